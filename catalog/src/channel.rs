// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Layout of the staging window shared by the two boot stages.
//!
//! ```text
//! 0x00  payload length, u32 little endian (plaintext)
//! 0x04  zero
//! 0x40  payload, encrypted, `length` bytes
//!       zero up to the end of the window
//! ```

use consts::{SIZE_HEADER_LEN, STAGING_PAYLOAD_OFFSET};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// The window cannot even hold the header.
    WindowTooSmall,
    /// The size header is zero: nothing was staged or it was already consumed.
    Empty,
    /// The declared length does not fit in the window.
    Overrun { len: usize, capacity: usize },
    /// Framing line `line` (zero based) has no newline inside the payload.
    MissingNewline { line: usize },
}

impl core::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WindowTooSmall => write!(f, "staging window too small"),
            Self::Empty => write!(f, "nothing staged"),
            Self::Overrun { len, capacity } => write!(
                f,
                "declared payload of {len} bytes overruns the window ({capacity} bytes)"
            ),
            Self::MissingNewline { line } => {
                write!(f, "framing line {} is not terminated", line + 1)
            }
        }
    }
}

impl core::error::Error for ChannelError {}

/// Number of payload bytes a window of `window_len` bytes can carry.
pub fn capacity(window_len: usize) -> usize {
    window_len.saturating_sub(STAGING_PAYLOAD_OFFSET)
}

/// Frame a payload of `len` bytes that is already in place: write the size
/// header, zero the rest of the header and everything after the payload.
pub fn frame(window: &mut [u8], len: usize) -> Result<(), ChannelError> {
    if window.len() < STAGING_PAYLOAD_OFFSET {
        return Err(ChannelError::WindowTooSmall);
    }
    let capacity = capacity(window.len());
    let header = u32::try_from(len)
        .ok()
        .filter(|_| len <= capacity)
        .ok_or(ChannelError::Overrun { len, capacity })?;
    window[..SIZE_HEADER_LEN].copy_from_slice(&header.to_le_bytes());
    window[SIZE_HEADER_LEN..STAGING_PAYLOAD_OFFSET].fill(0);
    window[STAGING_PAYLOAD_OFFSET + len..].fill(0);
    Ok(())
}

/// Read and validate the size header.
pub fn read_size_header(window: &[u8]) -> Result<usize, ChannelError> {
    if window.len() < STAGING_PAYLOAD_OFFSET {
        return Err(ChannelError::WindowTooSmall);
    }
    let mut header = [0; SIZE_HEADER_LEN];
    header.copy_from_slice(&window[..SIZE_HEADER_LEN]);
    let len = u32::from_le_bytes(header) as usize;
    let capacity = capacity(window.len());
    if len == 0 {
        return Err(ChannelError::Empty);
    }
    if len > capacity {
        return Err(ChannelError::Overrun { len, capacity });
    }
    Ok(len)
}

/// The whole payload region of the window.
pub fn payload_region(window: &mut [u8]) -> &mut [u8] {
    let start = STAGING_PAYLOAD_OFFSET.min(window.len());
    &mut window[start..]
}

/// Offset just past the first `lines` newline-terminated lines of `payload`.
/// Never looks outside `payload`.
pub fn skip_framing_lines(payload: &[u8], lines: usize) -> Result<usize, ChannelError> {
    let mut offset = 0;
    for line in 0..lines {
        let end = payload[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ChannelError::MissingNewline { line })?;
        offset += end + 1;
    }
    Ok(offset)
}

/// Zero the size header so the staged payload cannot be picked up again.
pub fn clear_header(window: &mut [u8]) {
    let end = SIZE_HEADER_LEN.min(window.len());
    window[..end].fill(0);
}

/// Zero the whole window.
pub fn scrub(window: &mut [u8]) {
    window.fill(0);
}
