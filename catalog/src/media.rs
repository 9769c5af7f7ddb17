// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Media access failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MediaError {
    NotFound,
    /// The image is larger than `u32::MAX` bytes.
    TooLarge,
    /// Fewer bytes came back than the image length promised.
    UnexpectedEof,
    Io,
}

impl core::fmt::Display for MediaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "image not found on media"),
            Self::TooLarge => write!(f, "image too large"),
            Self::UnexpectedEof => write!(f, "image shorter than expected"),
            Self::Io => write!(f, "media I/O error"),
        }
    }
}

impl core::error::Error for MediaError {}

/// Read-only access to game images on removable media.
pub trait MediaReader {
    /// Length of the named image in bytes.
    fn image_len(&mut self, name: &str) -> Result<u32, MediaError>;

    /// Read from the named image at `offset` into `buf`. Returns the number of
    /// bytes read, which is only short at the end of the image.
    fn read_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, MediaError>;

    /// Fill `buf` completely from `offset`.
    fn read_exact_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<(), MediaError> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read_at(name, offset + done as u32, &mut buf[done..])?;
            if n == 0 {
                return Err(MediaError::UnexpectedEof);
            }
            done += n;
        }
        Ok(())
    }
}
