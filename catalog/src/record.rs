// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed-width catalog rows.
//!
//! Row layout, all rows the same width:
//!
//! | offset | len | field                          |
//! |--------|-----|--------------------------------|
//! | 0      | 1   | status                         |
//! | 1      | 32  | title, NUL padded              |
//! | 33     | 4   | major version, little endian   |
//! | 37     | 4   | minor version, little endian   |
//! | 41     | 16  | owning user, NUL padded        |
//! | 57     | 32  | SHA-256 of the media image     |

use consts::{DIGEST_LEN, OWNER_LEN, ROW_LEN, TITLE_LEN};

use crate::Error;

const TITLE_AT: usize = 1;
const MAJOR_AT: usize = TITLE_AT + TITLE_LEN;
const MINOR_AT: usize = MAJOR_AT + 4;
const OWNER_AT: usize = MINOR_AT + 4;
const DIGEST_AT: usize = OWNER_AT + OWNER_LEN;

/// Game title, at most 31 bytes so the NUL terminator always fits.
pub type Title = heapless::String<{ TITLE_LEN - 1 }>;

/// User name, at most 15 bytes.
pub type UserName = heapless::String<{ OWNER_LEN - 1 }>;

/// Raw SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// Row status.
///
/// The values are chosen so that the only transitions the catalog makes in
/// place, erased → installed → uninstalled, only ever clear bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Uninstalled = 0x00,
    Installed = 0x0F,
    /// Erased flash reads as all ones, so an erased row terminates a scan.
    EndOfTable = 0xFF,
}

impl Status {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Uninstalled),
            0x0F => Some(Self::Installed),
            0xFF => Some(Self::EndOfTable),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRecord {
    pub status: Status,
    pub title: Title,
    pub major: u32,
    pub minor: u32,
    pub owner: UserName,
    pub digest: Digest,
}

impl InstallRecord {
    /// Size of an encoded row in bytes.
    pub const SIZE: usize = ROW_LEN;

    /// Offset of the status byte inside a row.
    pub const STATUS_OFFSET: usize = 0;

    /// Build an installed row.
    pub fn installed(
        title: &str,
        major: u32,
        minor: u32,
        owner: &str,
        digest: Digest,
    ) -> Result<Self, Error> {
        Ok(Self {
            status: Status::Installed,
            title: Title::try_from(title).map_err(|_| Error::TitleTooLong)?,
            major,
            minor,
            owner: UserName::try_from(owner).map_err(|_| Error::OwnerTooLong)?,
            digest,
        })
    }

    /// The row that terminates a table.
    pub fn end_of_table() -> Self {
        Self {
            status: Status::EndOfTable,
            title: Title::new(),
            major: u32::MAX,
            minor: u32::MAX,
            owner: UserName::new(),
            digest: [0xFF; DIGEST_LEN],
        }
    }

    pub fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    pub fn is_installed(&self) -> bool {
        self.status == Status::Installed
    }

    pub fn is_end_of_table(&self) -> bool {
        self.status == Status::EndOfTable
    }

    /// Encode the row. An end of table row is always all ones, whatever its
    /// other fields hold.
    pub fn encode(&self) -> [u8; ROW_LEN] {
        let mut row = [0xFF; ROW_LEN];
        if self.is_end_of_table() {
            return row;
        }
        row[Self::STATUS_OFFSET] = self.status.to_byte();
        write_fixed(&mut row[TITLE_AT..MAJOR_AT], &self.title);
        row[MAJOR_AT..MINOR_AT].copy_from_slice(&self.major.to_le_bytes());
        row[MINOR_AT..OWNER_AT].copy_from_slice(&self.minor.to_le_bytes());
        write_fixed(&mut row[OWNER_AT..DIGEST_AT], &self.owner);
        row[DIGEST_AT..].copy_from_slice(&self.digest);
        row
    }

    /// Decode the row at position `index` of the table.
    ///
    /// A row whose status byte is still erased is an end of table row even
    /// if the rest of it was partially programmed before a power loss.
    pub fn decode(row: &[u8; ROW_LEN], index: usize) -> Result<Self, Error> {
        let status = Status::from_byte(row[Self::STATUS_OFFSET]).ok_or(Error::CorruptRow { index })?;
        if status == Status::EndOfTable {
            return Ok(Self::end_of_table());
        }

        let title = read_fixed(&row[TITLE_AT..MAJOR_AT]).ok_or(Error::CorruptRow { index })?;
        let owner = read_fixed(&row[OWNER_AT..DIGEST_AT]).ok_or(Error::CorruptRow { index })?;
        let mut major = [0; 4];
        major.copy_from_slice(&row[MAJOR_AT..MINOR_AT]);
        let mut minor = [0; 4];
        minor.copy_from_slice(&row[MINOR_AT..OWNER_AT]);
        let mut digest = [0; DIGEST_LEN];
        digest.copy_from_slice(&row[DIGEST_AT..]);

        Ok(Self {
            status,
            title: Title::try_from(title).map_err(|_| Error::CorruptRow { index })?,
            major: u32::from_le_bytes(major),
            minor: u32::from_le_bytes(minor),
            owner: UserName::try_from(owner).map_err(|_| Error::CorruptRow { index })?,
            digest,
        })
    }
}

fn write_fixed(field: &mut [u8], value: &str) {
    field.fill(0);
    field[..value.len()].copy_from_slice(value.as_bytes());
}

/// Read a NUL padded text field. The text must be UTF-8 and everything after
/// the first NUL must be NUL as well.
fn read_fixed(field: &[u8]) -> Option<&str> {
    let first_zero = field.iter().position(|&b| b == 0)?;
    if field[first_zero..].iter().any(|&b| b != 0) {
        return None;
    }
    core::str::from_utf8(&field[..first_zero]).ok()
}
