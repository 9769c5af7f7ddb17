// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! NOR flash emulated in RAM.
//!
//! Programming can only clear bits, erasing sets a whole page back to ones,
//! exactly like the SPI NOR part on the board. Used by the host tool to work
//! on flash dumps and by the tests, which can also cut the power after a
//! given number of program or erase operations.

use consts::FLASH_PAGE_SIZE;
use embedded_storage::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RamFlashError {
    NotAligned,
    OutOfBounds,
    /// The simulated power cut happened; the operation did not take place.
    PowerLoss,
}

impl NorFlashError for RamFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::PowerLoss => NorFlashErrorKind::Other,
        }
    }
}

/// Flash contents held in any byte buffer, typically a `Vec<u8>` loaded from
/// a dump file.
#[derive(Debug)]
pub struct RamFlash<B> {
    bytes: B,
    /// Remaining program/erase operations before the power is cut.
    power_budget: Option<usize>,
    erase_count: usize,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RamFlash<B> {
    /// Wrap existing flash contents. The length must be a whole number of pages.
    pub fn new(bytes: B) -> Result<Self, RamFlashError> {
        if bytes.as_ref().len() % FLASH_PAGE_SIZE != 0 {
            return Err(RamFlashError::NotAligned);
        }
        Ok(Self {
            bytes,
            power_budget: None,
            erase_count: 0,
        })
    }

    /// Let `ops` more program or erase operations succeed, then fail every
    /// following one with [`RamFlashError::PowerLoss`].
    pub fn cut_power_after(&mut self, ops: usize) {
        self.power_budget = Some(ops);
    }

    pub fn restore_power(&mut self) {
        self.power_budget = None;
    }

    /// Number of page erases performed so far.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.bytes
    }

    fn spend_power(&mut self) -> Result<(), RamFlashError> {
        match self.power_budget.as_mut() {
            Some(0) => Err(RamFlashError::PowerLoss),
            Some(budget) => {
                *budget -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, RamFlashError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(RamFlashError::OutOfBounds)?;
        if end > self.bytes.as_ref().len() {
            return Err(RamFlashError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<B> ErrorType for RamFlash<B> {
    type Error = RamFlashError;
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ReadNorFlash for RamFlash<B> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes.as_ref()[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.as_ref().len()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> NorFlash for RamFlash<B> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = FLASH_PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
            return Err(RamFlashError::NotAligned);
        }
        if to < from {
            return Err(RamFlashError::OutOfBounds);
        }
        let range = self.range(from, (to - from) as usize)?;
        self.spend_power()?;
        self.bytes.as_mut()[range].fill(0xFF);
        self.erase_count += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        self.spend_power()?;
        // NOR cells can only be pulled from 1 to 0 by programming.
        for (cell, &b) in self.bytes.as_mut()[range].iter_mut().zip(bytes) {
            *cell &= b;
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> MultiwriteNorFlash for RamFlash<B> {}
