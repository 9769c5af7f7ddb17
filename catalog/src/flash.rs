// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Catalog table kept in a single erase page of NOR flash.
//!
//! ```text
//! page base
//! +----------+-------+-------+-----+-------------+----------------+
//! | sentinel | row 0 | row 1 | ... | end of table | erased (0xFF) |
//! +----------+-------+-------+-----+-------------+----------------+
//! ```
//!
//! Writes that only clear bits are programmed in place. Anything that needs a
//! bit to go back to one is done by copying the page to RAM, patching it,
//! erasing the page and programming it back: sentinel first, then the rows in
//! order with each status byte last. A power cut at any point leaves either a
//! missing sentinel or a table whose first unfinished row reads as erased,
//! which a scan treats as the end of the table.

use consts::{CATALOG_MAGIC, FLASH_PAGE_SIZE, MAX_ROWS, ROW_LEN, SENTINEL_LEN};
use embedded_storage::nor_flash::{MultiwriteNorFlash, NorFlash, NorFlashError};
use tracing::{debug, info, warn};

use crate::record::{InstallRecord, Status};
use crate::Error;

/// State of the flash bytes under a pending write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PageState {
    /// All ones, anything can be programmed.
    Clean,
    /// Already programmed; only writes that clear bits can go in place.
    Dirty,
}

impl PageState {
    pub fn of(bytes: &[u8]) -> Self {
        if bytes.iter().all(|&b| b == 0xFF) {
            Self::Clean
        } else {
            Self::Dirty
        }
    }
}

/// Whether `new` can be programmed over `old` without an erase.
fn programmable_over(old: &[u8], new: &[u8]) -> bool {
    old.iter().zip(new).all(|(&o, &n)| o & n == n)
}

/// Outcome of [`FlashTable::bootstrap`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    AlreadyInitialized,
    Initialized,
}

/// Flash device plus the base of the catalog page; all offsets are relative
/// to the page.
struct Region<F> {
    flash: F,
    base: u32,
}

impl<F: NorFlash> Region<F> {
    fn erase(&mut self) -> Result<(), Error> {
        let to = self.base + FLASH_PAGE_SIZE as u32;
        self.flash.erase(self.base, to).map_err(|e| Error::Flash(e.kind()))
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.flash
            .read(self.base + offset as u32, buf)
            .map_err(|e| Error::Flash(e.kind()))
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        self.flash
            .write(self.base + offset as u32, data)
            .map_err(|e| Error::Flash(e.kind()))
    }
}

/// Owning handle over the catalog page.
pub struct FlashTable<F> {
    region: Region<F>,
    /// Scratch copy of the page for erase and rewrite cycles.
    page: [u8; FLASH_PAGE_SIZE],
}

impl<F> FlashTable<F>
where
    F: NorFlash + MultiwriteNorFlash,
{
    /// Take ownership of the flash device and place the catalog at `base`.
    ///
    /// The catalog is not touched; call [`bootstrap`](Self::bootstrap) before
    /// using it on a device that may be blank.
    pub fn open(flash: F, base: u32) -> Result<Self, Error> {
        if F::WRITE_SIZE != 1 || F::ERASE_SIZE != FLASH_PAGE_SIZE {
            return Err(Error::UnsupportedGeometry);
        }
        if base as usize % FLASH_PAGE_SIZE != 0
            || base as usize + FLASH_PAGE_SIZE > flash.capacity()
        {
            return Err(Error::UnsupportedGeometry);
        }
        Ok(Self {
            region: Region { flash, base },
            page: [0xFF; FLASH_PAGE_SIZE],
        })
    }

    /// Give the flash device back.
    pub fn close(self) -> F {
        self.region.flash
    }

    pub fn base(&self) -> u32 {
        self.region.base
    }

    pub fn is_initialized(&mut self) -> Result<bool, Error> {
        Ok(self.read_sentinel()? == CATALOG_MAGIC)
    }

    /// Initialize the table if the sentinel is erased. Calling it again is a
    /// no-op.
    ///
    /// A sentinel that is neither erased nor valid is left alone and reported
    /// as [`Error::CorruptSentinel`]; only [`factory_reset`](Self::factory_reset)
    /// clears it.
    pub fn bootstrap(&mut self) -> Result<Bootstrap, Error> {
        match self.check_sentinel() {
            Ok(()) => {
                debug!("catalog sentinel present at {:#x}", self.region.base);
                return Ok(Bootstrap::AlreadyInitialized);
            }
            Err(Error::MissingSentinel) => {}
            Err(e) => return Err(e),
        }
        self.format()?;
        info!("catalog initialized at {:#x}", self.region.base);
        Ok(Bootstrap::Initialized)
    }

    /// Wipe the table unconditionally and start over with an empty catalog.
    pub fn factory_reset(&mut self) -> Result<(), Error> {
        warn!("factory reset of catalog at {:#x}", self.region.base);
        self.format()
    }

    /// Iterate over the rows in table order, ending with the end of table
    /// row if there is one.
    pub fn scan(&mut self) -> Scan<'_, F> {
        Scan {
            table: self,
            index: 0,
            state: ScanState::Start,
        }
    }

    /// Iterate over the installed rows only.
    pub fn installed(&mut self) -> impl Iterator<Item = Result<InstallRecord, Error>> + '_ {
        self.scan()
            .filter(|row| !matches!(row, Ok(record) if !record.is_installed()))
    }

    /// First installed row with the given title.
    pub fn find_by_title(&mut self, title: &str) -> Result<Option<InstallRecord>, Error> {
        Ok(self.locate(title)?.map(|(_, record)| record))
    }

    /// Number of rows that can still be appended.
    pub fn free_rows(&mut self) -> Result<usize, Error> {
        let end = self.end_of_table()?;
        // Every append also needs room for the new terminator.
        Ok(MAX_ROWS.saturating_sub(end + 1))
    }

    /// Put `record` where the end of table row is and write a new end of
    /// table row after it.
    pub fn append(&mut self, record: &InstallRecord) -> Result<(), Error> {
        if !record.is_installed() {
            return Err(Error::NotInstalled);
        }
        if self.locate(&record.title)?.is_some() {
            return Err(Error::AlreadyInstalled);
        }
        let end = self.end_of_table()?;
        if end + 1 >= MAX_ROWS {
            return Err(Error::TableFull);
        }
        self.program_row(end, &record.encode())?;
        self.program_row(end + 1, &InstallRecord::end_of_table().encode())?;
        info!(
            "catalog row {} <- {} {}.{} ({})",
            end,
            record.title.as_str(),
            record.major,
            record.minor,
            record.owner.as_str()
        );
        Ok(())
    }

    /// Turn the installed row for `title` into a tombstone.
    pub fn mark_removed(&mut self, title: &str) -> Result<InstallRecord, Error> {
        let (index, record) = self.locate(title)?.ok_or(Error::NotInstalled)?;
        let offset = Self::row_offset(index) + InstallRecord::STATUS_OFFSET;
        self.program(offset, &[Status::Uninstalled.to_byte()])?;
        info!("catalog row {} tombstoned ({})", index, title);
        Ok(record)
    }

    /// Copy of the raw catalog page.
    pub fn raw_page(&mut self, out: &mut [u8; FLASH_PAGE_SIZE]) -> Result<(), Error> {
        self.region.read(0, out)
    }

    fn format(&mut self) -> Result<(), Error> {
        self.region.erase()?;
        self.region.write(0, &CATALOG_MAGIC)?;
        self.program_row(0, &InstallRecord::end_of_table().encode())
    }

    fn locate(&mut self, title: &str) -> Result<Option<(usize, InstallRecord)>, Error> {
        for (index, row) in self.scan().enumerate() {
            let record = row?;
            if record.is_installed() && record.title == title {
                return Ok(Some((index, record)));
            }
        }
        Ok(None)
    }

    /// Index of the end of table row, or [`MAX_ROWS`] if the page has none.
    fn end_of_table(&mut self) -> Result<usize, Error> {
        let mut end = 0;
        for row in self.scan() {
            if row?.is_end_of_table() {
                return Ok(end);
            }
            end += 1;
        }
        Ok(end)
    }

    fn row_offset(index: usize) -> usize {
        SENTINEL_LEN + index * ROW_LEN
    }

    /// `MissingSentinel` for an erased sentinel, `CorruptSentinel` for
    /// anything else that is not the magic value.
    fn check_sentinel(&mut self) -> Result<(), Error> {
        let sentinel = self.read_sentinel()?;
        if sentinel == CATALOG_MAGIC {
            return Ok(());
        }
        match PageState::of(&sentinel) {
            PageState::Clean => Err(Error::MissingSentinel),
            PageState::Dirty => {
                warn!("catalog sentinel corrupt ({:02x?})", sentinel);
                Err(Error::CorruptSentinel)
            }
        }
    }

    fn read_sentinel(&mut self) -> Result<[u8; SENTINEL_LEN], Error> {
        let mut sentinel = [0; SENTINEL_LEN];
        self.region.read(0, &mut sentinel)?;
        Ok(sentinel)
    }

    fn read_row(&mut self, index: usize) -> Result<[u8; ROW_LEN], Error> {
        let mut row = [0; ROW_LEN];
        self.region.read(Self::row_offset(index), &mut row)?;
        Ok(row)
    }

    /// Program a whole row, status byte last.
    fn program_row(&mut self, index: usize, row: &[u8; ROW_LEN]) -> Result<(), Error> {
        let offset = Self::row_offset(index);
        let current = self.read_row(index)?;
        if !programmable_over(&current, row) {
            return self.rewrite_page(offset, row);
        }
        if current[1..] != row[1..] {
            self.region.write(offset + 1, &row[1..])?;
        }
        if current[0] != row[0] {
            self.region.write(offset, &row[..1])?;
        }
        Ok(())
    }

    /// Program `data` at `offset` in the page, erasing first if needed.
    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        let mut current = [0; ROW_LEN];
        let current = &mut current[..data.len()];
        self.region.read(offset, current)?;
        if current == data {
            return Ok(());
        }
        if programmable_over(current, data) {
            return self.region.write(offset, data);
        }
        self.rewrite_page(offset, data)
    }

    fn rewrite_page(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        debug!("catalog write at {:#x} needs an erase, rewriting page", offset);
        let Self { region, page } = self;
        region.read(0, page)?;
        page[offset..offset + data.len()].copy_from_slice(data);

        // Rows past the terminator are dropped by the rewrite.
        let rows = (0..MAX_ROWS)
            .take_while(|&index| {
                page[Self::row_offset(index) + InstallRecord::STATUS_OFFSET]
                    != Status::EndOfTable.to_byte()
            })
            .count();

        region.erase()?;
        region.write(0, &page[..SENTINEL_LEN])?;
        for index in 0..rows {
            let start = Self::row_offset(index);
            region.write(start + 1, &page[start + 1..start + ROW_LEN])?;
            region.write(start, &page[start..start + 1])?;
        }
        info!("catalog page rewritten with {} rows", rows);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ScanState {
    Start,
    Rows,
    Done,
}

/// Iterator returned by [`FlashTable::scan`].
///
/// Never reads past the catalog page. Stops after the end of table row, after
/// the last row of the page, or after the first error.
pub struct Scan<'a, F> {
    table: &'a mut FlashTable<F>,
    index: usize,
    state: ScanState,
}

impl<F> Iterator for Scan<'_, F>
where
    F: NorFlash + MultiwriteNorFlash,
{
    type Item = Result<InstallRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ScanState::Start {
            match self.table.check_sentinel() {
                Ok(()) => self.state = ScanState::Rows,
                Err(e) => {
                    self.state = ScanState::Done;
                    return Some(Err(e));
                }
            }
        }
        if self.state == ScanState::Done || self.index >= MAX_ROWS {
            self.state = ScanState::Done;
            return None;
        }

        let index = self.index;
        self.index += 1;
        let record = self
            .table
            .read_row(index)
            .and_then(|row| InstallRecord::decode(&row, index));
        match &record {
            Ok(record) if !record.is_end_of_table() => {}
            _ => self.state = ScanState::Done,
        }
        Some(record)
    }
}
