// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Access to the reserved physical memory holding the staging window.

use {
    consts::SIZE_HEADER_LEN,
    std::{
        fs::{File, OpenOptions},
        io,
        os::unix::fs::FileExt,
        path::Path,
    },
};

/// Fixed region of physical memory.
pub trait PhysicalWindow {
    /// Size of the window in bytes.
    fn len(&self) -> usize;

    /// Copy the whole window into `buf`, which is exactly [`len`](Self::len)
    /// bytes long.
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Zero the size header at the start of the window.
    fn clear_header(&mut self) -> io::Result<()>;
}

/// Window backed by a memory device such as `/dev/mem`, or by a plain file
/// for testing.
#[derive(Debug)]
pub struct DevMem {
    file: File,
    base: u64,
    len: usize,
}

impl DevMem {
    pub fn open(path: &Path, base: u64, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, base, len })
    }
}

impl PhysicalWindow for DevMem {
    fn len(&self) -> usize {
        self.len
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if buf.len() != self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer does not match the window size",
            ));
        }
        self.file.read_exact_at(buf, self.base)
    }

    fn clear_header(&mut self) -> io::Result<()> {
        self.file.write_all_at(&[0; SIZE_HEADER_LEN], self.base)
    }
}
