// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Game images kept as plain files in a directory.

use {
    catalog::{MediaError, MediaReader},
    std::{
        fs::File,
        io,
        os::unix::fs::FileExt,
        path::{Path, PathBuf},
    },
};

#[derive(Debug)]
pub struct DirMedia {
    root: PathBuf,
}

impl DirMedia {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Names of the images in the directory, sorted. Hash and signature side
    /// files are skipped.
    pub fn images(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(".SHA256") || name.ends_with(".SIG") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn path(&self, name: &str) -> Result<PathBuf, MediaError> {
        // Image names are single path components.
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(MediaError::NotFound),
        }
    }

    fn open(&self, name: &str) -> Result<File, MediaError> {
        File::open(self.path(name)?).map_err(io_error)
    }
}

impl MediaReader for DirMedia {
    fn image_len(&mut self, name: &str) -> Result<u32, MediaError> {
        let len = self.open(name)?.metadata().map_err(io_error)?.len();
        u32::try_from(len).map_err(|_| MediaError::TooLarge)
    }

    fn read_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, MediaError> {
        self.open(name)?
            .read_at(buf, offset.into())
            .map_err(io_error)
    }
}

fn io_error(e: io::Error) -> MediaError {
    match e.kind() {
        io::ErrorKind::NotFound => MediaError::NotFound,
        _ => MediaError::Io,
    }
}
