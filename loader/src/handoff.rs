// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Consumer side of the staging handoff.

use {
    crate::window::PhysicalWindow,
    catalog::{
        channel::{self, ChannelError},
        Aes256Ctr, Keystream, SessionKey,
    },
    consts::{FRAMING_LINES, STAGING_PAYLOAD_OFFSET},
    std::{
        io::Write,
        marker::PhantomData,
        path::{Path, PathBuf},
    },
    tracing::{debug, info},
};

/// Last step the loader completed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Start,
    MapWindow,
    ReadSizeHeader,
    Decrypt,
    SkipFramingLines,
    WriteExecutable,
    Done,
}

pub struct HandoffLoader<W, K = Aes256Ctr> {
    window: W,
    key: SessionKey,
    state: State,
    /// Copy of the whole window.
    buf: Vec<u8>,
    /// Declared payload length.
    len: usize,
    /// Length of the framing lines at the start of the payload.
    framing: usize,
    _keystream: PhantomData<K>,
}

impl<W: PhysicalWindow, K: Keystream> HandoffLoader<W, K> {
    pub fn new(window: W, key: SessionKey) -> Self {
        Self {
            window,
            key,
            state: State::Start,
            buf: Vec::new(),
            len: 0,
            framing: 0,
            _keystream: PhantomData,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run every step and leave the executable at `path`. With `consume` the
    /// size header is cleared afterwards so the blob cannot be loaded again.
    pub fn run(&mut self, path: &Path, consume: bool) -> Result<usize, Error> {
        self.map_window()?;
        self.read_size_header()?;
        self.decrypt()?;
        self.skip_framing_lines()?;
        let written = self.materialize(path)?;
        if consume {
            self.consume()?;
        } else {
            self.advance(State::Done);
        }
        Ok(written)
    }

    pub fn map_window(&mut self) -> Result<(), Error> {
        self.expect(State::Start)?;
        self.buf = vec![0; self.window.len()];
        self.window.read_into(&mut self.buf).map_err(Error::MapWindow)?;
        self.advance(State::MapWindow);
        Ok(())
    }

    pub fn read_size_header(&mut self) -> Result<usize, Error> {
        self.expect(State::MapWindow)?;
        self.len = channel::read_size_header(&self.buf)?;
        debug!("payload of {} bytes", self.len);
        self.advance(State::ReadSizeHeader);
        Ok(self.len)
    }

    pub fn decrypt(&mut self) -> Result<(), Error> {
        self.expect(State::ReadSizeHeader)?;
        K::init(&self.key).crypt_in_place(self.payload_mut());
        self.advance(State::Decrypt);
        Ok(())
    }

    pub fn skip_framing_lines(&mut self) -> Result<usize, Error> {
        self.expect(State::Decrypt)?;
        let payload = &self.buf[STAGING_PAYLOAD_OFFSET..STAGING_PAYLOAD_OFFSET + self.len];
        self.framing = channel::skip_framing_lines(payload, FRAMING_LINES)?;
        debug!("{} bytes of framing", self.framing);
        self.advance(State::SkipFramingLines);
        Ok(self.framing)
    }

    /// Write the executable next to `path` and rename it into place, so
    /// `path` either keeps its old contents or holds the complete new
    /// executable.
    pub fn materialize(&mut self, path: &Path) -> Result<usize, Error> {
        self.expect(State::SkipFramingLines)?;
        let start = STAGING_PAYLOAD_OFFSET + self.framing;
        let body = &self.buf[start..STAGING_PAYLOAD_OFFSET + self.len];

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        // The temporary file is removed on drop if anything below fails.
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(Error::CreateTempFile)?;
        file.write_all(body).map_err(Error::WriteExecutable)?;
        file.as_file().sync_all().map_err(Error::WriteExecutable)?;
        set_executable(file.as_file()).map_err(Error::SetPermissions)?;
        file.persist(path)
            .map_err(|e| Error::Persist(path.to_owned(), e.error))?;

        let written = body.len();
        info!("wrote {} bytes to {}", written, path.display());
        self.advance(State::WriteExecutable);
        Ok(written)
    }

    /// Clear the size header so the same blob is never loaded twice.
    pub fn consume(&mut self) -> Result<(), Error> {
        self.expect(State::WriteExecutable)?;
        self.window.clear_header().map_err(Error::ClearHeader)?;
        self.advance(State::Done);
        Ok(())
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[STAGING_PAYLOAD_OFFSET..STAGING_PAYLOAD_OFFSET + self.len]
    }

    fn expect(&self, state: State) -> Result<(), Error> {
        if self.state != state {
            return Err(Error::OutOfOrder {
                state: self.state,
                expected: state,
            });
        }
        Ok(())
    }

    fn advance(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

#[cfg(unix)]
fn set_executable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug)]
pub enum Error {
    Channel(ChannelError),
    ClearHeader(std::io::Error),
    CreateTempFile(std::io::Error),
    MapWindow(std::io::Error),
    OutOfOrder { state: State, expected: State },
    Persist(PathBuf, std::io::Error),
    SetPermissions(std::io::Error),
    WriteExecutable(std::io::Error),
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Channel(e) => write!(f, "invalid staged image: {e}"),
            Error::ClearHeader(e) => write!(f, "failed to clear the size header: {e}"),
            Error::CreateTempFile(e) => write!(f, "failed to create temporary file: {e}"),
            Error::MapWindow(e) => write!(f, "failed to read the staging window: {e}"),
            Error::OutOfOrder { state, expected } => {
                write!(f, "loader step run in state {state:?}, expected {expected:?}")
            }
            Error::Persist(path, e) => {
                write!(f, "failed to move executable to {}: {e}", path.display())
            }
            Error::SetPermissions(e) => write!(f, "failed to mark executable: {e}"),
            Error::WriteExecutable(e) => write!(f, "failed to write executable: {e}"),
        }
    }
}

impl std::error::Error for Error {}
