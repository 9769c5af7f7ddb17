//! Loader config file.
//!
//! ```toml
//! mem = "/dev/mem"
//! base = 0x1fc00000
//! size = 0x400000
//! output = "/usr/bin/game"
//! key = "<64 hex characters>"
//! nonce = "<16 hex characters>"
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mem: Option<PathBuf>,
    pub base: Option<u64>,
    pub size: Option<usize>,
    pub output: Option<PathBuf>,
    pub key: Option<String>,
    pub nonce: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;
        toml::from_str(&text).map_err(|e| Error::Parse(path.to_owned(), e))
    }
}

#[derive(Debug)]
pub enum Error {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Read(path, e) => write!(f, "failed to read {}: {e}", path.display()),
            Error::Parse(path, e) => write!(f, "{} is not valid TOML: {e}", path.display()),
        }
    }
}

impl std::error::Error for Error {}
