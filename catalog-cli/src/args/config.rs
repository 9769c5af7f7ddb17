use std::path::{Path, PathBuf};

/// `gamectl` config file. Every field can also be given on the command line,
/// but not in both places.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub flash: Option<PathBuf>,
    pub media: Option<PathBuf>,
    pub window: Option<PathBuf>,
    pub key: Option<String>,
    pub nonce: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&config)?;
        // Relative paths are relative to the config file.
        if let Some(dir) = path.parent() {
            for field in [&mut config.flash, &mut config.media, &mut config.window] {
                if let Some(p) = field.as_mut().filter(|p| p.is_relative()) {
                    *p = dir.join(&*p);
                }
            }
        }
        Ok(config)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Toml(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "failed to read config file: {e}"),
            Error::Toml(e) => write!(f, "config file format error in TOML: {e}"),
        }
    }
}

impl std::error::Error for Error {}
