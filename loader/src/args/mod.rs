use {
    catalog::SessionKey,
    clap::Parser,
    consts::{
        DEFAULT_GAME_PATH, DEFAULT_MEM_PATH, DEFAULT_SHARED_KEY, DEFAULT_SHARED_NONCE,
        STAGING_WINDOW_BASE, STAGING_WINDOW_SIZE,
    },
    std::path::PathBuf,
};

mod cli;
mod config;

pub use config::Error as ConfigError;

/// Loader arguments merged from the CLI and the config file.
#[derive(Debug, Clone)]
pub struct Args {
    pub mem: PathBuf,
    pub base: u64,
    pub size: usize,
    pub output: PathBuf,
    pub key: SessionKey,
    pub keep: bool,
    pub verbose: bool,
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    let config = cli
        .config
        .as_deref()
        .map(config::Config::load)
        .transpose()?
        .unwrap_or_default();

    // Anything given both on the CLI and in the config file is an error.
    let mem = pick(cli.mem, config.mem, "mem")?.unwrap_or_else(|| DEFAULT_MEM_PATH.into());
    let base = pick(cli.base, config.base, "base")?.unwrap_or(STAGING_WINDOW_BASE);
    let size = pick(cli.size, config.size, "size")?.unwrap_or(STAGING_WINDOW_SIZE);
    let output =
        pick(cli.output, config.output, "output")?.unwrap_or_else(|| DEFAULT_GAME_PATH.into());
    let key = pick(cli.key, config.key, "key")?
        .map(|key| decode_hex::<32>(&key).ok_or(Error::InvalidKeyHex))
        .transpose()?
        .unwrap_or(DEFAULT_SHARED_KEY);
    let nonce = pick(cli.nonce, config.nonce, "nonce")?
        .map(|nonce| decode_hex::<8>(&nonce).ok_or(Error::InvalidNonceHex))
        .transpose()?
        .unwrap_or(DEFAULT_SHARED_NONCE);

    if size <= consts::STAGING_PAYLOAD_OFFSET {
        return Err(Error::WindowTooSmall(size));
    }

    Ok(Args {
        mem,
        base,
        size,
        output,
        key: SessionKey::from_parts(key, nonce),
        keep: cli.keep,
        verbose: cli.verbose,
    })
}

fn pick<T>(cli: Option<T>, config: Option<T>, name: &'static str) -> Result<Option<T>, Error> {
    match (cli, config) {
        (Some(_), Some(_)) => Err(Error::InConfigAndCli(name)),
        (cli, config) => Ok(cli.or(config)),
    }
}

fn decode_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0; N];
    hex::decode_to_slice(s.trim(), &mut out).ok()?;
    Some(out)
}

/// Parse a decimal or `0x` prefixed hexadecimal number.
pub fn parse_number<T: TryFrom<u64>>(s: &str) -> Result<T, String> {
    let s = s.replace('_', "");
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid number {s:?}: {e}"))?;
    T::try_from(value).map_err(|_| format!("{value:#x} is out of range"))
}

#[derive(Debug)]
pub enum Error {
    Cli(clap::Error),
    Config(ConfigError),
    InConfigAndCli(&'static str),
    InvalidKeyHex,
    InvalidNonceHex,
    WindowTooSmall(usize),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::InConfigAndCli(name) => {
                write!(f, "{name} specified in both config and cli")
            }
            Error::InvalidKeyHex => write!(f, "key must be 32 bytes of hex"),
            Error::InvalidNonceHex => write!(f, "nonce must be 8 bytes of hex"),
            Error::WindowTooSmall(size) => {
                write!(f, "window of {size} bytes cannot hold a staged image")
            }
        }
    }
}

impl std::error::Error for Error {}
