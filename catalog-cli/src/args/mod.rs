use {
    catalog::SessionKey,
    clap::Parser,
    consts::{DEFAULT_SHARED_KEY, DEFAULT_SHARED_NONCE},
    std::path::PathBuf,
};

mod cli;
mod config;

pub use config::Error as ConfigError;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub struct Args {
    pub flash: PathBuf,
    pub media: Option<PathBuf>,
    pub window: Option<PathBuf>,
    pub key: SessionKey,
    pub verbose: bool,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Install { image: String, user: String },
    Uninstall { title: String },
    Play { title: String, user: String },
    Query,
    Verify { title: String },
    DumpFlash { raw: Option<PathBuf> },
    ResetFlash,
}

impl Command {
    /// Whether the command reads game images.
    fn needs_media(&self) -> bool {
        matches!(
            self,
            Command::Install { .. } | Command::Play { .. } | Command::Query | Command::Verify { .. }
        )
    }
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

    let command = match cli.command {
        cli::Command::List => Command::List,
        cli::Command::Install { image, user } => Command::Install { image, user },
        cli::Command::Uninstall { title } => Command::Uninstall { title },
        cli::Command::Play { title, user } => Command::Play { title, user },
        cli::Command::Query => Command::Query,
        cli::Command::Verify { title } => Command::Verify { title },
        cli::Command::DumpFlash { raw } => Command::DumpFlash { raw },
        cli::Command::ResetFlash { yes: true } => Command::ResetFlash,
        cli::Command::ResetFlash { yes: false } => return Err(Error::ResetNotConfirmed),
    };

    // Reconcile the CLI and config arguments. Error if anything is specified both
    // on the CLI and in the config file.
    let flash = match (cli.flash, config.flash) {
        (None, None) => return Err(Error::FlashMissing),
        (Some(_), Some(_)) => return Err(Error::InConfigAndCli("flash")),
        (cli, config) => cli.or(config).unwrap_or_default(),
    };
    let media = match (cli.media, config.media) {
        (Some(_), Some(_)) => return Err(Error::InConfigAndCli("media")),
        (cli, config) => cli.or(config),
    };
    if media.is_none() && command.needs_media() {
        return Err(Error::MediaMissing);
    }
    let window = match (cli.window, config.window) {
        (Some(_), Some(_)) => return Err(Error::InConfigAndCli("window")),
        (cli, config) => cli.or(config),
    };
    if window.is_none() && matches!(command, Command::Play { .. }) {
        return Err(Error::WindowMissing);
    }
    let key = match (cli.key, config.key) {
        (Some(_), Some(_)) => return Err(Error::InConfigAndCli("key")),
        (cli, config) => cli.or(config),
    };
    let nonce = match (cli.nonce, config.nonce) {
        (Some(_), Some(_)) => return Err(Error::InConfigAndCli("nonce")),
        (cli, config) => cli.or(config),
    };

    // Parse the arguments.
    let mut key_bytes = DEFAULT_SHARED_KEY;
    if let Some(key) = key {
        hex::decode_to_slice(key.trim(), &mut key_bytes).map_err(|_| Error::InvalidKeyHex)?;
    }
    let mut nonce_bytes = DEFAULT_SHARED_NONCE;
    if let Some(nonce) = nonce {
        hex::decode_to_slice(nonce.trim(), &mut nonce_bytes).map_err(|_| Error::InvalidNonceHex)?;
    }

    Ok(Args {
        flash,
        media,
        window,
        key: SessionKey::from_parts(key_bytes, nonce_bytes),
        verbose: cli.verbose,
        command,
    })
}

#[derive(Debug)]
pub enum Error {
    Cli(clap::Error),
    Config(ConfigError),
    FlashMissing,
    InConfigAndCli(&'static str),
    InvalidKeyHex,
    InvalidNonceHex,
    MediaMissing,
    ResetNotConfirmed,
    WindowMissing,
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
            Error::FlashMissing => write!(
                f,
                "flash image must be specified, either with --flash or in the config file"
            ),
            Error::InConfigAndCli(name) => write!(f, "{name} specified in both config and cli"),
            Error::InvalidKeyHex => write!(f, "key must be 32 bytes of hex"),
            Error::InvalidNonceHex => write!(f, "nonce must be 8 bytes of hex"),
            Error::MediaMissing => write!(
                f,
                "media directory must be specified, either with --media or in the config file"
            ),
            Error::ResetNotConfirmed => {
                write!(f, "reset-flash erases every installed game, pass --yes to confirm")
            }
            Error::WindowMissing => write!(
                f,
                "staging window file must be specified, either with --window or in the config file"
            ),
        }
    }
}

impl std::error::Error for Error {}
