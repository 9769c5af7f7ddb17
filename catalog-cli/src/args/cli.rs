//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Path to config file.
    #[clap(long, short, global = true)]
    pub config: Option<PathBuf>,
    /// Flash image holding the catalog page. Created blank if missing.
    #[clap(long, global = true)]
    pub flash: Option<PathBuf>,
    /// Directory with the provisioned game images.
    #[clap(long, global = true)]
    pub media: Option<PathBuf>,
    /// File standing in for the staging window.
    #[clap(long, global = true)]
    pub window: Option<PathBuf>,
    /// AES-256 staging key in hex (64 characters).
    #[clap(long, global = true)]
    pub key: Option<String>,
    /// CTR nonce in hex (16 characters).
    #[clap(long, global = true)]
    pub nonce: Option<String>,
    /// Log at debug level.
    #[clap(long, short, global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// List installed games.
    List,
    /// Install a game image from the media directory.
    Install {
        /// Image name, e.g. "chess-v1.0".
        image: String,
        /// User installing the game.
        #[clap(long, short)]
        user: String,
    },
    /// Uninstall a game.
    Uninstall {
        title: String,
    },
    /// Stage an installed game for the loader.
    Play {
        title: String,
        /// User playing the game, must be in the game's user list.
        #[clap(long, short)]
        user: String,
    },
    /// Show the images on the media and whether they are installed.
    Query,
    /// Check the media image of an installed game against its recorded
    /// digest.
    Verify {
        title: String,
    },
    /// Print every row of the catalog page.
    DumpFlash {
        /// Also write the raw page to this file.
        #[clap(long)]
        raw: Option<PathBuf>,
    },
    /// Erase the catalog and start over. Every installed game is forgotten.
    ResetFlash {
        /// Required, to avoid wiping the catalog by accident.
        #[clap(long)]
        yes: bool,
    },
}
