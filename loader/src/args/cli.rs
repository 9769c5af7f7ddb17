//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to config file.
    #[clap(long, short)]
    pub config: Option<PathBuf>,
    /// Memory device holding the staging window.
    #[clap(long)]
    pub mem: Option<PathBuf>,
    /// Physical address of the staging window, decimal or 0x-prefixed hex.
    #[clap(long, value_parser = super::parse_number::<u64>)]
    pub base: Option<u64>,
    /// Size of the staging window in bytes, decimal or 0x-prefixed hex.
    #[clap(long, value_parser = super::parse_number::<usize>)]
    pub size: Option<usize>,
    /// Where to write the game executable.
    #[clap(long, short)]
    pub output: Option<PathBuf>,
    /// AES-256 key in hex (64 characters).
    #[clap(long)]
    pub key: Option<String>,
    /// CTR nonce in hex (16 characters).
    #[clap(long)]
    pub nonce: Option<String>,
    /// Leave the size header in place after loading.
    #[clap(long)]
    pub keep: bool,
    /// Log at debug level.
    #[clap(long, short)]
    pub verbose: bool,
}
