// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Post-boot loader: picks up the image staged by the catalog shell, decrypts
//! it and leaves a launchable executable behind.

use {
    colored::Colorize,
    std::{ffi::OsString, io::Write},
    tracing::{info, warn},
    tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

mod args;
mod handoff;
mod window;

#[cfg(test)]
mod tests;

fn main() -> std::process::ExitCode {
    main_args(
        std::env::args_os(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting.
            writeln!(stderr, "{e}").expect("write error to stderr");
            ExitCode(1)
        }
        Err(e) => {
            writeln!(stderr, "{} {e}", "error:".bold().red()).expect("write error to stderr");
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = args::args(args)?;
    init_logging(args.verbose);

    if args.key.is_shared_default() {
        warn!("no provisioned key, using the built-in shared key");
    }
    info!(
        "loading staged image from {} at {:#x}",
        args.mem.display(),
        args.base
    );

    let window = window::DevMem::open(&args.mem, args.base, args.size)
        .map_err(|e| Error::OpenMem(args.mem.clone(), e))?;
    let mut loader: handoff::HandoffLoader<_> = handoff::HandoffLoader::new(window, args.key);
    let written = loader.run(&args.output, !args.keep)?;

    writeln!(
        &mut stdout,
        "{} {} ({written} bytes)",
        "loaded".bold(),
        args.output.display()
    )
    .map_err(Error::Stdout)?;
    Ok(())
}

/// Log to stderr, `info` by default or `debug` with `--verbose`. `RUST_LOG`
/// overrides both.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Only the first call installs a subscriber; tests call `run` repeatedly.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    Handoff(handoff::Error),
    OpenMem(std::path::PathBuf, std::io::Error),
    Stdout(std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<handoff::Error> for Error {
    fn from(e: handoff::Error) -> Self {
        Error::Handoff(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::Handoff(e) => write!(f, "{e}"),
            Error::OpenMem(path, e) => write!(f, "failed to open {}: {e}", path.display()),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
        }
    }
}

impl std::error::Error for Error {}
