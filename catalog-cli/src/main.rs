// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host front end for the game catalog.
//!
//! Works on a flash dump file, a directory of provisioned game images and a
//! file standing in for the staging window. Every command opens the flash
//! dump, runs against the catalog page and writes the dump back only if a
//! byte changed.

use {
    args::{Args, Command},
    catalog::{
        Bootstrap, CatalogService, FlashTable, InstallOutcome, InstallRecord, MediaReader,
        PageState, RamFlash, Sha256Hasher, StagingWriter, Status,
    },
    colored::Colorize,
    consts::{CATALOG_BASE, CATALOG_MAGIC, FLASH_PAGE_SIZE, SENTINEL_LEN, STAGING_WINDOW_SIZE},
    media::DirMedia,
    std::{
        ffi::OsString,
        io::Write,
        path::{Path, PathBuf},
    },
    tracing::{info, warn},
    tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

mod args;
mod media;

#[cfg(test)]
mod tests;

type Service = CatalogService<RamFlash<Vec<u8>>, DirMedia, Sha256Hasher>;

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

    let flash = load_flash(&args.flash)?;
    let original = flash.as_bytes().to_vec();
    let table = FlashTable::open(flash, CATALOG_BASE)?;

    if matches!(args.command, Command::Play { .. }) && args.key.is_shared_default() {
        warn!("no provisioned key, staging with the built-in shared key");
    }
    let media = DirMedia::new(args.media.clone().unwrap_or_default());
    let writer = StagingWriter::new(args.key.clone());
    let mut service: Service = CatalogService::new(table, media, Sha256Hasher::default(), writer);

    // Run the command, then save whatever it managed to change in flash even
    // if it failed halfway.
    let result = command(&args, &mut service, &mut stdout);
    let (table, _) = service.into_parts();
    let flash = table.close().into_inner();
    if flash != original {
        persist(&args.flash, &flash)?;
        info!("flash image {} updated", args.flash.display());
    }
    result
}

fn command(args: &Args, service: &mut Service, stdout: &mut impl Write) -> Result<(), Error> {
    if !matches!(args.command, Command::DumpFlash { .. } | Command::ResetFlash)
        && service.table().bootstrap()? == Bootstrap::Initialized
    {
        info!("blank catalog initialized in {}", args.flash.display());
    }

    match &args.command {
        Command::List => list(service, stdout),
        Command::Install { image, user } => {
            let line = match service.install(image, user)? {
                InstallOutcome::Installed(record) => {
                    format!("{} {image} for {}", "installed".bold(), record.owner)
                }
                InstallOutcome::Upgraded { from, record } => format!(
                    "{} {} from {}.{} to {}.{}",
                    "upgraded".bold(),
                    record.title,
                    from.0,
                    from.1,
                    record.major,
                    record.minor
                ),
                InstallOutcome::Unchanged(record) => format!(
                    "{} {}.{} already installed",
                    record.title, record.major, record.minor
                ),
            };
            writeln!(stdout, "{line}").map_err(Error::Stdout)
        }
        Command::Uninstall { title } => {
            let record = service.uninstall(title)?;
            writeln!(
                stdout,
                "{} {} {}.{}",
                "uninstalled".bold(),
                record.title,
                record.major,
                record.minor
            )
            .map_err(Error::Stdout)
        }
        Command::Play { title, user } => {
            // Checked when the arguments were parsed.
            let Some(path) = args.window.as_deref() else {
                return Err(Error::Args(args::Error::WindowMissing));
            };
            play(service, path, title, user, stdout)
        }
        Command::Query => query(service, args.media.as_deref().unwrap_or(Path::new(".")), stdout),
        Command::Verify { title } => {
            service.verify_digest(title)?;
            writeln!(stdout, "{} {title}", "verified".bold()).map_err(Error::Stdout)
        }
        Command::DumpFlash { raw } => dump_flash(service, raw.as_deref(), stdout),
        Command::ResetFlash => {
            service.table().factory_reset()?;
            writeln!(stdout, "{}", "catalog erased".bold()).map_err(Error::Stdout)
        }
    }
}

fn list(service: &mut Service, stdout: &mut impl Write) -> Result<(), Error> {
    let mut count = 0;
    for record in service.list() {
        let record = record?;
        writeln!(stdout, "{}", describe(&record)).map_err(Error::Stdout)?;
        count += 1;
    }
    if count == 0 {
        writeln!(stdout, "no games installed").map_err(Error::Stdout)?;
    }
    Ok(())
}

fn play(
    service: &mut Service,
    path: &Path,
    title: &str,
    user: &str,
    stdout: &mut impl Write,
) -> Result<(), Error> {
    let mut window = match std::fs::read(path) {
        Ok(window) => window,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![0; STAGING_WINDOW_SIZE],
        Err(e) => return Err(Error::Window(path.to_owned(), e)),
    };
    let original = window.clone();

    let result = service.play(title, user, &mut window);
    // A failed play scrubs the window; that is written back too.
    if window != original {
        persist(path, &window)?;
    }
    let len = result?;
    writeln!(
        stdout,
        "{} {title} ({}) in {}",
        "staged".bold(),
        humansize::format_size(len, humansize::DECIMAL),
        path.display()
    )
    .map_err(Error::Stdout)
}

fn query(service: &mut Service, dir: &Path, stdout: &mut impl Write) -> Result<(), Error> {
    let images = service
        .media()
        .images()
        .map_err(|e| Error::Media(dir.to_owned(), e))?;
    if images.is_empty() {
        writeln!(stdout, "no images in {}", dir.display()).map_err(Error::Stdout)?;
    }
    for image in images {
        let manifest = match service.read_manifest(&image) {
            Ok(manifest) => manifest,
            Err(e) => {
                writeln!(stdout, "{image}: {} {e}", "unusable:".yellow()).map_err(Error::Stdout)?;
                continue;
            }
        };
        let size = service.media().image_len(&image).map_err(catalog::Error::from)?;
        let state = match service.table().find_by_title(&manifest.title)? {
            Some(record) if record.version() == manifest.version() => "installed".green(),
            Some(record) => format!("{}.{} installed", record.major, record.minor)
                .as_str()
                .yellow(),
            None => "not installed".normal(),
        };
        let users: Vec<&str> = manifest.users.iter().map(|u| u.as_str()).collect();
        writeln!(
            stdout,
            "{image}: {} {}.{}, {}, users {}, {state}",
            manifest.title,
            manifest.major,
            manifest.minor,
            humansize::format_size(size, humansize::DECIMAL),
            users.join(" "),
        )
        .map_err(Error::Stdout)?;
    }
    Ok(())
}

fn dump_flash(service: &mut Service, raw: Option<&Path>, stdout: &mut impl Write) -> Result<(), Error> {
    let table = service.table();
    let mut page = Box::new([0; FLASH_PAGE_SIZE]);
    table.raw_page(&mut page)?;

    let sentinel = &page[..SENTINEL_LEN];
    let state = if sentinel == CATALOG_MAGIC {
        "valid".green()
    } else if PageState::of(sentinel) == PageState::Clean {
        "missing".red()
    } else {
        "corrupt".red()
    };
    writeln!(
        stdout,
        "sentinel {} at {:#x} ({state})",
        hex::encode(sentinel),
        table.base()
    )
    .map_err(Error::Stdout)?;

    for (index, record) in table.scan().enumerate() {
        match record {
            Ok(record) if record.is_end_of_table() => {
                writeln!(stdout, "{index:4} end of table").map_err(Error::Stdout)?;
            }
            Ok(record) => {
                writeln!(stdout, "{index:4} {}", describe(&record)).map_err(Error::Stdout)?;
            }
            Err(e) => {
                writeln!(stdout, "{index:4} {} {e}", "error:".red()).map_err(Error::Stdout)?;
            }
        }
    }

    if let Some(path) = raw {
        persist(path, &page[..])?;
        info!("raw page written to {}", path.display());
    }
    Ok(())
}

fn describe(record: &InstallRecord) -> String {
    let status = match record.status {
        Status::Installed => "installed".green(),
        Status::Uninstalled => "removed".dimmed(),
        Status::EndOfTable => "end".normal(),
    };
    format!(
        "{:<31} {:>9} {:<15} {} {status}",
        record.title.as_str(),
        format!("{}.{}", record.major, record.minor),
        record.owner.as_str(),
        hex::encode(record.digest),
    )
}

/// Read the flash dump, or start from a blank page if there is none yet.
fn load_flash(path: &Path) -> Result<RamFlash<Vec<u8>>, Error> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("{} does not exist, starting from erased flash", path.display());
            vec![0xFF; CATALOG_BASE as usize + FLASH_PAGE_SIZE]
        }
        Err(e) => return Err(Error::Flash(path.to_owned(), e)),
    };
    RamFlash::new(bytes).map_err(|_| Error::FlashLayout(path.to_owned()))
}

/// Replace `path` with `data` through a temporary file in the same
/// directory, so a crash never leaves a half written file behind.
fn persist(path: &Path, data: &[u8]) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::Persist(path.to_owned(), e))?;
    file.write_all(data)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| Error::Persist(path.to_owned(), e))?;
    file.persist(path)
        .map_err(|e| Error::Persist(path.to_owned(), e.error))?;
    Ok(())
}

/// Log to stderr, `info` by default or `debug` with `--verbose`. `RUST_LOG`
/// overrides both.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
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
    Catalog(catalog::Error),
    Flash(PathBuf, std::io::Error),
    FlashLayout(PathBuf),
    Media(PathBuf, std::io::Error),
    Persist(PathBuf, std::io::Error),
    Stdout(std::io::Error),
    Window(PathBuf, std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<catalog::Error> for Error {
    fn from(e: catalog::Error) -> Self {
        Error::Catalog(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::Catalog(e) => write!(f, "{e} ({:?} error)", e.kind()),
            Error::Flash(path, e) => {
                write!(f, "failed to read flash image {}: {e}", path.display())
            }
            Error::FlashLayout(path) => write!(
                f,
                "flash image {} is not a whole number of {FLASH_PAGE_SIZE} byte pages",
                path.display()
            ),
            Error::Media(path, e) => {
                write!(f, "failed to read media directory {}: {e}", path.display())
            }
            Error::Persist(path, e) => write!(f, "failed to write {}: {e}", path.display()),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::Window(path, e) => {
                write!(f, "failed to read staging window {}: {e}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {}
