use {
    crate::ExitCode,
    catalog::{channel, Aes256Ctr, ContentHasher, Keystream, SessionKey, Sha256Hasher},
    consts::{CATALOG_MAGIC, FLASH_PAGE_SIZE},
    std::{io::Write, path::PathBuf},
};

const CHESS_1_0: &[u8] = b"version:1.0\nname:chess\nusers:alice carol\npublic_key:Public RSA key at 0x7f3a\n\
\x7fELF chess 1.0\n";
const CHESS_1_1: &[u8] = b"version:1.1\nname:chess\nusers:alice carol\npublic_key:Public RSA key at 0x7f3a\n\
\x7fELF chess 1.1\n";
const GO_2_0: &[u8] = b"version:2\nname:go\nusers:bob\npublic_key:Public RSA key at 0x7f3a\n\x7fELF go\n";

/// Flash dump, media directory and staging window in a temporary directory.
struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir(&media).unwrap();
        for (name, image) in [
            ("chess-v1.0", CHESS_1_0),
            ("chess-v1.1", CHESS_1_1),
            ("go-v2.0", GO_2_0),
        ] {
            std::fs::write(media.join(name), image).unwrap();
        }
        Self { dir }
    }

    fn flash(&self) -> PathBuf {
        self.dir.path().join("flash.bin")
    }

    fn media(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    fn window(&self) -> PathBuf {
        self.dir.path().join("window.bin")
    }

    fn run(&self, command: &[&str]) -> Output {
        let flash = self.flash();
        let media = self.media();
        let window = self.window();
        let mut args = vec![
            "--flash",
            flash.to_str().unwrap(),
            "--media",
            media.to_str().unwrap(),
            "--window",
            window.to_str().unwrap(),
        ];
        args.extend_from_slice(command);
        test_vec(args)
    }
}

/// Install a game and list it.
#[test]
fn install_and_list() {
    let env = Env::new();
    let output = env.run(&["list"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("no games installed"));
    // The blank flash was initialized and saved.
    let flash = std::fs::read(env.flash()).unwrap();
    assert_eq!(flash.len(), FLASH_PAGE_SIZE);
    assert_eq!(flash[..4], CATALOG_MAGIC);

    let output = env.run(&["install", "chess-v1.0", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("chess-v1.0 for alice"));

    let output = env.run(&["list"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("chess"));
    assert!(output.stdout.contains("1.0"));
    assert!(output.stdout.contains("alice"));
    let digest = Sha256Hasher::default().hash(CHESS_1_0);
    assert!(output.stdout.contains(&hex::encode(digest)));
}

/// The same version again is a no-op, a newer one replaces the installed row.
#[test]
fn reinstall_and_upgrade() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));
    let before = std::fs::read(env.flash()).unwrap();

    let output = env.run(&["install", "chess-v1.0", "-u", "carol"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("chess 1.0 already installed"));
    assert_eq!(std::fs::read(env.flash()).unwrap(), before);

    let output = env.run(&["install", "chess-v1.1", "-u", "carol"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("chess from 1.0 to 1.1"));

    let output = env.run(&["list"]);
    assert_eq!(output.stdout.lines().count(), 1);
    assert!(output.stdout.contains("1.1"));
    assert!(output.stdout.contains("carol"));

    // The tombstone is still on flash.
    let output = env.run(&["dump-flash"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("removed"));
    assert!(output.stdout.contains("end of table"));
}

#[test]
fn downgrade_rejected() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.1", "-u", "alice"]).exit_code, ExitCode(0));
    let before = std::fs::read(env.flash()).unwrap();

    let output = env.run(&["install", "chess-v1.0", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("refusing downgrade from 1.1 to 1.0"));
    assert!(output.stderr.contains("Integrity"));
    assert_eq!(std::fs::read(env.flash()).unwrap(), before);
}

/// An image whose file name does not match its manifest is not installed.
#[test]
fn renamed_image_rejected() {
    let env = Env::new();
    std::fs::write(env.media().join("chess-v9.0"), CHESS_1_0).unwrap();
    let output = env.run(&["install", "chess-v9.0", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("manifest title does not match"));

    let output = env.run(&["install", "tetris-v1.0", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("image not found"));
}

/// Play stages the encrypted image, which decrypts back to the media image.
#[test]
fn play_stages_image() {
    let env = Env::new();
    std::fs::write(env.window(), vec![0xA5; 0x1000]).unwrap();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));

    let output = env.run(&["play", "chess", "-u", "carol"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("staged"));

    let mut window = std::fs::read(env.window()).unwrap();
    assert_eq!(window.len(), 0x1000);
    let len = channel::read_size_header(&window).unwrap();
    assert_eq!(len, CHESS_1_0.len());
    let payload = &mut channel::payload_region(&mut window)[..len];
    assert_ne!(payload, CHESS_1_0);
    Aes256Ctr::init(&SessionKey::shared_default()).crypt_in_place(payload);
    assert_eq!(payload, CHESS_1_0);
    let framing = channel::skip_framing_lines(payload, 4).unwrap();
    assert_eq!(&payload[framing..], b"\x7fELF chess 1.0\n");
}

/// A provisioned key from the command line is used for staging.
#[test]
fn play_with_provisioned_key() {
    let env = Env::new();
    std::fs::write(env.window(), vec![0; 0x1000]).unwrap();
    assert_eq!(env.run(&["install", "go-v2.0", "-u", "bob"]).exit_code, ExitCode(0));

    let key = hex::encode([0x42; 32]);
    let nonce = hex::encode(b"01234567");
    let output = env.run(&["play", "go", "-u", "bob", "--key", key.as_str(), "--nonce", nonce.as_str()]);
    assert_eq!(output.exit_code, ExitCode(0));

    let mut window = std::fs::read(env.window()).unwrap();
    let len = channel::read_size_header(&window).unwrap();
    let payload = &mut channel::payload_region(&mut window)[..len];
    Aes256Ctr::init(&SessionKey::from_parts([0x42; 32], *b"01234567")).crypt_in_place(payload);
    assert_eq!(payload, GO_2_0);
}

/// A user missing from the manifest cannot play, and nothing is staged.
#[test]
fn play_unauthorized() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));

    let output = env.run(&["play", "chess", "-u", "bob"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("not allowed to play"));
    assert!(!env.window().exists());

    let output = env.run(&["play", "go", "-u", "bob"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("not installed"));
    assert!(!env.window().exists());
}

/// Changed media bytes fail verification and are never staged.
#[test]
fn tampered_media() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));
    assert_eq!(env.run(&["verify", "chess"]).exit_code, ExitCode(0));

    let mut image = CHESS_1_0.to_vec();
    *image.last_mut().unwrap() = b'!';
    std::fs::write(env.media().join("chess-v1.0"), image).unwrap();

    let output = env.run(&["verify", "chess"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("digest does not match"));

    // A previously staged blob is scrubbed.
    let mut window = vec![0; 0x1000];
    window[..4].copy_from_slice(&16u32.to_le_bytes());
    std::fs::write(env.window(), &window).unwrap();
    let output = env.run(&["play", "chess", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("digest does not match"));
    let window = std::fs::read(env.window()).unwrap();
    assert!(window.iter().all(|&b| b == 0));
}

/// Images named after a manifest version without a minor part install and play.
#[test]
fn short_version_image_name() {
    let env = Env::new();
    std::fs::rename(env.media().join("go-v2.0"), env.media().join("go-v2")).unwrap();
    std::fs::write(env.window(), vec![0; 0x1000]).unwrap();

    let output = env.run(&["install", "go-v2", "-u", "bob"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("go-v2 for bob"));
    assert!(env.run(&["list"]).stdout.contains("2.0"));
    assert_eq!(env.run(&["verify", "go"]).exit_code, ExitCode(0));

    let output = env.run(&["play", "go", "-u", "bob"]);
    assert_eq!(output.exit_code, ExitCode(0));
    let mut window = std::fs::read(env.window()).unwrap();
    let len = channel::read_size_header(&window).unwrap();
    let payload = &mut channel::payload_region(&mut window)[..len];
    Aes256Ctr::init(&SessionKey::shared_default()).crypt_in_place(payload);
    assert_eq!(payload, GO_2_0);
}

#[test]
fn image_too_large_for_window() {
    let env = Env::new();
    std::fs::write(env.window(), vec![0x11; 0x60]).unwrap();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));

    let output = env.run(&["play", "chess", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("does not fit the staging window"));
    assert_eq!(std::fs::read(env.window()).unwrap(), vec![0x11; 0x60]);
}

#[test]
fn uninstall() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "go-v2.0", "-u", "bob"]).exit_code, ExitCode(0));
    let output = env.run(&["uninstall", "go"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("go 2.0"));

    assert!(env.run(&["list"]).stdout.contains("no games installed"));
    let output = env.run(&["uninstall", "go"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("not installed"));
}

#[test]
fn query() {
    let env = Env::new();
    std::fs::write(env.media().join("chess-v1.0.SHA256"), b"ignored").unwrap();
    std::fs::write(env.media().join("broken-v1.0"), b"version:1.0\n").unwrap();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));

    let output = env.run(&["query"]);
    assert_eq!(output.exit_code, ExitCode(0));
    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("broken-v1.0:"));
    assert!(lines[0].contains("unusable"));
    assert!(lines[1].starts_with("chess-v1.0:"));
    assert!(lines[1].contains("users alice carol"));
    assert!(lines[2].starts_with("chess-v1.1:"));
    assert!(lines[2].contains("1.0 installed"));
    assert!(lines[3].starts_with("go-v2.0:"));
    assert!(lines[3].contains("not installed"));
}

/// Dump a freshly reset catalog, raw page included.
#[test]
fn dump_and_reset() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));

    let output = env.run(&["reset-flash"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("pass --yes to confirm"));
    assert!(env.run(&["list"]).stdout.contains("chess"));

    let output = env.run(&["reset-flash", "--yes"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(env.run(&["list"]).stdout.contains("no games installed"));

    let raw = env.dir.path().join("page.bin");
    let output = env.run(&["dump-flash", "--raw", raw.to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains(&hex::encode(CATALOG_MAGIC)));
    assert!(output.stdout.contains("valid"));
    assert!(output.stdout.contains("   0 end of table"));
    let page = std::fs::read(raw).unwrap();
    assert_eq!(page.len(), FLASH_PAGE_SIZE);
    assert_eq!(page[..4], CATALOG_MAGIC);
    assert!(page[4..].iter().all(|&b| b == 0xFF));
}

/// Dumping a blank flash does not initialize it.
#[test]
fn dump_blank_flash() {
    let env = Env::new();
    let output = env.run(&["dump-flash"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("missing"));
    assert!(output.stdout.contains("catalog sentinel missing"));
    assert!(!env.flash().exists());
}

/// A damaged sentinel is reported and the catalog is left for a factory reset.
#[test]
fn corrupt_sentinel() {
    let env = Env::new();
    assert_eq!(env.run(&["install", "chess-v1.0", "-u", "alice"]).exit_code, ExitCode(0));
    let mut flash = std::fs::read(env.flash()).unwrap();
    flash[0] = b'X';
    std::fs::write(env.flash(), &flash).unwrap();

    for command in [&["list"][..], &["install", "go-v2.0", "-u", "bob"], &["uninstall", "chess"]] {
        let output = env.run(command);
        assert_eq!(output.exit_code, ExitCode(1));
        assert!(output.stderr.contains("sentinel corrupt"));
        assert!(output.stderr.contains("Integrity"));
        assert_eq!(std::fs::read(env.flash()).unwrap(), flash);
    }

    let output = env.run(&["dump-flash"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("corrupt"));
    assert_eq!(std::fs::read(env.flash()).unwrap(), flash);

    assert_eq!(env.run(&["reset-flash", "--yes"]).exit_code, ExitCode(0));
    let output = env.run(&["list"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("no games installed"));
}

/// Paths in the config file are relative to the file itself.
#[test]
fn config_file() {
    let env = Env::new();
    let config = env.dir.path().join("gamectl.toml");
    std::fs::write(&config, "flash = \"flash.bin\"\nmedia = \"media\"\n").unwrap();

    let output = test(["-c", config.to_str().unwrap(), "install", "go-v2.0", "-u", "bob"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(env.flash().exists());

    let output = test([
        "-c",
        config.to_str().unwrap(),
        "--flash",
        env.flash().to_str().unwrap(),
        "list",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("flash specified in both config and cli"));

    let config = create_file(b"flash = \"flash.bin\"\nwindow = 3\n");
    let output = test(["-c", config.path().to_str().unwrap(), "list"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("config file format error"));
}

#[test]
fn missing_arguments() {
    let output = test(["list"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("flash image must be specified"));

    let output = test(["--flash", "flash.bin", "query"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("media directory must be specified"));

    let output = test(["--flash", "flash.bin", "--media", "media", "play", "chess", "-u", "alice"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("staging window file must be specified"));

    let output = test(["--flash", "flash.bin", "--key", "00", "list"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("key must be 32 bytes of hex"));
}

#[test]
fn truncated_flash_image() {
    let env = Env::new();
    std::fs::write(env.flash(), vec![0xFF; 100]).unwrap();
    let output = env.run(&["list"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("not a whole number"));
    assert_eq!(std::fs::read(env.flash()).unwrap().len(), 100);
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    test_vec(args.to_vec())
}

fn test_vec(args: Vec<&str>) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("gamectl").chain(args.iter().copied()),
        &mut stdout,
        &mut stderr,
    );
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}
