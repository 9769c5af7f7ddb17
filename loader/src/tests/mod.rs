use {
    crate::ExitCode,
    catalog::{SessionKey, StagingWriter},
    std::{io::Write, path::Path},
};

const BASE: u64 = 0x1000;
const SIZE: usize = 0x10000;

const IMAGE: &[u8] = b"version:1.0\nname:chess\nusers:alice bob\npublic_key:Public RSA key at 0x7f3a\n\
\x7fELF\x02\x01\x01\nnot a framing line\n";
const BODY: &[u8] = b"\x7fELF\x02\x01\x01\nnot a framing line\n";

/// Stage `image` with `key` in a fake memory device.
fn staged_mem(dir: &Path, image: &[u8], key: SessionKey) -> std::path::PathBuf {
    let mut window = vec![0xA5; SIZE];
    StagingWriter::<catalog::Aes256Ctr>::new(key)
        .stage(&mut window, image)
        .unwrap();
    let mut mem = vec![0x5A; BASE as usize];
    mem.extend_from_slice(&window);
    mem.extend_from_slice(&[0x5A; 16]);
    let path = dir.join("mem");
    std::fs::write(&path, mem).unwrap();
    path
}

fn mem_args<'a>(mem: &'a str, output: &'a str) -> [&'a str; 8] {
    ["--mem", mem, "--base", "0x1000", "--size", "0x10000", "-o", output]
}

/// Stage and load an image, the executable is the image without its
/// manifest lines.
#[test]
fn load_staged_image() {
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), IMAGE, SessionKey::shared_default());
    let out_dir = tempfile::tempdir().unwrap();
    let game = out_dir.path().join("game");

    let output = test(mem_args(mem.to_str().unwrap(), game.to_str().unwrap()));
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("loaded"));
    assert_eq!(std::fs::read(&game).unwrap(), BODY);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&game).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    // Only the size header was cleared, nothing around the window changed.
    let mem = std::fs::read(&mem).unwrap();
    assert!(mem[..BASE as usize].iter().all(|&b| b == 0x5A));
    assert_eq!(mem[BASE as usize..][..4], [0; 4]);
    assert!(mem[BASE as usize + SIZE..].iter().all(|&b| b == 0x5A));
    // Only the executable is left in the target directory.
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 1);
}

/// A consumed blob cannot be loaded twice, and the existing executable is
/// left alone.
#[test]
fn load_twice() {
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), IMAGE, SessionKey::shared_default());
    let game = dir.path().join("game");
    let args = mem_args(mem.to_str().unwrap(), game.to_str().unwrap());

    assert_eq!(test(args).exit_code, ExitCode(0));
    std::fs::write(&game, b"previous").unwrap();
    let output = test(args);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("nothing staged"));
    assert_eq!(std::fs::read(&game).unwrap(), b"previous");
}

/// `--keep` leaves the size header in place.
#[test]
fn keep_header() {
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), IMAGE, SessionKey::shared_default());
    let game = dir.path().join("game");
    let mut args = mem_args(mem.to_str().unwrap(), game.to_str().unwrap()).to_vec();
    args.push("--keep");

    assert_eq!(test_vec(args.clone()).exit_code, ExitCode(0));
    assert_eq!(test_vec(args).exit_code, ExitCode(0));
    assert_eq!(std::fs::read(&game).unwrap(), BODY);
}

/// A size header larger than the window is rejected before anything is
/// written.
#[test]
fn oversized_header() {
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), IMAGE, SessionKey::shared_default());
    let mut bytes = std::fs::read(&mem).unwrap();
    bytes[BASE as usize..][..4].copy_from_slice(&(SIZE as u32).to_le_bytes());
    std::fs::write(&mem, bytes).unwrap();
    let game = dir.path().join("game");

    let output = test(mem_args(mem.to_str().unwrap(), game.to_str().unwrap()));
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("overruns"));
    assert!(!game.exists());
}

/// An image without all four manifest lines is rejected and leaves no file.
#[test]
fn missing_framing_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), b"version:1.0\nname:chess\n", SessionKey::shared_default());
    let out_dir = tempfile::tempdir().unwrap();
    let game = out_dir.path().join("game");

    let output = test(mem_args(mem.to_str().unwrap(), game.to_str().unwrap()));
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("framing line 3"));
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
}

/// Provisioned key from a config file.
#[test]
fn key_from_config() {
    let key = SessionKey::from_parts([0x42; 32], *b"01234567");
    let dir = tempfile::tempdir().unwrap();
    let mem = staged_mem(dir.path(), IMAGE, key);
    let game = dir.path().join("game");
    let config = create_file(
        format!(
            "mem = {:?}\nbase = 0x1000\nsize = 0x10000\nkey = \"{}\"\nnonce = \"{}\"\n",
            mem.to_str().unwrap(),
            hex::encode([0x42; 32]),
            hex::encode(b"01234567"),
        )
        .as_bytes(),
    );

    let output = test([
        "-c",
        config.path().to_str().unwrap(),
        "-o",
        game.to_str().unwrap(),
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert_eq!(std::fs::read(&game).unwrap(), BODY);
}

/// Values in both the config and on the command line are rejected.
#[test]
fn config_and_cli_conflict() {
    let config = create_file(b"base = 0x1000\n");
    let output = test([
        "-c",
        config.path().to_str().unwrap(),
        "--base",
        "0x2000",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("base specified in both config and cli"));

    let output = test(["--key", "abcd"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("key must be 32 bytes of hex"));
}

#[test]
fn missing_mem_device() {
    let dir = tempfile::tempdir().unwrap();
    let mem = dir.path().join("nope");
    let game = dir.path().join("game");
    let output = test(mem_args(mem.to_str().unwrap(), game.to_str().unwrap()));
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("failed to open"));
    assert!(!game.exists());
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    test_vec(args.to_vec())
}

fn test_vec(args: Vec<&str>) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("game-loader").chain(args.iter().copied()),
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
