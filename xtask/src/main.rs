//! Development tasks for echomemo
//!
//! Usage:
//!   cargo xtask install                 Install release binary and user service (sudo for the binary)
//!   cargo xtask uninstall               Remove binary and user service
//!   cargo xtask dist [--target TRIPLE]  Build release binary, optionally for the board

use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const BIN: &str = "echomemo";
const INSTALL_PATH: &str = "/usr/local/bin/echomemo";

/// Target most boards ship with
const BOARD_TARGET: &str = "aarch64-unknown-linux-gnu";

const SERVICE_UNIT: &str = "[Unit]
Description=Echomemo voice diary
After=sound.target network-online.target

[Service]
ExecStart=/usr/local/bin/echomemo daemon
Restart=on-failure
RestartSec=3

[Install]
WantedBy=default.target
";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    let result = match command.as_str() {
        "install" => install(),
        "uninstall" => uninstall(),
        "dist" => dist(target_arg(&args[1..])),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
echomemo development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary, install to /usr/local/bin and add a user service
  uninstall  Remove the binary and the user service
  dist       Build optimized release binary for distribution

Options:
  --target <TRIPLE>  Cross-compile (dist only); --board is {board}

Examples:
  cargo xtask install          # Build and install on the device itself
  cargo xtask dist --board     # Build for a 64-bit ARM board
  cargo xtask uninstall        # Remove installed binary and service
"#,
        board = BOARD_TARGET
    );
}

/// `--target TRIPLE` or `--board`
fn target_arg(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--board" => return Some(BOARD_TARGET.to_string()),
            "--target" => return iter.next().cloned(),
            _ => {}
        }
    }
    None
}

/// Get the project root directory
fn project_root() -> PathBuf {
    let dir = env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .or_else(|_| env::current_dir())
        .unwrap_or_else(|_| PathBuf::from("."));

    // xtask is in a subdirectory, go up one level
    dir.parent().map(Path::to_path_buf).unwrap_or(dir)
}

/// `cargo build --release`, returning the binary path
fn build_release(root: &Path, target: Option<&str>) -> anyhow::Result<PathBuf> {
    let mut args = vec!["build", "--release"];
    if let Some(target) = target {
        args.push("--target");
        args.push(target);
    }

    let status = Command::new("cargo")
        .args(&args)
        .current_dir(root)
        .status()
        .context("Failed to run cargo")?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = match target {
        Some(target) => root.join("target").join(target).join("release").join(BIN),
        None => root.join("target/release").join(BIN),
    };
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

fn service_path() -> anyhow::Result<PathBuf> {
    let home = env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".config/systemd/user/echomemo.service"))
}

/// Build release binary, install it and register a user service
fn install() -> anyhow::Result<()> {
    let root = project_root();

    println!("==> Building release binary...");
    let binary = build_release(&root, None)?;

    println!("==> Installing to {}...", INSTALL_PATH);
    let status = Command::new("sudo")
        .arg("install")
        .arg("-Dm755")
        .arg(&binary)
        .arg(INSTALL_PATH)
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed (sudo required)");
    }

    let unit = service_path()?;
    if let Some(parent) = unit.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&unit, SERVICE_UNIT)
        .with_context(|| format!("Failed to write {:?}", unit))?;
    println!("==> Wrote {:?}", unit);

    println!("==> Installed successfully!");
    println!();
    println!("Start on login with: systemctl --user enable --now echomemo");

    // Show version
    let _ = Command::new(INSTALL_PATH).arg("--version").status();

    Ok(())
}

/// Remove the binary and the user service
fn uninstall() -> anyhow::Result<()> {
    let unit = service_path()?;
    if unit.exists() {
        let _ = Command::new("systemctl")
            .args(["--user", "disable", "--now", "echomemo"])
            .status();
        std::fs::remove_file(&unit)?;
        println!("==> Removed {:?}", unit);
    }

    println!("==> Removing {}...", INSTALL_PATH);
    let status = Command::new("sudo")
        .args(["rm", "-f", INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Uninstall failed (sudo required)");
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary for distribution
fn dist(target: Option<String>) -> anyhow::Result<()> {
    let root = project_root();

    match target.as_deref() {
        Some(target) => println!("==> Building distribution binary for {}...", target),
        None => println!("==> Building distribution binary..."),
    }

    let binary = build_release(&root, target.as_deref())?;
    println!("==> Built: {:?}", binary);

    // Show binary info
    let _ = Command::new("ls").arg("-lh").arg(&binary).status();

    Ok(())
}
