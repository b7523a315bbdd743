use anyhow::Context as _;
use clap::{Parser, Subcommand};
use open_redirect::host::{self, SyscallArena};
use open_redirect::{Config, RedirectModule, locate};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Module parameter file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// File opened in place of intercepted paths
    #[arg(short, long)]
    replacement: Option<String>,
    /// Extension to intercept, without the dot (up to 5)
    #[arg(short, long = "extension", value_delimiter = ',')]
    extensions: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the module, open each path through the patched table, unload
    Open { paths: Vec<PathBuf> },
    /// Report where the dispatch table was found
    Locate,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(LevelFilter::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Locate => run_locate(),
        Commands::Open { ref paths } => load_config(&cli).and_then(|c| run_open(c, paths)),
    };
    match result {
        Ok(code) => exit(code),
        Err(e) => {
            tracing::error!("{e:?}");
            exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = match &cli.config {
        Some(p) => Config::from_file_path(p)?,
        None => Config::default(),
    };
    Ok(file.merge(cli.replacement.clone(), cli.extensions.clone()))
}

fn run_locate() -> anyhow::Result<i32> {
    let arena = SyscallArena::new()?;
    let range = arena.scan_range();
    // SAFETY: the range covers the arena mapping, which outlives the scan
    match unsafe { locate::locate(range, host::reference()) } {
        Ok(table) => {
            println!(
                "dispatch table at {:#x} (scanned {:#x}..{:#x})",
                table.base(),
                range.start(),
                range.end()
            );
            Ok(0)
        }
        Err(e) => {
            println!("{e}");
            Ok(1)
        }
    }
}

fn run_open(config: Config, paths: &[PathBuf]) -> anyhow::Result<i32> {
    let arena = SyscallArena::new()?;
    // SAFETY: the module is dropped before the arena
    let mut module = unsafe {
        RedirectModule::new(
            config,
            arena.scan_range(),
            host::reference(),
            arena.protect(),
        )
    };
    let status = module.on_load();
    if status != 0 {
        return Ok(-status);
    }
    for path in paths {
        match open_through_table(&arena, path) {
            Ok(opened) => println!("{} -> {}", path.display(), opened.display()),
            Err(e) => println!("{} -> {e:#}", path.display()),
        }
    }
    module.on_unload();
    Ok(0)
}

fn open_through_table(arena: &SyscallArena, path: &Path) -> anyhow::Result<PathBuf> {
    let c_path = CString::new(path.as_os_str().as_bytes()).context("path contains a NUL byte")?;
    let fd = arena.open(&c_path, libc::O_RDONLY, 0);
    if fd < 0 {
        let errno = nix::errno::Errno::from_raw(-fd as i32);
        anyhow::bail!("open failed: {errno}");
    }
    let fd = fd as libc::c_int;
    let opened = std::fs::read_link(format!("/proc/self/fd/{fd}"))
        .context("failed to resolve opened file");
    arena.close(fd);
    opened
}
