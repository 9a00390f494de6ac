//! initd - minimal init daemon
//!
//! When running as PID 1:
//! - Seeds default environment variables for the first session
//! - Mounts the filesystems listed in /etc/fstab (best-effort, like mount -a)
//! - Spawns and supervises an interactive shell forever
//!
//! A broken or missing mount table never blocks the shell; an inaccessible
//! shell or a failed fork terminates init, since no session can start.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use initd::logging;
use initd::pid1::{self, Supervisor, SysMounter, SysProcessOps};

#[derive(Parser)]
#[command(name = "initd")]
#[command(about = "Minimal boot-time init")]
#[command(
    long_about = "initd mounts the filesystems listed in the mount table, then \
    keeps an interactive shell running as the system's top-level session."
)]
struct Args {
    /// Path to the mount table
    #[arg(long, default_value = "/etc/fstab")]
    fstab: PathBuf,

    /// Shell to supervise
    #[arg(long, default_value = "/usr/bin/bash")]
    shell: PathBuf,

    /// Skip the mount pass
    #[arg(long)]
    no_mount: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(args.log_level) {
        eprintln!("initd: failed to install logger: {}", e);
    }

    if pid1::is_pid1() {
        info!("Running as PID 1");
        pid1::setup_environment();
        info!("Welcome to initd");
    }

    if !args.no_mount {
        // An unreadable mount table fails the mount phase only; the shell
        // is supervised regardless.
        if let Err(e) = pid1::apply_fstab(&args.fstab, &mut SysMounter) {
            log::error!("{}", e);
        }
    }

    let mut supervisor = Supervisor::new(&args.shell, SysProcessOps);
    match supervisor.run() {
        Ok(never) => match never {},
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
