//! PID 1 functionality
//!
//! Everything specific to running as init: seeding the boot environment,
//! the best-effort fstab mount pass, and shell supervision.

pub mod mount;
pub mod supervisor;

pub use mount::{apply_fstab, MountPassError, MountSummary, Mounter, SysMounter};
pub use supervisor::{ProcessOps, Supervisor, SupervisorError, SysProcessOps};

use std::env;
use std::process;

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}

/// Default environment for the first interactive session.
const BOOT_ENVIRONMENT: &[(&str, &str)] = &[
    ("TERM", "linux"),
    ("USER", "root"),
    ("HOME", "/root"),
    ("PATH", "/usr/local/bin:/usr/bin:/usr/sbin"),
];

/// Seed the process environment for early userspace.
///
/// Existing values are overwritten; the supervised shell inherits the
/// result through exec.
pub fn setup_environment() {
    log::trace!("Setting up environment variables");
    for (key, value) in BOOT_ENVIRONMENT {
        env::set_var(key, value);
    }
}
