//! initd - Minimal boot-time init
//!
//! A tiny PID 1 that:
//! - Parses /etc/fstab and mounts everything listed, best-effort
//! - Seeds the early-userspace environment
//! - Keeps an interactive shell running as the system's top-level session
//!
//! # Architecture
//!
//! ```text
//! /etc/fstab ──> fstab parser ──> option translation ──> mount pass
//!                                                            │
//!                        shell supervisor <── boot continues ┘
//! ```
//!
//! Failures before the supervisor are never fatal to boot: a broken mount
//! table still gets you a shell. Failures starting the shell are fatal,
//! because there is nothing left to fall back to.

pub mod fstab;
pub mod logging;
pub mod pid1;

pub use fstab::{FstabEntry, MountOptions};
