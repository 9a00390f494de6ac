//! Best-effort fstab mount pass
//!
//! Walks the mount table in file order and attempts every entry, mirroring
//! the semantics of `mount -a`: a failing entry is an observability event,
//! not a reason to stop mounting, and the pass as a whole succeeds even
//! when individual entries fail.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nix::mount::MsFlags;

use crate::fstab::{self, FstabEntry};

/// The platform mount primitive.
///
/// Injected into the pass so it can be exercised without touching the real
/// syscall.
pub trait Mounter {
    fn mount(
        &mut self,
        source: &str,
        target: &str,
        fs_type: &str,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()>;
}

/// [`Mounter`] backed by mount(2).
pub struct SysMounter;

impl Mounter for SysMounter {
    fn mount(
        &mut self,
        source: &str,
        target: &str,
        fs_type: &str,
        flags: MsFlags,
        data: Option<&str>,
    ) -> nix::Result<()> {
        nix::mount::mount(Some(source), target, Some(fs_type), flags, data)
    }
}

/// Outcome counts for one mount pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MountSummary {
    /// Entries handed to the mount primitive
    pub attempted: usize,
    /// Entries mounted successfully
    pub mounted: usize,
    /// Entries where the mount call failed
    pub failed: usize,
    /// Malformed lines skipped
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum MountPassError {
    #[error("failed to open mount table {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read mount table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Mount everything listed in the table at `path`, in file order.
///
/// Malformed lines and individual mount failures are logged and counted,
/// never propagated. Only a table that cannot be opened or read fails the
/// pass, and even that is expected to leave boot running: the caller logs
/// the error and moves on to shell supervision.
pub fn apply_fstab<M: Mounter>(
    path: &Path,
    mounter: &mut M,
) -> Result<MountSummary, MountPassError> {
    let file = File::open(path).map_err(|e| MountPassError::Config {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!("Mounting filesystems from {}", path.display());

    let mut summary = MountSummary::default();
    let mut reader = BufReader::new(file);
    let mut raw = String::new();
    let mut line_number = 0;

    loop {
        raw.clear();
        let n = reader.read_line(&mut raw).map_err(|e| MountPassError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        line_number += 1;

        let line = fstab::clip_line(fstab::trim_newline(&raw));
        if !fstab::is_entry_line(line) {
            continue;
        }

        match fstab::parse_line(line) {
            Ok(entry) => mount_entry(&entry, mounter, &mut summary),
            Err(e) => {
                summary.skipped += 1;
                log::warn!("Skipping invalid or incomplete line {}: {}", line_number, e);
            }
        }
    }

    log::info!(
        "Mount pass complete: {} mounted, {} failed, {} lines skipped",
        summary.mounted,
        summary.failed,
        summary.skipped
    );

    Ok(summary)
}

/// Translate one entry's options and hand it to the mount primitive.
fn mount_entry<M: Mounter>(entry: &FstabEntry, mounter: &mut M, summary: &mut MountSummary) {
    let opts = fstab::translate_options(&entry.options);
    let data = opts.data_string();

    summary.attempted += 1;
    log::trace!(
        "Mounting {} at {}: flags={:?} data={:?}",
        entry.source,
        entry.target,
        opts.flags,
        data
    );

    match mounter.mount(
        &entry.source,
        &entry.target,
        &entry.fs_type,
        opts.flags,
        data.as_deref(),
    ) {
        Ok(()) => {
            summary.mounted += 1;
            log::info!("Mounted {} ({}) at {}", entry.source, entry.fs_type, entry.target);
        }
        Err(e) => {
            summary.failed += 1;
            log::error!(
                "Failed to mount `{}` filesystem at `{}`, source: {}, options: `{}`: {}",
                entry.fs_type,
                entry.target,
                entry.source,
                data.as_deref().unwrap_or(""),
                e
            );
        }
    }
}
