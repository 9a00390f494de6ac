//! Boot logging
//!
//! Components log through the `log` facade; the binary wires it to a fern
//! dispatch writing timestamped lines to stderr. Warnings and errors are
//! also copied into /dev/kmsg, which survives early boot better than
//! anything on a filesystem that may not be mounted yet.

use std::fs::OpenOptions;
use std::io::Write;

use log::LevelFilter;

/// Write a line to the kernel log buffer. Best-effort: during early boot
/// /dev/kmsg may not exist yet, and that is fine.
pub fn kmsg(msg: &str) {
    if let Ok(mut f) = OpenOptions::new().write(true).open("/dev/kmsg") {
        let _ = writeln!(f, "initd: {}", msg);
    }
}

/// Install the global logger.
pub fn init(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .chain(fern::Output::call(|record| {
            if record.level() <= log::Level::Warn {
                kmsg(&format!("{}: {}", record.level(), record.args()));
            }
        }))
        .apply()?;
    Ok(())
}
