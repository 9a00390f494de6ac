//! Mount table parser - reads /etc/fstab entries and their options
//!
//! Fstab format:
//! ```text
//! # <file system>  <mount point>  <type>  <options>  <dump>  <pass>
//! /dev/sda1        /              ext4    rw,noatime 0       1
//! proc             /proc          proc    defaults   0       0
//! ```
//!
//! Only the first six whitespace-delimited fields of a line are ever read;
//! anything past them is dropped. Option tokens that name a kernel mount
//! flag become part of the flag bitmask; everything else is kept for the
//! filesystem driver.

use nix::mount::MsFlags;

/// Longest line the parser looks at. Longer lines are cut off here.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Maximum number of fields read from a single line.
const MAX_FIELDS: usize = 6;

/// A parsed fstab entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// Device, server, or pseudo-filesystem source
    pub source: String,
    /// Mount point path
    pub target: String,
    /// Filesystem type (ext4, tmpfs, nfs, ...)
    pub fs_type: String,
    /// Mount options, comma-separated, as written in the table
    pub options: String,
    /// Dump frequency
    pub dump: i32,
    /// Fsck pass number
    pub pass: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least 4 fields, found {fields}")]
    Incomplete { fields: usize },
}

/// Strip a single trailing newline. Other whitespace is left alone.
pub fn trim_newline(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

/// Cap a line at [`MAX_LINE_LENGTH`] bytes without splitting a character.
pub fn clip_line(line: &str) -> &str {
    if line.len() <= MAX_LINE_LENGTH {
        return line;
    }
    let mut end = MAX_LINE_LENGTH;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// Check whether a line carries an entry at all.
///
/// Empty lines and `#` comments are filtered here, before parsing, and
/// produce neither an entry nor a parse failure.
pub fn is_entry_line(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#')
}

/// Parse a single fstab line into an entry.
///
/// The line must already have its newline stripped and have passed
/// [`is_entry_line`]. The numeric fields default to 0 when absent and parse
/// permissively: non-numeric text is 0, never an error.
pub fn parse_line(line: &str) -> Result<FstabEntry, ParseError> {
    let fields: Vec<&str> = line
        .split([' ', '\t'])
        .filter(|f| !f.is_empty())
        .take(MAX_FIELDS)
        .collect();

    if fields.len() < 4 {
        return Err(ParseError::Incomplete {
            fields: fields.len(),
        });
    }

    Ok(FstabEntry {
        source: fields[0].to_string(),
        target: fields[1].to_string(),
        fs_type: fields[2].to_string(),
        options: fields[3].to_string(),
        dump: fields.get(4).and_then(|s| s.parse().ok()).unwrap_or(0),
        pass: fields.get(5).and_then(|s| s.parse().ok()).unwrap_or(0),
    })
}

/// Translated mount options: the kernel flag bitmask plus the tokens the
/// flag table did not recognize, in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Kernel-level mount flags
    pub flags: MsFlags,
    /// Unrecognized tokens, handed to the filesystem driver as mount data
    pub data: Vec<String>,
}

impl MountOptions {
    /// Serialize the unrecognized remainder for the mount data argument.
    ///
    /// Returns `None` when every token mapped to a flag.
    pub fn data_string(&self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.data.join(","))
        }
    }
}

/// Map symbolic option tokens to kernel mount flags.
///
/// The table is exact and case-sensitive. Any other token, including `rw`
/// and `defaults`, is kept for the filesystem driver. Feeding the remainder
/// back through changes nothing.
pub fn translate_options(options: &str) -> MountOptions {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();

    for token in options.split(',') {
        match token {
            "ro" => flags |= MsFlags::MS_RDONLY,
            "noatime" => flags |= MsFlags::MS_NOATIME,
            "relatime" => flags |= MsFlags::MS_RELATIME,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "sync" => flags |= MsFlags::MS_SYNCHRONOUS,
            "dirsync" => flags |= MsFlags::MS_DIRSYNC,
            "" => {}
            other => data.push(other.to_string()),
        }
    }

    MountOptions { flags, data }
}
