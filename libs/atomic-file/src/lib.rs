//! # atomic-file
//!
//! At-most-once replacement of a generated configuration artifact: write
//! the new content to a sibling temp file, `fchown`/`fchmod` it to the
//! target ownership and mode, `fsync`, then `rename` onto the
//! destination. A failure at any step removes the temp file and leaves
//! the previous destination contents untouched -- no generated file is
//! ever observed half-written, matching the error-handling design's
//! "no error ever causes a partial on-disk update".
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::sys::stat::{fchmod, Mode};
use nix::unistd::{fchown, Gid, Uid};
use thiserror::Error;

/// Failures replacing a generated file.
#[derive(Debug, Error)]
pub enum AtomicFileError {
    /// creating, writing, or syncing the temp file failed
    #[error("writing temp file {path:?}: {source}")]
    Write {
        /// the temp file path
        path: PathBuf,
        /// underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// `fchown`/`fchmod` on the temp file failed
    #[error("setting ownership/mode on temp file {path:?}: {source}")]
    Permissions {
        /// the temp file path
        path: PathBuf,
        /// underlying errno
        #[source]
        source: nix::Error,
    },
    /// the final `rename` onto the destination failed
    #[error("renaming {from:?} onto {to:?}: {source}")]
    Rename {
        /// the temp file path
        from: PathBuf,
        /// the destination path
        to: PathBuf,
        /// underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Target ownership and permission bits for a generated file, e.g. the
/// DHCP-user-owned, mode-0440 DHCP hosts file.
#[derive(Debug, Clone, Copy)]
pub struct FileOwnership {
    /// target owning uid
    pub uid: u32,
    /// target owning gid
    pub gid: u32,
    /// target mode bits (e.g. `0o440`)
    pub mode: u32,
}

/// Atomically replace `dest` with `contents`, built by calling
/// `write_contents` with a writer over a sibling temp file.
///
/// `write_contents` may write any amount of data across any number of
/// calls (generators are expected to be stream-friendly rather than
/// building the whole file in memory); once it returns successfully the
/// temp file is `fchown`ed, `fchmod`ed, `fsync`ed and renamed onto
/// `dest`. If `write_contents` returns an error, or any step after it
/// fails, the temp file is removed and `dest` is left untouched.
pub fn replace_with<F>(
    dest: &Path,
    ownership: FileOwnership,
    write_contents: F,
) -> Result<(), AtomicFileError>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    let result = (|| -> Result<(), AtomicFileError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| AtomicFileError::Write {
                path: tmp_path.clone(),
                source,
            })?;

        write_contents(&mut file).map_err(|source| AtomicFileError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        fchown(
            file.as_raw_fd(),
            Some(Uid::from_raw(ownership.uid)),
            Some(Gid::from_raw(ownership.gid)),
        )
        .map_err(|source| AtomicFileError::Permissions {
            path: tmp_path.clone(),
            source,
        })?;
        fchmod(
            file.as_raw_fd(),
            Mode::from_bits_truncate(ownership.mode),
        )
        .map_err(|source| AtomicFileError::Permissions {
            path: tmp_path.clone(),
            source,
        })?;

        file.sync_all().map_err(|source| AtomicFileError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        drop(file);

        std::fs::rename(&tmp_path, dest).map_err(|source| AtomicFileError::Rename {
            from: tmp_path.clone(),
            to: dest.to_owned(),
            source,
        })
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn my_ownership() -> FileOwnership {
        FileOwnership {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            mode: 0o640,
        }
    }

    #[test]
    fn replaces_destination_contents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.conf");
        std::fs::write(&dest, b"old").unwrap();

        replace_with(&dest, my_ownership(), |w| w.write_all(b"new")).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn leaves_destination_untouched_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.conf");
        std::fs::write(&dest, b"old").unwrap();

        let err = replace_with(&dest, my_ownership(), |_w| {
            Err(std::io::Error::other("boom"))
        });

        assert!(err.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        let tmp = dir.path().join(".out.conf.tmp");
        assert!(!tmp.exists(), "temp file must be cleaned up on failure");
    }

    #[test]
    fn creates_destination_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fresh.conf");

        replace_with(&dest, my_ownership(), |w| w.write_all(b"hello")).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }
}
