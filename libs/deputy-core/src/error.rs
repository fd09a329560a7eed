//! Errors the Deputy's two public operations can raise.

use thiserror::Error;

/// Failures from [`crate::Deputy::refresh`] or [`crate::Deputy::cleanup`].
///
/// Per the error-handling design: a file-write failure keeps the old
/// file and fails only that artifact's refresh; an init-system reload
/// failure is retried on the next cycle, not locally.
#[derive(Debug, Error)]
pub enum DeputyError {
    /// refreshing or diffing a materialized view failed
    #[error("refreshing view: {0}")]
    Diff(#[from] view_differ::DiffError),
    /// a database query outside the view differ failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// writing a generated artifact failed; the previous file is intact
    #[error("writing {artifact}: {source}")]
    Write {
        /// which artifact (`"dhcp hosts file"`, `"radius clients file"`)
        artifact: &'static str,
        #[source]
        source: atomic_file::AtomicFileError,
    },
    /// the `ipset restore` subprocess failed
    #[error("ipset restore exited with {status}: {stderr}")]
    IpsetRestore {
        /// the process's exit status, rendered
        status: String,
        /// captured stderr
        stderr: String,
    },
    /// spawning the `ipset restore` subprocess failed
    #[error("spawning ipset restore: {0}")]
    IpsetSpawn(#[source] std::io::Error),
    /// the init-system D-Bus call failed
    #[error("init-system IPC: {0}")]
    Ipc(#[from] hades_core::ipc::IpcError),
}
