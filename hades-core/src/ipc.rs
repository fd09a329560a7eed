//! Init-system IPC errors, expressed as a flat sum type instead of the
//! domain/code exception hierarchy the Python implementation inherited
//! from its D-Bus binding (design note: exception-hierarchy mapping).

use thiserror::Error;

/// Failure talking to the init system (systemd over D-Bus) to reload or
/// restart a unit.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The call did not complete within the configured timeout.
    #[error("init-system IPC call timed out")]
    Timeout,
    /// The peer closed the connection without sending a reply.
    #[error("init-system IPC call received no reply")]
    NoReply,
    /// The requested D-Bus object path does not exist.
    #[error("unknown D-Bus object: {0}")]
    UnknownObject(String),
    /// systemd reported the unit name is not a known/loadable service.
    #[error("unknown service: {0}")]
    ServiceUnknown(String),
    /// Any other IPC failure, carrying the raw message for diagnostics.
    #[error("init-system IPC error: {0}")]
    Other(String),
}

impl From<zbus::Error> for IpcError {
    fn from(err: zbus::Error) -> Self {
        match &err {
            zbus::Error::MethodError(name, _, _) => {
                let name = name.as_str();
                if name.ends_with("UnknownObject") {
                    IpcError::UnknownObject(err.to_string())
                } else if name.ends_with("NoSuchUnit") || name.contains("ServiceUnknown") {
                    IpcError::ServiceUnknown(err.to_string())
                } else {
                    IpcError::Other(err.to_string())
                }
            }
            zbus::Error::InputOutput(_) => IpcError::NoReply,
            _ => IpcError::Other(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for IpcError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        IpcError::Timeout
    }
}
