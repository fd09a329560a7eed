//! The UNIX-socket accept loop (spec §4.3): one connection processed at
//! a time, `RECEIVING -> PROCESSING -> REPLYING -> CLOSED`. Adopts a
//! systemd-activated socket when `LISTEN_FDS=1` is present in the
//! environment, otherwise binds `listen_path` itself.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use frame_codec::ProtocolError;
use hades_core::metrics::PROTOCOL_ERRORS;
use lease_store::Storage;
use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::ipc::{receive_frame, FdTriple};

/// The fixed ancillary-activation slot systemd's socket passing
/// convention reserves (`SD_LISTEN_FDS_START`).
const SD_LISTEN_FDS_START: RawFd = 3;

/// Page size used as the frame-size cap; matches the host's actual page
/// size in production but is fixed here since the wire format assumes
/// the common 4 KiB page.
const MAX_FRAME_LEN: usize = 4096 - 1;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("LISTEN_FDS={0:?} is not supported; this service accepts exactly one activated socket")]
    UnsupportedListenFds(String),
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to adopt activated socket: {0}")]
    Adopt(#[source] std::io::Error),
}

/// Build the listener either by adopting an activated socket or binding
/// fresh at `listen_path`.
pub fn build_listener(listen_path: &Path) -> Result<UnixListener, ServerError> {
    match std::env::var("LISTEN_FDS") {
        Ok(value) if value == "1" => {
            info!(fd = SD_LISTEN_FDS_START, "adopting activated socket");
            // Safety: systemd guarantees fd 3 is open and inherited
            // across exec when LISTEN_FDS=1 is set.
            let owned = unsafe { OwnedFd::from_raw_fd(SD_LISTEN_FDS_START) };
            let std_listener = StdUnixListener::from(owned);
            std_listener
                .set_nonblocking(true)
                .map_err(ServerError::Adopt)?;
            UnixListener::from_std(std_listener).map_err(ServerError::Adopt)
        }
        Ok(other) => Err(ServerError::UnsupportedListenFds(other)),
        Err(_) => {
            let _ = std::fs::remove_file(listen_path);
            let std_listener = StdUnixListener::bind(listen_path).map_err(|source| ServerError::Bind {
                path: listen_path.to_owned(),
                source,
            })?;
            std_listener
                .set_nonblocking(true)
                .map_err(|source| ServerError::Bind {
                    path: listen_path.to_owned(),
                    source,
                })?;
            UnixListener::from_std(std_listener).map_err(|source| ServerError::Bind {
                path: listen_path.to_owned(),
                source,
            })
        }
    }
}

/// Accept connections from `listener` one at a time, serving each to
/// completion before accepting the next, until `shutdown` fires.
pub async fn run(listener: UnixListener, store: Arc<dyn Storage>, shutdown: CancellationToken) {
    let mut buf = Vec::with_capacity(MAX_FRAME_LEN);
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        log_peer_credentials(&stream);

        if let Err(e) = serve_one(&stream, &mut buf, store.as_ref()).await {
            PROTOCOL_ERRORS.with_label_values(&[protocol_error_kind(&e)]).inc();
            debug!(error = %e, "connection ended with a protocol error");
        }
    }
}

/// Log the connecting peer's `SO_PEERCRED` identity. Purely informational --
/// the lease-script socket's filesystem permissions are the only access
/// control, this is not a second one.
fn log_peer_credentials(stream: &UnixStream) {
    // SAFETY: `borrowed` does not outlive `stream`, which keeps the fd open.
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(stream.as_raw_fd()) };
    match getsockopt(&borrowed, PeerCredentials) {
        Ok(cred) => debug!(
            pid = cred.pid(),
            uid = cred.uid(),
            gid = cred.gid(),
            "accepted connection"
        ),
        Err(e) => warn!(error = %e, "failed to read peer credentials"),
    }
}

fn protocol_error_kind(err: &ProtocolError) -> &'static str {
    match err {
        ProtocolError::BufferTooSmall { .. } => "buffer_too_small",
        ProtocolError::UnexpectedEof { .. } => "unexpected_eof",
        ProtocolError::TruncatedAncillary => "truncated_ancillary",
        ProtocolError::MissingEquals { .. } => "missing_equals",
        ProtocolError::NegativeCount { .. } => "negative_count",
        ProtocolError::LeftoverBytes { .. } => "leftover_bytes",
        ProtocolError::NoFileDescriptors => "no_file_descriptors",
        ProtocolError::WrongFdCount { .. } => "wrong_fd_count",
        ProtocolError::FdModeMismatch { .. } => "fd_mode_mismatch",
        ProtocolError::UnknownAccessMode { .. } => "unknown_access_mode",
    }
}

async fn serve_one(
    stream: &UnixStream,
    buf: &mut Vec<u8>,
    store: &dyn Storage,
) -> Result<(), ProtocolError> {
    let (frame, fds) = receive_frame(stream, buf, MAX_FRAME_LEN).await?;
    let FdTriple {
        stdin: _stdin,
        stdout,
        stderr: _stderr,
    } = fds;

    let mut stdout = TokioFile::from_std(std::fs::File::from(stdout));
    let status = dispatch::dispatch(&frame, store, &mut stdout).await;

    // the status byte is the reply; dnsmasq's forwarder reads exactly
    // one byte off the connected socket before exiting
    if let Err(e) = stream_reply(stream, status.status_byte()).await {
        error!(error = %e, "failed to write reply status byte");
    }

    Ok(())
}

async fn stream_reply(stream: &UnixStream, status: u8) -> std::io::Result<()> {
    loop {
        stream.writable().await?;
        match stream.try_write(&[status]) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_listen_fds_value_is_rejected() {
        std::env::set_var("LISTEN_FDS", "2");
        let result = build_listener(Path::new("/tmp/does-not-matter.sock"));
        std::env::remove_var("LISTEN_FDS");
        assert!(matches!(result, Err(ServerError::UnsupportedListenFds(_))));
    }
}
