//! Receiving one request frame plus its three ancillary file
//! descriptors off a connected [`tokio::net::UnixStream`].
//!
//! [`frame_codec::FrameParser`] only knows about the byte stream; this
//! module drives it with `recvmsg`, collecting `SCM_RIGHTS` file
//! descriptors as they arrive on any read (the control message is not
//! guaranteed to land on any particular `recvmsg` call) and validating
//! their open modes once all three have been seen.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use frame_codec::{Frame, FrameParser, ParseStep, ProtocolError};
use nix::cmsg_space;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};
use nix::sys::uio::IoSliceMut;
use tokio::io::Interest;
use tokio::net::UnixStream;

/// The three standard file descriptors dnsmasq's forwarder passes for
/// the calling `--dhcp-script` invocation.
#[derive(Debug)]
pub struct FdTriple {
    /// the caller's stdin
    pub stdin: OwnedFd,
    /// the caller's stdout
    pub stdout: OwnedFd,
    /// the caller's stderr
    pub stderr: OwnedFd,
}

#[derive(Clone, Copy)]
enum Required {
    Read,
    Write,
}

fn check_fd_mode(fd: RawFd, index: usize, required: Required) -> Result<(), ProtocolError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|_| ProtocolError::FdModeMismatch {
        index,
        expected: match required {
            Required::Read => "r",
            Required::Write => "w",
        },
    })?;
    let access = OFlag::from_bits_truncate(flags) & OFlag::O_ACCMODE;

    let ok = match (access, required) {
        (OFlag::O_RDWR, _) => true,
        (OFlag::O_RDONLY, Required::Read) => true,
        (OFlag::O_WRONLY, Required::Write) => true,
        (OFlag::O_RDONLY, Required::Write) | (OFlag::O_WRONLY, Required::Read) => false,
        _ => {
            return Err(ProtocolError::UnknownAccessMode {
                index,
                mode: access.bits(),
            })
        }
    };

    if ok {
        Ok(())
    } else {
        Err(ProtocolError::FdModeMismatch {
            index,
            expected: match required {
                Required::Read => "r",
                Required::Write => "w",
            },
        })
    }
}

/// Receive and parse one complete request frame, returning it along
/// with the three passed file descriptors. `buf` is a reused
/// accumulation buffer (cleared on entry); `max_len` is the hard
/// per-frame size cap (`page_size - 1`).
pub async fn receive_frame(
    stream: &UnixStream,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> Result<(Frame, FdTriple), ProtocolError> {
    buf.clear();
    let mut parser = FrameParser::new(max_len);
    let mut raw_fds: Vec<RawFd> = Vec::with_capacity(3);
    let mut last_needed = (0usize, "argc".to_owned());

    let result = loop {
        // First try to make progress on bytes already buffered.
        match parser.parse(buf) {
            Ok(ParseStep::Done { frame, .. }) => {
                if raw_fds.len() == 3 {
                    break Ok((frame, raw_fds.clone()));
                }
                // bytes are complete but the control message may still
                // be in flight; keep recv'ing until we see it or EOF.
                match recv_more(stream, buf, max_len, &mut raw_fds).await? {
                    0 if raw_fds.is_empty() => break Err(ProtocolError::NoFileDescriptors),
                    0 => {
                        break Err(ProtocolError::WrongFdCount {
                            expected: 3,
                            actual: raw_fds.len(),
                        })
                    }
                    _ => continue,
                }
            }
            Ok(ParseStep::Needed { total, element }) => {
                last_needed = (total, element);
            }
            Err(e) => break Err(e),
        }

        match recv_more(stream, buf, max_len, &mut raw_fds).await {
            Ok(0) => {
                break Err(ProtocolError::UnexpectedEof {
                    needed: last_needed.0,
                    available: buf.len(),
                    offset: buf.len(),
                    element: last_needed.1.clone(),
                })
            }
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };

    match result {
        Ok((frame, fds)) => {
            check_fd_mode(fds[0], 0, Required::Read)?;
            check_fd_mode(fds[1], 1, Required::Write)?;
            check_fd_mode(fds[2], 2, Required::Write)?;
            // Safety: each fd came from a single SCM_RIGHTS control
            // message we just received and have not touched since.
            let triple = unsafe {
                FdTriple {
                    stdin: OwnedFd::from_raw_fd(fds[0]),
                    stdout: OwnedFd::from_raw_fd(fds[1]),
                    stderr: OwnedFd::from_raw_fd(fds[2]),
                }
            };
            Ok((frame, triple))
        }
        Err(e) => {
            // close any fds we did receive before propagating the error
            for fd in raw_fds {
                let _ = unsafe { OwnedFd::from_raw_fd(fd) };
            }
            Err(e)
        }
    }
}

/// One `recvmsg` call: appends newly-received bytes to `buf` (capped at
/// `max_len`) and any `SCM_RIGHTS` descriptors to `fds`. Returns the
/// number of bytes received (`0` signals the peer has shut down its
/// write half).
async fn recv_more(
    stream: &UnixStream,
    buf: &mut Vec<u8>,
    max_len: usize,
    fds: &mut Vec<RawFd>,
) -> Result<usize, ProtocolError> {
    loop {
        stream
            .readable()
            .await
            .map_err(|_| ProtocolError::TruncatedAncillary)?;

        let mut scratch = [0u8; 4096];
        let cap = max_len.saturating_sub(buf.len()).min(scratch.len());
        let result = stream.try_io(Interest::READABLE, || {
            let mut iov = [IoSliceMut::new(&mut scratch[..cap.max(1)])];
            let mut cmsg_buf = cmsg_space!([RawFd; 3]);
            let msg = recvmsg::<()>(
                stream.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buf),
                MsgFlags::MSG_CMSG_CLOEXEC,
            )
            .map_err(std::io::Error::from)?;

            if msg.flags.intersects(MsgFlags::MSG_CTRUNC | MsgFlags::MSG_TRUNC) {
                return Err(std::io::Error::other("truncated ancillary data"));
            }

            for cmsg in msg
                .cmsgs()
                .map_err(|_| std::io::Error::other("truncated ancillary data"))?
            {
                if let ControlMessageOwned::ScmRights(received) = cmsg {
                    fds.extend(received);
                }
            }

            Ok(msg.bytes)
        });

        match result {
            Ok(n) => {
                if n > 0 {
                    buf.extend_from_slice(&scratch[..n]);
                }
                return Ok(n);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.to_string().contains("truncated ancillary data") => {
                return Err(ProtocolError::TruncatedAncillary)
            }
            Err(_) => return Err(ProtocolError::TruncatedAncillary),
        }
    }
}
