//! # lease-script-server
//!
//! The UNIX-socket IPC server dnsmasq's `--dhcp-script` forwarder talks
//! to: it accepts one connection per script invocation, reads a
//! [`frame_codec`] wire frame plus three ancillary file descriptors
//! (stdin/stdout/stderr of the calling process), runs the requested
//! command (`init`/`add`/`old`/`del`) against a [`lease_store::Storage`],
//! and replies with a single BSD-sysexits status byte.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod dispatch;
mod fields;
mod ipc;
mod leasefile;
mod server;

pub use dispatch::{dispatch, DispatchError};
pub use fields::FieldError;
pub use ipc::{receive_frame, FdTriple};
pub use server::{build_listener, run, ServerError};
