//! # hades-core
//!
//! Shared plumbing used by every hades binary: CLI/env configuration,
//! `tracing` setup, BSD sysexits, and the `IpcError` sum type used to
//! report init-system failures without a domain/code exception hierarchy.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use anyhow;
pub use tokio;
pub use tracing;

pub mod config;
pub mod exitcode;
pub mod ipc;
pub mod metrics;
pub mod prelude;
