//! # deputy-core
//!
//! The privileged operations the Deputy service exposes over the signed
//! RPC transport: materialized-view refresh, generated-artifact
//! regeneration (DHCP hosts file, RADIUS clients file, alternative-DNS
//! ipset), downstream daemon reload via systemd, administrative DHCP
//! release, and accounting-table cleanup.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod dhcp_hosts;
mod error;
mod ipset;
mod model;
mod radius_clients;
mod service;
mod systemd;

pub use error::DeputyError;
pub use service::{Deputy, DeputyConfig};
