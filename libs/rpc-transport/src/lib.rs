//! # rpc-transport
//!
//! An AMQP-backed task RPC transport: idempotent topology declaration,
//! a name-to-handler task registry (the registry-table pattern from
//! design note §9, generalized from the upstream DHCP engine's
//! `Plugin` registration), and the VRRP-driven queue-binding state
//! machine that toggles this node's site-wide routing binding as it
//! transitions to and from VRRP `MASTER`.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod error;
mod registry;
mod topology;
mod transport;
mod vrrp;

pub use error::RpcError;
pub use registry::{TaskHandler, TaskRegistry};
pub use topology::Topology;
pub use transport::RpcTransport;
pub use vrrp::{VrrpBinding, VrrpNotification, VrrpState};
