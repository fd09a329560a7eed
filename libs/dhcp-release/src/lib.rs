//! # dhcp-release
//!
//! Builds administrative DHCPRELEASE datagrams byte-for-byte per RFC
//! 2131's BOOTP layout and sends them from a named network namespace,
//! since the authoritative DHCP server is reachable only there.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod netns;
mod packet;
mod send;

pub use netns::NetnsGuard;
pub use packet::build_release_packet;
pub use send::{release_dhcp_lease, send_release_packet, ReleaseError};
