//! # lease-store
//!
//! Transactional upserts/deletes on the lease table, structured like
//! `ip-manager`'s `Storage` trait: one trait with a single production
//! backend (here: PostgreSQL, via [`postgres::PgLeaseStore`]) plus a
//! fake used by unit tests, since no live database is reachable in this
//! exercise.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

mod mac;
pub mod memory;
pub mod postgres;

pub use mac::{MacAddr, ParseMacError};

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

/// A single DHCP lease, keyed by [`Lease::ip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// the lease's unique key
    pub ip: IpAddr,
    /// client hardware address
    pub mac: MacAddr,
    /// DHCP client identifier (option 61), if the client sent one
    pub client_id: Option<Vec<u8>>,
    /// absolute lease expiry, always UTC
    pub expires_at: DateTime<Utc>,
    /// hostname dnsmasq resolved for this lease (DNS-sanitized)
    pub hostname: Option<String>,
    /// raw hostname the client supplied, before sanitization
    pub supplied_hostname: Option<String>,
    /// dnsmasq tags matched for this lease
    pub tags: Option<Vec<String>>,
    /// DNS domain dnsmasq appended to the hostname
    pub domain: Option<String>,
    /// relay agent circuit id (option 82 sub-option 1)
    pub circuit_id: Option<Vec<u8>>,
    /// relay agent subscriber id (option 82 sub-option 6)
    pub subscriber_id: Option<Vec<u8>>,
    /// relay agent remote id (option 82 sub-option 2)
    pub remote_id: Option<Vec<u8>>,
    /// DHCP vendor class identifier (option 60)
    pub vendor_class: Option<String>,
    /// ordered DHCP user class strings (option 77)
    pub user_classes: Option<Vec<String>>,
    /// the relay agent's own address, if the request was relayed
    pub relay_ip_address: Option<IpAddr>,
    /// DHCP parameter request list (option 55)
    pub requested_options: Option<Vec<u16>>,
    /// server-maintained; never set by callers, never decreases
    pub updated_at: DateTime<Utc>,
}

/// Failures raised by a [`Storage`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// the underlying database connection or statement failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// a `SERIALIZABLE` transaction lost a write-write race and must be
    /// retried by the caller
    #[error("transaction serialization failure, retry")]
    SerializationFailure,
}

/// Transactional CRUD over the lease table. Every mutating method runs
/// in a single `SERIALIZABLE` transaction end to end.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Stream every lease currently on file, in no particular order.
    /// Used to answer dnsmasq's `init` command.
    fn list_all(&self) -> BoxStream<'_, Result<Lease, StoreError>>;

    /// Insert `lease`. If a row with the same `ip` already exists this
    /// degrades to [`Storage::update`] and the caller is expected to log
    /// a warning (a race with dnsmasq re-issuing `add` after a restart).
    /// Returns `true` if a fresh row was inserted, `false` if it
    /// degraded to an update.
    async fn add(&self, lease: &Lease) -> Result<bool, StoreError>;

    /// `SELECT ... FOR UPDATE` by `ip`; insert if absent, otherwise
    /// update only the columns that changed plus `updated_at = now()`.
    /// A no-op diff performs no write.
    async fn update(&self, lease: &Lease) -> Result<(), StoreError>;

    /// Delete the row keyed by `ip`. Deleting an absent row is not an
    /// error; the caller logs a warning when no row was affected.
    async fn delete(&self, ip: IpAddr) -> Result<u64, StoreError>;
}
