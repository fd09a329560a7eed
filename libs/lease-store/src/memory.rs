//! An in-memory fake [`Storage`], used for unit tests in this crate and
//! by `lease-script-server`'s own tests. Mirrors how `ip-manager` is
//! tested against `sqlite::memory:` -- we have no Postgres available in
//! this exercise, so a `Storage`-trait fake stands in for it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use tracing::warn;

use crate::{Lease, StoreError, Storage};

/// A `Mutex<HashMap<IpAddr, Lease>>`-backed fake, sufficient for
/// exercising [`Storage`]'s contract without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<IpAddr, Lease>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current rows, for assertions in tests.
    pub fn snapshot(&self) -> Vec<Lease> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

fn diff_and_merge(current: &Lease, incoming: &Lease) -> Lease {
    let mut merged = current.clone();
    merged.mac = incoming.mac;
    merged.client_id = incoming.client_id.clone();
    merged.expires_at = incoming.expires_at;
    merged.hostname = incoming.hostname.clone();
    merged.supplied_hostname = incoming.supplied_hostname.clone();
    merged.tags = incoming.tags.clone();
    merged.domain = incoming.domain.clone();
    merged.circuit_id = incoming.circuit_id.clone();
    merged.subscriber_id = incoming.subscriber_id.clone();
    merged.remote_id = incoming.remote_id.clone();
    merged.vendor_class = incoming.vendor_class.clone();
    merged.user_classes = incoming.user_classes.clone();
    merged.relay_ip_address = incoming.relay_ip_address;
    merged.requested_options = incoming.requested_options.clone();
    merged
}

#[async_trait]
impl Storage for MemoryStore {
    fn list_all(&self) -> BoxStream<'_, Result<Lease, StoreError>> {
        let rows = self.rows.lock().unwrap().values().cloned().collect::<Vec<_>>();
        Box::pin(stream::iter(rows.into_iter().map(Ok)))
    }

    async fn add(&self, lease: &Lease) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(&lease.ip).cloned() {
            warn!(ip = %lease.ip, mac = %lease.mac, "add: row already exists, degrading to update");
            let mut merged = diff_and_merge(&existing, lease);
            if merged != existing {
                merged.updated_at = chrono::Utc::now();
            }
            rows.insert(lease.ip, merged);
            return Ok(false);
        }
        let mut row = lease.clone();
        row.updated_at = chrono::Utc::now();
        rows.insert(lease.ip, row);
        Ok(true)
    }

    async fn update(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&lease.ip).cloned() {
            None => {
                let mut row = lease.clone();
                row.updated_at = chrono::Utc::now();
                rows.insert(lease.ip, row);
            }
            Some(existing) => {
                let mut merged = diff_and_merge(&existing, lease);
                if merged == existing {
                    return Ok(());
                }
                merged.updated_at = chrono::Utc::now();
                rows.insert(lease.ip, merged);
            }
        }
        Ok(())
    }

    async fn delete(&self, ip: IpAddr) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let affected = if rows.remove(&ip).is_some() { 1 } else { 0 };
        if affected != 1 {
            warn!(%ip, affected, "delete: unexpected row count");
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MacAddr;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    fn sample_lease(ip: &str) -> Lease {
        Lease {
            ip: ip.parse().unwrap(),
            mac: "00:de:ad:be:ef:00".parse::<MacAddr>().unwrap(),
            client_id: None,
            expires_at: Utc.timestamp_opt(1_508_969_413, 0).unwrap(),
            hostname: None,
            supplied_hostname: None,
            tags: None,
            domain: None,
            circuit_id: None,
            subscriber_id: None,
            remote_id: None,
            vendor_class: None,
            user_classes: None,
            relay_ip_address: None,
            requested_options: None,
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = MemoryStore::new();
        let lease = sample_lease("141.76.121.2");
        assert!(store.add(&lease).await.unwrap());
        assert!(!store.add(&lease).await.unwrap());

        let rows = store.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip, lease.ip);
        assert_eq!(rows[0].mac, lease.mac);
    }

    #[tokio::test]
    async fn delete_on_absent_row_is_a_no_op() {
        let store = MemoryStore::new();
        let affected = store.delete("10.0.0.1".parse().unwrap()).await.unwrap();
        assert_eq!(affected, 0);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_regardless_of_divergence() {
        let store = MemoryStore::new();
        let lease = sample_lease("141.76.121.2");
        store.add(&lease).await.unwrap();
        let affected = store.delete(lease.ip).await.unwrap();
        assert_eq!(affected, 1);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn update_skips_write_when_nothing_changed() {
        let store = MemoryStore::new();
        let lease = sample_lease("141.76.121.2");
        store.add(&lease).await.unwrap();
        let before = store.snapshot()[0].updated_at;
        store.update(&lease).await.unwrap();
        let after = store.snapshot()[0].updated_at;
        assert_eq!(before, after, "unchanged lease must not touch updated_at");
    }

    #[tokio::test]
    async fn list_all_streams_every_row() {
        let store = MemoryStore::new();
        store.add(&sample_lease("141.76.121.2")).await.unwrap();
        store.add(&sample_lease("141.76.121.3")).await.unwrap();
        let leases: Vec<_> = store.list_all().collect().await;
        assert_eq!(leases.len(), 2);
    }
}
