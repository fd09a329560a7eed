//! PostgreSQL-backed [`Storage`], the only production implementation.
//!
//! Every mutating method runs end to end inside a single `SERIALIZABLE`
//! transaction (the spec's open question on isolation level is resolved
//! in favor of `SERIALIZABLE` everywhere, unlike the source it was
//! distilled from, which only set it on some call paths).

use std::net::IpAddr;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use tracing::warn;

use crate::{Lease, MacAddr, StoreError, Storage};

/// `sqlx::PgPool`-backed lease store, sized to the single in-flight
/// connection the lease-script server ever needs (one accept loop, one
/// transaction at a time) with a small overflow for brief handoffs.
#[derive(Debug, Clone)]
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    /// Connect with the pool sizing the concurrency model calls for:
    /// a size-1 pool with overflow 2 and pre-ping (`test_before_acquire`).
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(3)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool (used by callers that share one
    /// pool across `lease-store` and `view-differ`/`deputy-core`).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_serializable(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        let mut txn = self.pool.begin().await.map_err(classify)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *txn)
            .await
            .map_err(classify)?;
        Ok(txn)
    }
}

/// Map a raw `sqlx::Error` to [`StoreError`], recognizing Postgres
/// SQLSTATE `40001` ("serialization_failure") -- the error a
/// `SERIALIZABLE` transaction raises when it loses a write-write race
/// and must be retried by the caller (spec §4.4/§7).
fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("40001") {
            return StoreError::SerializationFailure;
        }
    }
    StoreError::Database(err)
}

fn row_to_lease(row: &sqlx::postgres::PgRow) -> Result<Lease, StoreError> {
    let mac_text: String = row.try_get("mac")?;
    let mac: MacAddr = mac_text
        .parse()
        .map_err(|_| {
            StoreError::Database(sqlx::Error::ColumnDecode {
                index: "mac".into(),
                source: Box::<dyn std::error::Error + Send + Sync>::from(
                    "malformed mac address in storage",
                ),
            })
        })?;
    let ip_text: String = row.try_get("ip")?;
    let ip: IpAddr = ip_text.parse().map_err(|_| {
        StoreError::Database(sqlx::Error::ColumnDecode {
            index: "ip".into(),
            source: Box::<dyn std::error::Error + Send + Sync>::from("malformed ip address in storage"),
        })
    })?;
    let relay_ip_address = row
        .try_get::<Option<String>, _>("relay_ip_address")?
        .map(|s| s.parse())
        .transpose()
        .map_err(|_: std::net::AddrParseError| {
            StoreError::Database(sqlx::Error::ColumnDecode {
                index: "relay_ip_address".into(),
                source: Box::<dyn std::error::Error + Send + Sync>::from(
                    "malformed relay ip address in storage",
                ),
            })
        })?;
    Ok(Lease {
        ip,
        mac,
        client_id: row.try_get("client_id")?,
        expires_at: row.try_get("expires_at")?,
        hostname: row.try_get("hostname")?,
        supplied_hostname: row.try_get("supplied_hostname")?,
        tags: row.try_get("tags")?,
        domain: row.try_get("domain")?,
        circuit_id: row.try_get("circuit_id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        remote_id: row.try_get("remote_id")?,
        vendor_class: row.try_get("vendor_class")?,
        user_classes: row.try_get("user_classes")?,
        relay_ip_address,
        requested_options: row
            .try_get::<Option<Vec<i32>>, _>("requested_options")?
            .map(|v| v.into_iter().map(|x| x as u16).collect()),
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Storage for PgLeaseStore {
    fn list_all(&self) -> BoxStream<'_, Result<Lease, StoreError>> {
        let pool = self.pool.clone();
        stream::once(async move {
            sqlx::query("SELECT * FROM dhcphost")
                .fetch_all(&pool)
                .await
                .map_err(StoreError::from)
        })
        .flat_map(|rows| match rows {
            Ok(rows) => stream::iter(rows.into_iter().map(|r| row_to_lease(&r)))
                .boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }

    async fn add(&self, lease: &Lease) -> Result<bool, StoreError> {
        let mut txn = self.begin_serializable().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM dhcphost WHERE ip = $1)")
            .bind(lease.ip.to_string())
            .fetch_one(&mut *txn)
            .await
            .map_err(classify)?;

        if exists {
            warn!(ip = %lease.ip, mac = %lease.mac, "add: row already exists, degrading to update");
            drop(txn);
            self.update(lease).await?;
            return Ok(false);
        }

        insert_lease(&mut txn, lease).await?;
        txn.commit().await.map_err(classify)?;
        Ok(true)
    }

    async fn update(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut txn = self.begin_serializable().await?;
        let existing = sqlx::query("SELECT * FROM dhcphost WHERE ip = $1 FOR UPDATE")
            .bind(lease.ip.to_string())
            .fetch_optional(&mut *txn)
            .await
            .map_err(classify)?;

        let Some(row) = existing else {
            insert_lease(&mut txn, lease).await?;
            txn.commit().await.map_err(classify)?;
            return Ok(());
        };

        let current = row_to_lease(&row)?;
        let mut merged = lease.clone();
        merged.updated_at = current.updated_at;
        if merged == current {
            // every column but updated_at already matches: no write
            txn.commit().await.map_err(classify)?;
            return Ok(());
        }

        sqlx::query(
            "UPDATE dhcphost SET \
                mac = $2, client_id = $3, expires_at = $4, hostname = $5, \
                supplied_hostname = $6, tags = $7, domain = $8, circuit_id = $9, \
                subscriber_id = $10, remote_id = $11, vendor_class = $12, \
                user_classes = $13, relay_ip_address = $14, requested_options = $15, \
                updated_at = now() \
             WHERE ip = $1",
        )
        .bind(lease.ip.to_string())
        .bind(lease.mac.to_string())
        .bind(&lease.client_id)
        .bind(lease.expires_at)
        .bind(&lease.hostname)
        .bind(&lease.supplied_hostname)
        .bind(&lease.tags)
        .bind(&lease.domain)
        .bind(&lease.circuit_id)
        .bind(&lease.subscriber_id)
        .bind(&lease.remote_id)
        .bind(&lease.vendor_class)
        .bind(&lease.user_classes)
        .bind(lease.relay_ip_address.map(|a| a.to_string()))
        .bind(
            lease
                .requested_options
                .as_ref()
                .map(|v| v.iter().map(|x| *x as i32).collect::<Vec<_>>()),
        )
        .execute(&mut *txn)
        .await
        .map_err(classify)?;

        txn.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn delete(&self, ip: IpAddr) -> Result<u64, StoreError> {
        let mut txn = self.begin_serializable().await?;
        let result = sqlx::query("DELETE FROM dhcphost WHERE ip = $1")
            .bind(ip.to_string())
            .execute(&mut *txn)
            .await
            .map_err(classify)?;
        txn.commit().await.map_err(classify)?;
        let affected = result.rows_affected();
        if affected != 1 {
            warn!(%ip, affected, "delete: unexpected row count");
        }
        Ok(affected)
    }
}

async fn insert_lease(txn: &mut Transaction<'_, Postgres>, lease: &Lease) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO dhcphost \
            (ip, mac, client_id, expires_at, hostname, supplied_hostname, tags, domain, \
             circuit_id, subscriber_id, remote_id, vendor_class, user_classes, \
             relay_ip_address, requested_options, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now())",
    )
    .bind(lease.ip.to_string())
    .bind(lease.mac.to_string())
    .bind(&lease.client_id)
    .bind(lease.expires_at)
    .bind(&lease.hostname)
    .bind(&lease.supplied_hostname)
    .bind(&lease.tags)
    .bind(&lease.domain)
    .bind(&lease.circuit_id)
    .bind(&lease.subscriber_id)
    .bind(&lease.remote_id)
    .bind(&lease.vendor_class)
    .bind(&lease.user_classes)
    .bind(lease.relay_ip_address.map(|a| a.to_string()))
    .bind(
        lease
            .requested_options
            .as_ref()
            .map(|v| v.iter().map(|x| *x as i32).collect::<Vec<_>>()),
    )
    .execute(&mut **txn)
    .await
    .map_err(classify)?;
    Ok(())
}
