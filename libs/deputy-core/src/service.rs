//! The Deputy's two public operations, `Refresh`/`Cleanup`
//! (`original_source/src/hades/deputy/server.py::HadesDeputyService`),
//! reimplemented with the differ/atomic-file/zbus/ipset building blocks
//! in this crate rather than D-Bus's own dispatch.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use chrono::Duration;
use lease_store::MacAddr;
use sqlx::PgPool;
use tracing::{info, warn};
use view_differ::{ViewDiffer, ViewSpec};
use zbus::Connection;

use crate::dhcp_hosts::write_dhcp_hosts_file;
use crate::error::DeputyError;
use crate::ipset::update_alternative_dns_ipset;
use crate::model::{fetch_alternative_dns_ips, fetch_dhcp_hosts, fetch_nas_clients};
use crate::radius_clients::write_radius_clients_file;
use crate::systemd::{reload_unit, restart_unit};
use atomic_file::FileOwnership;
use hades_core::metrics::DEPUTY_REFRESHES;

const DHCPHOST: ViewSpec = ViewSpec {
    view: "dhcphost",
    temp_view: "temp_dhcphost",
    key_columns: &["ip"],
};
const NAS: ViewSpec = ViewSpec {
    view: "nas",
    temp_view: "temp_nas",
    key_columns: &["nasname"],
};
const ALTERNATIVE_DNS: ViewSpec = ViewSpec {
    view: "alternative_dns",
    temp_view: "temp_alternative_dns",
    key_columns: &["ip"],
};
const UNTRACKED_VIEWS: &[&str] = &[
    "radcheck",
    "radreply",
    "radgroupcheck",
    "radgroupreply",
    "radusergroup",
];

/// Where generated artifacts land, who owns them, and what to reload.
#[derive(Debug, Clone)]
pub struct DeputyConfig {
    /// destination path for the DHCP hosts file
    pub dhcp_hosts_path: PathBuf,
    /// ownership/mode for the DHCP hosts file (DHCP user, 0440)
    pub dhcp_hosts_ownership: FileOwnership,
    /// systemd unit reloaded after the DHCP hosts file changes
    pub dhcp_hosts_unit: String,
    /// destination path for the RADIUS clients file
    pub radius_clients_path: PathBuf,
    /// ownership/mode for the RADIUS clients file (RADIUS user, 0440)
    pub radius_clients_ownership: FileOwnership,
    /// systemd unit restarted after the RADIUS clients file changes
    pub radius_unit: String,
    /// name of the ipset holding alternative-DNS-permitted addresses
    pub alternative_dns_ipset: String,
    /// accounting/post-auth row retention interval
    pub retention_interval: Duration,
    /// network namespace entered for release packets and the ipset restore
    pub release_namespace: String,
    /// DHCP server's own address, targeted by administrative releases
    pub release_server_ip: Ipv4Addr,
    /// interface the release packet is sent from, if pinned
    pub release_interface: Option<String>,
}

/// The Deputy service: materialized-view refresh plus the three
/// generated-artifact regenerations it can trigger, and accounting
/// table cleanup. `Refresh`/`Cleanup` are the service's only two public
/// operations and are never run concurrently with themselves (spec §5).
#[derive(Debug)]
pub struct Deputy {
    pool: PgPool,
    differ: ViewDiffer,
    bus: Connection,
    config: DeputyConfig,
}

impl Deputy {
    /// Construct a Deputy over an already-connected pool and system bus.
    pub fn new(pool: PgPool, bus: Connection, config: DeputyConfig) -> Self {
        let differ = ViewDiffer::new(pool.clone());
        Self {
            pool,
            differ,
            bus,
            config,
        }
    }

    /// Refresh the RADIUS-facing materialized views unconditionally,
    /// then either unconditionally (`force`) or conditionally (diff
    /// non-empty) regenerate and reload the three derived artifacts.
    pub async fn refresh(&self, force: bool) -> Result<(), DeputyError> {
        info!("refreshing materialized views");
        for view in UNTRACKED_VIEWS {
            self.differ.refresh_untracked(view).await?;
        }

        let (reload_dhcp_hosts, reload_nas, reload_alternative_dns) = if force {
            info!("forcing reload of dhcp hosts, nas clients, and alternative dns clients");
            self.differ.refresh_untracked(DHCPHOST.view).await?;
            self.differ.refresh_untracked(NAS.view).await?;
            self.differ.refresh_untracked(ALTERNATIVE_DNS.view).await?;
            (true, true, true)
        } else {
            let dhcphost = self.differ.refresh_and_diff(&DHCPHOST).await?;
            if !dhcphost.diff.is_empty() {
                info!(
                    added = dhcphost.diff.added.len(),
                    removed = dhcphost.diff.removed.len(),
                    modified = dhcphost.diff.modified.len(),
                    "dhcp host reservations changed"
                );
            }
            self.release_removed_hosts(&dhcphost.removed_rows).await;

            let nas_diff = self.differ.refresh_and_diff(&NAS).await?;
            if !nas_diff.diff.is_empty() {
                info!(
                    added = nas_diff.diff.added.len(),
                    removed = nas_diff.diff.removed.len(),
                    modified = nas_diff.diff.modified.len(),
                    "radius clients changed"
                );
            }
            let alternative_dns_diff = self.differ.refresh_and_diff(&ALTERNATIVE_DNS).await?;
            if !alternative_dns_diff.diff.is_empty() {
                info!(
                    added = alternative_dns_diff.diff.added.len(),
                    removed = alternative_dns_diff.diff.removed.len(),
                    modified = alternative_dns_diff.diff.modified.len(),
                    "alternative auth dns clients changed"
                );
            }
            (
                !dhcphost.diff.is_empty(),
                !nas_diff.diff.is_empty(),
                !alternative_dns_diff.diff.is_empty(),
            )
        };

        if reload_dhcp_hosts {
            let hosts = fetch_dhcp_hosts(&self.pool).await?;
            write_dhcp_hosts_file(
                &self.config.dhcp_hosts_path,
                self.config.dhcp_hosts_ownership,
                &hosts,
            )?;
            reload_unit(&self.bus, &self.config.dhcp_hosts_unit).await?;
            DEPUTY_REFRESHES.dhcp_hosts.inc();
        }
        if reload_nas {
            let clients = fetch_nas_clients(&self.pool).await?;
            write_radius_clients_file(
                &self.config.radius_clients_path,
                self.config.radius_clients_ownership,
                &clients,
            )?;
            restart_unit(&self.bus, &self.config.radius_unit).await?;
            DEPUTY_REFRESHES.radius_clients.inc();
        }
        if reload_alternative_dns {
            let ips = fetch_alternative_dns_ips(&self.pool).await?;
            update_alternative_dns_ipset(
                &self.config.release_namespace,
                &self.config.alternative_dns_ipset,
                &ips,
            )
            .await?;
            DEPUTY_REFRESHES.alternative_dns.inc();
        }

        Ok(())
    }

    /// Send an administrative DHCPRELEASE for every `dhcphost` row that
    /// dropped out of the view this cycle. Best-effort: a namespace-entry
    /// or socket failure is logged and skipped, never escalated to a
    /// `DeputyError` that would abort the rest of the refresh.
    async fn release_removed_hosts(&self, removed_rows: &[serde_json::Value]) {
        for row in removed_rows {
            let Some((mac, ip)) = parse_dhcp_host_row(row) else {
                warn!(?row, "removed dhcphost row missing mac/ip, skipping release");
                continue;
            };

            let namespace = self.config.release_namespace.clone();
            let server_ip = self.config.release_server_ip;
            let interface = self.config.release_interface.clone();
            let result = tokio::task::spawn_blocking(move || {
                dhcp_release::release_dhcp_lease(
                    &namespace,
                    ip,
                    server_ip,
                    mac.octets(),
                    None,
                    None,
                    interface.as_deref(),
                )
            })
            .await;

            match result {
                Ok(Ok(())) => info!(%mac, %ip, "sent administrative DHCP release"),
                Ok(Err(err)) => warn!(%mac, %ip, error = %err, "administrative DHCP release failed"),
                Err(err) => warn!(%mac, %ip, error = %err, "release task panicked"),
            }
        }
    }

    /// Delete accounting rows older than the configured retention
    /// interval, and post-auth rows older than one day.
    pub async fn cleanup(&self) -> Result<(), DeputyError> {
        info!("cleaning up old records");
        let retention_seconds = self.config.retention_interval.num_seconds();
        sqlx::query(
            "DELETE FROM radacct WHERE acctstoptime < now() - ($1 * interval '1 second')",
        )
        .bind(retention_seconds)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM radpostauth WHERE authdate < now() - interval '1 day'")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Pull `mac`/`ip` back out of a `dhcphost` row's `to_jsonb` snapshot.
fn parse_dhcp_host_row(row: &serde_json::Value) -> Option<(MacAddr, Ipv4Addr)> {
    let mac: MacAddr = row.get("mac")?.as_str()?.parse().ok()?;
    let ip: Ipv4Addr = row.get("ip")?.as_str()?.parse().ok()?;
    Some((mac, ip))
}
