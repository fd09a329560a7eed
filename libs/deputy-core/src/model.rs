//! Row shapes fetched for config regeneration
//! (`original_source/src/hades/common/db.py::get_all_dhcp_hosts`,
//! `get_all_nas_clients`, `get_all_alternative_dns_ips`).

use std::net::IpAddr;

use sqlx::{PgPool, Row};

use lease_store::MacAddr;

/// One row of the `dhcphost` view: a static DHCP reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpHost {
    /// reserved client hardware address
    pub mac: MacAddr,
    /// reserved IP address
    pub ip: IpAddr,
}

/// One row of the `nas` view: a RADIUS client (NAS) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasClient {
    /// the client's short name, used as both `client` and `home_server` id
    pub shortname: String,
    /// the client's address, bound into `ipaddr`
    pub nasname: String,
    /// the `nastype` value (e.g. `"other"`)
    pub nas_type: String,
    /// number of ports the NAS exposes
    pub ports: i32,
    /// shared secret; escaped before template substitution
    pub secret: String,
    /// CoA target, if distinct from `nasname` (unused by the current
    /// template, which always addresses CoA at `shortname`)
    pub server: Option<String>,
    /// SNMP community string, informational only
    pub community: Option<String>,
    /// free-text description, informational only
    pub description: Option<String>,
}

fn row_to_dhcp_host(row: &sqlx::postgres::PgRow) -> Result<DhcpHost, sqlx::Error> {
    let mac_text: String = row.try_get("mac")?;
    let mac: MacAddr = mac_text.parse().map_err(|_| sqlx::Error::ColumnDecode {
        index: "mac".into(),
        source: Box::<dyn std::error::Error + Send + Sync>::from("malformed mac address in dhcphost"),
    })?;
    let ip_text: String = row.try_get("ip")?;
    let ip: IpAddr = ip_text.parse().map_err(|_| sqlx::Error::ColumnDecode {
        index: "ip".into(),
        source: Box::<dyn std::error::Error + Send + Sync>::from("malformed ip address in dhcphost"),
    })?;
    Ok(DhcpHost { mac, ip })
}

/// Fetch every row of the `dhcphost` view.
pub async fn fetch_dhcp_hosts(pool: &PgPool) -> Result<Vec<DhcpHost>, sqlx::Error> {
    sqlx::query("SELECT mac, ip FROM dhcphost")
        .fetch_all(pool)
        .await?
        .iter()
        .map(row_to_dhcp_host)
        .collect()
}

fn row_to_nas_client(row: &sqlx::postgres::PgRow) -> Result<NasClient, sqlx::Error> {
    Ok(NasClient {
        shortname: row.try_get("shortname")?,
        nasname: row.try_get("nasname")?,
        nas_type: row.try_get("type")?,
        ports: row.try_get("ports")?,
        secret: row.try_get("secret")?,
        server: row.try_get("server")?,
        community: row.try_get("community")?,
        description: row.try_get("description")?,
    })
}

/// Fetch every row of the `nas` view.
pub async fn fetch_nas_clients(pool: &PgPool) -> Result<Vec<NasClient>, sqlx::Error> {
    sqlx::query("SELECT shortname, nasname, type, ports, secret, server, community, description FROM nas")
        .fetch_all(pool)
        .await?
        .iter()
        .map(row_to_nas_client)
        .collect()
}

/// Fetch every address in the `alternative_dns` view.
pub async fn fetch_alternative_dns_ips(pool: &PgPool) -> Result<Vec<IpAddr>, sqlx::Error> {
    let rows = sqlx::query("SELECT ip FROM alternative_dns")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| {
            let text: String = row.try_get("ip")?;
            text.parse().map_err(|_| sqlx::Error::ColumnDecode {
                index: "ip".into(),
                source: Box::<dyn std::error::Error + Send + Sync>::from(
                    "malformed ip address in alternative_dns",
                ),
            })
        })
        .collect()
}
