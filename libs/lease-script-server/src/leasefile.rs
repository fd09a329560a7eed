//! Renders the lease table in dnsmasq leasefile format for the `init`
//! command: `"{expires_at:d} {mac} {ip} {hostname|*} {client_id|*}\n"`,
//! matching `original_source/src/hades/bin/dhcp_script.py::generate_leasefile_lines`.

use futures::StreamExt;
use lease_store::{Lease, StoreError, Storage};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Format one lease as a single leasefile line.
pub fn format_line(lease: &Lease) -> String {
    let hostname = lease.hostname.as_deref().unwrap_or("*");
    let client_id = match &lease.client_id {
        Some(bytes) if !bytes.is_empty() => colon_hex(bytes),
        _ => "*".to_owned(),
    };
    format!(
        "{} {} {} {} {}\n",
        lease.expires_at.timestamp(),
        lease.mac,
        lease.ip,
        hostname,
        client_id
    )
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Stream every lease in `store` to `out` in leasefile format, the
/// effect of dnsmasq's `init` command.
pub async fn write_leasefile(
    store: &dyn Storage,
    out: &mut (impl AsyncWrite + Unpin),
) -> Result<(), StoreError> {
    let mut leases = store.list_all();
    while let Some(lease) = leases.next().await {
        let lease = lease?;
        out.write_all(format_line(&lease).as_bytes())
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
    }
    out.flush()
        .await
        .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lease_store::MacAddr;

    fn sample() -> Lease {
        Lease {
            ip: "141.76.121.2".parse().unwrap(),
            mac: "00:de:ad:be:ef:00".parse::<MacAddr>().unwrap(),
            client_id: Some(vec![0x01, 0x50, 0x7b, 0x9d, 0x87, 0x76, 0x4b]),
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

    #[test]
    fn matches_documented_format() {
        let line = format_line(&sample());
        assert_eq!(
            line,
            "1508969413 00:de:ad:be:ef:00 141.76.121.2 * 01:50:7b:9d:87:76:4b\n"
        );
    }

    #[test]
    fn missing_hostname_and_client_id_are_stars() {
        let mut lease = sample();
        lease.client_id = None;
        let line = format_line(&lease);
        assert!(line.ends_with(" * *\n"));
    }
}
