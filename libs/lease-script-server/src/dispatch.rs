//! Command dispatch table (spec §4.3): `init`/`add`/`old`/`del` plus the
//! ignore-on-unknown sentinel, each translated to a [`lease_store::Storage`]
//! call and a status byte.

use std::net::IpAddr;

use chrono::Utc;
use frame_codec::Frame;
use hades_core::exitcode::ExitCode;
use hades_core::metrics::LEASE_STORE_OPS;
use lease_store::{Lease, MacAddr, StoreError, Storage};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::fields;
use crate::leasefile;

fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A value/parse error in argv or the environment; always `EX_USAGE`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// too few positional arguments for the command
    #[error("command {command:?} requires a {missing} argument")]
    MissingArgument {
        /// the command name
        command: String,
        /// human name of the missing argument
        missing: &'static str,
    },
    /// an argv field failed to parse (MAC, IP)
    #[error("invalid {field}: {value:?}")]
    InvalidArgument {
        /// which argv field
        field: &'static str,
        /// the raw text that failed to parse
        value: String,
    },
    /// a `DNSMASQ_*` environment variable failed to parse
    #[error(transparent)]
    Field(#[from] fields::FieldError),
    /// the lease store reported a non-transient failure after retry
    #[error("lease store error: {0}")]
    Store(#[from] StoreError),
}

fn build_lease(
    mac: MacAddr,
    ip: IpAddr,
    hostname: Option<String>,
    frame: &Frame,
) -> Result<Lease, DispatchError> {
    let now = Utc::now();
    Ok(Lease {
        ip,
        mac,
        client_id: fields::client_id(&frame.env)?,
        expires_at: fields::expires_at(&frame.env, now)?,
        hostname,
        supplied_hostname: fields::supplied_hostname(&frame.env),
        tags: fields::tags(&frame.env),
        domain: fields::domain(&frame.env),
        circuit_id: fields::circuit_id(&frame.env),
        subscriber_id: fields::subscriber_id(&frame.env),
        remote_id: fields::remote_id(&frame.env),
        vendor_class: fields::vendor_class(&frame.env),
        user_classes: fields::user_classes(&frame.env),
        relay_ip_address: fields::relay_ip_address(&frame.env)?,
        requested_options: fields::requested_options(&frame.env)?,
        updated_at: now,
    })
}

fn parse_mac(command: &str, argv: &[Vec<u8>], index: usize) -> Result<MacAddr, DispatchError> {
    let raw = argv
        .get(index)
        .ok_or_else(|| DispatchError::MissingArgument {
            command: command.to_owned(),
            missing: "mac",
        })?;
    let text = decode_lossy(raw);
    text.parse().map_err(|_| DispatchError::InvalidArgument {
        field: "mac",
        value: text,
    })
}

fn parse_ip(command: &str, argv: &[Vec<u8>], index: usize) -> Result<IpAddr, DispatchError> {
    let raw = argv
        .get(index)
        .ok_or_else(|| DispatchError::MissingArgument {
            command: command.to_owned(),
            missing: "ip",
        })?;
    let text = decode_lossy(raw);
    text.parse().map_err(|_| DispatchError::InvalidArgument {
        field: "ip",
        value: text,
    })
}

fn parse_hostname(argv: &[Vec<u8>], index: usize) -> Option<String> {
    argv.get(index).map(|raw| decode_lossy(raw))
}

/// Apply one mutating store operation, retrying exactly once on a
/// `SERIALIZABLE` write-write conflict before giving up (spec §7: "one
/// retry on serialization failure").
async fn with_retry<F, Fut>(op: F) -> Result<(), StoreError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), StoreError>>,
{
    match op().await {
        Err(StoreError::SerializationFailure) => op().await,
        other => other,
    }
}

async fn add_or_retry(store: &dyn Storage, lease: &Lease) -> Result<(), StoreError> {
    with_retry(|| async { store.add(lease).await.map(|_| ()) }).await
}

async fn update_or_retry(store: &dyn Storage, lease: &Lease) -> Result<(), StoreError> {
    with_retry(|| store.update(lease)).await
}

/// Process one parsed frame against `store`, writing `init`'s leasefile
/// output to `stdout`. Returns the status byte to reply with.
pub async fn dispatch(
    frame: &Frame,
    store: &dyn Storage,
    stdout: &mut (impl AsyncWrite + Unpin),
) -> ExitCode {
    match run(frame, store, stdout).await {
        Ok(()) => ExitCode::Ok,
        Err(DispatchError::Store(_)) => ExitCode::TempFail,
        Err(_) => ExitCode::Usage,
    }
}

async fn run(
    frame: &Frame,
    store: &dyn Storage,
    stdout: &mut (impl AsyncWrite + Unpin),
) -> Result<(), DispatchError> {
    let Some(command) = frame.argv.first().map(|c| decode_lossy(c)) else {
        warn!("empty argv, treating as unknown command");
        return Ok(());
    };

    match command.as_str() {
        "init" => {
            leasefile::write_leasefile(store, stdout).await?;
            LEASE_STORE_OPS.init.inc();
            Ok(())
        }
        "add" => {
            let mac = parse_mac("add", &frame.argv, 1)?;
            let ip = parse_ip("add", &frame.argv, 2)?;
            let hostname = parse_hostname(&frame.argv, 3);
            let lease = build_lease(mac, ip, hostname, frame)?;
            add_or_retry(store, &lease).await?;
            LEASE_STORE_OPS.add.inc();
            Ok(())
        }
        "old" => {
            let mac = parse_mac("old", &frame.argv, 1)?;
            let ip = parse_ip("old", &frame.argv, 2)?;
            let hostname = parse_hostname(&frame.argv, 3);
            let lease = build_lease(mac, ip, hostname, frame)?;
            update_or_retry(store, &lease).await?;
            LEASE_STORE_OPS.update.inc();
            Ok(())
        }
        "del" => {
            let _mac = parse_mac("del", &frame.argv, 1)?;
            let ip = parse_ip("del", &frame.argv, 2)?;
            store.delete(ip).await?;
            LEASE_STORE_OPS.delete.inc();
            Ok(())
        }
        other => {
            warn!(command = other, "unknown dhcp-script command");
            Ok(())
        }
    }
}
