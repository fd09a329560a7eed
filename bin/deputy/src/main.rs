//! `hades-deputy`: the privileged service that regenerates the DHCP
//! hosts file, the RADIUS clients file, and the alternative-DNS ipset
//! off the materialized-view differ (spec §4.8), reachable over the
//! signed RPC transport as the `refresh`/`cleanup` tasks, and keeping
//! this node's `rpc <-> site_key` binding in sync with VRRP.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use atomic_file::FileOwnership;
use deputy_core::{Deputy, DeputyConfig as CoreDeputyConfig};
use ed25519_dalek::{SigningKey, VerifyingKey};
use envelope_codec::{Encoding, EnvelopeCodec, Payload};
use hades_core::config::{cli, trace};
use hades_core::exitcode::ExitCode;
use health_api::{Health, HealthApi};
use rpc_transport::{RpcTransport, TaskHandler, TaskRegistry, Topology, VrrpBinding};
use sqlx::postgres::PgPoolOptions;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zbus::Connection;

const RPC_CONTENT_TYPE: &str = "application/json";

fn main() -> ProcessExitCode {
    let config = <cli::DeputyConfig as cli::Parser>::parse();

    if config.version {
        println!("hades-deputy {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Ok.report();
    }

    if let Err(err) = trace::Config::parse(&config.common.hades_log, &config.common.log_format) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::Config.report();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("hades-deputy")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "failed to build tokio runtime");
            return ExitCode::OsErr.report();
        }
    };

    rt.block_on(run(config))
}

async fn run(config: cli::DeputyConfig) -> ProcessExitCode {
    debug!(?config, instance = ?config.instance(), "starting deputy");

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .test_before_acquire(true)
        .connect(&config.common.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to the database");
            return ExitCode::TempFail.report();
        }
    };

    let bus = match Connection::system().await {
        Ok(bus) => bus,
        Err(err) => {
            error!(error = %err, "failed to connect to the system bus");
            return ExitCode::Unavailable.report();
        }
    };

    let deputy_config = CoreDeputyConfig {
        dhcp_hosts_path: config.dhcp_hosts_path.clone(),
        dhcp_hosts_ownership: FileOwnership {
            uid: config.dhcp_hosts_uid,
            gid: config.dhcp_hosts_gid,
            mode: 0o440,
        },
        dhcp_hosts_unit: config.dhcp_hosts_unit.clone(),
        radius_clients_path: config.radius_clients_path.clone(),
        radius_clients_ownership: FileOwnership {
            uid: config.radius_clients_uid,
            gid: config.radius_clients_gid,
            mode: 0o440,
        },
        radius_unit: config.radius_unit.clone(),
        alternative_dns_ipset: config.alternative_dns_ipset.clone(),
        retention_interval: chrono::Duration::from_std(config.retention())
            .unwrap_or(chrono::Duration::zero()),
        release_namespace: config.namespace.clone(),
        release_server_ip: config.dhcp_server_ip,
        release_interface: config.dhcp_release_interface.clone(),
    };
    let deputy = Arc::new(Deputy::new(pool, bus, deputy_config));

    let envelope = match build_envelope_codec(&config) {
        Ok(codec) => Arc::new(codec),
        Err(err) => {
            error!(error = %err, "failed to load signing/trusted keys");
            return ExitCode::Config.report();
        }
    };

    let topology = Topology {
        node_key: config.node_key.clone(),
        site_key: config.site_key.clone(),
    };
    let vrrp = Arc::new(Mutex::new(VrrpBinding::new(
        config.vrrp_instance.clone(),
        topology.clone(),
    )));

    let mut registry = TaskRegistry::new();
    registry.register("refresh", Arc::new(RefreshTask(Arc::clone(&deputy))) as Arc<dyn TaskHandler>);
    registry.register("cleanup", Arc::new(CleanupTask(Arc::clone(&deputy))) as Arc<dyn TaskHandler>);

    let transport = RpcTransport::new(
        config.broker_url.clone(),
        topology,
        registry,
        envelope,
        vec![RPC_CONTENT_TYPE],
    );

    let health = HealthApi::new(config.health_addr);
    let health_state = health.state();
    let _health_guard = health.serve();

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));
    let refresh_ticker = tokio::spawn(periodic_refresh(
        Arc::clone(&deputy),
        config.refresh_interval(),
        shutdown.clone(),
    ));
    let cleanup_ticker = tokio::spawn(periodic_cleanup(
        Arc::clone(&deputy),
        config.cleanup_interval(),
        shutdown.clone(),
    ));

    *health_state.lock() = Health::Good;
    let transport_result = transport.run(shutdown.clone(), vrrp).await;
    *health_state.lock() = Health::Bad;

    shutdown.cancel();
    signal_task.abort();
    let _ = refresh_ticker.await;
    let _ = cleanup_ticker.await;

    match transport_result {
        Ok(()) => {
            info!("deputy exiting cleanly");
            ExitCode::Ok.report()
        }
        Err(err) => {
            error!(error = %err, "rpc transport exited with an error");
            ExitCode::TempFail.report()
        }
    }
}

/// Run `deputy.refresh(false)` on a fixed interval until `shutdown`
/// fires (spec §2's "scheduler/timer -> Deputy.Refresh" data flow).
async fn periodic_refresh(deputy: Arc<Deputy>, interval: std::time::Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(err) = deputy.refresh(false).await {
                    warn!(error = %err, "background refresh failed");
                }
            }
        }
    }
}

/// Run `deputy.cleanup()` on a fixed interval until `shutdown` fires.
async fn periodic_cleanup(deputy: Arc<Deputy>, interval: std::time::Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(err) = deputy.cleanup().await {
                    warn!(error = %err, "background cleanup failed");
                }
            }
        }
    }
}

async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = install_and_wait().await {
        error!(error = %err, "failed to install signal handlers");
    }
    shutdown.cancel();
}

async fn install_and_wait() -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::select! {
        _ = hangup.recv() => info!(signal = "SIGHUP", "shutdown requested"),
        _ = interrupt.recv() => info!(signal = "SIGINT", "shutdown requested"),
        _ = terminate.recv() => info!(signal = "SIGTERM", "shutdown requested"),
    }
    Ok(())
}

/// Read the 32-byte ed25519 seed at `path` and build a [`SigningKey`].
fn load_signing_key(path: &Path) -> anyhow::Result<SigningKey> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading signing key at {}", path.display()))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("signing key at {} is not exactly 32 bytes", path.display()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Read every file in `dir` as a base64-encoded verify key, keyed (as
/// the envelope codec expects) by that same base64 text.
fn load_trusted_keys(dir: &Path) -> anyhow::Result<HashMap<String, VerifyingKey>> {
    use base64::Engine;

    let mut trusted = HashMap::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading trusted keys directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())?;
        let text = contents.trim().to_owned();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&text)
            .with_context(|| format!("decoding trusted key {}", entry.path().display()))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| {
            anyhow::anyhow!("trusted key {} is not 32 bytes", entry.path().display())
        })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .with_context(|| format!("parsing trusted key {}", entry.path().display()))?;
        trusted.insert(text, key);
    }
    Ok(trusted)
}

fn build_envelope_codec(config: &cli::DeputyConfig) -> anyhow::Result<EnvelopeCodec> {
    let signing_key = load_signing_key(&config.signing_key_path)?;
    let mut trusted = load_trusted_keys(&config.trusted_keys_dir)?;
    // trust our own key too, so this node accepts its own broadcasts
    let verifying = signing_key.verifying_key();
    let self_b64 = base64::engine::general_purpose::STANDARD.encode(verifying.as_bytes());
    trusted.entry(self_b64).or_insert(verifying);

    Ok(EnvelopeCodec::new(signing_key, Encoding::Armored, trusted))
}

struct RefreshTask(Arc<Deputy>);

#[async_trait]
impl TaskHandler for RefreshTask {
    async fn handle(&self, payload: Payload) -> anyhow::Result<()> {
        let force = match &payload {
            Payload::Json(value) => value
                .get("force")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            Payload::Raw(_) => false,
        };
        self.0.refresh(force).await.map_err(Into::into)
    }
}

struct CleanupTask(Arc<Deputy>);

#[async_trait]
impl TaskHandler for CleanupTask {
    async fn handle(&self, _payload: Payload) -> anyhow::Result<()> {
        self.0.cleanup().await.map_err(Into::into)
    }
}
