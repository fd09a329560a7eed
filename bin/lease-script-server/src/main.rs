//! `hades-lease-script-server`: the UNIX-socket daemon dnsmasq's
//! `--dhcp-script` forwarder talks to (spec §4.3). Binds or adopts the
//! listening socket, connects a small Postgres pool, and serves one
//! connection at a time until `SIGHUP`/`SIGINT`/`SIGTERM`.

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use anyhow::Context;
use hades_core::config::{cli, trace};
use hades_core::exitcode::ExitCode;
use lease_script_server::build_listener;
use lease_store::postgres::PgLeaseStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

fn main() -> ProcessExitCode {
    let config = <cli::LeaseScriptConfig as cli::Parser>::parse();

    if config.version {
        println!("hades-lease-script-server {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Ok.report();
    }

    if let Err(err) = trace::Config::parse(&config.common.hades_log, &config.common.log_format) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::Config.report();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("hades-lease-script")
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

async fn run(config: cli::LeaseScriptConfig) -> ProcessExitCode {
    debug!(?config, "starting lease-script server");

    let listener = match build_listener(&config.socket) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, "failed to bind or adopt the lease-script socket");
            return ExitCode::OsErr.report();
        }
    };
    info!(socket = %config.socket.display(), "lease-script socket ready");

    let store = match PgLeaseStore::connect(&config.common.database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to connect to the lease database");
            return ExitCode::TempFail.report();
        }
    };
    let store: Arc<dyn lease_store::Storage> = Arc::new(store);

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    lease_script_server::run(listener, store, shutdown).await;

    signal_task.abort();
    info!("lease-script server exiting cleanly");
    ExitCode::Ok.report()
}

/// Stop accepting new connections on `SIGHUP`, `SIGINT`, or `SIGTERM`
/// (spec §4.3: "graceful shutdown ... stop accepting, drain in-flight
/// connection, exit 0").
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    let result = install_and_wait().await;
    if let Err(err) = result {
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
