//! `ReloadUnit`/`RestartUnit` over the system D-Bus
//! (`original_source/src/hades/deputy/server.py::reload_systemd_unit`,
//! `restart_systemd_unit`), with the 100 ms default IPC timeout from
//! spec §5.

use std::time::Duration;

use hades_core::ipc::IpcError;
use tracing::debug;
use zbus::Connection;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
const DESTINATION: &str = "org.freedesktop.systemd1";
const PATH: &str = "/org/freedesktop/systemd1";
const INTERFACE: &str = "org.freedesktop.systemd1.Manager";

async fn call_unit_method(
    connection: &Connection,
    method: &str,
    unit: &str,
) -> Result<(), IpcError> {
    debug!(unit, method, "instructing systemd");
    tokio::time::timeout(
        DEFAULT_TIMEOUT,
        connection.call_method(
            Some(DESTINATION),
            PATH,
            Some(INTERFACE),
            method,
            &(unit, "fail"),
        ),
    )
    .await??;
    Ok(())
}

/// Instruct systemd to reload `unit` (`ReloadUnit(unit, "fail")`).
pub async fn reload_unit(connection: &Connection, unit: &str) -> Result<(), IpcError> {
    call_unit_method(connection, "ReloadUnit", unit).await
}

/// Instruct systemd to restart `unit` (`RestartUnit(unit, "fail")`).
pub async fn restart_unit(connection: &Connection, unit: &str) -> Result<(), IpcError> {
    call_unit_method(connection, "RestartUnit", unit).await
}
