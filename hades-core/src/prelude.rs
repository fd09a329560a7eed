//! Common imports pulled in by most hades crates, mirroring the upstream
//! DHCP engine's own `prelude` module.

pub use anyhow::{Context, Result, anyhow};
pub use tracing::{debug, error, info, instrument, trace, warn};

pub use crate::exitcode::ExitCode;
pub use crate::ipc::IpcError;
