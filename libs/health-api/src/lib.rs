//! # health-api
//!
//! Liveness and metrics HTTP surface for the Deputy binary (spec §2.1's
//! ambient "health/readiness" addition). Exposes:
//!
//! /health
//! /ping
//! /metrics
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::net::SocketAddr;

use anyhow::{bail, Result};
use axum::{extract::Extension, routing, Router};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, error, trace};

pub use crate::models::{Health, State};

/// Owns the spawned HTTP task; aborts it on drop.
#[derive(Debug)]
pub struct HealthApiGuard {
    task_handle: JoinHandle<()>,
}

impl Drop for HealthApiGuard {
    fn drop(&mut self) {
        trace!("health api guard dropped");
        self.task_handle.abort();
    }
}

/// Serves liveness and metrics over HTTP for one binary.
#[derive(Debug)]
pub struct HealthApi {
    addr: SocketAddr,
    state: State,
}

impl HealthApi {
    /// Build a new health API bound to `addr`, starting in [`Health::Bad`]
    /// until the caller reports good health.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: models::blank_health(),
        }
    }

    /// Handle usable to flip health state from elsewhere in the process.
    pub fn state(&self) -> State {
        self.state.clone()
    }

    async fn run(addr: SocketAddr, state: State) -> Result<()> {
        let tcp = TcpListener::bind(&addr).await?;
        let app = Router::new()
            .route("/health", routing::get(handlers::health))
            .route("/ping", routing::get(handlers::ping))
            .route("/metrics", routing::get(handlers::metrics))
            .layer(Extension(state));

        debug!(%addr, "health api listening");
        axum::serve(tcp, app).await?;
        bail!("health api returned -- should not happen")
    }

    /// Start serving in the background.
    pub fn serve(self) -> HealthApiGuard {
        let addr = self.addr;
        let state = self.state.clone();
        let task_handle = tokio::spawn(async move {
            if let Err(err) = HealthApi::run(addr, state).await {
                error!(?err, "health api task exited");
            }
        });
        HealthApiGuard { task_handle }
    }
}

mod handlers {
    use axum::{
        extract::Extension,
        http::{header, Response, StatusCode},
        response::IntoResponse,
        body::Body,
    };
    use prometheus::{Encoder, TextEncoder};
    use tracing::error;

    use crate::models::{Health, State};

    pub(crate) async fn health(
        Extension(state): Extension<State>,
    ) -> Result<impl IntoResponse, std::convert::Infallible> {
        Ok(match *state.lock() {
            Health::Good => StatusCode::OK,
            Health::Bad => StatusCode::INTERNAL_SERVER_ERROR,
        })
    }

    pub(crate) async fn ping() -> impl IntoResponse {
        StatusCode::OK
    }

    pub(crate) async fn metrics() -> Result<impl IntoResponse, std::convert::Infallible> {
        let encoder = TextEncoder::new();
        let mut buf = String::new();
        let mf = prometheus::gather();
        let resp = Response::builder().header(header::CONTENT_TYPE, encoder.format_type());

        match encoder.encode_utf8(&mf, &mut buf) {
            Err(err) => {
                error!(?err, "error encoding prometheus metrics");
                Ok(resp
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .unwrap())
            }
            Ok(_) => Ok(resp.status(StatusCode::OK).body(Body::from(buf)).unwrap()),
        }
    }
}

/// Health state shared between the serving task and the binary's own
/// background loops.
pub mod models {
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::{fmt, sync::Arc};

    /// Shared, lock-guarded health state.
    pub type State = Arc<Mutex<Health>>;

    /// Binary health, good or bad.
    #[derive(Serialize, Deserialize, Debug, PartialEq, Copy, Clone, Eq)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Health {
        /// ready to serve
        Good,
        /// not ready
        Bad,
    }

    impl fmt::Display for Health {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", match *self {
                Health::Good => "GOOD",
                Health::Bad => "BAD",
            })
        }
    }

    pub(crate) fn blank_health() -> State {
        Arc::new(Mutex::new(Health::Bad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn health_starts_bad_then_flips_good() -> anyhow::Result<()> {
        let api = HealthApi::new("127.0.0.1:8890".parse().unwrap());
        let state = api.state();
        let _guard = api.serve();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let r = reqwest::get("http://127.0.0.1:8890/health").await?;
        assert_eq!(r.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        *state.lock() = Health::Good;
        let r = reqwest::get("http://127.0.0.1:8890/health").await?;
        assert_eq!(r.status(), reqwest::StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() -> anyhow::Result<()> {
        let api = HealthApi::new("127.0.0.1:8891".parse().unwrap());
        let _guard = api.serve();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let r = reqwest::get("http://127.0.0.1:8891/metrics").await?;
        assert_eq!(r.status(), reqwest::StatusCode::OK);
        Ok(())
    }
}
