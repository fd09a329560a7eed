//! Broker connection, consumer loop, and reconnect-with-backoff.

use std::sync::Arc;
use std::time::Duration;

use envelope_codec::{EnvelopeCodec, Payload};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::RpcError;
use crate::registry::TaskRegistry;
use crate::topology::Topology;
use crate::vrrp::VrrpBinding;

/// Maximum reconnect backoff, regardless of attempt count.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A connected RPC transport: owns the broker connection, this node's
/// topology, task registry, and VRRP binding state.
#[derive(Debug)]
pub struct RpcTransport {
    broker_url: String,
    topology: Topology,
    registry: TaskRegistry,
    envelope: Arc<EnvelopeCodec>,
    accept: Vec<&'static str>,
}

impl RpcTransport {
    /// Build a transport. Connection happens lazily in [`Self::run`].
    pub fn new(
        broker_url: impl Into<String>,
        topology: Topology,
        registry: TaskRegistry,
        envelope: Arc<EnvelopeCodec>,
        accept: Vec<&'static str>,
    ) -> Self {
        Self {
            broker_url: broker_url.into(),
            topology,
            registry,
            envelope,
            accept,
        }
    }

    /// Run the connect/consume loop until `shutdown` is cancelled.
    /// Connection loss triggers reconnect with exponential backoff
    /// capped at [`MAX_BACKOFF`]; `vrrp` (if this node is `MASTER`)
    /// re-asserts its site-key binding on every successful reconnect.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        vrrp: Arc<tokio::sync::Mutex<VrrpBinding>>,
    ) -> Result<(), RpcError> {
        let mut backoff = Duration::from_millis(200);

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self.connect_and_consume(&shutdown, &vrrp).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "rpc transport connection lost, reconnecting");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_consume(
        &self,
        shutdown: &CancellationToken,
        vrrp: &Arc<tokio::sync::Mutex<VrrpBinding>>,
    ) -> Result<(), RpcError> {
        let connection =
            Connection::connect(&self.broker_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;

        self.topology.declare(&channel).await?;
        vrrp.lock().await.reassert(&channel).await?;

        let mut consumer = channel
            .basic_consume(
                &self.topology.node_queue(),
                "hades-rpc-transport",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.topology.node_queue(), "rpc transport consuming");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                delivery = consumer.next() => {
                    let Some(delivery) = delivery else { return Ok(()) };
                    let delivery = delivery?;
                    match self.dispatch(&delivery.data, &channel, vrrp).await {
                        Ok(()) => {
                            delivery.ack(BasicAckOptions::default()).await?;
                        }
                        Err(e) => {
                            let requeue = !matches!(
                                e,
                                RpcError::Envelope(
                                    envelope_codec::EnvelopeError::BadSignature
                                        | envelope_codec::EnvelopeError::UnknownSigner(_)
                                )
                            );
                            if requeue {
                                warn!(error = %e, "task handler failed, nacking for redelivery");
                            } else {
                                warn!(error = %e, "signature/signer failure, nacking and dropping");
                            }
                            delivery
                                .nack(BasicNackOptions {
                                    requeue,
                                    ..Default::default()
                                })
                                .await?;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one decoded envelope. The `vrrp_notify` task is handled
    /// inline rather than through the registry, because reacting to it
    /// requires the live broker channel ([`VrrpBinding::on_notification`]
    /// adds/removes a queue binding) that a plain [`crate::TaskHandler`]
    /// is never given.
    async fn dispatch(
        &self,
        body: &[u8],
        channel: &lapin::Channel,
        vrrp: &Arc<tokio::sync::Mutex<VrrpBinding>>,
    ) -> Result<(), RpcError> {
        let payload = self.envelope.deserialize(body, &self.accept).map_err(|e| {
            if matches!(
                e,
                envelope_codec::EnvelopeError::BadSignature
                    | envelope_codec::EnvelopeError::UnknownSigner(_)
            ) {
                hades_core::metrics::RPC_SIGNATURE_FAILURES.inc();
            }
            e
        })?;
        let task_name = match &payload {
            Payload::Json(value) => value
                .get("task")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned(),
            Payload::Raw(_) => String::new(),
        };

        if task_name == "vrrp_notify" {
            let Payload::Json(value) = &payload else {
                return Err(RpcError::UnknownTask(task_name));
            };
            let notification = crate::vrrp::VrrpNotification::from_json(value)
                .ok_or_else(|| RpcError::UnknownTask(task_name.clone()))?;
            vrrp.lock()
                .await
                .on_notification(channel, &notification)
                .await?;
            return Ok(());
        }

        let handler = self
            .registry
            .get(&task_name)
            .ok_or_else(|| RpcError::UnknownTask(task_name.clone()))?;
        handler.handle(payload).await.map_err(RpcError::Handler)
    }
}
