//! Idempotent exchange/queue/binding declaration.
//!
//! Declared fresh on every connection (declaration is idempotent by
//! construction in AMQP): two topic exchanges (`rpc`, `notify`), one
//! auto-delete non-durable queue per node, with the static bindings
//! from the spec's data model plus the transient `rpc <-> site_key`
//! binding the VRRP state machine adds and removes.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};

use crate::error::RpcError;

/// Exchange name carrying task RPCs.
pub const RPC_EXCHANGE: &str = "rpc";
/// Exchange name carrying VRRP/broadcast notifications.
pub const NOTIFY_EXCHANGE: &str = "notify";

/// Static routing identity of this node within the broker topology.
#[derive(Debug, Clone)]
pub struct Topology {
    /// this node's own routing key
    pub node_key: String,
    /// the site-wide broadcast routing key
    pub site_key: String,
}

impl Topology {
    /// the per-node queue name, derived from the node key
    pub fn node_queue(&self) -> String {
        format!("hades.{}", self.node_key)
    }

    /// Declare both exchanges, this node's queue, and every binding
    /// except the transient `rpc <-> site_key` one (owned by
    /// [`crate::VrrpBinding`]).
    pub async fn declare(&self, channel: &Channel) -> Result<(), RpcError> {
        channel
            .exchange_declare(
                RPC_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .exchange_declare(
                NOTIFY_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let queue = self.node_queue();
        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: false,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &queue,
                RPC_EXCHANGE,
                &self.node_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        for routing_key in [self.node_key.as_str(), self.site_key.as_str(), ""] {
            channel
                .queue_bind(
                    &queue,
                    NOTIFY_EXCHANGE,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(())
    }

    /// Add the transient `rpc <-> site_key` binding (entered `MASTER`).
    pub async fn bind_site_key(&self, channel: &Channel) -> Result<(), RpcError> {
        channel
            .queue_bind(
                &self.node_queue(),
                RPC_EXCHANGE,
                &self.site_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Remove the transient `rpc <-> site_key` binding (left `MASTER`).
    pub async fn unbind_site_key(&self, channel: &Channel) -> Result<(), RpcError> {
        channel
            .queue_unbind(
                &self.node_queue(),
                RPC_EXCHANGE,
                &self.site_key,
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}
