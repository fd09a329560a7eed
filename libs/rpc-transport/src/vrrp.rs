//! VRRP-driven binding state machine (spec §4.6, scenario 5).
//!
//! Only notifications naming this transport's *watched* VRRP instance
//! drive binding changes; notifications for other instances are
//! observed (logged) but otherwise ignored, matching "other instances
//! (auth, unauth) are observed but do not mutate bindings in this
//! core."

use lapin::Channel;
use tracing::{debug, info, warn};

use hades_core::metrics::VRRP_BINDING_TRANSITIONS;

use crate::error::RpcError;
use crate::topology::Topology;

/// Local VRRP instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrrpState {
    /// not currently passing traffic
    Backup,
    /// currently elected, owns the virtual IP
    Master,
    /// keepalived reported a fault condition
    Fault,
}

impl VrrpState {
    /// Parse keepalived's own state names (`"MASTER"`, `"BACKUP"`, `"FAULT"`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "MASTER" => Some(VrrpState::Master),
            "BACKUP" => Some(VrrpState::Backup),
            "FAULT" => Some(VrrpState::Fault),
            _ => None,
        }
    }
}

/// A VRRP notification as keepalived's notify script would deliver it.
#[derive(Debug, Clone)]
pub struct VrrpNotification {
    /// the kind of VRRP instance (`"instance"` vs `"sync_group"`)
    pub kind: String,
    /// the VRRP instance name
    pub name: String,
    /// the new state
    pub state: VrrpState,
    /// keepalived priority at the time of transition
    pub priority: u8,
}

impl VrrpNotification {
    /// Parse a notification out of the JSON payload a `vrrp_notify` task
    /// message carries: `{"type", "name", "state", "priority"}`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Some(Self {
            kind: value.get("type")?.as_str()?.to_owned(),
            name: value.get("name")?.as_str()?.to_owned(),
            state: VrrpState::parse(value.get("state")?.as_str()?)?,
            priority: value.get("priority")?.as_u64()?.try_into().ok()?,
        })
    }
}

/// Tracks local VRRP state for one watched instance and keeps the
/// `rpc <-> site_key` binding in sync with it. The callback
/// ([`VrrpBinding::on_notification`]) is idempotent: repeating the same
/// transition, or re-asserting `MASTER` after a broker reconnect, is
/// always safe.
#[derive(Debug)]
pub struct VrrpBinding {
    watched_instance: String,
    state: VrrpState,
    topology: Topology,
}

impl VrrpBinding {
    /// Start tracking `watched_instance` (e.g. `"hades-radius"`),
    /// assuming `BACKUP` until told otherwise.
    pub fn new(watched_instance: impl Into<String>, topology: Topology) -> Self {
        Self {
            watched_instance: watched_instance.into(),
            state: VrrpState::Backup,
            topology,
        }
    }

    /// current tracked state
    pub fn state(&self) -> VrrpState {
        self.state
    }

    /// Apply a VRRP notification, mutating the broker binding if (and
    /// only if) it concerns the watched instance and changes its
    /// tracked state.
    pub async fn on_notification(
        &mut self,
        channel: &Channel,
        notification: &VrrpNotification,
    ) -> Result<(), RpcError> {
        if notification.name != self.watched_instance {
            debug!(
                instance = %notification.name,
                watched = %self.watched_instance,
                "observed VRRP notification for an unrelated instance"
            );
            return Ok(());
        }

        let previous = self.state;
        self.state = notification.state;

        match (previous, notification.state) {
            (VrrpState::Master, VrrpState::Master) => {
                // no transition; nothing to do
            }
            (_, VrrpState::Master) => {
                info!(instance = %notification.name, "entering MASTER, binding site key");
                self.topology.bind_site_key(channel).await?;
                VRRP_BINDING_TRANSITIONS.to_master.inc();
            }
            (VrrpState::Master, _) => {
                info!(instance = %notification.name, "leaving MASTER, unbinding site key");
                self.topology.unbind_site_key(channel).await?;
                VRRP_BINDING_TRANSITIONS.from_master.inc();
            }
            _ => {}
        }

        if notification.state == VrrpState::Fault {
            warn!(instance = %notification.name, "VRRP instance reported FAULT");
        }

        Ok(())
    }

    /// Re-assert the site-key binding after a broker reconnect, if this
    /// node is currently `MASTER`.
    pub async fn reassert(&self, channel: &Channel) -> Result<(), RpcError> {
        if self.state == VrrpState::Master {
            info!("reconnected while MASTER, re-asserting site key binding");
            self.topology.bind_site_key(channel).await?;
            VRRP_BINDING_TRANSITIONS.reassert.inc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notif(name: &str, state: VrrpState) -> VrrpNotification {
        VrrpNotification {
            kind: "instance".into(),
            name: name.into(),
            state,
            priority: 100,
        }
    }

    #[test]
    fn unrelated_instance_names_do_not_change_state() {
        let topology = Topology {
            node_key: "node1".into(),
            site_key: "site1".into(),
        };
        let binding = VrrpBinding::new("hades-radius", topology);
        assert_eq!(binding.state(), VrrpState::Backup);
        // a notification for a different instance should be ignored by
        // construction -- exercised at the integration level, since
        // `on_notification` needs a live channel to bind/unbind.
        let n = notif("some-other-instance", VrrpState::Master);
        assert_ne!(n.name, "hades-radius");
    }
}
