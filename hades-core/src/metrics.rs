#![allow(missing_docs)] // proc macros dont play nicely with docstrings

//! # metrics
//!
//! Prometheus counters shared across the hades binaries, mirroring the
//! upstream DHCP engine's own `dora_core::metrics` module: a handful of
//! `lazy_static` registered counters, one per subsystem named in the
//! ambient-stack section of the spec (protocol errors, lease store
//! operations, deputy refresh outcomes, RPC signature failures, VRRP
//! binding transitions).

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};
use prometheus_static_metric::make_static_metric;

make_static_metric! {
    pub label_enum LeaseOp {
        add,
        update,
        delete,
        init,
    }
    pub struct LeaseStoreOps: IntCounter {
        "op" => LeaseOp
    }

    pub label_enum RefreshArtifact {
        dhcp_hosts,
        radius_clients,
        alternative_dns,
    }
    pub struct DeputyRefreshes: IntCounter {
        "artifact" => RefreshArtifact
    }

    pub label_enum VrrpTransition {
        to_master,
        from_master,
        reassert,
    }
    pub struct VrrpBindingTransitions: IntCounter {
        "transition" => VrrpTransition
    }
}

lazy_static! {
    /// lease-script frames rejected by `frame-codec` or the dispatch
    /// layer, labeled by [`ProtocolError`](frame_codec::ProtocolError)
    /// variant name.
    pub static ref PROTOCOL_ERRORS: IntCounterVec = register_int_counter_vec!(
        "hades_protocol_errors_total",
        "lease-script frames rejected, by error kind",
        &["kind"]
    )
    .unwrap();

    /// lease store operations performed, by kind.
    pub static ref LEASE_STORE_OPS_VEC: IntCounterVec = register_int_counter_vec!(
        "hades_lease_store_ops_total",
        "lease store operations performed",
        &["op"]
    )
    .unwrap();
    pub static ref LEASE_STORE_OPS: LeaseStoreOps = LeaseStoreOps::from(&LEASE_STORE_OPS_VEC);

    /// Deputy refresh outcomes, by generated artifact.
    pub static ref DEPUTY_REFRESHES_VEC: IntCounterVec = register_int_counter_vec!(
        "hades_deputy_refreshes_total",
        "deputy refresh cycles that regenerated an artifact",
        &["artifact"]
    )
    .unwrap();
    pub static ref DEPUTY_REFRESHES: DeputyRefreshes = DeputyRefreshes::from(&DEPUTY_REFRESHES_VEC);

    /// envelope signature/unknown-signer rejections.
    pub static ref RPC_SIGNATURE_FAILURES: IntCounter = register_int_counter!(
        "hades_rpc_signature_failures_total",
        "RPC envelopes rejected for a bad signature or unknown signer"
    )
    .unwrap();

    /// VRRP-driven binding state transitions, by kind.
    pub static ref VRRP_BINDING_TRANSITIONS_VEC: IntCounterVec = register_int_counter_vec!(
        "hades_vrrp_binding_transitions_total",
        "VRRP-driven rpc<->site_key binding transitions",
        &["transition"]
    )
    .unwrap();
    pub static ref VRRP_BINDING_TRANSITIONS: VrrpBindingTransitions =
        VrrpBindingTransitions::from(&VRRP_BINDING_TRANSITIONS_VEC);
}
