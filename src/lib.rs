//! Relays Kubernetes pod and replicaset inventory to a remote collector
//! over one persistent bidirectional gRPC stream.
//!
//! On every session the relay lists both kinds and replays them as added
//! events, then watches for changes and forwards each one as it happens.
//! Watch subscriptions rotate on a fixed interval without losing their
//! place. Anything fatal tears the whole session down; the supervisor
//! builds a new one and the collector starts from a fresh snapshot.

pub mod config;
pub mod error;
pub mod k8s;
pub mod relay;
pub mod session;
pub mod synthetic;

/// Types generated from the collector protocol definition.
pub mod collector {
    include!(concat!(env!("OUT_DIR"), "/collector.rs"));
}
