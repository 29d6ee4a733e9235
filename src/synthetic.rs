//! Deterministic inventory source for running the relay without a
//! cluster. Each generation group adds a replicaset, adds and deletes a
//! pod it owns, then adds an orphan pod; the groups repeat forever.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tokio::time::sleep;

use crate::error::Result;
use crate::k8s::source::{
    InventorySource, Listing, RawChange, RawEvent, RawEventStream, RawObject, ResourceKind,
};

/// Spacing between the events of one group.
const SLOT_MS: u64 = 100;
/// Spacing between group starts.
const GROUP_MS: u64 = 800;
const GROUP_LEN: u64 = 4;

/// Synthetic cursors are global sequence numbers, so a rebuilt watch
/// resumes generation exactly where the previous one stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSource;

impl SyntheticSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InventorySource for SyntheticSource {
    async fn list(&self, _kind: ResourceKind) -> Result<Listing> {
        // Nothing pre-exists; the story starts at sequence 1.
        Ok(Listing {
            objects: Vec::new(),
            cursor: "0".to_owned(),
        })
    }

    async fn watch(&self, kind: ResourceKind, cursor: &str) -> Result<RawEventStream> {
        // Cursors on this source are always our own sequence numbers;
        // anything else restarts generation from the top.
        let last = cursor.parse().unwrap_or(0);
        Ok(event_stream(kind, last))
    }
}

fn event_stream(kind: ResourceKind, last: u64) -> RawEventStream {
    Box::pin(stream::unfold(
        (last, offset_ms(last)),
        move |(last, last_offset)| async move {
            let seq = next_seq(kind, last);
            let offset = offset_ms(seq);
            sleep(Duration::from_millis(offset - last_offset)).await;
            Some((Ok(event_at(seq)), (seq, offset)))
        },
    ))
}

/// The next sequence number after `last` carried on `kind`'s stream.
fn next_seq(kind: ResourceKind, last: u64) -> u64 {
    let mut seq = last + 1;
    while kind_of(seq) != kind {
        seq += 1;
    }
    seq
}

/// Slot 0 of every group is the replicaset event; the rest are pods.
const fn kind_of(seq: u64) -> ResourceKind {
    if (seq - 1) % GROUP_LEN == 0 {
        ResourceKind::ReplicaSet
    } else {
        ResourceKind::Pod
    }
}

/// Milliseconds from generation start to the emission of `seq`.
const fn offset_ms(seq: u64) -> u64 {
    if seq == 0 {
        return 0;
    }
    let index = seq - 1;
    (index / GROUP_LEN) * GROUP_MS + (index % GROUP_LEN) * SLOT_MS
}

fn event_at(seq: u64) -> RawEvent {
    let group = (seq - 1) / GROUP_LEN;
    match (seq - 1) % GROUP_LEN {
        0 => RawEvent::Change(
            RawChange::Added,
            RawObject::ReplicaSet(Box::new(replica_set(group, seq))),
        ),
        1 => RawEvent::Change(RawChange::Added, RawObject::Pod(Box::new(owned_pod(group, seq)))),
        2 => RawEvent::Change(
            RawChange::Deleted,
            RawObject::Pod(Box::new(owned_pod(group, seq))),
        ),
        _ => RawEvent::Change(RawChange::Added, RawObject::Pod(Box::new(orphan_pod(group, seq)))),
    }
}

fn replica_set(group: u64, seq: u64) -> ReplicaSet {
    ReplicaSet {
        metadata: ObjectMeta {
            uid: Some(format!("RS-UID-{group}")),
            resource_version: Some(seq.to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_owned(),
                kind: "Deployment".to_owned(),
                uid: format!("RS-OWNER-UID-{group}"),
                name: format!("RS-OWNER-Name-{group}"),
                controller: Some(true),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        },
        ..ReplicaSet::default()
    }
}

fn owned_pod(group: u64, seq: u64) -> Pod {
    Pod {
        metadata: ObjectMeta {
            uid: Some(format!("POD-UID-{group}")),
            name: Some(format!("POD-N-{group}")),
            namespace: Some(format!("POD-NS-{group}")),
            resource_version: Some(seq.to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_owned(),
                kind: "ReplicaSet".to_owned(),
                uid: format!("RS-UID-{group}"),
                name: format!("RSS-OWNER-Name-{group}"),
                controller: Some(true),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        },
        status: Some(PodStatus {
            pod_ip: Some("192.168.1.1".to_owned()),
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}

fn orphan_pod(group: u64, seq: u64) -> Pod {
    Pod {
        metadata: ObjectMeta {
            uid: Some(format!("POD-UID-NO-OWNER{group}")),
            name: Some(format!("POD-NO-NAME-{group}")),
            namespace: Some(format!("POD-NS-NO-{group}")),
            resource_version: Some(seq.to_string()),
            ..ObjectMeta::default()
        },
        status: Some(PodStatus {
            pod_ip: Some("192.168.1.1".to_owned()),
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}
