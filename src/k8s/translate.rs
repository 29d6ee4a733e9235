//! Pure mapping from watch notifications to collector wire events. No
//! state, no I/O - everything the collector learns about an object is
//! decided here.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::collector::{ContainerInfo, Info, OwnerInfo, PodInfo, ReplicaSetInfo, info};
use crate::error::{Error, Result};
use crate::k8s::source::{RawChange, RawEvent, RawObject, ResourceKind};

/// Maps one watch notification to the wire event relayed to the collector.
///
/// `expected` is the kind of the watch the notification arrived on. A
/// payload of any other kind - including the status payload of an
/// error-type notification - means the notification was corrupted or
/// misrouted, and the session has to go down.
///
/// # Errors
///
/// Returns `Error::UnrecognizedChange` for notification kinds this relay
/// does not track, and `Error::MalformedEvent` when the payload is not an
/// object of the `expected` kind.
pub fn translate(expected: ResourceKind, event: RawEvent) -> Result<Info> {
    match event {
        RawEvent::Change(change, object) => {
            let event = wire_event(change);
            match (expected, object) {
                (ResourceKind::Pod, RawObject::Pod(pod)) => Ok(Info {
                    kind: info::Kind::Pod as i32,
                    event: event as i32,
                    pod_info: Some(pod_info(&pod)),
                    rs_info: None,
                }),
                (ResourceKind::ReplicaSet, RawObject::ReplicaSet(rs)) => Ok(Info {
                    kind: info::Kind::ReplicaSet as i32,
                    event: event as i32,
                    pod_info: None,
                    rs_info: Some(rs_info(&rs)),
                }),
                (expected, _) => Err(Error::MalformedEvent { expected }),
            }
        }
        RawEvent::Unrecognized(kind) => Err(Error::UnrecognizedChange(kind)),
    }
}

const fn wire_event(change: RawChange) -> info::Event {
    match change {
        RawChange::Added => info::Event::Added,
        RawChange::Modified => info::Event::Modified,
        RawChange::Deleted => info::Event::Deleted,
        RawChange::Error => info::Event::Error,
    }
}

/// Everything the collector tracks about one pod.
fn pod_info(pod: &Pod) -> PodInfo {
    PodInfo {
        uid: pod.metadata.uid.clone().unwrap_or_default(),
        ip: pod
            .status
            .as_ref()
            .and_then(|status| status.pod_ip.clone())
            .unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        owner: controller_owner(&pod.metadata),
        ns: pod.metadata.namespace.clone().unwrap_or_default(),
        version: version_fingerprint(pod),
        is_host_network: pod
            .spec
            .as_ref()
            .and_then(|spec| spec.host_network)
            .unwrap_or_default(),
        container_infos: containers(pod),
    }
}

fn rs_info(rs: &ReplicaSet) -> ReplicaSetInfo {
    ReplicaSetInfo {
        uid: rs.metadata.uid.clone().unwrap_or_default(),
        owner: controller_owner(&rs.metadata),
    }
}

/// The first owner reference flagged as the controller, if any. At most
/// one owner is ever reported, even when the platform lists several
/// references.
fn controller_owner(meta: &ObjectMeta) -> Option<OwnerInfo> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|reference| reference.controller == Some(true))
        .map(|reference| OwnerInfo {
            uid: reference.uid.clone(),
            name: reference.name.clone(),
            kind: reference.kind.clone(),
        })
}

/// Image-set fingerprint: the sorted, quoted, comma-joined image
/// references, so two pods running the same images in a different
/// container order compare equal.
fn version_fingerprint(pod: &Pod) -> String {
    let mut images: Vec<String> = container_statuses(pod)
        .iter()
        .map(|container| format!("'{}'", container.image))
        .collect();
    images.sort();
    images.join(",")
}

/// Container identity rows, verbatim in the order the platform reported.
fn containers(pod: &Pod) -> Vec<ContainerInfo> {
    container_statuses(pod)
        .iter()
        .map(|container| ContainerInfo {
            id: container.container_id.clone().unwrap_or_default(),
            name: container.name.clone(),
            image: container.image.clone(),
        })
        .collect()
}

fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default()
}
