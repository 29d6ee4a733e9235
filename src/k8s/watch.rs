//! Cluster-backed inventory source: a thin adapter over the platform's
//! list and watch endpoints. Interpreting the notifications is left to
//! [`translate`](crate::k8s::translate).

use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::k8s::source::{
    InventorySource, Listing, RawChange, RawEvent, RawEventStream, RawObject, ResourceKind,
};

/// Watches the whole cluster, one API handle per tracked kind.
pub struct KubeSource {
    pods: Api<Pod>,
    replica_sets: Api<ReplicaSet>,
}

impl KubeSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            pods: Api::all(client.clone()),
            replica_sets: Api::all(client),
        }
    }
}

#[async_trait]
impl InventorySource for KubeSource {
    async fn list(&self, kind: ResourceKind) -> Result<Listing> {
        match kind {
            ResourceKind::Pod => list_all(&self.pods, kind, RawObject::Pod).await,
            ResourceKind::ReplicaSet => {
                list_all(&self.replica_sets, kind, RawObject::ReplicaSet).await
            }
        }
    }

    async fn watch(&self, kind: ResourceKind, cursor: &str) -> Result<RawEventStream> {
        match kind {
            ResourceKind::Pod => open_watch(&self.pods, kind, cursor, RawObject::Pod).await,
            ResourceKind::ReplicaSet => {
                open_watch(&self.replica_sets, kind, cursor, RawObject::ReplicaSet).await
            }
        }
    }
}

async fn list_all<K>(
    api: &Api<K>,
    kind: ResourceKind,
    wrap: fn(Box<K>) -> RawObject,
) -> Result<Listing>
where
    K: Clone + DeserializeOwned + fmt::Debug,
{
    let list = api
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::List { kind, source })?;
    let cursor = list.metadata.resource_version.clone().unwrap_or_default();
    debug!("📋 Listed {} {kind}s at version {cursor}", list.items.len());

    let objects = list
        .items
        .into_iter()
        .map(|object| wrap(Box::new(object)))
        .collect();
    Ok(Listing { objects, cursor })
}

async fn open_watch<K>(
    api: &Api<K>,
    kind: ResourceKind,
    cursor: &str,
    wrap: fn(Box<K>) -> RawObject,
) -> Result<RawEventStream>
where
    K: Clone + DeserializeOwned + fmt::Debug + Send + 'static,
{
    // No server-side timeout: rotation bounds the cycle. Bookmarks are
    // not versions this relay resumes from, so keep them off the wire.
    let params = WatchParams::default().disable_bookmarks();
    let stream = api
        .watch(&params, cursor)
        .await
        .map_err(|source| Error::WatchOpen { kind, source })?;
    debug!("🔍 Watching {kind}s from version {cursor}");

    Ok(Box::pin(stream.map(move |item| raw_event(kind, item, wrap))))
}

fn raw_event<K>(
    kind: ResourceKind,
    item: kube::Result<WatchEvent<K>>,
    wrap: fn(Box<K>) -> RawObject,
) -> Result<RawEvent> {
    let event = item.map_err(|source| Error::WatchStream { kind, source })?;
    Ok(match event {
        WatchEvent::Added(object) => RawEvent::Change(RawChange::Added, wrap(Box::new(object))),
        WatchEvent::Modified(object) => {
            RawEvent::Change(RawChange::Modified, wrap(Box::new(object)))
        }
        WatchEvent::Deleted(object) => RawEvent::Change(RawChange::Deleted, wrap(Box::new(object))),
        WatchEvent::Error(status) => {
            RawEvent::Change(RawChange::Error, RawObject::Status(Box::new(status)))
        }
        WatchEvent::Bookmark(_) => RawEvent::Unrecognized("BOOKMARK".to_owned()),
    })
}
