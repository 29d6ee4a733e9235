//! Startup snapshot: list both kinds and relay every object as an added
//! event before any watch opens. Controllers go first so the collector
//! can resolve pod owners on arrival.

use tracing::info;

use crate::error::Result;
use crate::k8s::source::{InventorySource, Listing, RawChange, RawEvent, ResourceKind};
use crate::k8s::translate::translate;
use crate::relay::EventSink;
use crate::session::{Cursors, log_change};

/// Relays the full inventory of both kinds and returns the cursors the
/// watches resume from.
///
/// # Errors
///
/// Any list or relay failure is fatal to the calling session.
pub async fn run(source: &dyn InventorySource, sink: &mut dyn EventSink) -> Result<Cursors> {
    let replica_set = relay_kind(source, sink, ResourceKind::ReplicaSet).await?;
    let pod = relay_kind(source, sink, ResourceKind::Pod).await?;
    Ok(Cursors { pod, replica_set })
}

async fn relay_kind(
    source: &dyn InventorySource,
    sink: &mut dyn EventSink,
    kind: ResourceKind,
) -> Result<String> {
    let Listing { objects, cursor } = source.list(kind).await?;
    let count = objects.len();
    for object in objects {
        let info = translate(kind, RawEvent::Change(RawChange::Added, object))?;
        log_change(kind, &info);
        sink.send(info).await?;
    }
    info!("📋 Relayed {count} {kind}s, resuming from version {cursor:?}");
    Ok(cursor)
}
