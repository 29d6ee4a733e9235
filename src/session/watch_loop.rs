//! The live half of a session. Two watch subscriptions, the peer
//! listener, the rotation timer, and the shutdown token are multiplexed
//! on one task; every iteration handles exactly one of them. Rotation
//! rebuilds the subscriptions from the current cursors and nothing else;
//! shutdown ends the loop cleanly; every other way a cycle ends kills
//! the session.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::k8s::source::{InventorySource, RawEvent, RawEventStream, ResourceKind};
use crate::k8s::translate::translate;
use crate::relay::{EventSink, PeerListener};
use crate::session::{Cursors, ROTATION_INTERVAL, log_change};

/// Relays live changes until shutdown is requested or something fatal
/// happens.
///
/// # Errors
///
/// Everything except rotation and shutdown is fatal: a watch stream
/// failing, closing early, or delivering something untranslatable, a
/// rejected send, or any signal from the collector.
pub async fn run(
    source: &dyn InventorySource,
    sink: &mut dyn EventSink,
    listener: &mut PeerListener,
    cancel: &CancellationToken,
    mut cursors: Cursors,
) -> Result<()> {
    loop {
        // A hung open must not outlive a shutdown request either.
        let cycle = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            cycle = WatchCycle::open(source, &cursors) => cycle?,
        };
        match run_cycle(cycle, sink, listener, cancel, &mut cursors).await? {
            CycleEnd::Rotate => debug!("🔄 Rotating watch subscriptions"),
            CycleEnd::Shutdown => return Ok(()),
        }
    }
}

/// The pair of subscriptions one rotation interval lives on. Dropping
/// the cycle closes both.
struct WatchCycle {
    pods: RawEventStream,
    replica_sets: RawEventStream,
}

impl WatchCycle {
    async fn open(source: &dyn InventorySource, cursors: &Cursors) -> Result<Self> {
        let pods = source
            .watch(ResourceKind::Pod, cursors.get(ResourceKind::Pod))
            .await?;
        let replica_sets = source
            .watch(ResourceKind::ReplicaSet, cursors.get(ResourceKind::ReplicaSet))
            .await?;
        Ok(Self { pods, replica_sets })
    }
}

enum CycleEnd {
    /// The rotation timer fired; rebuild the cycle from the current
    /// cursors.
    Rotate,
    /// Shutdown was requested; end the session cleanly.
    Shutdown,
}

async fn run_cycle(
    mut cycle: WatchCycle,
    sink: &mut dyn EventSink,
    listener: &mut PeerListener,
    cancel: &CancellationToken,
    cursors: &mut Cursors,
) -> Result<CycleEnd> {
    let rotation = tokio::time::sleep(ROTATION_INTERVAL);
    tokio::pin!(rotation);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(CycleEnd::Shutdown),
            () = &mut rotation => return Ok(CycleEnd::Rotate),
            signal = listener.signal() => {
                debug!("🛑 Collector signalled: {signal:?}");
                return Err(signal.into_error());
            }
            event = cycle.pods.next() => {
                relay_one(sink, cursors, ResourceKind::Pod, event).await?;
            }
            event = cycle.replica_sets.next() => {
                relay_one(sink, cursors, ResourceKind::ReplicaSet, event).await?;
            }
        }
    }
}

async fn relay_one(
    sink: &mut dyn EventSink,
    cursors: &mut Cursors,
    kind: ResourceKind,
    event: Option<Result<RawEvent>>,
) -> Result<()> {
    let event = event.ok_or(Error::WatchClosed { kind })??;
    let version = event.resource_version().map(ToOwned::to_owned);
    let info = translate(kind, event)?;
    log_change(kind, &info);
    sink.send(info).await?;
    if let Some(version) = version {
        cursors.advance(kind, &version);
    }
    Ok(())
}
