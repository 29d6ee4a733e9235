//! One collector session: relay the full inventory, then relay live
//! changes until shutdown or something fatal. A session dying is
//! routine; the [`supervisor`] replaces it forever.

pub mod bootstrap;
pub mod supervisor;
pub mod watch_loop;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collector::{Info, info};
use crate::error::Result;
use crate::k8s::source::{InventorySource, ResourceKind};
use crate::relay::{EventSink, PeerListener};

/// How long one watch cycle runs before its subscriptions are rebuilt.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(300);

/// Pause between a dead session and the next attempt.
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Per-kind resumption cursors. A cursor moves only after the event that
/// carried it was accepted by the sink, so a rebuilt watch never skips a
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursors {
    pub pod: String,
    pub replica_set: String,
}

impl Cursors {
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Pod => &self.pod,
            ResourceKind::ReplicaSet => &self.replica_set,
        }
    }

    pub fn advance(&mut self, kind: ResourceKind, version: &str) {
        match kind {
            ResourceKind::Pod => version.clone_into(&mut self.pod),
            ResourceKind::ReplicaSet => version.clone_into(&mut self.replica_set),
        }
    }
}

/// Everything one session owns: the inventory backend, the outbound
/// sink, and the inbound peer listener.
pub struct Session<'a> {
    source: &'a dyn InventorySource,
    sink: Box<dyn EventSink>,
    listener: PeerListener,
}

impl<'a> Session<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn InventorySource,
        sink: Box<dyn EventSink>,
        listener: PeerListener,
    ) -> Self {
        Self {
            source,
            sink,
            listener,
        }
    }

    /// Relays the startup snapshot and returns the cursors the watches
    /// pick up from.
    ///
    /// # Errors
    ///
    /// Any list or relay failure ends the session.
    pub async fn bootstrap(&mut self) -> Result<Cursors> {
        bootstrap::run(self.source, self.sink.as_mut()).await
    }

    /// Relays live changes until shutdown is requested. Rotation
    /// rebuilds the watches in place; everything else that ends a cycle
    /// is fatal.
    ///
    /// # Errors
    ///
    /// Any stream, translation, relay, or peer failure ends the session.
    pub async fn watch(mut self, cursors: Cursors, cancel: CancellationToken) -> Result<()> {
        watch_loop::run(
            self.source,
            self.sink.as_mut(),
            &mut self.listener,
            &cancel,
            cursors,
        )
        .await
    }
}

/// One debug line per outbound wire event, keyed by change kind. The
/// snapshot and the live watch both route their sends through this.
pub(crate) fn log_change(kind: ResourceKind, info: &Info) {
    match info.event() {
        info::Event::Added => debug!("➕ {kind} added: {info:?}"),
        info::Event::Modified => debug!("📝 {kind} modified: {info:?}"),
        info::Event::Deleted => debug!("🗑️  {kind} deleted: {info:?}"),
        info::Event::Error => debug!("❌ {kind} error: {info:?}"),
    }
}
