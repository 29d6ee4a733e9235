//! Keeps one session alive at a time, forever. A session dying is
//! routine; only a shutdown request stops the relay.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::k8s::source::InventorySource;
use crate::relay;
use crate::session::{RETRY_DELAY, Session};

/// Lifecycle of one session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dialing the collector and opening the stream.
    Connecting,
    /// Relaying the startup snapshot.
    Bootstrapping,
    /// Relaying live changes.
    Watching,
    /// Waiting out the pause after a dead session.
    Backoff,
}

pub struct Supervisor {
    config: Config,
    source: Box<dyn InventorySource>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: Config, source: Box<dyn InventorySource>) -> Self {
        Self { config, source }
    }

    /// Runs sessions until shutdown is requested. A dead session is
    /// logged, waited out, and replaced; a session that observed the
    /// shutdown request ends the relay.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("🚀 Relaying to {}", self.config.collector_addr);
        loop {
            match self.session(&cancel).await {
                Ok(()) => break,
                Err(error) => debug!("❌ Session ended: {error}"),
            }
            self.enter(Phase::Backoff);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }
        info!("🛑 Shutdown requested, stopping relay");
    }

    /// One full session: connect, bootstrap, then watch. Returns `Ok`
    /// only when shutdown was requested; every other exit is the error
    /// that killed the session.
    async fn session(&self, cancel: &CancellationToken) -> Result<()> {
        self.enter(Phase::Connecting);
        let (sink, listener) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            pair = relay::connect(&self.config.collector_addr) => pair?,
        };
        let mut session = Session::new(self.source.as_ref(), Box::new(sink), listener);

        self.enter(Phase::Bootstrapping);
        let cursors = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            cursors = session.bootstrap() => cursors?,
        };

        self.enter(Phase::Watching);
        session.watch(cursors, cancel.clone()).await
    }

    fn enter(&self, phase: Phase) {
        debug!("🔄 Session phase: {phase:?}");
    }
}
