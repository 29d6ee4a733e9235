//! Collector transport. Each session opens exactly one bidirectional
//! stream: events flow out through an [`EventSink`], and the single
//! [`PeerListener`] watches the inbound half, where any activity at all
//! means the collector wants the session torn down and rebuilt.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Endpoint;
use tracing::debug;

use crate::collector::Info;
use crate::collector::collector_client::CollectorClient;
use crate::error::{Error, Result};

/// Events buffered between the session and the wire. Small on purpose:
/// a stalled collector should push back on the watch loop, not queue.
const SEND_BUFFER: usize = 32;

/// What the inbound half of the stream reported. At most one signal is
/// ever produced per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignal {
    /// The collector sent a message. Content is irrelevant; any inbound
    /// message is an instruction to start the session over.
    Reset,
    /// The collector closed its half of the stream.
    Closed,
    /// The inbound half failed.
    Failed(String),
}

impl PeerSignal {
    /// The session-fatal error this signal stands for.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::Reset => Error::PeerReset("reset requested".to_owned()),
            Self::Closed => Error::PeerReset("stream closed by collector".to_owned()),
            Self::Failed(detail) => Error::PeerReset(detail),
        }
    }
}

/// Outbound half of a collector session.
#[async_trait]
pub trait EventSink: Send {
    /// Hands one event to the transport.
    ///
    /// # Errors
    ///
    /// Failure means the outbound half is gone and the session cannot
    /// continue.
    async fn send(&mut self, info: Info) -> Result<()>;
}

/// Sends events into the open collector stream.
pub struct CollectorSink {
    tx: mpsc::Sender<Info>,
}

#[async_trait]
impl EventSink for CollectorSink {
    async fn send(&mut self, info: Info) -> Result<()> {
        self.tx
            .send(info)
            .await
            .map_err(|_| Error::Transport("collector stream is gone".to_owned()))
    }
}

/// Waits for the one signal the inbound half will ever produce.
pub struct PeerListener {
    rx: mpsc::Receiver<PeerSignal>,
}

impl PeerListener {
    /// Wraps a signal channel. [`connect`] builds one wired to the live
    /// stream; anything else feeding the channel works the same way.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<PeerSignal>) -> Self {
        Self { rx }
    }

    /// Resolves when the collector speaks, closes, or the stream fails.
    pub async fn signal(&mut self) -> PeerSignal {
        self.rx.recv().await.unwrap_or(PeerSignal::Closed)
    }
}

/// Dials the collector and opens the one stream a session lives on.
///
/// # Errors
///
/// Returns `Error::Transport` when the dial or the stream-open handshake
/// fails.
pub async fn connect(address: &str) -> Result<(CollectorSink, PeerListener)> {
    let endpoint = Endpoint::try_from(format!("http://{address}"))
        .map_err(|e| Error::Transport(e.to_string()))?;
    let channel = endpoint
        .connect()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    let mut client = CollectorClient::new(channel);

    let (event_tx, event_rx) = mpsc::channel(SEND_BUFFER);
    let mut replies = client
        .collect(ReceiverStream::new(event_rx))
        .await
        .map_err(|status| Error::Transport(status.to_string()))?
        .into_inner();

    let (signal_tx, signal_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let signal = match replies.message().await {
            Ok(Some(_)) => PeerSignal::Reset,
            Ok(None) => PeerSignal::Closed,
            Err(status) => PeerSignal::Failed(status.to_string()),
        };
        let _ = signal_tx.send(signal).await;
    });

    debug!("📡 Collector stream open to {address}");
    Ok((CollectorSink { tx: event_tx }, PeerListener::new(signal_rx)))
}
