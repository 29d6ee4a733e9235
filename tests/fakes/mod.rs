//! Scripted doubles for the session engine's three seams: the inventory
//! backend, the outbound event sink, and the collector peer. A capturing
//! log writer joins them for assertions on tracing output. Each test
//! crate uses a subset of these.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use podrelay::collector::collector_server::{Collector, CollectorServer};
use podrelay::collector::{Info, Reply};
use podrelay::error::{Error, Result};
use podrelay::k8s::source::{
    InventorySource, Listing, RawChange, RawEvent, RawEventStream, RawObject, ResourceKind,
};
use podrelay::relay::{EventSink, PeerListener, PeerSignal};

/// Inventory backend that plays back exactly the listings and watch feeds
/// a test scripted, in order, and panics on anything it was not told to
/// expect. The panics are the point: a session that lists twice or opens
/// watches out of order fails loudly.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
}

#[derive(Default)]
struct Script {
    listings: HashMap<ResourceKind, VecDeque<Result<Listing>>>,
    feeds: HashMap<ResourceKind, VecDeque<Result<Feed>>>,
    watch_log: Vec<(ResourceKind, String)>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful listing of `kind`.
    pub fn push_listing(&self, kind: ResourceKind, objects: Vec<RawObject>, cursor: &str) {
        self.script
            .lock()
            .unwrap()
            .listings
            .entry(kind)
            .or_default()
            .push_back(Ok(Listing {
                objects,
                cursor: cursor.to_owned(),
            }));
    }

    pub fn fail_listing(&self, kind: ResourceKind, error: Error) {
        self.script
            .lock()
            .unwrap()
            .listings
            .entry(kind)
            .or_default()
            .push_back(Err(error));
    }

    /// Queues the feed the next watch over `kind` delivers.
    pub fn push_feed(&self, kind: ResourceKind, feed: Feed) {
        self.script
            .lock()
            .unwrap()
            .feeds
            .entry(kind)
            .or_default()
            .push_back(Ok(feed));
    }

    pub fn fail_watch_open(&self, kind: ResourceKind, error: Error) {
        self.script
            .lock()
            .unwrap()
            .feeds
            .entry(kind)
            .or_default()
            .push_back(Err(error));
    }

    /// Every watch opened so far, in open order, with the cursor it
    /// started from.
    pub fn watch_log(&self) -> Vec<(ResourceKind, String)> {
        self.script.lock().unwrap().watch_log.clone()
    }
}

#[async_trait]
impl InventorySource for ScriptedSource {
    async fn list(&self, kind: ResourceKind) -> Result<Listing> {
        self.script
            .lock()
            .unwrap()
            .listings
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("unscripted listing of {kind}s"))
    }

    async fn watch(&self, kind: ResourceKind, cursor: &str) -> Result<RawEventStream> {
        let feed = {
            let mut script = self.script.lock().unwrap();
            script.watch_log.push((kind, cursor.to_owned()));
            script
                .feeds
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("unscripted watch over {kind}s"))
        }?;
        if feed.stall_open {
            std::future::pending::<()>().await;
        }
        Ok(feed.into_stream())
    }
}

/// One watch subscription's worth of events, plus how the stream behaves
/// once they run out.
pub struct Feed {
    events: Vec<RawEvent>,
    tail: Tail,
    drop_flag: Option<Arc<AtomicBool>>,
    stall_open: bool,
}

enum Tail {
    /// Stay open without yielding again.
    Pending,
    /// End the stream.
    End,
    /// Fail the stream.
    Fail(Error),
}

impl Feed {
    /// Delivers `events`, then stays open.
    #[must_use]
    pub fn events(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            tail: Tail::Pending,
            drop_flag: None,
            stall_open: false,
        }
    }

    /// Delivers `events`, then ends the stream.
    #[must_use]
    pub fn ending(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            tail: Tail::End,
            drop_flag: None,
            stall_open: false,
        }
    }

    /// Delivers `events`, then fails the stream with `error`.
    #[must_use]
    pub fn failing(events: Vec<RawEvent>, error: Error) -> Self {
        Self {
            events,
            tail: Tail::Fail(error),
            drop_flag: None,
            stall_open: false,
        }
    }

    /// Never finishes opening; the subscription hangs at the open call.
    #[must_use]
    pub fn stalled() -> Self {
        Self {
            events: Vec::new(),
            tail: Tail::Pending,
            drop_flag: None,
            stall_open: true,
        }
    }

    /// Raises `flag` when the subscription is dropped.
    #[must_use]
    pub fn on_drop(mut self, flag: &Arc<AtomicBool>) -> Self {
        self.drop_flag = Some(Arc::clone(flag));
        self
    }

    fn into_stream(self) -> RawEventStream {
        let head = stream::iter(self.events.into_iter().map(Ok));
        let tail: RawEventStream = match self.tail {
            Tail::Pending => Box::pin(stream::pending()),
            Tail::End => Box::pin(stream::empty()),
            Tail::Fail(error) => Box::pin(stream::iter([Err(error)])),
        };
        let inner: RawEventStream = Box::pin(head.chain(tail));
        match self.drop_flag {
            Some(flag) => Box::pin(Flagged {
                inner,
                _guard: SetOnDrop(flag),
            }),
            None => inner,
        }
    }
}

struct Flagged {
    inner: RawEventStream,
    _guard: SetOnDrop,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Stream for Flagged {
    type Item = Result<RawEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Sink that records everything relayed, optionally rejecting sends from
/// the nth one onward.
#[derive(Clone, Default)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<Info>>>,
    fail_at: Arc<Mutex<Option<usize>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything accepted so far, in relay order.
    pub fn sent(&self) -> Vec<Info> {
        self.sent.lock().unwrap().clone()
    }

    /// Rejects the nth send and every one after it, zero-based.
    pub fn fail_from(&self, n: usize) {
        *self.fail_at.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&mut self, info: Info) -> Result<()> {
        let mut sent = self.sent.lock().unwrap();
        if let Some(n) = *self.fail_at.lock().unwrap() {
            if sent.len() >= n {
                return Err(Error::Transport("scripted send failure".to_owned()));
            }
        }
        sent.push(info);
        Ok(())
    }
}

/// Hand-fed peer channel. The sender injects signals; the listener is
/// what a session consumes.
pub fn peer_channel() -> (mpsc::Sender<PeerSignal>, PeerListener) {
    let (tx, rx) = mpsc::channel(1);
    (tx, PeerListener::new(rx))
}

pub fn pod_object(uid: &str, version: &str) -> RawObject {
    RawObject::Pod(Box::new(Pod {
        metadata: ObjectMeta {
            uid: Some(uid.to_owned()),
            name: Some(format!("{uid}-name")),
            namespace: Some("default".to_owned()),
            resource_version: Some(version.to_owned()),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }))
}

/// Pod payload with no resumption cursor in its metadata.
pub fn unversioned_pod(uid: &str) -> RawObject {
    RawObject::Pod(Box::new(Pod {
        metadata: ObjectMeta {
            uid: Some(uid.to_owned()),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }))
}

pub fn rs_object(uid: &str, version: &str) -> RawObject {
    RawObject::ReplicaSet(Box::new(ReplicaSet {
        metadata: ObjectMeta {
            uid: Some(uid.to_owned()),
            resource_version: Some(version.to_owned()),
            ..ObjectMeta::default()
        },
        ..ReplicaSet::default()
    }))
}

pub fn status_object(code: u16, message: &str) -> RawObject {
    RawObject::Status(Box::new(ErrorResponse {
        status: "Failure".to_owned(),
        message: message.to_owned(),
        reason: "Expired".to_owned(),
        code,
    }))
}

pub fn api_error(code: u16, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: message.to_owned(),
        reason: "Expired".to_owned(),
        code,
    })
}

pub fn added(object: RawObject) -> RawEvent {
    RawEvent::Change(RawChange::Added, object)
}

pub fn modified(object: RawObject) -> RawEvent {
    RawEvent::Change(RawChange::Modified, object)
}

pub fn deleted(object: RawObject) -> RawEvent {
    RawEvent::Change(RawChange::Deleted, object)
}

/// In-process collector service. Records every event it receives, and can
/// be scripted to write a reply or hang up its half once the running
/// total reaches a count.
#[derive(Clone, Default)]
pub struct TestCollector {
    seen: Arc<Mutex<Vec<Info>>>,
    sessions: Arc<AtomicUsize>,
    reset_after: Option<usize>,
    close_after: Option<usize>,
}

impl TestCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one reply once `n` events have been accepted in total.
    #[must_use]
    pub fn resetting_after(n: usize) -> Self {
        Self {
            reset_after: Some(n),
            ..Self::default()
        }
    }

    /// Closes the reply stream once `n` events have been accepted in
    /// total.
    #[must_use]
    pub fn closing_after(n: usize) -> Self {
        Self {
            close_after: Some(n),
            ..Self::default()
        }
    }

    /// Everything accepted so far, across every session.
    pub fn seen(&self) -> Vec<Info> {
        self.seen.lock().unwrap().clone()
    }

    /// How many times the relay has opened a stream.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl Collector for TestCollector {
    type CollectStream = ReceiverStream<std::result::Result<Reply, Status>>;

    async fn collect(
        &self,
        request: Request<Streaming<Info>>,
    ) -> std::result::Result<Response<Self::CollectStream>, Status> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let mut events = request.into_inner();
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let seen = Arc::clone(&self.seen);
        let reset_after = self.reset_after;
        let close_after = self.close_after;
        tokio::spawn(async move {
            while let Ok(Some(info)) = events.message().await {
                let count = {
                    let mut seen = seen.lock().unwrap();
                    seen.push(info);
                    seen.len()
                };
                if Some(count) == reset_after {
                    let _ = reply_tx.send(Ok(Reply::default())).await;
                }
                if Some(count) == close_after {
                    return;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(reply_rx)))
    }
}

/// Serves `collector` on an ephemeral loopback port in the background and
/// returns the address to dial.
pub async fn spawn_collector(collector: TestCollector) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        Server::builder()
            .add_service(CollectorServer::new(collector))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("collector server");
    });
    addr
}

/// Captures whatever tracing output the installed filter lets through,
/// for assertions on log levels and content.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes this capture the thread's tracing destination, filtered by
    /// `directive`, until the guard drops.
    #[must_use]
    pub fn install(&self, directive: &str) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(directive))
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Everything captured so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
