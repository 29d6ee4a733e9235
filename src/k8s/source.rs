//! The platform seam: everything the relay asks of an inventory backend is
//! "list with a resumption cursor" and "watch from one". The live cluster,
//! the synthetic generator, and scripted test doubles all sit behind
//! [`InventorySource`].

use async_trait::async_trait;
use futures::Stream;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::error::ErrorResponse;
use std::fmt;
use std::pin::Pin;

use crate::error::Result;

/// The two resource kinds relayed to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    ReplicaSet,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pod => write!(f, "pod"),
            Self::ReplicaSet => write!(f, "replicaset"),
        }
    }
}

/// Change kinds a watch subscription can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChange {
    Added,
    Modified,
    Deleted,
    Error,
}

/// Payload of a watch notification. `Status` carries watch-level error
/// payloads, which hold no object of either kind.
#[derive(Debug, Clone)]
pub enum RawObject {
    Pod(Box<Pod>),
    ReplicaSet(Box<ReplicaSet>),
    Status(Box<ErrorResponse>),
}

impl RawObject {
    /// Resumption cursor carried in the object metadata, if any.
    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Pod(pod) => pod.metadata.resource_version.as_deref(),
            Self::ReplicaSet(rs) => rs.metadata.resource_version.as_deref(),
            Self::Status(_) => None,
        }
    }
}

/// One notification delivered by a watch subscription.
#[derive(Debug, Clone)]
pub enum RawEvent {
    /// A change to one object, as reported by the platform.
    Change(RawChange, RawObject),
    /// A notification kind this relay was not written for - bookmarks and
    /// whatever the platform invents next.
    Unrecognized(String),
}

impl RawEvent {
    /// The cursor to advance to once this notification has been relayed.
    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Change(_, object) => object.resource_version(),
            Self::Unrecognized(_) => None,
        }
    }
}

/// Stream of notifications from one open watch subscription. Dropping the
/// stream stops the subscription.
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Full current state of one resource kind plus the cursor a watch picks
/// up from.
pub struct Listing {
    pub objects: Vec<RawObject>,
    pub cursor: String,
}

/// An inventory backend the session engine can bootstrap from and watch.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Lists the full current set of `kind`.
    ///
    /// # Errors
    ///
    /// A listing failure is fatal to the calling session.
    async fn list(&self, kind: ResourceKind) -> Result<Listing>;

    /// Opens a watch over `kind` starting at `cursor`, yielding every
    /// change after that point.
    ///
    /// # Errors
    ///
    /// An open failure is fatal to the calling session.
    async fn watch(&self, kind: ResourceKind, cursor: &str) -> Result<RawEventStream>;
}
