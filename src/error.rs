use crate::k8s::source::ResourceKind;

pub type Result<T> = core::result::Result<T, Error>;

/// Session-fatal conditions. Every variant funnels into the same recovery
/// path: the supervisor drops the whole session and starts a new one after
/// a short delay. The variants differ only in what gets logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bootstrap listing failed
    #[error("{kind} list failed: {source}")]
    List {
        kind: ResourceKind,
        #[source]
        source: kube::Error,
    },

    /// Opening a watch subscription failed
    #[error("{kind} watch open failed: {source}")]
    WatchOpen {
        kind: ResourceKind,
        #[source]
        source: kube::Error,
    },

    /// A live watch stream yielded a transport or decode error
    #[error("{kind} watch stream failed: {source}")]
    WatchStream {
        kind: ResourceKind,
        #[source]
        source: kube::Error,
    },

    /// A watch stream ended before the rotation timer fired
    #[error("{kind} watch stream ended early")]
    WatchClosed { kind: ResourceKind },

    /// A notification payload was not an object of the kind the watch was
    /// opened for
    #[error("payload does not match the {expected} watch")]
    MalformedEvent { expected: ResourceKind },

    /// The platform reported a change kind this relay does not track
    #[error("unrecognized change kind: {0}")]
    UnrecognizedChange(String),

    /// The collector connection or an outbound send failed
    #[error("collector transport failed: {0}")]
    Transport(String),

    /// The collector signaled a session reset
    #[error("collector reset the session: {0}")]
    PeerReset(String),

    /// No usable Kubernetes configuration could be inferred
    #[error("kubernetes config inference failed: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    /// The Kubernetes client could not be built from the inferred config
    #[error("kubernetes client setup failed: {0}")]
    ClientSetup(#[source] kube::Error),
}
