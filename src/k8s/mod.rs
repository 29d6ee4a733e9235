pub mod client;
pub mod source;
pub mod translate;
pub mod watch;

/// User agent sent with every Kubernetes api call - automatically tracks
/// the package version, so relay traffic is identifiable in audit logs.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
