//! Process configuration, fixed at startup and passed by value. Nothing
//! here changes while the relay runs.

/// Immutable settings for one relay process.
#[derive(Debug, Clone)]
pub struct Config {
    /// host:port of the collector's gRPC endpoint.
    pub collector_addr: String,
    /// Feed generated inventory instead of watching a cluster.
    pub synthetic: bool,
    /// Default logging to debug instead of warn.
    pub verbose: bool,
}
