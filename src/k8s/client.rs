use http::{HeaderName, HeaderValue};
use kube::{Client, Config};

use crate::error::{Error, Result};

/// Creates the Kubernetes client for one session from inferred
/// configuration - the in-cluster service account when running as a pod,
/// the local kubeconfig otherwise.
///
/// # Errors
///
/// Will return `Err` if no usable configuration can be inferred or the
/// client cannot be built from it.
pub async fn new(user_agent: &str) -> Result<Client> {
    let mut config = Config::infer().await?;

    // An invalid user agent falls back to the client default rather than
    // failing session setup.
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        config
            .headers
            .push((HeaderName::from_static("user-agent"), value));
    }

    Client::try_from(config).map_err(Error::ClientSetup)
}
