//! Shared HTTP plumbing for the network-backed providers.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Default per-request timeout.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a client with the given timeout and the plugsync user agent.
pub(crate) fn build_client(
    provider: &'static str,
    timeout: Duration,
) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("plugsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Upstream {
            provider,
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Append path segments (percent-encoded) to `base`.
pub(crate) fn endpoint(
    provider: &'static str,
    base: &str,
    segments: &[&str],
) -> ProviderResult<Url> {
    let mut url = Url::parse(base).map_err(|e| ProviderError::Upstream {
        provider,
        message: format!("invalid API base {base:?}: {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| ProviderError::Upstream {
            provider,
            message: format!("API base {base:?} cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET `url` and decode a JSON body. A 404 yields `Ok(None)`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &'static str,
    url: Url,
) -> ProviderResult<Option<T>> {
    debug!(provider, url = %url, "fetching metadata");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ProviderError::Upstream {
            provider,
            message: format!("request to {url} failed: {e}"),
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ProviderError::Upstream {
            provider,
            message: format!("{url} returned {status}"),
        });
    }

    let body = response.bytes().await.map_err(|e| ProviderError::Upstream {
        provider,
        message: format!("failed to read body from {url}: {e}"),
    })?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| ProviderError::Decode {
            provider,
            message: e.to_string(),
        })
}
