//! HTTP retrieval of the raw feed payload.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Issues a single GET against `url` and returns the response body.
///
/// `timeout` bounds the whole exchange, body included. There is no retry:
/// one failed attempt is the result.
#[tracing::instrument(skip_all, fields(url = %url, timeout = ?timeout))]
pub async fn fetch_feed<C: HttpClient>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let mut req = reqwest::Request::new(reqwest::Method::GET, parsed);
    *req.timeout_mut() = Some(timeout);

    let resp = client
        .execute(req)
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let bytes = resp.bytes().await.map_err(|e| classify(e, timeout))?;
    debug!(bytes = bytes.len(), status = status.as_u16(), "Feed body received");
    Ok(bytes.to_vec())
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Request(err)
    }
}
