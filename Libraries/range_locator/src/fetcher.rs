use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::Client;
use tracing::{debug, error, instrument};

use crate::{FetchError, PREFIX_RANGE, PREFIX_SIZE};

/// Default time allowed for the range request, body included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the first [`PREFIX_SIZE`] bytes of a resource.
#[async_trait]
pub trait PrefixFetcher: Send + Sync {
    async fn fetch_prefix(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, FetchError>;
}

/// Fetches prefixes with a single HTTP range request.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_headers(extra: &HashMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::with_capacity(extra.len() + 1);
    for (name, value) in extra {
        let invalid = || FetchError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }
    // Set last so a caller-supplied Range never widens the request.
    headers.insert(RANGE, HeaderValue::from_static(PREFIX_RANGE));
    Ok(headers)
}

#[async_trait]
impl PrefixFetcher for HttpFetcher {
    /// Sends `Range: bytes=0-1023` and keeps at most [`PREFIX_SIZE`] bytes of the
    /// answer. Origins that ignore the range and stream the whole file are cut
    /// off once the prefix is complete.
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch_prefix(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .headers(build_headers(headers)?)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            error!("Range request answered with {}", status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut prefix = BytesMut::with_capacity(PREFIX_SIZE);
        while prefix.len() < PREFIX_SIZE {
            match response.chunk().await.map_err(request_error)? {
                Some(chunk) => prefix.extend_from_slice(&chunk),
                None => break,
            }
        }
        prefix.truncate(PREFIX_SIZE);

        debug!("Received {} prefix bytes with status {}", prefix.len(), status);
        Ok(prefix.freeze())
    }
}
