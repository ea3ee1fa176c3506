use thiserror::Error;

/// The prefix of a resource could not be fetched.
///
/// This is always distinct from "fetched, but no index inside", which is
/// reported as [`crate::SegmentRanges::NOT_FOUND`].
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection failure, timeout, or a broken body stream.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("header {name:?} cannot be sent with the range request")]
    InvalidHeader { name: String },

    #[error("failed to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
