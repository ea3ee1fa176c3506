use range_locator::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    /// A format descriptor lacks a field the representation cannot do without.
    #[error("format {format_id} has no {field}")]
    MalformedFormat {
        format_id: String,
        field: &'static str,
    },

    #[error("failed to locate segment ranges: {0}")]
    Fetch(#[from] FetchError),

    #[error("invalid presentation duration {0}")]
    InvalidDuration(f64),

    #[error("XML write error: {0}")]
    Xml(String),
}
