//! Publishes a DASH manifest on a short-lived loopback HTTP endpoint.
//!
//! The server answers `GET` and `HEAD /manifest.mpd` and exits on its own
//! once no connection has arrived for [`IDLE_TIMEOUT`].

pub mod error;
pub mod server;

pub use error::ServerError;
pub use server::{
    start_server, start_server_with_timeout, ManifestServer, IDLE_TIMEOUT, MANIFEST_CONTENT_TYPE,
    MANIFEST_PATH,
};
