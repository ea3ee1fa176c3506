//! Builds minimal on-demand MPEG-DASH manifests for media whose audio and
//! video live in separate single files.
//!
//! Every representation carries a `BaseURL` pointing straight at the origin
//! and a `SegmentBase` whose byte ranges come from [`range_locator`].

pub mod error;
pub mod format;
pub mod mpd;

pub use error::ManifestError;
pub use format::FormatDescriptor;
pub use mpd::builder::{build_manifest, Manifest};
pub use mpd::iso8601_duration;
