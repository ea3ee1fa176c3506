use std::collections::HashMap;

use range_locator::Container;
use serde::Deserialize;

use crate::mpd::ContentType;
use crate::ManifestError;

/// One entry of a yt-dlp `formats` list.
///
/// Only `format_id` is required to deserialize. Which of the remaining fields
/// a representation needs is checked when the format is added to a manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    /// File extension, e.g. `webm` or `m4a`.
    pub ext: Option<String>,
    /// Container tag: `webm_dash`, `mp4_dash`, `m4a_dash`, ...
    pub container: Option<String>,
    pub url: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    /// Total bitrate in kbps.
    pub tbr: Option<f64>,
    /// Audio bitrate in kbps.
    pub abr: Option<f64>,
    /// Video bitrate in kbps.
    pub vbr: Option<f64>,
    /// Audio sampling rate in Hz.
    pub asr: Option<u32>,
    pub audio_channels: Option<u32>,
    pub fps: Option<f64>,
    /// `"WIDTHxHEIGHT"`, or free text such as `"audio only"`.
    pub resolution: Option<String>,
    /// Headers the origin expects on every request for this format.
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

/// Where the bytes of a representation live.
#[derive(Debug, Clone, Copy)]
pub struct MediaSource<'a> {
    pub url: &'a str,
    pub container_tag: &'a str,
}

impl MediaSource<'_> {
    pub fn container(&self) -> Container {
        Container::from_tag(self.container_tag)
    }
}

impl FormatDescriptor {
    pub(crate) fn require<'a>(
        &self,
        value: &'a Option<String>,
        field: &'static str,
    ) -> Result<&'a str, ManifestError> {
        value.as_deref().ok_or_else(|| ManifestError::MalformedFormat {
            format_id: self.format_id.clone(),
            field,
        })
    }

    /// The resource URL and container tag, both of which are mandatory.
    pub fn source(&self) -> Result<MediaSource<'_>, ManifestError> {
        Ok(MediaSource {
            url: self.require(&self.url, "url")?,
            container_tag: self.require(&self.container, "container")?,
        })
    }

    /// `format_id` up to its first hyphen, so `"251-drc"` becomes `"251"`.
    pub fn representation_id(&self) -> &str {
        self.format_id
            .split_once('-')
            .map_or(self.format_id.as_str(), |(id, _)| id)
    }

    /// `audio/<ext>` or `video/<ext>`. Without an extension the container tag
    /// minus its `_dash` suffix stands in.
    pub fn mime_type(&self, content_type: ContentType, container_tag: &str) -> String {
        let subtype = match self.ext.as_deref() {
            Some(ext) => ext,
            None => container_tag.strip_suffix("_dash").unwrap_or(container_tag),
        };
        format!("{}/{}", content_type.as_str(), subtype)
    }

    /// Bandwidth in bits per second from the total bitrate, or from
    /// `track_kbps` when no total is known.
    pub fn bandwidth(&self, track_kbps: Option<f64>) -> Option<u64> {
        self.tbr
            .or(track_kbps)
            .filter(|kbps| kbps.is_finite())
            .map(|kbps| (kbps * 1000.0).round() as u64)
    }

    /// Width and height parsed from a `"WxH"` resolution.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (width, height) = self.resolution.as_deref()?.split_once('x')?;
        Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
    }
}

/// Rewrites a resource URL for use as a `BaseURL`.
///
/// `&`, `?` and `=` each become `/`. The playback side cannot resolve query
/// strings in a `BaseURL`, and the origins involved accept the path form.
pub fn base_url_text(url: &str) -> String {
    url.replace(['&', '?', '='], "/")
}
