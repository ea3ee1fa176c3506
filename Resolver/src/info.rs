use std::fs;
use std::io;

use dash_manifest::FormatDescriptor;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid info JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("info JSON has no duration")]
    MissingDuration,

    #[error("no format with id {0}")]
    UnknownFormat(String),

    #[error("requested_formats has no {0} format")]
    MissingTrack(&'static str),
}

/// The parts of a yt-dlp info dictionary the resolver looks at.
#[derive(Debug, Deserialize)]
pub struct MediaInfo {
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<FormatDescriptor>,
    /// The formats yt-dlp picked for a merged download, video first.
    #[serde(default)]
    pub requested_formats: Vec<FormatDescriptor>,
}

impl MediaInfo {
    /// Reads info JSON from `path`, or from stdin when `path` is `-`.
    pub fn load(path: &str) -> Result<Self, InfoError> {
        let read_error = |source| InfoError::Read {
            path: path.to_string(),
            source,
        };
        let text = if path == "-" {
            io::read_to_string(io::stdin()).map_err(read_error)?
        } else {
            fs::read_to_string(path).map_err(read_error)?
        };
        Ok(serde_json::from_str(&text)?)
    }

    pub fn duration(&self) -> Result<f64, InfoError> {
        self.duration.ok_or(InfoError::MissingDuration)
    }

    /// Picks the audio and video formats.
    ///
    /// An explicit id is looked up in `formats`. Otherwise the audio-only and
    /// the video entry of `requested_formats` are used.
    pub fn select(
        &self,
        audio_id: Option<&str>,
        video_id: Option<&str>,
    ) -> Result<(&FormatDescriptor, &FormatDescriptor), InfoError> {
        let audio = match audio_id {
            Some(id) => self.format_by_id(id)?,
            None => self
                .requested_formats
                .iter()
                .find(|f| is_audio_only(f))
                .ok_or(InfoError::MissingTrack("audio"))?,
        };
        let video = match video_id {
            Some(id) => self.format_by_id(id)?,
            None => self
                .requested_formats
                .iter()
                .find(|f| has_video(f))
                .ok_or(InfoError::MissingTrack("video"))?,
        };
        Ok((audio, video))
    }

    fn format_by_id(&self, id: &str) -> Result<&FormatDescriptor, InfoError> {
        self.formats
            .iter()
            .find(|f| f.format_id == id)
            .ok_or_else(|| InfoError::UnknownFormat(id.to_string()))
    }
}

// yt-dlp writes the codec as "none" for an absent track.
fn present(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| c != "none")
}

fn has_video(format: &FormatDescriptor) -> bool {
    present(format.vcodec.as_deref())
}

fn is_audio_only(format: &FormatDescriptor) -> bool {
    present(format.acodec.as_deref()) && !has_video(format)
}
