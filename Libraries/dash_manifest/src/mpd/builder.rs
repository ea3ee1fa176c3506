use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use range_locator::{PrefixFetcher, RangeLocator};
use tracing::{debug, info, instrument, warn};

use super::{
    iso8601_duration, AdaptationSet, ContentType, Period, Representation, SegmentBase,
    AUDIO_CHANNEL_SCHEME, MIN_BUFFER_TIME, MPD_NAMESPACE, ON_DEMAND_PROFILE, ROLE_SCHEME,
    SCHEMA_LOCATION, XSI_NAMESPACE,
};
use crate::format::{base_url_text, FormatDescriptor, MediaSource};
use crate::ManifestError;

/// A static on-demand MPD under construction.
///
/// Formats are added one at a time, each triggering a single range lookup.
/// [`Manifest::emit`] takes the manifest by value, so nothing can be added
/// once the document has been serialized.
#[derive(Debug, Clone)]
pub struct Manifest {
    duration: f64,
    period: Period,
}

impl Manifest {
    /// `duration` is the presentation length in seconds.
    pub fn new(duration: f64) -> Result<Self, ManifestError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(ManifestError::InvalidDuration(duration));
        }
        Ok(Self {
            duration,
            period: Period::default(),
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn audio_set(&self) -> &AdaptationSet {
        &self.period.audio
    }

    pub fn video_set(&self) -> &AdaptationSet {
        &self.period.video
    }

    /// Adds an audio representation.
    ///
    /// Needs `acodec`, `url` and `container`. `tbr` is used for the bandwidth,
    /// falling back to `abr`.
    #[instrument(skip_all, fields(format_id = %format.format_id))]
    pub async fn add_audio_format<F: PrefixFetcher>(
        &mut self,
        format: &FormatDescriptor,
        locator: &RangeLocator<F>,
    ) -> Result<(), ManifestError> {
        let codecs = format.require(&format.acodec, "acodec")?;
        let source = format.source()?;
        let segment_base = locate(format, source, locator).await?;

        let representation = Representation {
            id: format.representation_id().to_string(),
            codecs: codecs.to_string(),
            mime_type: format.mime_type(ContentType::Audio, source.container_tag),
            bandwidth: format.bandwidth(format.abr),
            audio_sampling_rate: format.asr,
            audio_channels: format.audio_channels,
            frame_rate: None,
            width: None,
            height: None,
            base_url: base_url_text(source.url),
            segment_base,
        };

        info!(
            "Added audio representation {} ({}, {:?} bps)",
            representation.id, representation.codecs, representation.bandwidth
        );
        self.period.audio.representations.push(representation);
        Ok(())
    }

    /// Adds a video representation.
    ///
    /// Needs `vcodec`, `url` and `container`. `tbr` is used for the bandwidth,
    /// falling back to `vbr`.
    #[instrument(skip_all, fields(format_id = %format.format_id))]
    pub async fn add_video_format<F: PrefixFetcher>(
        &mut self,
        format: &FormatDescriptor,
        locator: &RangeLocator<F>,
    ) -> Result<(), ManifestError> {
        let codecs = format.require(&format.vcodec, "vcodec")?;
        let source = format.source()?;

        let dimensions = format.dimensions();
        if dimensions.is_none() {
            warn!(
                "Resolution {:?} is not WIDTHxHEIGHT, leaving width and height out",
                format.resolution
            );
        }

        let segment_base = locate(format, source, locator).await?;

        let representation = Representation {
            id: format.representation_id().to_string(),
            codecs: codecs.to_string(),
            mime_type: format.mime_type(ContentType::Video, source.container_tag),
            bandwidth: format.bandwidth(format.vbr),
            audio_sampling_rate: None,
            audio_channels: None,
            frame_rate: format.fps,
            width: dimensions.map(|(width, _)| width),
            height: dimensions.map(|(_, height)| height),
            base_url: base_url_text(source.url),
            segment_base,
        };

        info!(
            "Added video representation {} ({}, {:?} bps)",
            representation.id, representation.codecs, representation.bandwidth
        );
        self.period.video.representations.push(representation);
        Ok(())
    }

    /// Serializes the manifest as UTF-8 XML with a declaration.
    ///
    /// An indented rendering is tried first. If it fails the document is
    /// written again without indentation, and only that second failure is
    /// reported.
    pub fn emit(self) -> Result<Vec<u8>, ManifestError> {
        match self.render(true) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!("Indented rendering failed ({}), emitting without indentation", e);
                self.render(false)
            }
        }
    }

    fn render(&self, indent: bool) -> Result<Vec<u8>, ManifestError> {
        let buffer = Cursor::new(Vec::new());
        let mut writer = if indent {
            Writer::new_with_indent(buffer, b' ', 2)
        } else {
            Writer::new(buffer)
        };

        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;

        let mut mpd = BytesStart::new("MPD");
        mpd.push_attribute(("xmlns", MPD_NAMESPACE));
        mpd.push_attribute(("profiles", ON_DEMAND_PROFILE));
        mpd.push_attribute(("type", "static"));
        mpd.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        mpd.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
        mpd.push_attribute(("minBufferTime", iso8601_duration(MIN_BUFFER_TIME).as_str()));
        mpd.push_attribute((
            "mediaPresentationDuration",
            iso8601_duration(self.duration).as_str(),
        ));
        write(&mut writer, Event::Start(mpd))?;

        write(&mut writer, Event::Start(BytesStart::new("Period")))?;
        write_adaptation_set(&mut writer, &self.period.audio)?;
        write_adaptation_set(&mut writer, &self.period.video)?;
        write(&mut writer, Event::End(BytesEnd::new("Period")))?;

        write(&mut writer, Event::End(BytesEnd::new("MPD")))?;

        let document = writer.into_inner().into_inner();
        debug!("Rendered {} byte manifest (indent: {})", document.len(), indent);
        Ok(document)
    }
}

/// Creates a manifest holding exactly one audio and one video representation
/// and serializes it.
pub async fn build_manifest<F: PrefixFetcher>(
    duration: f64,
    audio: &FormatDescriptor,
    video: &FormatDescriptor,
    locator: &RangeLocator<F>,
) -> Result<Vec<u8>, ManifestError> {
    let mut manifest = Manifest::new(duration)?;
    manifest.add_audio_format(audio, locator).await?;
    manifest.add_video_format(video, locator).await?;
    manifest.emit()
}

async fn locate<F: PrefixFetcher>(
    format: &FormatDescriptor,
    source: MediaSource<'_>,
    locator: &RangeLocator<F>,
) -> Result<SegmentBase, ManifestError> {
    let ranges = locator
        .locate(source.url, source.container(), &format.http_headers)
        .await?;
    if !ranges.is_found() {
        // Still usable in the document; the player decides what to do with it.
        warn!(
            "No index found in the first bytes of format {} ({})",
            format.format_id, source.container_tag
        );
    }
    Ok(ranges.into())
}

fn write<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), ManifestError> {
    writer
        .write_event(event)
        .map_err(|e| ManifestError::Xml(e.to_string()))
}

fn write_adaptation_set<W: Write>(
    writer: &mut Writer<W>,
    set: &AdaptationSet,
) -> Result<(), ManifestError> {
    let mut element = BytesStart::new("AdaptationSet");
    element.push_attribute(("id", set.id.to_string().as_str()));
    element.push_attribute(("subsegmentAlignment", "true"));
    element.push_attribute(("contentType", set.content_type.as_str()));
    write(writer, Event::Start(element))?;

    let mut role = BytesStart::new("Role");
    role.push_attribute(("schemeIdUri", ROLE_SCHEME));
    role.push_attribute(("value", "main"));
    write(writer, Event::Empty(role))?;

    for representation in &set.representations {
        write_representation(writer, set.content_type, representation)?;
    }

    write(writer, Event::End(BytesEnd::new("AdaptationSet")))
}

fn write_representation<W: Write>(
    writer: &mut Writer<W>,
    content_type: ContentType,
    rep: &Representation,
) -> Result<(), ManifestError> {
    let mut element = BytesStart::new("Representation");
    element.push_attribute(("id", rep.id.as_str()));
    element.push_attribute(("codecs", rep.codecs.as_str()));
    match content_type {
        ContentType::Audio => {
            if let Some(rate) = rep.audio_sampling_rate {
                element.push_attribute(("audioSamplingRate", rate.to_string().as_str()));
            }
            element.push_attribute(("startWithSAP", "1"));
        }
        ContentType::Video => {
            element.push_attribute(("startWithSAP", "1"));
            element.push_attribute(("maxPlayoutRate", "1"));
            if let Some(fps) = rep.frame_rate {
                element.push_attribute(("frameRate", fps.to_string().as_str()));
            }
            if let (Some(width), Some(height)) = (rep.width, rep.height) {
                element.push_attribute(("width", width.to_string().as_str()));
                element.push_attribute(("height", height.to_string().as_str()));
            }
        }
    }
    element.push_attribute(("mimeType", rep.mime_type.as_str()));
    if let Some(bandwidth) = rep.bandwidth {
        element.push_attribute(("bandwidth", bandwidth.to_string().as_str()));
    }
    write(writer, Event::Start(element))?;

    if let Some(channels) = rep.audio_channels {
        let mut channel_config = BytesStart::new("AudioChannelConfiguration");
        channel_config.push_attribute(("schemeIdUri", AUDIO_CHANNEL_SCHEME));
        channel_config.push_attribute(("value", channels.to_string().as_str()));
        write(writer, Event::Empty(channel_config))?;
    }

    write(writer, Event::Start(BytesStart::new("BaseURL")))?;
    write(writer, Event::Text(BytesText::new(&rep.base_url)))?;
    write(writer, Event::End(BytesEnd::new("BaseURL")))?;

    let mut segment_base = BytesStart::new("SegmentBase");
    segment_base.push_attribute((
        "indexRange",
        rep.segment_base.index_range.to_string().as_str(),
    ));
    write(writer, Event::Start(segment_base))?;

    let mut initialization = BytesStart::new("Initialization");
    initialization.push_attribute((
        "range",
        rep.segment_base.initialization.to_string().as_str(),
    ));
    write(writer, Event::Empty(initialization))?;

    write(writer, Event::End(BytesEnd::new("SegmentBase")))?;
    write(writer, Event::End(BytesEnd::new("Representation")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use quick_xml::Reader;
    use range_locator::{ByteRange, FetchError, SegmentRanges};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed prefix for every URL and counts the fetches.
    struct StaticFetcher {
        prefix: Bytes,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(prefix: Vec<u8>) -> Self {
            Self {
                prefix: Bytes::from(prefix),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PrefixFetcher for StaticFetcher {
        async fn fetch_prefix(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.prefix.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl PrefixFetcher for FailingFetcher {
        async fn fetch_prefix(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
        ) -> Result<Bytes, FetchError> {
            Err(FetchError::InvalidHeader {
                name: "Bad Header".into(),
            })
        }
    }

    // ftyp (0..999) then a 1000 byte sidx.
    fn mp4_prefix() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.resize(1000, 0);
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(b"sidx");
        data.resize(1024, 0);
        data
    }

    fn audio_format() -> FormatDescriptor {
        FormatDescriptor {
            format_id: "140-drc".into(),
            ext: Some("m4a".into()),
            container: Some("m4a_dash".into()),
            url: Some("https://media.example/audio?id=7&itag=140".into()),
            acodec: Some("mp4a.40.2".into()),
            tbr: Some(129.5),
            abr: Some(128.0),
            asr: Some(44100),
            audio_channels: Some(2),
            ..Default::default()
        }
    }

    fn video_format() -> FormatDescriptor {
        FormatDescriptor {
            format_id: "137".into(),
            ext: Some("mp4".into()),
            container: Some("mp4_dash".into()),
            url: Some("https://media.example/video.mp4".into()),
            vcodec: Some("avc1.640028".into()),
            vbr: Some(4000.0),
            fps: Some(30.0),
            resolution: Some("1920x1080".into()),
            ..Default::default()
        }
    }

    fn emitted_text(manifest: Manifest) -> String {
        String::from_utf8(manifest.emit().unwrap()).unwrap()
    }

    /// Parses the whole document, failing on malformed XML, and returns the
    /// `contentType` of every AdaptationSet.
    fn adaptation_content_types(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut content_types = vec![];
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == b"AdaptationSet" => {
                    let value = e.try_get_attribute("contentType").unwrap().unwrap();
                    content_types.push(String::from_utf8(value.value.to_vec()).unwrap());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        content_types
    }

    #[test]
    fn rejects_invalid_durations() {
        assert!(matches!(Manifest::new(-1.0), Err(ManifestError::InvalidDuration(_))));
        assert!(Manifest::new(f64::NAN).is_err());
        assert!(Manifest::new(f64::INFINITY).is_err());
        assert_eq!(Manifest::new(0.0).unwrap().duration(), 0.0);
    }

    #[test]
    fn empty_manifest_has_both_sets() {
        let xml = emitted_text(Manifest::new(300.0).unwrap());

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("xmlns=\"urn:mpeg:DASH:schema:MPD:2011\""));
        assert!(xml.contains("profiles=\"urn:mpeg:dash:profile:isoff-main:2011\""));
        assert!(xml.contains("type=\"static\""));
        assert!(xml.contains("minBufferTime=\"P0DT0H0M1.5S\""));
        assert!(xml.contains("mediaPresentationDuration=\"P0DT0H5M0S\""));
        let role = "<Role schemeIdUri=\"urn:mpeg:DASH:role:2011\" value=\"main\"/>";
        assert_eq!(xml.matches(role).count(), 2);
        assert_eq!(adaptation_content_types(&xml), ["audio", "video"]);
    }

    #[tokio::test]
    async fn audio_representation_attributes() {
        let fetcher = StaticFetcher::new(mp4_prefix());
        let locator = RangeLocator::new(fetcher);
        let mut manifest = Manifest::new(120.0).unwrap();
        manifest.add_audio_format(&audio_format(), &locator).await.unwrap();

        let rep = &manifest.audio_set().representations[0];
        assert_eq!(rep.id, "140");
        assert_eq!(rep.bandwidth, Some(129_500));
        assert_eq!(rep.mime_type, "audio/m4a");
        assert_eq!(rep.base_url, "https://media.example/audio/id/7/itag/140");
        assert_eq!(rep.segment_base.initialization, ByteRange::new(0, 999));
        assert_eq!(rep.segment_base.index_range, ByteRange::new(1000, 1999));
        assert!(manifest.video_set().representations.is_empty());

        let xml = emitted_text(manifest);
        assert!(xml.contains(
            "<Representation id=\"140\" codecs=\"mp4a.40.2\" audioSamplingRate=\"44100\" \
             startWithSAP=\"1\" mimeType=\"audio/m4a\" bandwidth=\"129500\">"
        ));
        assert!(xml.contains(
            "<AudioChannelConfiguration \
             schemeIdUri=\"urn:mpeg:dash:23003:3:audio_channel_configuration:2011\" value=\"2\"/>"
        ));
        assert!(xml.contains("<BaseURL>https://media.example/audio/id/7/itag/140</BaseURL>"));
        assert!(xml.contains("<SegmentBase indexRange=\"1000-1999\">"));
        assert!(xml.contains("<Initialization range=\"0-999\"/>"));
    }

    #[tokio::test]
    async fn video_representation_attributes() {
        let locator = RangeLocator::new(StaticFetcher::new(mp4_prefix()));
        let mut manifest = Manifest::new(120.0).unwrap();
        manifest.add_video_format(&video_format(), &locator).await.unwrap();

        let xml = emitted_text(manifest);
        assert!(xml.contains(
            "<Representation id=\"137\" codecs=\"avc1.640028\" startWithSAP=\"1\" \
             maxPlayoutRate=\"1\" frameRate=\"30\" width=\"1920\" height=\"1080\" \
             mimeType=\"video/mp4\" bandwidth=\"4000000\">"
        ));
        assert!(!xml.contains("AudioChannelConfiguration"));
    }

    #[tokio::test]
    async fn optional_attributes_are_omitted() {
        let locator = RangeLocator::new(StaticFetcher::new(mp4_prefix()));
        let mut manifest = Manifest::new(10.0).unwrap();

        let mut audio = audio_format();
        audio.tbr = None;
        audio.abr = None;
        audio.asr = None;
        audio.audio_channels = None;
        manifest.add_audio_format(&audio, &locator).await.unwrap();

        let mut video = video_format();
        video.vbr = None;
        video.fps = None;
        video.resolution = Some("audio only".into());
        manifest.add_video_format(&video, &locator).await.unwrap();

        let xml = emitted_text(manifest);
        assert!(!xml.contains("bandwidth="));
        assert!(!xml.contains("audioSamplingRate="));
        assert!(!xml.contains("AudioChannelConfiguration"));
        assert!(!xml.contains("frameRate="));
        assert!(!xml.contains("width="));
        assert!(!xml.contains("height="));
    }

    #[tokio::test]
    async fn ampersand_is_escaped_in_output() {
        let locator = RangeLocator::new(StaticFetcher::new(mp4_prefix()));
        let mut manifest = Manifest::new(10.0).unwrap();
        let mut audio = audio_format();
        audio.acodec = Some("mp4a&x".into());
        manifest.add_audio_format(&audio, &locator).await.unwrap();

        let xml = emitted_text(manifest);
        assert!(xml.contains("codecs=\"mp4a&amp;x\""));
        assert!(!xml.contains("mp4a&x"));
    }

    #[tokio::test]
    async fn base_url_text_is_escaped() {
        let locator = RangeLocator::new(StaticFetcher::new(mp4_prefix()));
        let mut manifest = Manifest::new(10.0).unwrap();
        manifest.add_audio_format(&audio_format(), &locator).await.unwrap();
        // Inject a raw ampersand past the rewrite to exercise text escaping.
        manifest.period.audio.representations[0].base_url = "https://a.example/x&y".into();

        let xml = emitted_text(manifest);
        assert!(xml.contains("<BaseURL>https://a.example/x&amp;y</BaseURL>"));
    }

    #[tokio::test]
    async fn missing_fields_fail_before_fetching() {
        let locator = RangeLocator::new(StaticFetcher::new(mp4_prefix()));
        let mut manifest = Manifest::new(10.0).unwrap();

        let mut audio = audio_format();
        audio.acodec = None;
        let err = manifest.add_audio_format(&audio, &locator).await.unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MalformedFormat { ref format_id, field: "acodec" } if format_id == "140-drc"
        ));

        let mut video = video_format();
        video.url = None;
        let err = manifest.add_video_format(&video, &locator).await.unwrap_err();
        assert!(matches!(err, ManifestError::MalformedFormat { field: "url", .. }));

        let mut video = video_format();
        video.container = None;
        let err = manifest.add_video_format(&video, &locator).await.unwrap_err();
        assert!(matches!(err, ManifestError::MalformedFormat { field: "container", .. }));

        assert!(manifest.audio_set().representations.is_empty());
        assert!(manifest.video_set().representations.is_empty());
        assert_eq!(locator.fetcher().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_index_still_adds_representation() {
        let locator = RangeLocator::new(StaticFetcher::new(vec![0u8; 1024]));
        let mut manifest = Manifest::new(10.0).unwrap();
        let mut audio = audio_format();
        audio.container = Some("webm_dash".into());
        manifest.add_audio_format(&audio, &locator).await.unwrap();

        assert_eq!(
            manifest.audio_set().representations[0].segment_base,
            SegmentBase::from(SegmentRanges::NOT_FOUND)
        );
        let xml = emitted_text(manifest);
        assert!(xml.contains("<SegmentBase indexRange=\"0-0\">"));
        assert!(xml.contains("<Initialization range=\"0-0\"/>"));
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let locator = RangeLocator::new(FailingFetcher);
        let mut manifest = Manifest::new(10.0).unwrap();
        let err = manifest
            .add_audio_format(&audio_format(), &locator)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Fetch(FetchError::InvalidHeader { .. })));
        assert!(manifest.audio_set().representations.is_empty());
    }

    #[tokio::test]
    async fn build_manifest_fetches_once_per_format() {
        let fetcher = StaticFetcher::new(mp4_prefix());
        let locator = RangeLocator::new(fetcher);
        let document = build_manifest(90061.0, &audio_format(), &video_format(), &locator)
            .await
            .unwrap();

        let xml = String::from_utf8(document).unwrap();
        assert!(xml.contains("mediaPresentationDuration=\"P1DT1H1M1S\""));
        assert_eq!(adaptation_content_types(&xml), ["audio", "video"]);
        assert_eq!(xml.matches("<Representation ").count(), 2);
        assert_eq!(locator.fetcher().calls.load(Ordering::SeqCst), 2);
    }
}
