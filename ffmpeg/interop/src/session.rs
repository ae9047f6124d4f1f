/*!
    Media session lifecycle.

    A [`MediaSession`] is one opened source: the container, the selected
    streams with their providers and decode contexts, and the binding to a
    host [`MediaStreamSource`]. Opening is all-or-nothing; closing releases
    everything in a fixed order under the session lock.
*/

use std::sync::{Arc, Weak};

use ffmpeg_types::{AV_TIME_BASE, MediaType, Ticks};
use parking_lot::Mutex;

use crate::codec_map;
use crate::config::{EngineOptions, SessionConfig};
use crate::descriptor::StreamId;
use crate::engine::{self, Engine, InputSource};
use crate::error::{InteropError, Result};
use crate::host::{MediaStreamSource, StreamSourceEvents, SubscriptionId};
use crate::io::{ByteStream, IoAdapter, SharedByteStream, share_stream};
use crate::provider::ProviderVariant;
use crate::reader::PacketReader;
use crate::selector::{self, StreamSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Opening,
    Ready,
    Closed,
}

/**
    Progress of a start request. Always back to `Idle` once the request has
    been handled.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeekPhase {
    #[default]
    Idle,
    SeekRequested,
    Flushing,
}

/**
    Cover art extracted from an attached-picture stream.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub data: Vec<u8>,
    /// File extension including the dot, e.g. `.png`.
    pub extension: &'static str,
}

struct HostBinding {
    source: Arc<MediaStreamSource>,
    subscription: SubscriptionId,
}

enum OpenInput<'a> {
    Locator(&'a str),
    Stream(SharedByteStream),
}

pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    host: Option<HostBinding>,
    pub(crate) audio: Option<StreamSlot>,
    pub(crate) video: Option<StreamSlot>,
    pub(crate) subtitle: Option<StreamSlot>,
    thumbnail: Option<usize>,
    pub(crate) reader: Option<PacketReader>,
    byte_stream: Option<SharedByteStream>,
    pub(crate) duration: Ticks,
    pub(crate) start_offset: Ticks,
    pub(crate) seek_phase: SeekPhase,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            host: None,
            audio: None,
            video: None,
            subtitle: None,
            thumbnail: None,
            reader: None,
            byte_stream: None,
            duration: Ticks::ZERO,
            start_offset: Ticks::ZERO,
            seek_phase: SeekPhase::Idle,
        }
    }

    /// Whether host events should still be served.
    pub(crate) fn is_live(&self) -> bool {
        self.host.is_some()
    }

    pub(crate) fn slot(&self, media: MediaType) -> Option<&StreamSlot> {
        match media {
            MediaType::Audio => self.audio.as_ref(),
            MediaType::Video => self.video.as_ref(),
            MediaType::Subtitle => self.subtitle.as_ref(),
        }
    }

    /**
        The slot published under `id`, together with the packet reader.
    */
    pub(crate) fn slot_and_reader(
        &mut self,
        id: StreamId,
    ) -> Option<(&mut StreamSlot, &mut PacketReader)> {
        let reader = self.reader.as_mut()?;
        let slot = [&mut self.audio, &mut self.video, &mut self.subtitle]
            .into_iter()
            .flatten()
            .find(|slot| slot.id() == id)?;
        Some((slot, reader))
    }

    /**
        Release everything, in order: host events, providers, reader
        bindings, decode contexts, container (and its I/O adapter), byte
        stream. Safe to call on a partially opened session.
    */
    fn release(&mut self) {
        if let Some(host) = self.host.take() {
            host.source.unsubscribe(host.subscription);
        }

        let mut decoders = Vec::new();
        for slot in [self.video.take(), self.audio.take(), self.subtitle.take()]
            .into_iter()
            .flatten()
        {
            let (provider, decoder) = slot.into_parts();
            drop(provider);
            decoders.extend(decoder);
        }

        if let Some(reader) = self.reader.as_mut() {
            reader.unbind_all();
        }
        drop(decoders);
        self.reader = None;
        self.byte_stream = None;
        self.thumbnail = None;
    }
}

/**
    One opened media source serving a host.
*/
pub struct MediaSession {
    pub(crate) inner: Mutex<SessionInner>,
}

impl MediaSession {
    /**
        Open a path or URL.
    */
    pub fn open_by_locator(
        engine: &dyn Engine,
        locator: &str,
        force_audio_decode: bool,
        force_video_decode: bool,
        options: EngineOptions,
    ) -> Result<Arc<Self>> {
        if locator.is_empty() {
            return Err(InteropError::InvalidArgument("locator"));
        }
        let config = SessionConfig {
            force_audio_decode,
            force_video_decode,
            options,
        };
        Self::open(engine, OpenInput::Locator(locator), &config, None)
    }

    /**
        Open a seekable byte stream, optionally registering with an existing
        host source instead of creating one.
    */
    pub fn open_by_stream(
        engine: &dyn Engine,
        stream: impl ByteStream + 'static,
        force_audio_decode: bool,
        force_video_decode: bool,
        options: EngineOptions,
        existing_host: Option<Arc<MediaStreamSource>>,
    ) -> Result<Arc<Self>> {
        let config = SessionConfig {
            force_audio_decode,
            force_video_decode,
            options,
        };
        Self::open(
            engine,
            OpenInput::Stream(share_stream(stream)),
            &config,
            existing_host,
        )
    }

    /**
        Open a path or URL with a [`SessionConfig`].
    */
    pub fn open_with_config(
        engine: &dyn Engine,
        locator: &str,
        config: &SessionConfig,
    ) -> Result<Arc<Self>> {
        Self::open_by_locator(
            engine,
            locator,
            config.force_audio_decode,
            config.force_video_decode,
            config.options.clone(),
        )
    }

    fn open(
        engine: &dyn Engine,
        input: OpenInput<'_>,
        config: &SessionConfig,
        existing_host: Option<Arc<MediaStreamSource>>,
    ) -> Result<Arc<Self>> {
        let session = Arc::new(Self {
            inner: Mutex::new(SessionInner::new()),
        });

        let mut inner = session.inner.lock();
        inner.state = SessionState::Opening;

        let weak: Weak<dyn StreamSourceEvents> = Arc::downgrade(&session) as _;
        match open_locked(&mut inner, engine, input, config, existing_host, weak) {
            Ok(()) => {
                inner.state = SessionState::Ready;
                tracing::info!(
                    audio = inner.audio.as_ref().map(|s| s.stream_index()),
                    video = inner.video.as_ref().map(|s| s.stream_index()),
                    subtitle = inner.subtitle.as_ref().map(|s| s.stream_index()),
                    duration = inner.duration.0,
                    "media session ready"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "open failed, releasing session");
                inner.release();
                inner.state = SessionState::Closed;
                return Err(e);
            }
        }

        drop(inner);
        Ok(session)
    }

    /**
        Release the session. Idempotent; also run on drop.

        Once closed, every host event is answered with "nothing".
    */
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return;
        }
        inner.release();
        inner.state = SessionState::Closed;
        tracing::debug!("media session closed");
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /**
        The host source this session serves. `None` once closed.
    */
    pub fn media_stream_source(&self) -> Option<Arc<MediaStreamSource>> {
        self.inner
            .lock()
            .host
            .as_ref()
            .map(|host| Arc::clone(&host.source))
    }

    /**
        Media duration, zero for live or unknown-length sources.
    */
    pub fn duration(&self) -> Ticks {
        self.inner.lock().duration
    }

    pub fn seek_phase(&self) -> SeekPhase {
        self.inner.lock().seek_phase
    }

    pub fn audio_codec_name(&self) -> Option<String> {
        self.codec_name(MediaType::Audio)
    }

    pub fn video_codec_name(&self) -> Option<String> {
        self.codec_name(MediaType::Video)
    }

    pub fn subtitle_codec_name(&self) -> Option<String> {
        self.codec_name(MediaType::Subtitle)
    }

    fn codec_name(&self, media: MediaType) -> Option<String> {
        self.inner.lock().slot(media)?.codec_name.clone()
    }

    /**
        Which provider serves `media`, if that stream is exposed.
    */
    pub fn provider_variant(&self, media: MediaType) -> Option<ProviderVariant> {
        Some(self.inner.lock().slot(media)?.provider.variant())
    }

    /**
        Published stream id for `media`, if that stream is exposed.
    */
    pub fn stream_id(&self, media: MediaType) -> Option<StreamId> {
        Some(self.inner.lock().slot(media)?.id())
    }

    pub fn is_selected(&self, media: MediaType) -> bool {
        self.inner
            .lock()
            .slot(media)
            .is_some_and(StreamSlot::is_selected)
    }

    /**
        Cover art of the source, if it has any.
    */
    pub fn extract_thumbnail(&self) -> Option<Thumbnail> {
        let inner = self.inner.lock();
        let index = inner.thumbnail?;
        let stream = inner
            .reader
            .as_ref()?
            .container()
            .streams()
            .iter()
            .find(|stream| stream.index == index)?;
        let data = stream.attached_picture.clone()?;
        Some(Thumbnail {
            data,
            extension: codec_map::thumbnail_extension(stream.codec_id()),
        })
    }
}

fn open_locked(
    inner: &mut SessionInner,
    engine: &dyn Engine,
    input: OpenInput<'_>,
    config: &SessionConfig,
    existing_host: Option<Arc<MediaStreamSource>>,
    handler: Weak<dyn StreamSourceEvents>,
) -> Result<()> {
    engine::ensure_initialized(engine)?;

    let source = match input {
        OpenInput::Locator(locator) => {
            tracing::debug!(locator, "opening input");
            InputSource::Locator(locator)
        }
        OpenInput::Stream(stream) => {
            tracing::debug!("opening byte stream");
            inner.byte_stream = Some(Arc::clone(&stream));
            InputSource::Stream(IoAdapter::new(stream))
        }
    };

    let mut container = engine.open_input(source, &config.options)?;
    container.find_stream_info()?;

    let reader = inner.reader.insert(PacketReader::new(container));
    let selection = selector::select_streams(
        reader,
        config.force_audio_decode,
        config.force_video_decode,
    )?;

    let duration = reader
        .container()
        .duration()
        .map_or(Ticks::ZERO, |d| Ticks::from_units(d, AV_TIME_BASE));
    inner.start_offset = selector::start_offset(reader.container());
    inner.duration = duration;
    inner.audio = selection.audio;
    inner.video = selection.video;
    inner.subtitle = selection.subtitle;
    inner.thumbnail = selection.thumbnail;

    let source = existing_host.unwrap_or_else(MediaStreamSource::new);
    for slot in [&inner.video, &inner.audio, &inner.subtitle].into_iter().flatten() {
        source.add_stream_descriptor(Arc::clone(&slot.descriptor));
    }

    if duration > Ticks::ZERO {
        source.set_duration(duration);
        source.set_can_seek(true);
    } else {
        // live source: play as soon as possible
        source.set_buffer_time(Ticks::ZERO);
    }

    let subscription = source.subscribe(handler);
    inner.host = Some(HostBinding {
        source,
        subscription,
    });
    Ok(())
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state != SessionState::Closed {
            inner.release();
            inner.state = SessionState::Closed;
        }
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MediaSession")
            .field("state", &inner.state)
            .field("audio", &inner.audio)
            .field("video", &inner.video)
            .field("subtitle", &inner.subtitle)
            .field("thumbnail", &inner.thumbnail)
            .field("duration", &inner.duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use ffmpeg_types::{CodecId, CodecParameters, StreamInfo};

    use super::*;
    use crate::descriptor::AudioSubtype;
    use crate::engine::DecoderOptions;
    use crate::test_support::fixtures::{self, adts_audio, avc_video, cover_art, subtitle};
    use crate::test_support::{MockContainer, MockEngine, MockLog};

    fn open(engine: &MockEngine) -> Result<Arc<MediaSession>> {
        MediaSession::open_by_locator(engine, "movie.mp4", false, false, EngineOptions::new())
    }

    #[test]
    fn opens_avc_video_with_adts_audio() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let session = open(&engine).unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            session.provider_variant(MediaType::Video),
            Some(ProviderVariant::VideoPassthroughAvc)
        );
        assert_eq!(
            session.provider_variant(MediaType::Audio),
            Some(ProviderVariant::AudioPassthrough)
        );
        assert!(session.is_selected(MediaType::Audio));
        assert!(session.is_selected(MediaType::Video));
        assert_eq!(session.video_codec_name().as_deref(), Some("h264"));
        assert_eq!(session.audio_codec_name().as_deref(), Some("aac"));
        assert_eq!(session.duration(), Ticks(100_000_000));

        let host = session.media_stream_source().unwrap();
        let descriptors = host.stream_descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].media_type(), MediaType::Video);
        assert_eq!(
            descriptors[1].audio().map(|a| a.subtype.clone()),
            Some(AudioSubtype::AacAdts)
        );
        assert_eq!(host.duration(), Some(Ticks(100_000_000)));
        assert!(host.can_seek());
        assert!(host.has_subscriber());

        assert_eq!(engine.log.locator.lock().as_deref(), Some("movie.mp4"));
        let options = engine.log.decoder_options.lock().clone();
        assert_eq!(
            options,
            [
                (1, DecoderOptions::default()),
                (0, DecoderOptions::multithreaded())
            ]
        );
    }

    #[test]
    fn empty_locator_is_rejected() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let result = MediaSession::open_by_locator(&engine, "", false, false, EngineOptions::new());
        assert!(matches!(result, Err(InteropError::InvalidArgument("locator"))));
    }

    #[test]
    fn cover_art_becomes_thumbnail_not_video() {
        let container = MockContainer::new(vec![adts_audio(0), cover_art(1, b"\x89PNG")]);
        let engine = MockEngine::new(container);
        let session = open(&engine).unwrap();

        assert_eq!(session.provider_variant(MediaType::Video), None);
        assert_eq!(session.stream_id(MediaType::Video), None);
        let thumbnail = session.extract_thumbnail().unwrap();
        assert_eq!(thumbnail.data, b"\x89PNG");
        assert_eq!(thumbnail.extension, ".png");

        let host = session.media_stream_source().unwrap();
        assert_eq!(host.stream_descriptors().len(), 1);
    }

    #[test]
    fn no_thumbnail_for_regular_video() {
        let engine = MockEngine::new(fixtures::h264_aac());
        assert_eq!(open(&engine).unwrap().extract_thumbnail(), None);
    }

    #[test]
    fn first_recognized_subtitle_wins() {
        let container = MockContainer::new(vec![
            avc_video(0),
            adts_audio(1),
            subtitle(2, CodecId::WebVtt),
            subtitle(3, CodecId::Subrip),
            subtitle(4, CodecId::Ass),
        ]);
        let engine = MockEngine::new(container);
        let session = open(&engine).unwrap();

        assert_eq!(
            session.provider_variant(MediaType::Subtitle),
            Some(ProviderVariant::Subtitle)
        );
        assert_eq!(session.subtitle_codec_name().as_deref(), Some("subrip"));
        assert!(!session.is_selected(MediaType::Subtitle));

        let host = session.media_stream_source().unwrap();
        let kinds: Vec<_> = host
            .stream_descriptors()
            .iter()
            .map(|d| d.media_type())
            .collect();
        assert_eq!(kinds, [MediaType::Video, MediaType::Audio, MediaType::Subtitle]);
    }

    #[test]
    fn rejected_option_fails_the_open() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let options = EngineOptions::new().with("rtsp_transport", "tcp").with("bogus", 1);
        let result = MediaSession::open_by_locator(&engine, "rtsp://cam", false, false, options);
        assert!(matches!(result, Err(InteropError::InvalidConfiguration(ref k)) if k == "bogus"));
    }

    #[test]
    fn video_failure_releases_audio_and_container() {
        let mut container = fixtures::h264_aac();
        container.broken_decoders.insert(0);
        let engine = MockEngine::new(container);

        let result = open(&engine);
        assert!(matches!(result, Err(InteropError::OutOfMemory(_))));
        assert_eq!(
            engine.log.events(),
            ["decoder dropped", "container dropped"]
        );
    }

    #[test]
    fn probe_failure_is_an_open_failure() {
        let mut container = fixtures::h264_aac();
        container.fail_probe = true;
        let engine = MockEngine::new(container);
        assert!(matches!(open(&engine), Err(InteropError::OpenFailed(_))));
        assert_eq!(engine.log.events(), ["container dropped"]);
    }

    #[test]
    fn unopenable_input_is_an_open_failure() {
        let engine = MockEngine::empty();
        assert!(matches!(open(&engine), Err(InteropError::OpenFailed(_))));
    }

    #[test]
    fn forced_audio_decode_without_decoder_exposes_no_audio() {
        let mut container = fixtures::h264_aac();
        container.undecodable.insert(1);
        let engine = MockEngine::new(container);

        let session =
            MediaSession::open_by_locator(&engine, "a.mp4", true, false, EngineOptions::new())
                .unwrap();
        assert_eq!(session.provider_variant(MediaType::Audio), None);
        assert!(session.provider_variant(MediaType::Video).is_some());
    }

    #[test]
    fn forced_video_decode_uses_nv12() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let session =
            MediaSession::open_by_locator(&engine, "a.mp4", false, true, EngineOptions::new())
                .unwrap();
        assert_eq!(
            session.provider_variant(MediaType::Video),
            Some(ProviderVariant::VideoDecode)
        );
    }

    #[test]
    fn opus_without_decoder_passes_through() {
        let opus = StreamInfo::new(1, MediaType::Audio, CodecParameters::audio(CodecId::Opus, 48_000, 2));
        let mut container = MockContainer::new(vec![avc_video(0), opus]);
        container.undecodable.insert(1);
        let engine = MockEngine::new(container);
        let session = open(&engine).unwrap();

        assert_eq!(
            session.provider_variant(MediaType::Audio),
            Some(ProviderVariant::AudioPassthrough)
        );
        assert!(session.is_selected(MediaType::Audio));
        assert_eq!(session.audio_codec_name().as_deref(), Some("opus"));

        let host = session.media_stream_source().unwrap();
        let audio = host.stream_descriptors()[1].audio().cloned().unwrap();
        assert_eq!(audio.subtype, AudioSubtype::Other("OPUS"));
    }

    #[test]
    fn unknown_audio_without_decoder_is_not_exposed() {
        let vorbis = StreamInfo::new(1, MediaType::Audio, CodecParameters::audio(CodecId::Vorbis, 44_100, 2));
        let mut container = MockContainer::new(vec![avc_video(0), vorbis]);
        container.undecodable.insert(1);
        let engine = MockEngine::new(container);

        let session = open(&engine).unwrap();
        assert_eq!(session.provider_variant(MediaType::Audio), None);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn live_source_has_no_buffering() {
        let mut container = fixtures::h264_aac();
        container.duration = None;
        let engine = MockEngine::new(container);
        let session = open(&engine).unwrap();

        let host = session.media_stream_source().unwrap();
        assert_eq!(session.duration(), Ticks::ZERO);
        assert_eq!(host.buffer_time(), Some(Ticks::ZERO));
        assert_eq!(host.duration(), None);
        assert!(!host.can_seek());
    }

    struct LoggedStream {
        inner: Cursor<Vec<u8>>,
        log: Arc<MockLog>,
    }

    impl Read for LoggedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for LoggedStream {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl Drop for LoggedStream {
        fn drop(&mut self) {
            self.log.push("byte stream dropped");
        }
    }

    #[test]
    fn stream_open_reads_through_adapter_and_adopts_host() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let stream = LoggedStream {
            inner: Cursor::new(b"\0\0\0\x20ftypisom\0\0\x02\0isomiso2".to_vec()),
            log: Arc::clone(&engine.log),
        };
        let host = MediaStreamSource::new();

        let session = MediaSession::open_by_stream(
            &engine,
            stream,
            false,
            false,
            EngineOptions::new(),
            Some(Arc::clone(&host)),
        )
        .unwrap();

        assert!(Arc::ptr_eq(&session.media_stream_source().unwrap(), &host));
        assert_eq!(host.stream_descriptors().len(), 2);
        assert_eq!(
            engine.log.streamed.lock().as_deref(),
            Some(&b"\0\0\0\x20ftypisom\0\0\x02\0"[..])
        );

        session.close();
        assert_eq!(
            engine.log.events(),
            [
                "decoder dropped",
                "decoder dropped",
                "container dropped",
                "io adapter dropped",
                "byte stream dropped",
            ]
        );
    }

    #[test]
    fn close_is_idempotent_and_detaches_from_host() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let session = open(&engine).unwrap();
        let host = session.media_stream_source().unwrap();
        let video = session.stream_id(MediaType::Video).unwrap();

        session.close();
        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.media_stream_source().is_none());
        assert!(!host.has_subscriber());
        assert_eq!(host.request_sample(video), None);
        assert_eq!(engine.log.events().len(), 3);
    }

    #[test]
    fn dropping_the_session_releases_everything() {
        let engine = MockEngine::new(fixtures::h264_aac());
        let session = open(&engine).unwrap();
        let host = session.media_stream_source().unwrap();

        drop(session);
        assert!(!host.has_subscriber());
        assert_eq!(
            engine.log.events(),
            ["decoder dropped", "decoder dropped", "container dropped"]
        );
    }
}
