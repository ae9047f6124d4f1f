/*!
    Host-side media stream source.

    [`MediaStreamSource`] is what a playback pipeline holds on to: the list of
    published stream descriptors, duration/seekability hints, and a single
    event subscription through which it drives the session (start, sample
    and stream-switch requests).
*/

use std::sync::{Arc, Weak};

use ffmpeg_types::Ticks;
use parking_lot::Mutex;

use crate::descriptor::{StreamDescriptor, StreamId};
use crate::provider::MediaSample;

/**
    Callbacks the host raises on its subscriber.
*/
pub trait StreamSourceEvents: Send + Sync {
    /**
        Playback is (re)starting, optionally at `position`. Returns the
        actual start position to acknowledge, if any.
    */
    fn starting(&self, position: Option<Ticks>) -> Option<Ticks>;

    /**
        The host wants the next sample of `stream`. `None` means no sample
        (end of stream, failure, or a closed session).
    */
    fn sample_requested(&self, stream: StreamId) -> Option<MediaSample>;

    /**
        The host deselects `old` and selects `new`. Either side may be absent.
    */
    fn switch_streams_requested(&self, old: Option<StreamId>, new: Option<StreamId>);
}

/**
    Token returned by [`MediaStreamSource::subscribe`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct HostState {
    descriptors: Vec<Arc<StreamDescriptor>>,
    duration: Option<Ticks>,
    can_seek: bool,
    buffer_time: Option<Ticks>,
    actual_start: Option<Ticks>,
    handler: Option<(SubscriptionId, Weak<dyn StreamSourceEvents>)>,
    next_subscription: u64,
}

/**
    The host-facing session handle.

    Holds only a weak reference to its event handler, so it never keeps a
    session alive. Its own lock is released before any handler is invoked.
*/
#[derive(Default)]
pub struct MediaStreamSource {
    state: Mutex<HostState>,
}

impl MediaStreamSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_stream_descriptor(&self, descriptor: Arc<StreamDescriptor>) {
        self.state.lock().descriptors.push(descriptor);
    }

    /**
        Published descriptors, in registration order.
    */
    pub fn stream_descriptors(&self) -> Vec<Arc<StreamDescriptor>> {
        self.state.lock().descriptors.clone()
    }

    pub fn set_duration(&self, duration: Ticks) {
        self.state.lock().duration = Some(duration);
    }

    pub fn duration(&self) -> Option<Ticks> {
        self.state.lock().duration
    }

    pub fn set_can_seek(&self, can_seek: bool) {
        self.state.lock().can_seek = can_seek;
    }

    pub fn can_seek(&self) -> bool {
        self.state.lock().can_seek
    }

    /**
        How much media the host should buffer before playing. Zero for live
        sources.
    */
    pub fn set_buffer_time(&self, buffer_time: Ticks) {
        self.state.lock().buffer_time = Some(buffer_time);
    }

    pub fn buffer_time(&self) -> Option<Ticks> {
        self.state.lock().buffer_time
    }

    /**
        Start position acknowledged by the last [`MediaStreamSource::start`].
    */
    pub fn actual_start_position(&self) -> Option<Ticks> {
        self.state.lock().actual_start
    }

    /**
        Register the event handler, replacing any previous one.
    */
    pub fn subscribe(&self, handler: Weak<dyn StreamSourceEvents>) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.handler = Some((id, handler));
        id
    }

    /**
        Remove the handler registered under `id`. Unknown ids are ignored.
    */
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        if state.handler.as_ref().is_some_and(|(current, _)| *current == id) {
            state.handler = None;
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.state
            .lock()
            .handler
            .as_ref()
            .is_some_and(|(_, handler)| handler.strong_count() > 0)
    }

    fn handler(&self) -> Option<Arc<dyn StreamSourceEvents>> {
        self.state
            .lock()
            .handler
            .as_ref()
            .and_then(|(_, handler)| handler.upgrade())
    }

    /**
        Raise the starting event and record the acknowledged position.
    */
    pub fn start(&self, position: Option<Ticks>) -> Option<Ticks> {
        let actual = self.handler()?.starting(position);
        if actual.is_some() {
            self.state.lock().actual_start = actual;
        }
        actual
    }

    pub fn request_sample(&self, stream: StreamId) -> Option<MediaSample> {
        self.handler()?.sample_requested(stream)
    }

    pub fn switch_streams(&self, old: Option<StreamId>, new: Option<StreamId>) {
        if let Some(handler) = self.handler() {
            handler.switch_streams_requested(old, new);
        }
    }
}

impl std::fmt::Debug for MediaStreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MediaStreamSource")
            .field("streams", &state.descriptors.len())
            .field("duration", &state.duration)
            .field("can_seek", &state.can_seek)
            .field("buffer_time", &state.buffer_time)
            .field("subscribed", &state.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        starts: AtomicUsize,
        switches: AtomicUsize,
    }

    impl StreamSourceEvents for Recorder {
        fn starting(&self, position: Option<Ticks>) -> Option<Ticks> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            position
        }

        fn sample_requested(&self, _: StreamId) -> Option<MediaSample> {
            None
        }

        fn switch_streams_requested(&self, _: Option<StreamId>, _: Option<StreamId>) {
            self.switches.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn events_reach_the_subscriber() {
        let host = MediaStreamSource::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn StreamSourceEvents> = Arc::downgrade(&recorder) as _;
        host.subscribe(weak);

        assert_eq!(host.start(Some(Ticks(5))), Some(Ticks(5)));
        assert_eq!(host.actual_start_position(), Some(Ticks(5)));
        host.switch_streams(None, None);
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.switches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_host_is_silent() {
        let host = MediaStreamSource::new();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn StreamSourceEvents> = Arc::downgrade(&recorder) as _;
        let id = host.subscribe(weak);
        host.unsubscribe(id);

        assert!(!host.has_subscriber());
        assert_eq!(host.start(Some(Ticks(1))), None);
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stale_subscription_id_is_ignored() {
        let host = MediaStreamSource::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let old = host.subscribe(Arc::downgrade(&first) as Weak<dyn StreamSourceEvents>);
        host.subscribe(Arc::downgrade(&second) as Weak<dyn StreamSourceEvents>);

        host.unsubscribe(old);
        assert!(host.has_subscriber());
        host.start(None);
        assert_eq!(second.starts.load(Ordering::SeqCst), 1);
        assert_eq!(first.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_handler_is_not_kept_alive() {
        let host = MediaStreamSource::new();
        let recorder = Arc::new(Recorder::default());
        host.subscribe(Arc::downgrade(&recorder) as Weak<dyn StreamSourceEvents>);
        drop(recorder);
        assert!(!host.has_subscriber());
        assert_eq!(host.request_sample(ForeignStreamId::any()), None);
    }

    struct ForeignStreamId;

    impl ForeignStreamId {
        fn any() -> StreamId {
            use crate::descriptor::{EncodingProperties, SubtitleSubtype, TimedTextEncoding};
            StreamDescriptor::new(EncodingProperties::TimedText(TimedTextEncoding {
                subtype: SubtitleSubtype::Srt,
                format_user_data: Vec::new(),
            }))
            .id()
        }
    }
}
