/*!
    Host event handling: start/seek, sample requests and stream switches.

    Every handler runs under the session lock, the same lock teardown
    takes, so a request racing with [`MediaSession::close`] either completes
    first or finds the session closed.
*/

use ffmpeg_types::Ticks;

use crate::descriptor::StreamId;
use crate::host::StreamSourceEvents;
use crate::provider::MediaSample;
use crate::session::{MediaSession, SeekPhase, SessionInner};

impl SessionInner {
    /**
        Seek every selected stream to `position`.

        The reference stream is video if present, otherwise audio. On success
        every selected provider is re-enabled and flushed and its decoder
        reset, so nothing decoded before the seek leaks out after it.
    */
    fn seek_to(&mut self, position: Ticks) {
        let Some(reference) = self.video.as_ref().or(self.audio.as_ref()) else {
            return;
        };
        let timing = reference.timing;
        let target = (self.start_offset + position).to_pts(timing.time_base);

        let Some(reader) = self.reader.as_mut() else {
            return;
        };

        self.seek_phase = SeekPhase::SeekRequested;
        tracing::debug!(
            stream = timing.stream_index,
            position = position.0,
            target,
            "seeking"
        );

        match reader.seek(timing.stream_index, target) {
            Ok(()) => {
                self.seek_phase = SeekPhase::Flushing;
                for slot in [&mut self.audio, &mut self.video, &mut self.subtitle]
                    .into_iter()
                    .flatten()
                    .filter(|slot| slot.is_selected())
                {
                    slot.provider.enable();
                    slot.provider.flush();
                    reader.flush(slot.stream_index());
                    slot.reset_decoder();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, target, "seek failed");
            }
        }

        self.seek_phase = SeekPhase::Idle;
    }
}

impl StreamSourceEvents for MediaSession {
    fn starting(&self, position: Option<Ticks>) -> Option<Ticks> {
        let mut inner = self.inner.lock();
        if !inner.is_live() {
            return None;
        }

        let position = position?;
        if position <= inner.duration {
            inner.seek_to(position);
        } else {
            tracing::debug!(
                position = position.0,
                duration = inner.duration.0,
                "start position past the end, not seeking"
            );
        }
        Some(position)
    }

    fn sample_requested(&self, stream: StreamId) -> Option<MediaSample> {
        let mut inner = self.inner.lock();
        if !inner.is_live() {
            return None;
        }

        let Some((slot, reader)) = inner.slot_and_reader(stream) else {
            tracing::debug!(%stream, "sample requested for unknown stream");
            return None;
        };

        match slot.produce(reader) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(
                    stream = slot.stream_index(),
                    error = %e,
                    "sample production failed"
                );
                None
            }
        }
    }

    fn switch_streams_requested(&self, old: Option<StreamId>, new: Option<StreamId>) {
        let mut inner = self.inner.lock();
        if !inner.is_live() {
            return;
        }

        if let Some(id) = old {
            if let Some((slot, reader)) = inner.slot_and_reader(id) {
                tracing::debug!(stream = slot.stream_index(), "deselecting stream");
                slot.deselect(reader);
            }
        }

        if let Some(id) = new {
            if let Some((slot, reader)) = inner.slot_and_reader(id) {
                tracing::debug!(stream = slot.stream_index(), "selecting stream");
                slot.select(reader);
            }
        }
    }
}
