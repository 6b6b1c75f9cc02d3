//! Binding received tracks to a media sink.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::media::{MediaSink, MediaStream, MediaTrack};
use crate::session::SessionEvent;

/// What the attached sink is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No sink attached and nothing received.
    Detached,
    /// Sink attached, no tracks yet.
    Placeholder,
    /// Tracks received, no sink attached yet.
    Buffering,
    /// Stream bound, waiting for the first rendered frame.
    Starting,
    Playing,
}

struct Attachment {
    stream: MediaStream,
    sink: Option<Arc<dyn MediaSink>>,
    /// Bumped on every bind so a stale first-frame wait is ignored.
    epoch: u64,
}

/// Aggregates remote tracks into one stream and keeps the sink bound to it.
pub struct StreamAttachment {
    ctx: SessionContext,
    state: Arc<Mutex<Attachment>>,
    playback_tx: Arc<watch::Sender<PlaybackState>>,
}

impl StreamAttachment {
    pub(crate) fn new(ctx: SessionContext) -> Self {
        let (playback_tx, _) = watch::channel(PlaybackState::Detached);
        Self {
            ctx,
            state: Arc::new(Mutex::new(Attachment {
                stream: MediaStream::new(),
                sink: None,
                epoch: 0,
            })),
            playback_tx: Arc::new(playback_tx),
        }
    }

    pub fn playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback_tx.subscribe()
    }

    pub fn playback_state(&self) -> PlaybackState {
        *self.playback_tx.borrow()
    }

    pub async fn stream(&self) -> MediaStream {
        self.state.lock().await.stream.clone()
    }

    /// Attach a sink. Tracks received earlier are bound right away;
    /// otherwise the sink shows its placeholder.
    pub async fn set_sink(&self, sink: Arc<dyn MediaSink>) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.sink.take() {
            previous.detach();
        }
        state.sink = Some(sink);
        if state.stream.is_empty() {
            if let Some(sink) = &state.sink {
                sink.show_placeholder();
            }
            self.playback_tx.send_replace(PlaybackState::Placeholder);
        } else {
            self.bind(&mut state);
        }
    }

    /// Add a received track and rebind the aggregate stream.
    pub(crate) async fn add_track(&self, track: MediaTrack) {
        let mut state = self.state.lock().await;
        if !state.stream.add_track(track) {
            return;
        }
        if state.sink.is_some() {
            self.bind(&mut state);
        } else {
            debug!(tracks = state.stream.len(), "Track buffered until a sink is attached");
            self.playback_tx.send_replace(PlaybackState::Buffering);
        }
    }

    fn bind(&self, state: &mut Attachment) {
        let Some(sink) = state.sink.clone() else {
            return;
        };
        state.epoch += 1;
        sink.bind(&state.stream);
        self.playback_tx.send_replace(PlaybackState::Starting);

        let epoch = state.epoch;
        let shared = Arc::clone(&self.state);
        let playback_tx = Arc::clone(&self.playback_tx);
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let rendered = tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                rendered = sink.first_frame() => rendered,
            };
            if shared.lock().await.epoch != epoch {
                return;
            }
            match rendered {
                Ok(()) => {
                    info!("Remote stream playing");
                    playback_tx.send_replace(PlaybackState::Playing);
                    ctx.emit(SessionEvent::Playing);
                }
                Err(e) => {
                    // Playback aborted, typically by a newer bind.
                    warn!(error = %e, "Remote stream did not start playing");
                }
            }
        });
    }

    /// Stop all received tracks but keep the sink, which falls back to its
    /// placeholder until tracks arrive again.
    pub(crate) async fn reset_stream(&self) {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.stream.stop_all();
        let playback = match &state.sink {
            Some(sink) => {
                sink.show_placeholder();
                PlaybackState::Placeholder
            }
            None => PlaybackState::Detached,
        };
        self.playback_tx.send_replace(playback);
    }

    /// Stop all received tracks and detach the sink.
    pub(crate) async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.stream.stop_all();
        if let Some(sink) = state.sink.take() {
            sink.detach();
        }
        self.playback_tx.send_replace(PlaybackState::Detached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::testing::{loopback_channel, settle, test_context, FakeEngine, RecordingSink};

    fn attachment() -> (StreamAttachment, crate::signaling::SignalingChannel) {
        let (channel, _server) = loopback_channel();
        let (ctx, _events) = test_context(&channel, Arc::new(FakeEngine::default()));
        (StreamAttachment::new(ctx), channel)
    }

    #[tokio::test]
    async fn sink_without_tracks_shows_placeholder() {
        let (attachment, _channel) = attachment();
        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;

        assert_eq!(sink.placeholder_count(), 1);
        assert!(sink.binds().is_empty());
        assert_eq!(attachment.playback_state(), PlaybackState::Placeholder);
    }

    #[tokio::test]
    async fn tracks_before_sink_are_buffered() {
        let (attachment, _channel) = attachment();
        attachment
            .add_track(MediaTrack::new("v", MediaKind::Video))
            .await;
        attachment
            .add_track(MediaTrack::new("a", MediaKind::Audio))
            .await;
        assert_eq!(attachment.playback_state(), PlaybackState::Buffering);

        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;
        assert_eq!(sink.binds(), vec![2]);
        assert_eq!(sink.placeholder_count(), 0);
        assert_eq!(attachment.playback_state(), PlaybackState::Starting);
    }

    #[tokio::test]
    async fn playing_is_reported_after_first_frame() {
        let (attachment, _channel) = attachment();
        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;
        attachment
            .add_track(MediaTrack::new("v", MediaKind::Video))
            .await;

        settle().await;
        assert_eq!(attachment.playback_state(), PlaybackState::Starting);

        sink.deliver_frame();
        let mut playback = attachment.playback();
        playback
            .wait_for(|s| *s == PlaybackState::Playing)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn each_new_track_rebinds_the_aggregate() {
        let (attachment, _channel) = attachment();
        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;
        let video = MediaTrack::new("v", MediaKind::Video);
        attachment.add_track(video.clone()).await;
        attachment.add_track(video).await;
        attachment
            .add_track(MediaTrack::new("a", MediaKind::Audio))
            .await;

        assert_eq!(sink.binds(), vec![1, 2]);
        assert_eq!(attachment.stream().await.len(), 2);
    }

    #[tokio::test]
    async fn reset_stream_keeps_the_sink() {
        let (attachment, _channel) = attachment();
        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;
        let video = MediaTrack::new("v", MediaKind::Video);
        attachment.add_track(video.clone()).await;

        attachment.reset_stream().await;
        assert!(video.is_stopped());
        assert!(attachment.stream().await.is_empty());
        assert_eq!(sink.detach_count(), 0);
        assert_eq!(sink.placeholder_count(), 2);
        assert_eq!(attachment.playback_state(), PlaybackState::Placeholder);

        let audio = MediaTrack::new("a", MediaKind::Audio);
        attachment.add_track(audio).await;
        assert_eq!(attachment.playback_state(), PlaybackState::Starting);
    }

    #[tokio::test]
    async fn clear_stops_tracks_and_detaches() {
        let (attachment, _channel) = attachment();
        let sink = Arc::new(RecordingSink::default());
        attachment.set_sink(sink.clone()).await;
        let video = MediaTrack::new("v", MediaKind::Video);
        attachment.add_track(video.clone()).await;

        attachment.clear().await;
        assert!(video.is_stopped());
        assert_eq!(sink.detach_count(), 1);
        assert!(attachment.stream().await.is_empty());
        assert_eq!(attachment.playback_state(), PlaybackState::Detached);
    }
}
