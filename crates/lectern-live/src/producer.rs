//! Publishing local tracks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::{LiveError, Result};
use crate::media::{Direction, MediaKind, MediaTrack};
use crate::protocol::events;
use crate::transport::TransportManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Running,
    Paused,
    Closed,
}

/// A local track accepted by the SFU.
#[derive(Debug, Clone)]
pub struct Producer {
    pub id: String,
    /// Publish transport the producer lives on.
    pub transport_id: String,
    pub track: MediaTrack,
    pub state: ProducerState,
}

impl Producer {
    pub fn kind(&self) -> MediaKind {
        self.track.kind()
    }
}

/// Owns the local tracks and producers of a publishing session.
///
/// Pause, resume and the toggles are no-ops when there is nothing to act
/// on, so UI controls can call them freely.
pub struct ProducerSession {
    ctx: SessionContext,
    transports: Arc<TransportManager>,
    producers: RwLock<Vec<Producer>>,
    tracks: RwLock<Vec<MediaTrack>>,
    stopped: AtomicBool,
}

impl ProducerSession {
    pub(crate) fn new(ctx: SessionContext, transports: Arc<TransportManager>) -> Self {
        Self {
            ctx,
            transports,
            producers: RwLock::new(Vec::new()),
            tracks: RwLock::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Produce every track on the connected publish transport.
    ///
    /// Producers left on an earlier publish transport are dropped first.
    /// If any track fails, the tracks of this call that were not produced
    /// are stopped and released.
    pub async fn start_publishing(&self, tracks: Vec<MediaTrack>) -> Result<Vec<Producer>> {
        let transport = self
            .transports
            .publish_transport()
            .await
            .filter(|t| t.is_connected())
            .ok_or(LiveError::TransportNotConnected(Direction::Publish))?;
        let generation = self.ctx.generation.current();

        self.retire_stale(transport.id(), &tracks).await;
        {
            let mut owned = self.tracks.write().await;
            for track in &tracks {
                if !owned.iter().any(|t| t.id() == track.id()) {
                    owned.push(track.clone());
                }
            }
        }

        let mut started = Vec::with_capacity(tracks.len());
        for (index, track) in tracks.iter().enumerate() {
            let produced = match transport.produce(track).await {
                Ok(_) if !self.ctx.is_current(generation) => Err(LiveError::Cancelled),
                other => other,
            };
            let id = match produced {
                Ok(id) => id,
                Err(e) => {
                    self.release(&tracks[index..]).await;
                    return Err(e);
                }
            };
            info!(producer_id = %id, kind = %track.kind(), "Producer started");
            let producer = Producer {
                id,
                transport_id: transport.id().to_string(),
                track: track.clone(),
                state: ProducerState::Running,
            };
            self.producers.write().await.push(producer.clone());
            started.push(producer);
        }
        Ok(started)
    }

    /// Drop producers that are not on `transport_id`. Their tracks are
    /// stopped unless `keep` publishes them again.
    async fn retire_stale(&self, transport_id: &str, keep: &[MediaTrack]) {
        let mut producers = self.producers.write().await;
        let (current, stale): (Vec<Producer>, Vec<Producer>) = producers
            .drain(..)
            .partition(|p| p.transport_id == transport_id && p.state != ProducerState::Closed);
        *producers = current;
        drop(producers);

        if stale.is_empty() {
            return;
        }
        debug!(count = stale.len(), "Dropping producers of a previous publish transport");
        let released: Vec<MediaTrack> = stale
            .into_iter()
            .map(|p| p.track)
            .filter(|t| !keep.iter().any(|k| k.id() == t.id()))
            .collect();
        self.release(&released).await;
    }

    /// Stop `tracks` and forget them.
    async fn release(&self, tracks: &[MediaTrack]) {
        let mut owned = self.tracks.write().await;
        for track in tracks {
            track.stop();
            owned.retain(|t| t.id() != track.id());
        }
    }

    pub async fn producers(&self) -> Vec<Producer> {
        self.producers.read().await.clone()
    }

    pub async fn producer(&self, kind: MediaKind) -> Option<Producer> {
        self.producers
            .read()
            .await
            .iter()
            .find(|p| p.kind() == kind)
            .cloned()
    }

    /// Pause the producer of `kind`, muting its track.
    pub async fn pause(&self, kind: MediaKind) {
        self.set_paused(kind, true).await;
    }

    pub async fn resume(&self, kind: MediaKind) {
        self.set_paused(kind, false).await;
    }

    async fn set_paused(&self, kind: MediaKind, paused: bool) {
        let mut producers = self.producers.write().await;
        let Some(producer) = producers
            .iter_mut()
            .find(|p| p.kind() == kind && p.state != ProducerState::Closed)
        else {
            debug!(%kind, paused, "No producer to toggle");
            return;
        };
        let target = if paused {
            ProducerState::Paused
        } else {
            ProducerState::Running
        };
        if producer.state == target {
            return;
        }
        producer.track.set_enabled(!paused);
        producer.state = target;
        debug!(producer_id = %producer.id, %kind, paused, "Producer toggled");
    }

    pub async fn toggle_camera(&self, enabled: bool) {
        self.set_paused(MediaKind::Video, !enabled).await;
    }

    pub async fn toggle_mic(&self, enabled: bool) {
        self.set_paused(MediaKind::Audio, !enabled).await;
    }

    /// Close producers, the publish transport and every local track, then
    /// tell the room the teacher left. Safe to call more than once.
    pub async fn stop_publishing(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        for producer in self.producers.write().await.iter_mut() {
            producer.state = ProducerState::Closed;
        }
        self.transports.close(Direction::Publish).await;
        for track in self.tracks.write().await.drain(..) {
            track.stop();
        }

        if let Err(e) = self
            .ctx
            .signaling
            .send(events::TEACHER_LEAVE_ROOM, Value::Null)
            .await
        {
            warn!(error = %e, "Failed to announce teacher leaving");
        }
        info!("Stopped publishing");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
