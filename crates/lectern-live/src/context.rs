//! State shared by the components of one session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::device::{CapabilityNegotiator, Device};
use crate::error::{LiveError, Result};
use crate::media::MediaEngine;
use crate::session::{SessionEvent, SessionStatus};
use crate::signaling::ScopedChannel;

/// Buffer size for the session event channel.
const EVENT_BUFFER: usize = 256;

/// Counter bumped on teardown. Async work captures the value when it
/// starts and discards its result if the value moved on.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) signaling: ScopedChannel,
    pub(crate) engine: Arc<dyn MediaEngine>,
    pub(crate) generation: Generation,
    pub(crate) cancel: CancellationToken,
    status_tx: Arc<watch::Sender<SessionStatus>>,
    event_tx: mpsc::Sender<SessionEvent>,
    device: Arc<Mutex<Option<Device>>>,
}

impl SessionContext {
    pub(crate) fn new(
        signaling: ScopedChannel,
        engine: Arc<dyn MediaEngine>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let ctx = Self {
            signaling,
            engine,
            generation: Generation::default(),
            cancel: CancellationToken::new(),
            status_tx: Arc::new(status_tx),
            event_tx,
            device: Arc::new(Mutex::new(None)),
        };
        (ctx, event_rx)
    }

    pub(crate) fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn current_status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(?status, "Session status changed");
            self.emit(SessionEvent::StatusChanged(status));
        }
    }

    /// Publish an event without ever blocking the caller.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!(error = %e, "Session event dropped");
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        !self.cancel.is_cancelled() && self.generation.is_current(generation)
    }

    pub(crate) fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(LiveError::Cancelled)
        }
    }

    /// Stop all work belonging to this session.
    pub(crate) fn invalidate(&self) -> u64 {
        self.cancel.cancel();
        self.generation.advance()
    }

    /// Loaded device, negotiating it on first use.
    pub(crate) async fn ensure_device(&self) -> Result<Device> {
        let generation = self.generation.current();
        let mut slot = self.device.lock().await;
        if let Some(device) = slot.as_ref().filter(|d| d.is_loaded()) {
            return Ok(device.clone());
        }
        let device = CapabilityNegotiator::new(self.signaling.clone(), Arc::clone(&self.engine))
            .negotiate()
            .await?;
        self.ensure_current(generation)?;
        *slot = Some(device.clone());
        Ok(device)
    }

    pub(crate) async fn device(&self) -> Option<Device> {
        self.device.lock().await.clone()
    }
}
