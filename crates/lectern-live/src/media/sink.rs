use async_trait::async_trait;

use super::{EngineError, MediaStream};

/// Renders a remote stream (a video element, a window, a recorder).
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Replace whatever the sink shows with `stream`.
    fn bind(&self, stream: &MediaStream);

    /// Show the "waiting for the teacher" placeholder.
    fn show_placeholder(&self);

    /// Resolve once the currently bound stream renders its first frame.
    async fn first_frame(&self) -> Result<(), EngineError>;

    /// Stop rendering and drop the bound stream.
    fn detach(&self);
}
