//! Router capability negotiation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LiveError, Result};
use crate::media::MediaEngine;
use crate::protocol::{ClientSignal, RouterCapabilities, RtpCapabilities, ServerSignal};
use crate::signaling::ScopedChannel;

/// The local media device. Starts unloaded; transport creation and
/// produce/consume all require it loaded.
#[derive(Debug, Clone, Default)]
pub struct Device {
    router: Option<RouterCapabilities>,
    rtp: Option<RtpCapabilities>,
}

impl Device {
    pub fn unloaded() -> Self {
        Self::default()
    }

    pub(crate) fn loaded(router: RouterCapabilities, rtp: RtpCapabilities) -> Self {
        Self {
            router: Some(router),
            rtp: Some(rtp),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.rtp.is_some()
    }

    pub fn rtp_capabilities(&self) -> Result<&RtpCapabilities> {
        self.rtp.as_ref().ok_or(LiveError::DeviceNotReady)
    }

    pub fn router_capabilities(&self) -> Option<&RouterCapabilities> {
        self.router.as_ref()
    }
}

/// Fetches the router's capabilities and loads them into a [`Device`].
pub struct CapabilityNegotiator {
    signaling: ScopedChannel,
    engine: Arc<dyn MediaEngine>,
}

impl CapabilityNegotiator {
    pub fn new(signaling: ScopedChannel, engine: Arc<dyn MediaEngine>) -> Self {
        Self { signaling, engine }
    }

    /// Ask the server for its router capabilities and load them.
    pub async fn negotiate(&self) -> Result<Device> {
        debug!("Requesting router capabilities");
        let answer = self
            .signaling
            .request(&ClientSignal::GetRouterRtpCapabilities)
            .await
            .map_err(|e| match e {
                LiveError::Cancelled => LiveError::Cancelled,
                other => LiveError::CapabilityLoad(other.to_string()),
            })?;

        let router = match answer {
            ServerSignal::RouterCapabilities { data } => data,
            other => {
                return Err(LiveError::CapabilityLoad(format!(
                    "expected routerCapabilities, got {}",
                    other.name()
                )))
            }
        };

        let rtp = self
            .engine
            .load(&router)
            .await
            .map_err(|e| LiveError::CapabilityLoad(e.to_string()))?;

        info!("Device loaded with router capabilities");
        Ok(Device::loaded(router, rtp))
    }
}
