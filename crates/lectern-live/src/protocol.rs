//! Wire protocol for the classroom signaling server.
//!
//! Every frame is an [`Envelope`]: an event name, a JSON payload, and an
//! optional `ref` used to pair requests with their answers. Media
//! negotiation rides on the `message` event with a `type` discriminator
//! ([`ClientSignal`] outbound, [`ServerSignal`] inbound). Chat and
//! whiteboard traffic use their own event names (see [`events`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::MediaKind;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names understood by the signaling server.
pub mod events {
    pub const MESSAGE: &str = "message";
    pub const NEW_PRODUCER: &str = "new-producer";
    pub const USER_JOIN_ROOM: &str = "user-join-room";
    pub const USER_MESSAGE: &str = "user-message";
    pub const NEW_MESSAGE: &str = "new-message";
    pub const GET_MESSAGES: &str = "get-messages";
    pub const WHITEBOARD_UPDATE: &str = "whiteboard-update";
    pub const WHITEBOARD_CLOSE: &str = "whiteboard-close";
    pub const REQUEST_WHITEBOARD_STATE: &str = "request-whiteboard-state";
    pub const TEACHER_LEAVE_ROOM: &str = "teacher-leave-room";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One frame on the signaling socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            msg_ref: None,
        }
    }

    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Opaque negotiation blobs
// ---------------------------------------------------------------------------

/// Codec and header-extension capabilities of the server's router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterCapabilities(pub Value);

/// Capabilities of the local device after loading the router's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// Server-side transport description returned by transport creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: String,
    #[serde(default)]
    pub ice_parameters: Value,
    #[serde(default)]
    pub ice_candidates: Value,
    #[serde(default)]
    pub dtls_parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

// ---------------------------------------------------------------------------
// Negotiation messages
// ---------------------------------------------------------------------------

/// Client-to-server negotiation requests, sent on the `message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientSignal {
    GetRouterRtpCapabilities,
    CreateProducerTransport {
        force_tcp: bool,
        rtp_capabilities: RtpCapabilities,
    },
    ConnectProducerTransport {
        dtls_parameters: DtlsParameters,
    },
    Produce {
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },
    CreateConsumerTransport {
        force_tcp: bool,
    },
    ConnectConsumerTransport {
        dtls_parameters: DtlsParameters,
    },
    Consume {
        rtp_capabilities: RtpCapabilities,
    },
    Resume,
}

impl ClientSignal {
    /// Wire name of the request, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ClientSignal::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            ClientSignal::CreateProducerTransport { .. } => "createProducerTransport",
            ClientSignal::ConnectProducerTransport { .. } => "connectProducerTransport",
            ClientSignal::Produce { .. } => "produce",
            ClientSignal::CreateConsumerTransport { .. } => "createConsumerTransport",
            ClientSignal::ConnectConsumerTransport { .. } => "connectConsumerTransport",
            ClientSignal::Consume { .. } => "consume",
            ClientSignal::Resume => "resume",
        }
    }
}

/// Server-to-client negotiation answers on the `message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerSignal {
    RouterCapabilities { data: RouterCapabilities },
    ProducerTransportCreated { data: TransportOptions },
    ProducerConnected,
    Produced { data: ProducedPayload },
    SubTransportCreated { data: TransportOptions },
    SubConnected,
    Subscribed { data: SubscribedPayload },
    Resumed,
    #[serde(other)]
    Unknown,
}

impl ServerSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ServerSignal::RouterCapabilities { .. } => "routerCapabilities",
            ServerSignal::ProducerTransportCreated { .. } => "producerTransportCreated",
            ServerSignal::ProducerConnected => "producerConnected",
            ServerSignal::Produced { .. } => "produced",
            ServerSignal::SubTransportCreated { .. } => "subTransportCreated",
            ServerSignal::SubConnected => "subConnected",
            ServerSignal::Subscribed { .. } => "subscribed",
            ServerSignal::Resumed => "resumed",
            ServerSignal::Unknown => "unknown",
        }
    }
}

/// Answer to `produce`: the server-issued producer id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProducedPayload {
    #[serde(default)]
    pub id: String,
}

/// Answer to `consume`. Either consumer options or an `error` string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub producer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub rtp_parameters: RtpParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validated consumer description handed to the media engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerOptions {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

impl SubscribedPayload {
    /// Check the payload carries everything needed to receive a track.
    pub fn into_options(self) -> Result<ConsumerOptions, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.id.is_empty() {
            return Err("subscribed payload has no consumer id".into());
        }
        if self.producer_id.is_empty() {
            return Err("subscribed payload has no producer id".into());
        }
        let kind = self
            .kind
            .ok_or_else(|| "subscribed payload has no media kind".to_string())?;
        Ok(ConsumerOptions {
            id: self.id,
            producer_id: self.producer_id,
            kind,
            rtp_parameters: self.rtp_parameters,
        })
    }
}

// ---------------------------------------------------------------------------
// Chat payloads
// ---------------------------------------------------------------------------

/// Outbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    pub message: String,
    pub room_id: String,
}

/// Acknowledgement of `get-messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl HistoryResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Chat text from a wire value. Servers send plain strings, but anything
/// else is kept in its JSON form rather than dropped.
pub fn message_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
