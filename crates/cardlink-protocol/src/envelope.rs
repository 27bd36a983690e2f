//! Message envelope shared by both relay endpoints.
//!
//! Every message on the wire is a JSON object with a free-form `type` field
//! in the original protocol. Here the type is a closed enum with an explicit
//! [`EnvelopeKind::Unknown`] fallback so dispatch can be exhaustive: unknown
//! kinds are logged and ignored by the relay, never a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Known envelope kinds plus a passthrough for anything unrecognized.
///
/// Wire names are SCREAMING_SNAKE strings; [`EnvelopeKind::Unknown`] keeps
/// the original string so it can be logged and re-serialized verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeKind {
    // Card lifecycle events (bridge -> relay)
    CardDetected,
    CardRemoved,

    // Card commands (frontend -> relay -> bridge) and their results
    ReadCard,
    ReadResult,
    WriteCard,
    WriteResult,
    RemoveCardData,
    RemoveResult,

    // Reader lifecycle events
    ReaderConnected,
    ReaderDisconnected,
    ReaderError,

    // Session management
    BridgeConnected,
    BridgeDisconnected,
    Heartbeat,
    Status,

    // Failure surface
    Error,

    /// Anything not in the closed set above.
    Unknown(String),
}

impl EnvelopeKind {
    /// Wire representation of this kind.
    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::CardDetected => "CARD_DETECTED",
            Self::CardRemoved => "CARD_REMOVED",
            Self::ReadCard => "READ_CARD",
            Self::ReadResult => "READ_RESULT",
            Self::WriteCard => "WRITE_CARD",
            Self::WriteResult => "WRITE_RESULT",
            Self::RemoveCardData => "REMOVE_CARD_DATA",
            Self::RemoveResult => "REMOVE_RESULT",
            Self::ReaderConnected => "READER_CONNECTED",
            Self::ReaderDisconnected => "READER_DISCONNECTED",
            Self::ReaderError => "READER_ERROR",
            Self::BridgeConnected => "BRIDGE_CONNECTED",
            Self::BridgeDisconnected => "BRIDGE_DISCONNECTED",
            Self::Heartbeat => "HEARTBEAT",
            Self::Status => "STATUS",
            Self::Error => "ERROR",
            Self::Unknown(s) => s,
        }
    }

    /// Parse a wire name, falling back to [`EnvelopeKind::Unknown`].
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "CARD_DETECTED" => Self::CardDetected,
            "CARD_REMOVED" => Self::CardRemoved,
            "READ_CARD" => Self::ReadCard,
            "READ_RESULT" => Self::ReadResult,
            "WRITE_CARD" => Self::WriteCard,
            "WRITE_RESULT" => Self::WriteResult,
            "REMOVE_CARD_DATA" => Self::RemoveCardData,
            "REMOVE_RESULT" => Self::RemoveResult,
            "READER_CONNECTED" => Self::ReaderConnected,
            "READER_DISCONNECTED" => Self::ReaderDisconnected,
            "READER_ERROR" => Self::ReaderError,
            "BRIDGE_CONNECTED" => Self::BridgeConnected,
            "BRIDGE_DISCONNECTED" => Self::BridgeDisconnected,
            "HEARTBEAT" => Self::Heartbeat,
            "STATUS" => Self::Status,
            "ERROR" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// True for kinds that can settle a pending request: any `*RESULT`
    /// message, or `ERROR`.
    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Error) || self.as_wire().contains("RESULT")
    }

    /// True for every kind except [`EnvelopeKind::Unknown`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for EnvelopeKind {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<EnvelopeKind> for String {
    fn from(kind: EnvelopeKind) -> Self {
        kind.as_wire().to_string()
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// A single message on either relay endpoint.
///
/// Outbound envelopes from the relay always carry `type`, `payload` and
/// `timestamp`; `requestId` is present only on correlated request/response
/// pairs. Inbound envelopes without a timestamp get stamped on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message kind; dispatch key.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,

    /// Correlation id, present on request/response pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Event payload (card status, read results, reader names).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Command arguments (write payload, remove range).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// When the envelope was produced.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Human-readable failure description. Never a stack trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Outcome flag on `*_RESULT` envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Envelope {
    /// Bare envelope of the given kind, stamped now.
    #[must_use]
    pub fn event(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            request_id: None,
            payload: None,
            data: None,
            timestamp: Utc::now(),
            error: None,
            success: None,
        }
    }

    /// True if this envelope carries the given correlation id.
    #[must_use]
    pub fn matches_request(&self, request_id: &str) -> bool {
        self.request_id.as_deref() == Some(request_id)
    }

    /// True if this envelope can settle a pending request.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.kind.is_response()
    }

    /// True for `ERROR` envelopes and `*_RESULT` envelopes with
    /// `success == false`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Error) || self.success == Some(false)
    }
}
