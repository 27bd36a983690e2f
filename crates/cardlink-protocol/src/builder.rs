//! Fluent construction of outbound envelopes.
//!
//! The relay builds a lot of envelopes: status pushes, rebroadcasts,
//! correlated commands, error surfaces. The builder keeps those call sites
//! declarative.
//!
//! # Example
//!
//! ```
//! use cardlink_protocol::{EnvelopeBuilder, EnvelopeKind};
//! use serde_json::json;
//!
//! let envelope = EnvelopeBuilder::new(EnvelopeKind::ReadResult)
//!     .request_id("READ_CARD-1700000000000-a1b2c3d4")
//!     .payload(json!({ "payload": "7B2269..." }))
//!     .success(true)
//!     .build();
//!
//! assert!(envelope.is_response());
//! ```

use crate::envelope::{Envelope, EnvelopeKind};
use serde_json::Value;

/// Builder for [`Envelope`] values.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    /// Start building an envelope of the given kind, stamped now.
    #[must_use]
    pub fn new(kind: EnvelopeKind) -> Self {
        Self {
            envelope: Envelope::event(kind),
        }
    }

    /// Set the correlation id.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.envelope.request_id = Some(request_id.into());
        self
    }

    /// Set the event payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.envelope.payload = Some(payload);
        self
    }

    /// Set the command arguments.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.envelope.data = Some(data);
        self
    }

    /// Set the human-readable error string.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.envelope.error = Some(error.into());
        self
    }

    /// Set the outcome flag.
    #[must_use]
    pub fn success(mut self, success: bool) -> Self {
        self.envelope.success = Some(success);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Envelope {
        self.envelope
    }
}
