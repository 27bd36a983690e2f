//! Wire protocol for the cardlink relay.
//!
//! Both relay endpoints (bridge-facing and frontend-facing) exchange JSON
//! envelopes, one per line, over a duplex TCP connection. This crate owns
//! the envelope model ([`Envelope`], [`EnvelopeKind`]), request-id
//! generation for correlated request/response pairs, and the
//! [`EnvelopeCodec`] that integrates the framing with Tokio's `Framed`
//! streams.

pub mod builder;
pub mod codec;
pub mod envelope;
pub mod request_id;

pub use builder::EnvelopeBuilder;
pub use codec::EnvelopeCodec;
pub use envelope::{Envelope, EnvelopeKind};
pub use request_id::generate_request_id;
