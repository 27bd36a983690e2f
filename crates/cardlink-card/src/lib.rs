//! MIFARE Classic card engine.
//!
//! This crate owns everything that touches card blocks: the sector/trailer
//! layout math, the [`CardTransceiver`] abstraction over reader hardware,
//! and the [`CardEngine`] read/write/erase algorithms built on top of it.
//! The engine is transport-agnostic: the same algorithms run against a
//! remote bridge, a locally attached PC/SC reader (`hardware-pcsc`
//! feature), or the in-memory [`MockTransceiver`] used by tests.
//!
//! All traits use native `async fn` methods (Edition 2024 RPITIT), so no
//! `async_trait` macro is needed.

#![allow(async_fn_in_trait)]

pub mod credential;
pub mod engine;
pub mod layout;
pub mod mock;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc_reader;
pub mod traits;

pub use credential::{CardCredential, CredentialKind, CredentialRequest, CredentialSource};
pub use engine::{CardEngine, EngineConfig, ReadOutcome, RemoveOutcome, WriteOutcome};
pub use mock::MockTransceiver;
pub use traits::CardTransceiver;
