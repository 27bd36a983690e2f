//! Duplex relay between hardware bridges and frontend sessions.
//!
//! The relay exposes two TCP endpoints: one for the hardware bridge
//! attached to the physical reader, one for any number of interactive
//! frontend sessions. Inbound envelopes are dispatched by kind, cached
//! card/reader state is kept for status snapshots, and commands forwarded
//! to the bridge are correlated with their responses through a
//! pending-request table.
//!
//! All mutable relay state (session registry, pending table, cached card
//! state) is owned by a single actor task; connection tasks talk to it
//! exclusively through message passing, so no locks are needed even on a
//! multi-threaded runtime.

pub mod local;
pub mod pending;
pub mod relay;
pub mod server;
pub mod session;

pub use local::LocalReaderAdapter;
pub use relay::{Relay, RelayConfig, RelayHandle, RelaySnapshot};
pub use server::{RelayServer, RelayServerConfig};
pub use session::{NfcSession, SessionRegistry};
