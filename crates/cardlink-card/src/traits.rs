//! Reader hardware abstraction.
//!
//! [`CardTransceiver`] is the contract between the card engine and whatever
//! is physically talking to the card: a PC/SC reader, a remote bridge, or
//! the in-memory mock. The engine only ever issues the four primitive
//! operations below; all sector-skip and re-authentication policy lives in
//! the engine itself so the algorithms stay testable without hardware.
//!
//! # Object safety and dynamic dispatch
//!
//! The trait is NOT object-safe: `async fn` methods return opaque
//! `impl Future` types (Edition 2024 RPITIT), so `Box<dyn CardTransceiver>`
//! does not work. Use generic type parameters instead:
//!
//! ```no_run
//! use cardlink_card::CardTransceiver;
//! use cardlink_core::Result;
//!
//! async fn probe<T: CardTransceiver>(reader: &mut T) -> Result<bool> {
//!     Ok(reader.card_present().await?.is_some())
//! }
//! ```

use cardlink_core::constants::BLOCK_SIZE;
use cardlink_core::{CardUid, KeyType, Result};

/// Primitive block-level operations against a single reader.
///
/// Implementations may hold per-card connection state; the engine drives
/// one operation at a time, mirroring the serial nature of the hardware
/// (a reader services one authenticate/read/write transaction at a time).
pub trait CardTransceiver: Send {
    /// Probe for a card in the reader's field.
    ///
    /// Returns the card UID if one is present, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader itself is unreachable. An empty
    /// field is not an error.
    async fn card_present(&mut self) -> Result<Option<CardUid>>;

    /// Authenticate the sector containing `block` with the given key.
    ///
    /// MIFARE Classic authentication is per sector; authenticating any
    /// block of a sector unlocks all four of its blocks until the card
    /// leaves the field or another sector is authenticated.
    ///
    /// # Errors
    ///
    /// Returns `Error::AuthenticationFailed` if the card rejects the key,
    /// `Error::NoCardPresent` if the card left the field.
    async fn authenticate(&mut self, block: u8, key_type: KeyType, key: &[u8; 6]) -> Result<()>;

    /// Read one 16-byte block.
    ///
    /// # Errors
    ///
    /// Returns `Error::BlockIoFailed` on a transfer error; the sector must
    /// have been authenticated first.
    async fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]>;

    /// Write one 16-byte block.
    ///
    /// # Errors
    ///
    /// Returns `Error::BlockIoFailed` on a transfer error; the sector must
    /// have been authenticated first.
    async fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()>;
}
