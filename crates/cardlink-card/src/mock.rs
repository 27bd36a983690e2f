//! Mock card transceiver for testing and development.
//!
//! Simulates a MIFARE Classic 1K card sitting on a reader: an in-memory
//! 64-block array with programmable authentication and I/O faults, plus a
//! log of every primitive the engine issued. All engine unit tests and the
//! relay's local-adapter tests run against this mock.

use std::collections::HashSet;

use crate::traits::CardTransceiver;
use cardlink_core::constants::{BLOCK_SIZE, TOTAL_BLOCKS};
use cardlink_core::{CardUid, Error, KeyType, Result};

/// In-memory card and fault injection for a single simulated reader.
///
/// # Examples
///
/// ```
/// use cardlink_card::{CardEngine, MockTransceiver};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cardlink_core::Result<()> {
/// let engine = CardEngine::new();
/// let mut reader = MockTransceiver::with_card("04ABCDEF");
///
/// let outcome = engine.read_card(&mut reader).await?;
/// assert_eq!(outcome.payload, None); // blank card
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockTransceiver {
    /// UID of the simulated card, `None` when the field is empty.
    uid: Option<CardUid>,

    /// Raw block contents.
    blocks: [[u8; BLOCK_SIZE]; TOTAL_BLOCKS as usize],

    /// Sectors that reject authentication.
    fail_auth_sectors: HashSet<u8>,

    /// Blocks that fail reads and writes.
    fail_io_blocks: HashSet<u8>,

    /// Every authentication issued: (block, key slot).
    auth_log: Vec<(u8, KeyType)>,

    /// Blocks successfully read, in order.
    reads: Vec<u8>,

    /// Blocks successfully written, in order.
    writes: Vec<u8>,
}

impl MockTransceiver {
    /// Reader with an empty field.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uid: None,
            blocks: [[0u8; BLOCK_SIZE]; TOTAL_BLOCKS as usize],
            fail_auth_sectors: HashSet::new(),
            fail_io_blocks: HashSet::new(),
            auth_log: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Reader with a blank card already present.
    ///
    /// # Panics
    ///
    /// Panics if `uid` is not a valid UID string; mocks are wired up with
    /// literals.
    #[must_use]
    pub fn with_card(uid: &str) -> Self {
        let mut mock = Self::new();
        mock.insert_card(CardUid::new(uid).expect("valid mock card UID"));
        mock
    }

    /// Place a card in the field.
    pub fn insert_card(&mut self, uid: CardUid) {
        self.uid = Some(uid);
    }

    /// Remove the card from the field.
    pub fn eject_card(&mut self) {
        self.uid = None;
    }

    /// Raw contents of one block.
    #[must_use]
    pub fn block(&self, block: u8) -> &[u8; BLOCK_SIZE] {
        &self.blocks[block as usize]
    }

    /// Overwrite one block directly, bypassing authentication. Test setup
    /// only; the engine never sees this path.
    pub fn set_block(&mut self, block: u8, data: [u8; BLOCK_SIZE]) {
        self.blocks[block as usize] = data;
    }

    /// Make the given sector reject authentication.
    pub fn fail_auth_on_sector(&mut self, sector: u8) {
        self.fail_auth_sectors.insert(sector);
    }

    /// Make the given block fail reads and writes.
    pub fn fail_io_on_block(&mut self, block: u8) {
        self.fail_io_blocks.insert(block);
    }

    /// Every authentication issued so far: (block, key slot).
    #[must_use]
    pub fn auth_log(&self) -> &[(u8, KeyType)] {
        &self.auth_log
    }

    /// Blocks successfully read, in order.
    #[must_use]
    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    /// Blocks successfully written, in order.
    #[must_use]
    pub fn writes(&self) -> &[u8] {
        &self.writes
    }

    fn require_card(&self) -> Result<()> {
        if self.uid.is_none() {
            return Err(Error::NoCardPresent);
        }
        Ok(())
    }
}

impl Default for MockTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl CardTransceiver for MockTransceiver {
    async fn card_present(&mut self) -> Result<Option<CardUid>> {
        Ok(self.uid.clone())
    }

    async fn authenticate(&mut self, block: u8, key_type: KeyType, _key: &[u8; 6]) -> Result<()> {
        self.require_card()?;
        let sector = crate::layout::sector_of(block);
        if self.fail_auth_sectors.contains(&sector) {
            return Err(Error::AuthenticationFailed { sector });
        }
        self.auth_log.push((block, key_type));
        Ok(())
    }

    async fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        self.require_card()?;
        if self.fail_io_blocks.contains(&block) {
            return Err(Error::block_io(block, "simulated read fault"));
        }
        self.reads.push(block);
        Ok(self.blocks[block as usize])
    }

    async fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.require_card()?;
        if self.fail_io_blocks.contains(&block) {
            return Err(Error::block_io(block, "simulated write fault"));
        }
        self.blocks[block as usize] = *data;
        self.writes.push(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_field_reports_no_card() {
        let mut mock = MockTransceiver::new();
        assert_eq!(mock.card_present().await.unwrap(), None);
        assert!(matches!(
            mock.read_block(4).await.unwrap_err(),
            Error::NoCardPresent
        ));
    }

    #[tokio::test]
    async fn test_insert_and_eject() {
        let mut mock = MockTransceiver::new();
        let uid = CardUid::new("DEADBEEF").unwrap();

        mock.insert_card(uid.clone());
        assert_eq!(mock.card_present().await.unwrap(), Some(uid));

        mock.eject_card();
        assert_eq!(mock.card_present().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let mut mock = MockTransceiver::with_card("04ABCDEF");
        let data = [0x5Au8; BLOCK_SIZE];

        mock.authenticate(4, KeyType::B, &[0xFF; 6]).await.unwrap();
        mock.write_block(4, &data).await.unwrap();
        assert_eq!(mock.read_block(4).await.unwrap(), data);
        assert_eq!(mock.writes(), &[4]);
        assert_eq!(mock.reads(), &[4]);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let mut mock = MockTransceiver::with_card("04ABCDEF");
        mock.fail_auth_on_sector(2);
        mock.fail_io_on_block(5);

        assert!(matches!(
            mock.authenticate(8, KeyType::A, &[0xFF; 6]).await.unwrap_err(),
            Error::AuthenticationFailed { sector: 2 }
        ));
        assert!(mock.authenticate(4, KeyType::A, &[0xFF; 6]).await.is_ok());
        assert!(matches!(
            mock.read_block(5).await.unwrap_err(),
            Error::BlockIoFailed { block: 5, .. }
        ));
        // Failed writes leave the block untouched and unrecorded.
        assert!(mock.write_block(5, &[1u8; BLOCK_SIZE]).await.is_err());
        assert_eq!(mock.block(5), &[0u8; BLOCK_SIZE]);
        assert!(mock.writes().is_empty());
    }
}
