//! Block-level read, write and erase algorithms.
//!
//! All three operations walk raw block numbers, skip sector trailers, and
//! authenticate with a well-known default key. They differ deliberately in
//! two places:
//!
//! - **Authentication caching**: the read and erase scans re-authenticate
//!   only when the sector index changes, because one sector's four blocks
//!   share a key — this halves the hardware round-trips. Write
//!   authenticates every block it touches.
//! - **Failure policy**: read and write stop at the first failing block;
//!   erase is best-effort and keeps going, because the goal of an erase is
//!   to clear as much residual data as possible even on a faulty card.
//!
//! The "last authenticated sector" is explicit traversal state threaded
//! through each scan, never ambient engine state, so the algorithms are
//! testable against the mock without a real reader.

use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::layout::{is_addressable, is_sector_trailer, sector_of};
use crate::traits::CardTransceiver;
use cardlink_core::buffer::{encode_hex, json_to_buffer, trim_trailing_zeros};
use cardlink_core::constants::{
    BLOCK_SIZE, DATA_START_BLOCK, DEFAULT_KEY, ERASE_START_BLOCK, LAST_BLOCK, PAYLOAD_TERMINATOR,
};
use cardlink_core::{CardUid, Error, KeyType, Result};

/// Key selection and scan-start configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key slot used when authenticating for reads.
    pub read_key: KeyType,

    /// Key slot used when authenticating for writes and erases.
    pub write_key: KeyType,

    /// The 6-byte sector key. Factory-default transport key unless the
    /// deployment re-keys its cards.
    pub key: [u8; 6],

    /// First block of the payload region.
    pub start_block: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_key: KeyType::A,
            write_key: KeyType::B,
            key: DEFAULT_KEY,
            start_block: DATA_START_BLOCK,
        }
    }
}

/// Result of a full-card read scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    /// UID of the card that was read.
    pub uid: CardUid,

    /// Hex-encoded payload after trailing-zero trimming, `None` if the
    /// card holds no data.
    pub payload: Option<String>,

    /// Number of data blocks appended before the scan stopped.
    pub blocks_read: u8,

    /// Set when the scan aborted early (authentication or I/O failure).
    /// The payload still carries whatever was accumulated before the
    /// failure.
    pub error: Option<String>,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Number of 16-byte blocks written.
    pub blocks_written: u8,

    /// Total bytes written, including zero padding.
    pub bytes_written: usize,
}

/// Result of a best-effort erase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Blocks overwritten with zeros.
    pub cleared: Vec<u8>,

    /// Blocks that failed to authenticate or write.
    pub failed: Vec<u8>,
}

impl RemoveOutcome {
    /// True if every targeted block was cleared.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Coerce a frontend-supplied write payload into a JSON value.
///
/// Strings are parsed as JSON first; anything that fails to parse is
/// wrapped as `{"data": <string>}`. This two-branch fallback is
/// intentional: frontends historically sent both serialized objects and
/// bare strings, and both must land on the card as valid JSON.
#[must_use]
pub fn coerce_write_payload(input: &Value) -> Value {
    match input {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({ "data": s })),
        other => other.clone(),
    }
}

/// Block-level card operations over any [`CardTransceiver`].
#[derive(Debug, Clone, Default)]
pub struct CardEngine {
    config: EngineConfig,
}

impl CardEngine {
    /// Engine with default key/layout configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with explicit configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Get the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scan the card's data region and return its payload.
    ///
    /// Starts at the configured start block and walks to the last block,
    /// skipping sector trailers and authenticating once per sector with
    /// the read key. A block whose first byte is `0x00` terminates the
    /// scan (the block is not appended). The accumulated bytes are
    /// trailing-zero trimmed and hex encoded.
    ///
    /// On an authentication or I/O failure the scan stops and returns the
    /// partial payload with [`ReadOutcome::error`] set.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCardPresent` if the reader's field is empty, or
    /// a reader-level error from the presence probe.
    pub async fn read_card<T: CardTransceiver>(&self, reader: &mut T) -> Result<ReadOutcome> {
        let uid = reader.card_present().await?.ok_or(Error::NoCardPresent)?;
        debug!(uid = %uid, start_block = self.config.start_block, "starting card read scan");

        let mut data: Vec<u8> = Vec::new();
        let mut blocks_read: u8 = 0;
        let mut scan_error: Option<String> = None;
        let mut last_auth_sector: Option<u8> = None;

        for block in self.config.start_block..=LAST_BLOCK {
            if is_sector_trailer(block) {
                trace!(block, "skipping sector trailer");
                continue;
            }

            let sector = sector_of(block);
            if last_auth_sector != Some(sector) {
                match reader
                    .authenticate(block, self.config.read_key, &self.config.key)
                    .await
                {
                    Ok(()) => last_auth_sector = Some(sector),
                    Err(e) => {
                        warn!(sector, error = %e, "read scan aborted: authentication failed");
                        scan_error = Some(e.to_string());
                        break;
                    }
                }
            }

            match reader.read_block(block).await {
                Ok(chunk) => {
                    if chunk[0] == PAYLOAD_TERMINATOR {
                        trace!(block, "payload terminator reached");
                        break;
                    }
                    data.extend_from_slice(&chunk);
                    blocks_read += 1;
                }
                Err(e) => {
                    warn!(block, error = %e, "read scan aborted: block read failed");
                    scan_error = Some(e.to_string());
                    break;
                }
            }
        }

        let trimmed = trim_trailing_zeros(&data);
        let payload = if trimmed.is_empty() {
            None
        } else {
            Some(encode_hex(trimmed))
        };

        debug!(
            uid = %uid,
            blocks_read,
            payload_bytes = trimmed.len(),
            aborted = scan_error.is_some(),
            "card read scan finished"
        );

        Ok(ReadOutcome {
            uid,
            payload,
            blocks_read,
            error: scan_error,
        })
    }

    /// Write a payload to the card's data region.
    ///
    /// The input is coerced via [`coerce_write_payload`], serialized to
    /// JSON, zero-padded to a 16-byte boundary, and written in sequential
    /// chunks from the configured start block. Sector trailers are skipped
    /// by advancing to the next block. Every block is authenticated with
    /// the write key before writing — unlike the read scan there is no
    /// sector-level caching here.
    ///
    /// # Errors
    ///
    /// Aborts on the first failing block with `Error::AuthenticationFailed`
    /// or `Error::BlockIoFailed` naming the failure site, or
    /// `Error::BlockIoFailed` on capacity overflow.
    pub async fn write_card<T: CardTransceiver>(
        &self,
        reader: &mut T,
        input: &Value,
    ) -> Result<WriteOutcome> {
        let value = coerce_write_payload(input);
        let buffer = json_to_buffer(&value)?;
        debug!(
            bytes = buffer.len(),
            start_block = self.config.start_block,
            "starting card write"
        );

        let mut block = self.config.start_block;
        let mut blocks_written: u8 = 0;

        for chunk in buffer.chunks(BLOCK_SIZE) {
            while is_addressable(block) && is_sector_trailer(block) {
                block += 1;
            }
            if !is_addressable(block) {
                return Err(Error::block_io(LAST_BLOCK, "card capacity exceeded"));
            }

            reader
                .authenticate(block, self.config.write_key, &self.config.key)
                .await?;

            let mut padded = [0u8; BLOCK_SIZE];
            padded[..chunk.len()].copy_from_slice(chunk);
            reader.write_block(block, &padded).await?;

            trace!(block, "block written");
            blocks_written += 1;
            block += 1;
        }

        debug!(blocks_written, bytes = buffer.len(), "card write finished");
        Ok(WriteOutcome {
            blocks_written,
            bytes_written: buffer.len(),
        })
    }

    /// Best-effort erase of the card's full writable region.
    ///
    /// Equivalent to [`CardEngine::remove_range`] over `[1, 63]`; block 0
    /// (the manufacturer block) is preserved.
    pub async fn remove_card_data<T: CardTransceiver>(
        &self,
        reader: &mut T,
    ) -> Result<RemoveOutcome> {
        self.remove_range(reader, ERASE_START_BLOCK, LAST_BLOCK).await
    }

    /// Best-effort erase of an explicit block range (inclusive).
    ///
    /// Skips sector trailers, authenticates on sector transitions with the
    /// write key, and overwrites each block with zeros. A failure on one
    /// block is logged and recorded but does not stop the scan — the goal
    /// is to clear as much residual data as possible even under partial
    /// hardware faults.
    ///
    /// The range is clamped to `[1, 63]` so the manufacturer block can
    /// never be targeted.
    pub async fn remove_range<T: CardTransceiver>(
        &self,
        reader: &mut T,
        start_block: u8,
        end_block: u8,
    ) -> Result<RemoveOutcome> {
        let start = start_block.max(ERASE_START_BLOCK);
        let end = end_block.min(LAST_BLOCK);
        debug!(start, end, "starting best-effort erase");

        let mut cleared: Vec<u8> = Vec::new();
        let mut failed: Vec<u8> = Vec::new();
        let mut last_auth_sector: Option<u8> = None;
        let zero_block = [0u8; BLOCK_SIZE];

        for block in start..=end {
            if is_sector_trailer(block) {
                continue;
            }

            let sector = sector_of(block);
            if last_auth_sector != Some(sector) {
                match reader
                    .authenticate(block, self.config.write_key, &self.config.key)
                    .await
                {
                    Ok(()) => last_auth_sector = Some(sector),
                    Err(e) => {
                        warn!(block, sector, error = %e, "erase: authentication failed, continuing");
                        failed.push(block);
                        continue;
                    }
                }
            }

            match reader.write_block(block, &zero_block).await {
                Ok(()) => cleared.push(block),
                Err(e) => {
                    warn!(block, error = %e, "erase: block write failed, continuing");
                    failed.push(block);
                }
            }
        }

        debug!(
            cleared = cleared.len(),
            failed = failed.len(),
            "best-effort erase finished"
        );
        Ok(RemoveOutcome { cleared, failed })
    }
}
