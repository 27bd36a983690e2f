//! Core constants for the MIFARE Classic card layout and relay defaults.
//!
//! The card geometry constants describe a MIFARE Classic 1K card: 64 blocks
//! of 16 bytes each, grouped into 16 sectors of 4 blocks. The last block of
//! every sector is the *sector trailer* holding the access keys and is never
//! used for payload storage; block 0 is the read-only manufacturer block.
//!
//! # Card layout
//!
//! ```text
//! Sector 0:  block 0 (manufacturer) | block 1 | block 2 | block 3 (trailer)
//! Sector 1:  block 4               | block 5 | block 6 | block 7 (trailer)
//! ...
//! Sector 15: block 60              | ...     | ...     | block 63 (trailer)
//! ```
//!
//! Payload data begins at [`DATA_START_BLOCK`] (block 4) because blocks 0-3
//! hold manufacturer data and the sector-0 trailer. Erasure begins at
//! [`ERASE_START_BLOCK`] (block 1) so the manufacturer block is preserved.
//!
//! # Usage
//!
//! ```
//! use cardlink_core::constants::*;
//!
//! assert_eq!(BLOCK_SIZE, 16);
//! assert_eq!(TOTAL_BLOCKS, BLOCKS_PER_SECTOR * TOTAL_SECTORS);
//! assert!(DATA_START_BLOCK > MANUFACTURER_BLOCK);
//! ```

/// Size of a single card block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Number of blocks in one sector.
pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Total number of blocks on a MIFARE Classic 1K card.
pub const TOTAL_BLOCKS: u8 = 64;

/// Total number of sectors on a MIFARE Classic 1K card.
pub const TOTAL_SECTORS: u8 = 16;

/// Manufacturer block. Read-only card identity data; never erased.
pub const MANUFACTURER_BLOCK: u8 = 0;

/// First block of the payload data region.
///
/// Blocks 0-3 are the manufacturer block, two sector-0 data blocks that
/// conventionally hold NDEF metadata, and the sector-0 trailer.
pub const DATA_START_BLOCK: u8 = 4;

/// First block cleared by the erase operation.
///
/// Erasure starts one block past [`MANUFACTURER_BLOCK`] so card identity
/// data survives a full wipe.
pub const ERASE_START_BLOCK: u8 = 1;

/// Last addressable block (inclusive).
pub const LAST_BLOCK: u8 = TOTAL_BLOCKS - 1;

/// Well-known transport key shipped on blank MIFARE Classic cards.
pub const DEFAULT_KEY: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// A zero first byte in a freshly read block terminates the payload scan.
pub const PAYLOAD_TERMINATOR: u8 = 0x00;

/// Default deadline for a correlated bridge request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default TCP port for the bridge-facing relay endpoint.
pub const DEFAULT_BRIDGE_PORT: u16 = 7171;

/// Default TCP port for the frontend-facing relay endpoint.
pub const DEFAULT_FRONTEND_PORT: u16 = 7172;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_geometry_is_consistent() {
        assert_eq!(TOTAL_BLOCKS, BLOCKS_PER_SECTOR * TOTAL_SECTORS);
        assert_eq!(LAST_BLOCK, 63);
        assert_eq!(BLOCK_SIZE * TOTAL_BLOCKS as usize, 1024);
    }

    #[test]
    fn test_data_region_starts_past_sector_zero() {
        assert_eq!(DATA_START_BLOCK, BLOCKS_PER_SECTOR);
        assert!(ERASE_START_BLOCK > MANUFACTURER_BLOCK);
        assert!(ERASE_START_BLOCK < DATA_START_BLOCK);
    }

    #[test]
    fn test_default_key_is_transport_key() {
        assert_eq!(DEFAULT_KEY.len(), 6);
        assert!(DEFAULT_KEY.iter().all(|b| *b == 0xFF));
    }
}
