//! Sector and block layout math for MIFARE Classic 1K cards.
//!
//! Every scan in the engine walks raw block numbers and uses these helpers
//! to decide what a block is. The invariants here are load-bearing: sector
//! trailers hold access keys and must never be read or written by payload
//! logic, and the manufacturer block must never be erased.

use cardlink_core::constants::{BLOCKS_PER_SECTOR, MANUFACTURER_BLOCK, TOTAL_BLOCKS};

/// True if the block is the last block of its sector (the sector trailer).
///
/// # Examples
///
/// ```
/// use cardlink_card::layout::is_sector_trailer;
///
/// assert!(is_sector_trailer(3));
/// assert!(is_sector_trailer(63));
/// assert!(!is_sector_trailer(4));
/// ```
#[must_use]
pub fn is_sector_trailer(block: u8) -> bool {
    (block + 1) % BLOCKS_PER_SECTOR == 0
}

/// Sector index containing the given block.
#[must_use]
pub fn sector_of(block: u8) -> u8 {
    block / BLOCKS_PER_SECTOR
}

/// True for block 0, the read-only card identity block.
#[must_use]
pub fn is_manufacturer_block(block: u8) -> bool {
    block == MANUFACTURER_BLOCK
}

/// True if the block number addresses a block that exists on the card.
#[must_use]
pub fn is_addressable(block: u8) -> bool {
    block < TOTAL_BLOCKS
}
