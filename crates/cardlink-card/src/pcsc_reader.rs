//! PC/SC-backed transceiver for locally attached readers.
//!
//! Drives a CCID reader (ACR122U and friends) through the PC/SC pseudo-APDU
//! set for contactless storage cards: load key into volatile slot 0,
//! general authenticate, read binary, update binary. Status word `90 00`
//! is success; everything else maps onto the core error taxonomy.
//!
//! PC/SC calls are short synchronous operations; they run inline on the
//! calling task rather than through a blocking pool, matching the one
//! in-flight transaction the hardware can service anyway.

use std::ffi::CString;

use pcsc::{Card, Context, Protocols, Scope, ShareMode};
use tracing::{debug, trace, warn};

use crate::traits::CardTransceiver;
use cardlink_core::constants::BLOCK_SIZE;
use cardlink_core::{CardUid, Error, KeyType, Result};

/// Volatile key slot used for every authentication.
const KEY_SLOT: u8 = 0x00;

/// Transceiver over one PC/SC reader.
pub struct PcscTransceiver {
    context: Context,
    reader: CString,
    card: Option<Card>,
    loaded_key: Option<[u8; 6]>,
}

impl PcscTransceiver {
    /// Connect to the first reader the PC/SC service reports.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the service is unreachable or no reader
    /// is attached.
    pub fn new() -> Result<Self> {
        let context = Context::establish(Scope::User)
            .map_err(|e| Error::Config(format!("PC/SC unavailable: {e}")))?;

        let mut buf = [0u8; 2048];
        let reader = context
            .list_readers(&mut buf)
            .map_err(|e| Error::Config(format!("cannot list PC/SC readers: {e}")))?
            .next()
            .ok_or_else(|| Error::Config("no PC/SC reader attached".to_string()))?
            .to_owned();

        debug!(reader = ?reader, "using PC/SC reader");
        Ok(Self {
            context,
            reader,
            card: None,
            loaded_key: None,
        })
    }

    /// Connect to a reader by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the service is unreachable or the name
    /// contains an interior NUL byte.
    pub fn with_reader(name: &str) -> Result<Self> {
        let context = Context::establish(Scope::User)
            .map_err(|e| Error::Config(format!("PC/SC unavailable: {e}")))?;
        let reader = CString::new(name)
            .map_err(|_| Error::Config(format!("invalid reader name: {name}")))?;

        Ok(Self {
            context,
            reader,
            card: None,
            loaded_key: None,
        })
    }

    /// Connect to the card if one is in the field.
    fn connect(&mut self) -> Result<bool> {
        if self.card.is_some() {
            return Ok(true);
        }
        match self
            .context
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => {
                self.card = Some(card);
                self.loaded_key = None;
                Ok(true)
            }
            Err(pcsc::Error::NoSmartcard) => Ok(false),
            Err(e) => Err(Error::Config(format!("PC/SC connect failed: {e}"))),
        }
    }

    /// Transmit an APDU and check the trailing status word.
    fn transmit(&mut self, block: u8, apdu: &[u8]) -> Result<Vec<u8>> {
        let Some(card) = self.card.as_ref() else {
            return Err(Error::NoCardPresent);
        };

        let mut rapdu_buf = [0u8; 258];
        let rapdu = match card.transmit(apdu, &mut rapdu_buf) {
            Ok(rapdu) => rapdu,
            Err(pcsc::Error::RemovedCard | pcsc::Error::ResetCard) => {
                warn!("card left the field mid-transaction");
                self.card = None;
                self.loaded_key = None;
                return Err(Error::NoCardPresent);
            }
            Err(e) => return Err(Error::block_io(block, e)),
        };

        if rapdu.len() < 2 || rapdu[rapdu.len() - 2..] != [0x90, 0x00] {
            return Err(Error::block_io(
                block,
                format!("status word {:02X?}", &rapdu[rapdu.len().saturating_sub(2)..]),
            ));
        }
        Ok(rapdu[..rapdu.len() - 2].to_vec())
    }

    /// Load the sector key into the reader's volatile key slot once.
    fn load_key(&mut self, key: &[u8; 6]) -> Result<()> {
        if self.loaded_key.as_ref() == Some(key) {
            return Ok(());
        }
        let mut apdu = vec![0xFF, 0x82, 0x00, KEY_SLOT, 0x06];
        apdu.extend_from_slice(key);
        self.transmit(0, &apdu)?;
        self.loaded_key = Some(*key);
        Ok(())
    }
}

impl CardTransceiver for PcscTransceiver {
    async fn card_present(&mut self) -> Result<Option<CardUid>> {
        if !self.connect()? {
            return Ok(None);
        }

        // GET DATA: UID of the card in the field.
        match self.transmit(0, &[0xFF, 0xCA, 0x00, 0x00, 0x00]) {
            Ok(uid_bytes) => Ok(Some(CardUid::from_bytes(&uid_bytes)?)),
            Err(Error::NoCardPresent) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn authenticate(&mut self, block: u8, key_type: KeyType, key: &[u8; 6]) -> Result<()> {
        if !self.connect()? {
            return Err(Error::NoCardPresent);
        }
        self.load_key(key)?;

        let key_code: u8 = match key_type {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        };
        // GENERAL AUTHENTICATE against the loaded volatile key.
        let apdu = [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_code, KEY_SLOT];
        self.transmit(block, &apdu).map_err(|e| match e {
            Error::BlockIoFailed { .. } => Error::AuthenticationFailed {
                sector: crate::layout::sector_of(block),
            },
            other => other,
        })?;

        trace!(block, ?key_type, "sector authenticated");
        Ok(())
    }

    async fn read_block(&mut self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let data = self.transmit(block, &[0xFF, 0xB0, 0x00, block, BLOCK_SIZE as u8])?;
        let mut out = [0u8; BLOCK_SIZE];
        if data.len() != BLOCK_SIZE {
            return Err(Error::block_io(
                block,
                format!("short read: {} bytes", data.len()),
            ));
        }
        out.copy_from_slice(&data);
        Ok(out)
    }

    async fn write_block(&mut self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        let mut apdu = vec![0xFF, 0xD6, 0x00, block, BLOCK_SIZE as u8];
        apdu.extend_from_slice(data);
        self.transmit(block, &apdu)?;
        Ok(())
    }
}
