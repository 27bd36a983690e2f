use crate::{Result, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card UID as an uppercase hex string (4-10 bytes on real hardware).
///
/// # Validation
/// A UID string is valid iff it is non-empty, contains only hex digits and
/// has an even length (whole bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardUid(String);

impl CardUid {
    /// Create a new card UID with validation.
    ///
    /// The string is normalized to uppercase before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the string is empty, has an odd
    /// length, or contains non-hex characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_core::CardUid;
    ///
    /// let uid = CardUid::new("04abcdef").unwrap();
    /// assert_eq!(uid.as_str(), "04ABCDEF");
    ///
    /// assert!(CardUid::new("04ABC").is_err());  // odd length
    /// assert!(CardUid::new("ZZ").is_err());     // not hex
    /// assert!(CardUid::new("").is_err());       // empty
    /// ```
    pub fn new(uid: &str) -> Result<Self> {
        let uid = uid.trim().to_uppercase();
        if !Self::is_valid(&uid) {
            return Err(Error::InvalidUid(uid));
        }
        Ok(CardUid(uid))
    }

    /// Check whether a string is a well-formed UID.
    ///
    /// True iff the string is non-empty, hex-only, and of even length.
    #[must_use]
    pub fn is_valid(uid: &str) -> bool {
        !uid.is_empty() && uid.len() % 2 == 0 && uid.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Build a UID from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidUid(String::new()));
        }
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        Ok(CardUid(hex))
    }

    /// Get the UID as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format the UID as colon-grouped byte pairs for display.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_core::CardUid;
    ///
    /// let uid = CardUid::new("04ABCDEF").unwrap();
    /// assert_eq!(uid.grouped(), "04:AB:CD:EF");
    /// ```
    #[must_use]
    pub fn grouped(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardUid::new(s)
    }
}

/// Session identifier assigned on socket accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a connected relay session, defaulted by listening endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Remote hardware process attached to the physical reader.
    Bridge,
    /// Interactive dashboard/UI client.
    Frontend,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionRole::Bridge => write!(f, "bridge"),
            SessionRole::Frontend => write!(f, "frontend"),
        }
    }
}

/// MIFARE Classic authentication key slot.
///
/// Each sector is protected by two 6-byte keys. Key A is conventionally the
/// read key and key B the write key, but the mapping is configurable per
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    A,
    B,
}

/// Snapshot of the card currently (not) sitting on the bridge's reader.
///
/// Mutated only by the relay dispatcher on CARD_DETECTED / CARD_REMOVED;
/// read by newly connecting frontends for their initial STATUS push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatus {
    /// Whether a card is on the reader.
    pub present: bool,

    /// UID of the present card, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<CardUid>,
}

impl CardStatus {
    /// Status for a detected card.
    #[must_use]
    pub fn present(uid: CardUid) -> Self {
        Self {
            present: true,
            uid: Some(uid),
        }
    }

    /// Status for an empty reader.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Heartbeat timestamp alias used by the session registry.
pub type Heartbeat = DateTime<Utc>;
