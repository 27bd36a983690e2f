//! Byte and buffer utilities shared by the card engine and the relay.
//!
//! Pure, stateless helpers: hex codec, trailing-zero trimming, block-size
//! padding, and JSON↔buffer framing. The JSON framing pads serialized values
//! to a whole number of card blocks so they can be written chunk by chunk,
//! and tolerates the padding on the way back in.

use crate::constants::BLOCK_SIZE;
use crate::error::{Error, Result};
use serde_json::Value;

/// Encode bytes as an uppercase hex string.
///
/// # Examples
///
/// ```
/// use cardlink_core::buffer::encode_hex;
///
/// assert_eq!(encode_hex(&[0xDE, 0xAD]), "DEAD");
/// assert_eq!(encode_hex(&[]), "");
/// ```
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Decode a hex string into bytes.
///
/// # Errors
/// Returns `Error::InvalidHex` if the string has an odd length or contains
/// non-hex characters.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim();
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return Err(Error::InvalidHex(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::InvalidHex(hex.to_string()))
        })
        .collect()
}

/// Encode a text string as hex over its UTF-8 bytes.
#[must_use]
pub fn text_to_hex(text: &str) -> String {
    encode_hex(text.as_bytes())
}

/// Decode a hex string back into text.
///
/// # Errors
/// Returns `Error::InvalidHex` if the string is not valid hex or the decoded
/// bytes are not valid UTF-8.
pub fn hex_to_text(hex: &str) -> Result<String> {
    let bytes = decode_hex(hex)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidHex(hex.trim().to_string()))
}

/// True if the buffer contains at least one non-zero byte.
#[must_use]
pub fn has_valid_data(buffer: &[u8]) -> bool {
    buffer.iter().any(|b| *b != 0)
}

/// Strip trailing zero bytes.
///
/// Idempotent; an all-zero buffer trims to empty.
///
/// # Examples
///
/// ```
/// use cardlink_core::buffer::trim_trailing_zeros;
///
/// assert_eq!(trim_trailing_zeros(&[1, 2, 0, 0]), &[1, 2]);
/// assert_eq!(trim_trailing_zeros(&[0, 0]), &[] as &[u8]);
/// assert_eq!(trim_trailing_zeros(&[1, 0, 2]), &[1, 0, 2]);
/// ```
#[must_use]
pub fn trim_trailing_zeros(buffer: &[u8]) -> &[u8] {
    let end = buffer
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |pos| pos + 1);
    &buffer[..end]
}

/// Right-pad a buffer with zero bytes to the next block boundary.
///
/// A buffer already sitting on a boundary is returned unchanged; an empty
/// buffer stays empty.
#[must_use]
pub fn pad_to_block(buffer: &[u8]) -> Vec<u8> {
    let mut padded = buffer.to_vec();
    let remainder = padded.len() % BLOCK_SIZE;
    if remainder != 0 {
        padded.resize(padded.len() + BLOCK_SIZE - remainder, 0);
    }
    padded
}

/// Serialize a JSON value into a block-padded byte buffer.
///
/// # Errors
/// Returns `Error::Serialization` if the value cannot be serialized.
pub fn json_to_buffer(value: &Value) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value)?;
    Ok(pad_to_block(&bytes))
}

/// Parse a (possibly block-padded) byte buffer back into a JSON value.
///
/// Trailing zero padding is stripped before parsing. Returns `None` on
/// malformed input rather than an error; wire data is untrusted and the
/// caller treats unparseable payloads as absent.
#[must_use]
pub fn buffer_to_json(buffer: &[u8]) -> Option<Value> {
    let trimmed = trim_trailing_zeros(buffer);
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_slice(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0x00, 0x7F, 0xFF, 0x42];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "007FFF42");
        assert_eq!(decode_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn test_decode_hex_rejects_malformed() {
        assert!(decode_hex("ABC").is_err());
        assert!(decode_hex("ZZ").is_err());
        assert!(decode_hex("§§").is_err());
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_text_hex_roundtrip() {
        let hex = text_to_hex("gate-7");
        assert_eq!(hex_to_text(&hex).unwrap(), "gate-7");
    }

    #[test]
    fn test_hex_to_text_rejects_invalid_utf8() {
        // 0xFF alone is not valid UTF-8
        assert!(hex_to_text("FF").is_err());
    }

    #[test]
    fn test_has_valid_data() {
        assert!(!has_valid_data(&[]));
        assert!(!has_valid_data(&[0, 0, 0]));
        assert!(has_valid_data(&[0, 0, 1]));
    }

    #[test]
    fn test_trim_is_idempotent() {
        let buf = vec![5, 0, 3, 0, 0, 0];
        let once = trim_trailing_zeros(&buf);
        let twice = trim_trailing_zeros(once);
        assert_eq!(once, &[5, 0, 3]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trim_all_zero_buffer_yields_empty() {
        assert!(trim_trailing_zeros(&[0u8; 48]).is_empty());
    }

    #[test]
    fn test_pad_to_block() {
        assert_eq!(pad_to_block(&[1u8; 12]).len(), 16);
        assert_eq!(pad_to_block(&[1u8; 16]).len(), 16);
        assert_eq!(pad_to_block(&[1u8; 17]).len(), 32);
        assert!(pad_to_block(&[]).is_empty());
    }

    #[test]
    fn test_json_buffer_roundtrip() {
        for value in [
            json!({"id": "abc", "gates": "1,2,3"}),
            json!("plain string"),
            json!(42),
            json!([1, 2, 3]),
        ] {
            let buffer = json_to_buffer(&value).unwrap();
            assert_eq!(buffer.len() % BLOCK_SIZE, 0);
            assert_eq!(buffer_to_json(&buffer), Some(value));
        }
    }

    #[test]
    fn test_write_payload_pads_single_block() {
        // {"id":"abc"} is 12 bytes of JSON, one padded block
        let buffer = json_to_buffer(&json!({"id": "abc"})).unwrap();
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn test_buffer_to_json_malformed_is_none() {
        assert_eq!(buffer_to_json(b"not json"), None);
        assert_eq!(buffer_to_json(&[]), None);
        assert_eq!(buffer_to_json(&[0u8; 32]), None);
    }
}
