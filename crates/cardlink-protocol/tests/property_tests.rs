//! Property-based tests for envelope serialization and buffer framing.
//!
//! These tests use proptest to generate random valid inputs and verify that
//! wire-format invariants hold across the whole input space, not just the
//! handful of fixtures in the unit tests.

use proptest::prelude::*;

use cardlink_core::buffer::{buffer_to_json, json_to_buffer, trim_trailing_zeros};
use cardlink_core::constants::BLOCK_SIZE;
use cardlink_protocol::{Envelope, EnvelopeBuilder, EnvelopeKind, generate_request_id};

/// Strategy for wire names: known kinds plus arbitrary SCREAMING_SNAKE ones.
fn wire_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("CARD_DETECTED".to_string()),
        Just("READ_RESULT".to_string()),
        Just("REMOVE_CARD_DATA".to_string()),
        Just("ERROR".to_string()),
        prop::string::string_regex("[A-Z][A-Z_]{0,30}").expect("wire name regex"),
    ]
}

/// Strategy for JSON-serializable leaf values.
fn json_leaf() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 _:,-]{0,40}".prop_map(serde_json::Value::from),
    ]
}

/// Strategy for flat JSON objects like the credential payloads written to cards.
fn json_object() -> impl Strategy<Value = serde_json::Value> {
    prop::collection::btree_map("[a-z_]{1,12}", json_leaf(), 0..8).prop_map(|map| {
        serde_json::Value::Object(map.into_iter().collect())
    })
}

proptest! {
    /// Property: parsing a wire name and re-serializing it is lossless,
    /// whether or not the name is in the closed kind set.
    #[test]
    fn prop_kind_wire_roundtrip(name in wire_name()) {
        let kind = EnvelopeKind::from_wire(&name);
        prop_assert_eq!(kind.as_wire(), name.as_str());
    }

    /// Property: envelopes survive a JSON serialize/deserialize cycle with
    /// every field intact.
    #[test]
    fn prop_envelope_json_roundtrip(
        name in wire_name(),
        request_id in prop::option::of("[A-Z_]{1,12}-[0-9]{1,13}-[0-9a-f]{8}"),
        payload in prop::option::of(json_object()),
        success in prop::option::of(any::<bool>()),
    ) {
        let mut builder = EnvelopeBuilder::new(EnvelopeKind::from_wire(&name));
        if let Some(request_id) = &request_id {
            builder = builder.request_id(request_id.clone());
        }
        if let Some(payload) = &payload {
            builder = builder.payload(payload.clone());
        }
        if let Some(success) = success {
            builder = builder.success(success);
        }
        let original = builder.build();

        let json = serde_json::to_string(&original).unwrap();
        let decoded: Envelope = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(decoded.kind, original.kind);
        prop_assert_eq!(decoded.request_id, original.request_id);
        prop_assert_eq!(decoded.payload, original.payload);
        prop_assert_eq!(decoded.success, original.success);
    }

    /// Property: any JSON value framed into card blocks comes back equal
    /// after padding is stripped, and the framed buffer is always a whole
    /// number of blocks.
    #[test]
    fn prop_json_buffer_roundtrip(value in json_object()) {
        let buffer = json_to_buffer(&value).unwrap();
        prop_assert_eq!(buffer.len() % BLOCK_SIZE, 0);
        prop_assert_eq!(buffer_to_json(&buffer), Some(value));
    }

    /// Property: trimming trailing zeros is idempotent.
    #[test]
    fn prop_trim_idempotent(buffer in prop::collection::vec(any::<u8>(), 0..64)) {
        let once = trim_trailing_zeros(&buffer).to_vec();
        let twice = trim_trailing_zeros(&once).to_vec();
        prop_assert_eq!(once, twice);
    }

    /// Property: request ids generated for any kind are prefixed with the
    /// wire name and unique across a burst.
    #[test]
    fn prop_request_ids_unique(name in wire_name(), count in 2usize..32) {
        let kind = EnvelopeKind::from_wire(&name);
        let ids: std::collections::HashSet<String> =
            (0..count).map(|_| generate_request_id(&kind)).collect();
        prop_assert_eq!(ids.len(), count);
        let prefix = format!("{}-", name);
        for id in &ids {
            prop_assert!(id.starts_with(&prefix));
        }
    }
}
