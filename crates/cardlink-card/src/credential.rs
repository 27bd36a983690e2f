//! Credential-preparation collaborator contract.
//!
//! Turning a domain record (guest + visit) into the flat key-value payload
//! written to a card is the job of an external data-preparation service:
//! object in, serialized bytes out. This module owns only the contract —
//! the request shape, the flat credential shape, and the
//! [`CredentialSource`] trait the engine calls through. Referential
//! integrity (does this guest belong to this visit?) is the collaborator's
//! responsibility and must fail before any bytes are produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use cardlink_core::{Error, Result};

/// What kind of credential is being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// A guest attending a registered visit.
    Visitor,
}

/// A request to prepare a credential for writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    /// Credential kind.
    #[serde(rename = "type")]
    pub kind: CredentialKind,

    /// Guest being credentialed.
    pub guest_id: String,

    /// Visit the guest is attending.
    pub visit_id: String,
}

/// The flat payload written to a card.
///
/// Serializes to the JSON object the card engine frames into blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCredential {
    /// Guest display name.
    pub name: String,

    /// Reference to the guest's photo, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,

    /// Host company name.
    pub company: String,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window.
    pub valid_until: DateTime<Utc>,

    /// Comma-joined ids of the gates this credential opens.
    pub gates: String,
}

impl CardCredential {
    /// The permitted gate ids as individual strings.
    #[must_use]
    pub fn gate_ids(&self) -> Vec<&str> {
        self.gates
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Serialize into the JSON value handed to the card engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if serialization fails.
    pub fn to_payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The data-preparation collaborator.
///
/// Implementations resolve the visit/guest/gate records backing a request
/// and return the flat credential, or reject with
/// `Error::DomainValidationFailed` — before any bytes are produced — when
/// the pairing is invalid.
pub trait CredentialSource: Send + Sync {
    /// Resolve a request into a writable credential.
    ///
    /// # Errors
    ///
    /// `Error::DomainValidationFailed` when the guest/visit pairing does
    /// not validate.
    async fn prepare(&self, request: &CredentialRequest) -> Result<CardCredential>;
}

/// In-memory [`CredentialSource`] for tests and demos.
///
/// Holds explicit (guest, visit) pairings; anything not registered fails
/// domain validation, like the real service rejecting a guest who is not
/// a participant of the visit.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialSource {
    credentials: HashMap<(String, String), CardCredential>,
}

impl MemoryCredentialSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a valid pairing.
    pub fn register(
        &mut self,
        guest_id: impl Into<String>,
        visit_id: impl Into<String>,
        credential: CardCredential,
    ) {
        self.credentials
            .insert((guest_id.into(), visit_id.into()), credential);
    }
}

impl CredentialSource for MemoryCredentialSource {
    async fn prepare(&self, request: &CredentialRequest) -> Result<CardCredential> {
        self.credentials
            .get(&(request.guest_id.clone(), request.visit_id.clone()))
            .cloned()
            .ok_or_else(|| {
                Error::DomainValidationFailed(format!(
                    "guest {} is not a participant of visit {}",
                    request.guest_id, request.visit_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_credential() -> CardCredential {
        CardCredential {
            name: "Ada Lovelace".to_string(),
            photo_ref: Some("photos/ada.jpg".to_string()),
            company: "Analytical Engines Ltd".to_string(),
            valid_from: Utc.with_ymd_and_hms(2026, 8, 7, 8, 0, 0).unwrap(),
            valid_until: Utc.with_ymd_and_hms(2026, 8, 7, 18, 0, 0).unwrap(),
            gates: "gate-1,gate-4,gate-9".to_string(),
        }
    }

    #[test]
    fn test_gate_ids_split() {
        let credential = sample_credential();
        assert_eq!(credential.gate_ids(), vec!["gate-1", "gate-4", "gate-9"]);

        let mut no_gates = credential;
        no_gates.gates = String::new();
        assert!(no_gates.gate_ids().is_empty());
    }

    #[test]
    fn test_payload_is_flat_json() {
        let payload = sample_credential().to_payload().unwrap();
        assert_eq!(payload["name"], "Ada Lovelace");
        assert_eq!(payload["gates"], "gate-1,gate-4,gate-9");
        assert!(payload.as_object().unwrap().values().all(|v| !v.is_object()));
    }

    #[tokio::test]
    async fn test_memory_source_resolves_registered_pairing() {
        let mut source = MemoryCredentialSource::new();
        source.register("guest-7", "visit-42", sample_credential());

        let request = CredentialRequest {
            kind: CredentialKind::Visitor,
            guest_id: "guest-7".to_string(),
            visit_id: "visit-42".to_string(),
        };
        let credential = source.prepare(&request).await.unwrap();
        assert_eq!(credential.name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_memory_source_rejects_unknown_pairing() {
        let source = MemoryCredentialSource::new();
        let request = CredentialRequest {
            kind: CredentialKind::Visitor,
            guest_id: "guest-7".to_string(),
            visit_id: "visit-1".to_string(),
        };

        let err = source.prepare(&request).await.unwrap_err();
        assert!(matches!(err, Error::DomainValidationFailed(_)));
    }

    #[test]
    fn test_request_wire_shape() {
        let request: CredentialRequest = serde_json::from_str(
            r#"{"type":"visitor","guestId":"g1","visitId":"v1"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, CredentialKind::Visitor);
        assert_eq!(request.guest_id, "g1");
    }
}
