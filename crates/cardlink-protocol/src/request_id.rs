//! Correlation-id generation for bridge-bound commands.

use crate::envelope::EnvelopeKind;
use chrono::Utc;

/// Generate a request id of the form `TYPE-<unix-millis>-<random suffix>`.
///
/// The timestamp orders ids in logs; the random suffix keeps ids unique
/// when several commands of the same kind are issued within one
/// millisecond. Ids must stay unique for the life of the pending table.
///
/// # Examples
///
/// ```
/// use cardlink_protocol::{EnvelopeKind, generate_request_id};
///
/// let id = generate_request_id(&EnvelopeKind::ReadCard);
/// assert!(id.starts_with("READ_CARD-"));
/// ```
#[must_use]
pub fn generate_request_id(kind: &EnvelopeKind) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        kind.as_wire(),
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id(&EnvelopeKind::WriteCard);
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "WRITE_CARD");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_request_ids_are_unique_under_burst() {
        let ids: HashSet<String> = (0..1000)
            .map(|_| generate_request_id(&EnvelopeKind::ReadCard))
            .collect();
        assert_eq!(ids.len(), 1000);
    }
}
