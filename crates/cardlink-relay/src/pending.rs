//! Pending-request table for bridge command correlation.
//!
//! Every command forwarded to the bridge gets a unique request id and a
//! table entry holding the oneshot responder and the handle of its
//! spawned deadline task. An entry is settled exactly once — by a matching
//! response, by deadline expiry, or by its owning bridge disconnecting —
//! and a second settlement attempt for the same id is an idempotent no-op.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use cardlink_core::{Error, Result, SessionId};
use cardlink_protocol::Envelope;

/// One in-flight bridge command.
#[derive(Debug)]
pub struct PendingRequest {
    /// Session that owns the command (the bridge it was sent to).
    pub created_by: SessionId,

    /// Settles the caller's future.
    responder: oneshot::Sender<Result<Envelope>>,

    /// Deadline task, aborted when the entry settles early.
    deadline: JoinHandle<()>,
}

/// Table of in-flight bridge commands keyed by request id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
}

impl PendingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh entry.
    ///
    /// Request ids are generated with a random suffix and must be unique;
    /// inserting a duplicate id would orphan the previous responder, so
    /// the old entry is settled with an error first. In practice this
    /// never fires.
    pub fn insert(
        &mut self,
        request_id: String,
        created_by: SessionId,
        responder: oneshot::Sender<Result<Envelope>>,
        deadline: JoinHandle<()>,
    ) {
        if let Some(stale) = self.entries.insert(
            request_id.clone(),
            PendingRequest {
                created_by,
                responder,
                deadline,
            },
        ) {
            stale.deadline.abort();
            let _ = stale
                .responder
                .send(Err(Error::ClientDisconnected(format!(
                    "request id {request_id} reused"
                ))));
        }
        trace!(request_id = %request_id, in_flight = self.entries.len(), "pending request inserted");
    }

    /// Settle an entry with a response or error.
    ///
    /// Returns `true` if an entry existed. A missing id (already settled,
    /// or never ours) returns `false` and has no other effect.
    pub fn settle(&mut self, request_id: &str, result: Result<Envelope>) -> bool {
        let Some(entry) = self.entries.remove(request_id) else {
            return false;
        };
        entry.deadline.abort();
        // The caller may have given up; a dead receiver is fine.
        let _ = entry.responder.send(result);
        trace!(request_id = %request_id, in_flight = self.entries.len(), "pending request settled");
        true
    }

    /// Settle an entry with `RequestTimeout`, if it is still live.
    pub fn expire(&mut self, request_id: &str, timeout_ms: u64) -> bool {
        let Some(entry) = self.entries.remove(request_id) else {
            return false;
        };
        debug!(request_id = %request_id, timeout_ms, "pending request timed out");
        let _ = entry.responder.send(Err(Error::RequestTimeout {
            request_id: request_id.to_string(),
            timeout_ms,
        }));
        true
    }

    /// Eagerly reject every entry owned by a disconnecting session.
    ///
    /// Returns the number of rejected entries. Rejection uses a
    /// disconnect error, not the timeout error — the caller learns
    /// immediately instead of waiting out the deadline.
    pub fn reject_owned_by(&mut self, session_id: &SessionId) -> usize {
        let owned: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| &entry.created_by == session_id)
            .map(|(id, _)| id.clone())
            .collect();

        for request_id in &owned {
            if let Some(entry) = self.entries.remove(request_id) {
                entry.deadline.abort();
                let _ = entry.responder.send(Err(Error::ClientDisconnected(
                    "bridge disconnected before responding".to_string(),
                )));
            }
        }

        if !owned.is_empty() {
            debug!(
                session_id = %session_id,
                rejected = owned.len(),
                "rejected pending requests of disconnected session"
            );
        }
        owned.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_protocol::EnvelopeKind;

    fn spawn_noop() -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    fn insert_entry(
        table: &mut PendingTable,
        request_id: &str,
        owner: &SessionId,
    ) -> oneshot::Receiver<Result<Envelope>> {
        let (tx, rx) = oneshot::channel();
        table.insert(request_id.to_string(), owner.clone(), tx, spawn_noop());
        rx
    }

    #[tokio::test]
    async fn test_settle_resolves_receiver_once() {
        let mut table = PendingTable::new();
        let owner = SessionId::generate();
        let rx = insert_entry(&mut table, "READ_CARD-1-aa", &owner);

        assert!(table.settle("READ_CARD-1-aa", Ok(Envelope::event(EnvelopeKind::ReadResult))));
        let envelope = rx.await.unwrap().unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::ReadResult);

        // Second settlement attempt is an idempotent no-op.
        assert!(!table.settle("READ_CARD-1-aa", Ok(Envelope::event(EnvelopeKind::ReadResult))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_settling_one_entry_leaves_others() {
        let mut table = PendingTable::new();
        let owner = SessionId::generate();
        let _rx_a = insert_entry(&mut table, "READ_CARD-1-aa", &owner);
        let _rx_b = insert_entry(&mut table, "WRITE_CARD-1-bb", &owner);

        table.settle("READ_CARD-1-aa", Ok(Envelope::event(EnvelopeKind::ReadResult)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_rejects_with_timeout_error() {
        let mut table = PendingTable::new();
        let owner = SessionId::generate();
        let rx = insert_entry(&mut table, "WRITE_CARD-1-cc", &owner);

        assert!(table.expire("WRITE_CARD-1-cc", 10_000));
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 10_000, .. }));

        // The entry is gone; expiring again is a no-op.
        assert!(!table.expire("WRITE_CARD-1-cc", 10_000));
    }

    #[tokio::test]
    async fn test_reject_owned_by_targets_exactly_one_session() {
        let mut table = PendingTable::new();
        let doomed = SessionId::generate();
        let survivor = SessionId::generate();

        let rx1 = insert_entry(&mut table, "READ_CARD-1-aa", &doomed);
        let rx2 = insert_entry(&mut table, "WRITE_CARD-1-bb", &doomed);
        let rx3 = insert_entry(&mut table, "READ_CARD-1-cc", &survivor);

        assert_eq!(table.reject_owned_by(&doomed), 2);
        assert_eq!(table.len(), 1);

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            // Disconnect error, never the timeout error.
            assert!(matches!(err, Error::ClientDisconnected(_)));
        }
        // The surviving entry is untouched and can still settle.
        assert!(table.settle("READ_CARD-1-cc", Ok(Envelope::event(EnvelopeKind::ReadResult))));
        assert!(rx3.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_capacity_reusable_after_expiry() {
        let mut table = PendingTable::new();
        let owner = SessionId::generate();

        let _rx = insert_entry(&mut table, "READ_CARD-1-aa", &owner);
        table.expire("READ_CARD-1-aa", 10_000);
        assert!(table.is_empty());

        let rx = insert_entry(&mut table, "READ_CARD-2-bb", &owner);
        assert_eq!(table.len(), 1);
        table.settle("READ_CARD-2-bb", Ok(Envelope::event(EnvelopeKind::ReadResult)));
        assert!(rx.await.unwrap().is_ok());
    }
}
