//! Session registry for connected bridges and frontends.
//!
//! Every accepted socket becomes an [`NfcSession`] with a role defaulted by
//! the endpoint it arrived on. The registry tracks exactly one
//! authoritative bridge at a time (a newer bridge connection supersedes the
//! previous lookup target) and any number of frontends. Sessions are not
//! expired by a timer: heartbeats only refresh a timestamp, and staleness
//! is observed at the next disconnect.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use cardlink_core::{Heartbeat, SessionId, SessionRole};
use cardlink_protocol::Envelope;

/// One connected socket.
#[derive(Debug)]
pub struct NfcSession {
    /// Registry key, generated on accept.
    pub id: SessionId,

    /// Bridge or frontend, defaulted by listening endpoint.
    pub role: SessionRole,

    /// Bridge-reported identifier, set by a BRIDGE_CONNECTED message.
    pub bridge_id: Option<String>,

    /// Names of the readers attached to this bridge.
    pub readers: Vec<String>,

    /// Last heartbeat or connect time.
    pub last_heartbeat: Heartbeat,

    /// Outbound envelope queue drained by the connection's writer task.
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl NfcSession {
    /// Queue an envelope for this session.
    ///
    /// A send to a session whose writer already hung up is a no-op: the
    /// disconnect is about to be processed anyway.
    pub fn send(&self, envelope: Envelope) {
        if self.outbound.send(envelope).is_err() {
            trace!(session_id = %self.id, "dropping envelope for closing session");
        }
    }
}

/// In-process map of every live session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, NfcSession>,

    /// The authoritative bridge, when one is connected.
    current_bridge: Option<SessionId>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted socket and return its session id.
    ///
    /// A second bridge connection supersedes the previous one as the
    /// lookup target for bridge-bound commands. The superseded session
    /// stays registered until its socket closes; this mirrors deployments
    /// that rely on silent bridge failover.
    pub fn open(
        &mut self,
        role: SessionRole,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) -> SessionId {
        let id = SessionId::generate();
        let session = NfcSession {
            id: id.clone(),
            role,
            bridge_id: None,
            readers: Vec::new(),
            last_heartbeat: Utc::now(),
            outbound,
        };

        if role == SessionRole::Bridge {
            if let Some(previous) = &self.current_bridge {
                warn!(
                    previous = %previous,
                    superseding = %id,
                    "second bridge connection supersedes the current one"
                );
            }
            self.current_bridge = Some(id.clone());
        }

        debug!(session_id = %id, %role, "session opened");
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Drop a session, returning its record.
    ///
    /// If the session was the authoritative bridge, the bridge slot is
    /// cleared.
    pub fn close(&mut self, session_id: &SessionId) -> Option<NfcSession> {
        let session = self.sessions.remove(session_id)?;
        if self.current_bridge.as_ref() == Some(session_id) {
            self.current_bridge = None;
        }
        debug!(session_id = %session_id, role = %session.role, "session closed");
        Some(session)
    }

    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<&NfcSession> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut NfcSession> {
        self.sessions.get_mut(session_id)
    }

    /// The authoritative bridge session, if one is connected.
    #[must_use]
    pub fn bridge(&self) -> Option<&NfcSession> {
        self.current_bridge
            .as_ref()
            .and_then(|id| self.sessions.get(id))
    }

    /// Mutable access to the authoritative bridge session.
    pub fn bridge_mut(&mut self) -> Option<&mut NfcSession> {
        let id = self.current_bridge.clone()?;
        self.sessions.get_mut(&id)
    }

    #[must_use]
    pub fn bridge_connected(&self) -> bool {
        self.current_bridge.is_some()
    }

    /// Record a bridge identification message: overwrite the stored
    /// bridge id and reader list.
    pub fn identify_bridge(
        &mut self,
        session_id: &SessionId,
        bridge_id: String,
        readers: Vec<String>,
    ) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            debug!(session_id = %session_id, bridge_id = %bridge_id, ?readers, "bridge identified");
            session.bridge_id = Some(bridge_id);
            session.readers = readers;
        }
    }

    /// Append a reader name to a bridge's list if not already present.
    pub fn add_reader(&mut self, session_id: &SessionId, reader: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            if !session.readers.iter().any(|r| r == reader) {
                session.readers.push(reader.to_string());
            }
        }
    }

    /// Refresh a session's heartbeat timestamp.
    pub fn heartbeat(&mut self, session_id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.last_heartbeat = Utc::now();
        }
    }

    /// Queue an envelope to every frontend session.
    pub fn broadcast_frontends(&self, envelope: &Envelope) {
        for session in self
            .sessions
            .values()
            .filter(|s| s.role == SessionRole::Frontend)
        {
            session.send(envelope.clone());
        }
    }

    /// Queue an envelope to every session, bridges included.
    pub fn broadcast_all(&self, envelope: &Envelope) {
        for session in self.sessions.values() {
            session.send(envelope.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_protocol::EnvelopeKind;

    fn open_with_channel(
        registry: &mut SessionRegistry,
        role: SessionRole,
    ) -> (SessionId, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.open(role, tx), rx)
    }

    #[test]
    fn test_open_assigns_role_and_heartbeat() {
        let mut registry = SessionRegistry::new();
        let (id, _rx) = open_with_channel(&mut registry, SessionRole::Frontend);

        let session = registry.get(&id).unwrap();
        assert_eq!(session.role, SessionRole::Frontend);
        assert!(session.bridge_id.is_none());
        assert!(session.readers.is_empty());
    }

    #[test]
    fn test_second_bridge_supersedes_first() {
        let mut registry = SessionRegistry::new();
        let (first, _rx1) = open_with_channel(&mut registry, SessionRole::Bridge);
        assert_eq!(registry.bridge().unwrap().id, first);

        let (second, _rx2) = open_with_channel(&mut registry, SessionRole::Bridge);
        assert_eq!(registry.bridge().unwrap().id, second);

        // Both sessions stay registered; only the lookup target moved.
        assert_eq!(registry.len(), 2);

        // Closing the superseded session does not disturb the new target.
        registry.close(&first);
        assert_eq!(registry.bridge().unwrap().id, second);
    }

    #[test]
    fn test_closing_bridge_clears_slot() {
        let mut registry = SessionRegistry::new();
        let (id, _rx) = open_with_channel(&mut registry, SessionRole::Bridge);
        assert!(registry.bridge_connected());

        registry.close(&id);
        assert!(!registry.bridge_connected());
        assert!(registry.bridge().is_none());
    }

    #[test]
    fn test_identify_bridge_overwrites_readers() {
        let mut registry = SessionRegistry::new();
        let (id, _rx) = open_with_channel(&mut registry, SessionRole::Bridge);

        registry.identify_bridge(&id, "bridge-1".to_string(), vec!["ACR122U".to_string()]);
        registry.identify_bridge(&id, "bridge-1".to_string(), vec!["PN532".to_string()]);

        let session = registry.get(&id).unwrap();
        assert_eq!(session.bridge_id.as_deref(), Some("bridge-1"));
        assert_eq!(session.readers, vec!["PN532".to_string()]);
    }

    #[test]
    fn test_add_reader_deduplicates() {
        let mut registry = SessionRegistry::new();
        let (id, _rx) = open_with_channel(&mut registry, SessionRole::Bridge);

        registry.add_reader(&id, "ACR122U");
        registry.add_reader(&id, "ACR122U");
        registry.add_reader(&id, "PN532");

        assert_eq!(
            registry.get(&id).unwrap().readers,
            vec!["ACR122U".to_string(), "PN532".to_string()]
        );
    }

    #[test]
    fn test_broadcast_frontends_skips_bridge() {
        let mut registry = SessionRegistry::new();
        let (_bridge, mut bridge_rx) = open_with_channel(&mut registry, SessionRole::Bridge);
        let (_frontend, mut frontend_rx) = open_with_channel(&mut registry, SessionRole::Frontend);

        registry.broadcast_frontends(&Envelope::event(EnvelopeKind::CardDetected));

        assert!(frontend_rx.try_recv().is_ok());
        assert!(bridge_rx.try_recv().is_err());

        registry.broadcast_all(&Envelope::event(EnvelopeKind::ReaderConnected));
        assert!(frontend_rx.try_recv().is_ok());
        assert!(bridge_rx.try_recv().is_ok());
    }

    #[test]
    fn test_heartbeat_refreshes_timestamp() {
        let mut registry = SessionRegistry::new();
        let (id, _rx) = open_with_channel(&mut registry, SessionRole::Frontend);

        let before = registry.get(&id).unwrap().last_heartbeat;
        registry.heartbeat(&id);
        let after = registry.get(&id).unwrap().last_heartbeat;
        assert!(after >= before);
    }

    #[test]
    fn test_send_to_closed_receiver_is_noop() {
        let mut registry = SessionRegistry::new();
        let (id, rx) = open_with_channel(&mut registry, SessionRole::Frontend);
        drop(rx);

        // Must not panic or error.
        registry
            .get(&id)
            .unwrap()
            .send(Envelope::event(EnvelopeKind::Status));
    }
}
