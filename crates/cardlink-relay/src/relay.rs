//! The relay actor: dispatcher, correlation engine, and cached card state.
//!
//! A single task owns every piece of mutable relay state — the session
//! registry, the pending-request table, and the card/reader cache. All
//! other tasks (connection handlers, deadline timers, the local-reader
//! adapter) interact with it through [`RelayCommand`] messages on an mpsc
//! channel, so state mutation is serialized without locks.
//!
//! # Dispatch
//!
//! Inbound bridge envelopes are matched exhaustively on their kind:
//! card lifecycle events update the cache and fan out to frontends,
//! `*_RESULT` and `ERROR` envelopes additionally settle a matching pending
//! request, reader events rebroadcast, and unknown kinds are logged and
//! ignored. Frontend envelopes are commands forwarded to the bridge via
//! the correlation engine; with no bridge connected the issuing frontend
//! receives an immediate `ERROR` envelope instead of a silent drop.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::pending::PendingTable;
use crate::session::SessionRegistry;
use cardlink_core::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use cardlink_core::{CardStatus, CardUid, Error, Result, SessionId, SessionRole};
use cardlink_protocol::{Envelope, EnvelopeBuilder, EnvelopeKind, generate_request_id};

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deadline for every correlated bridge request. Not configurable per
    /// call; one deadline governs all commands.
    pub request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Read-only view of the relay's state, for status endpoints and tests.
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub bridge_connected: bool,
    pub card_status: CardStatus,
    pub last_read_payload: Option<Value>,
    pub sessions: usize,
    pub pending_requests: usize,
}

/// Commands understood by the relay actor.
#[derive(Debug)]
pub enum RelayCommand {
    /// A socket was accepted; register it and reply with its session id.
    OpenSession {
        role: SessionRole,
        outbound: mpsc::UnboundedSender<Envelope>,
        reply: oneshot::Sender<SessionId>,
    },

    /// A socket closed.
    CloseSession { session_id: SessionId },

    /// An envelope arrived on a registered session.
    Inbound {
        session_id: SessionId,
        envelope: Envelope,
    },

    /// Forward a command to the bridge and correlate its response.
    SendToBridge {
        kind: EnvelopeKind,
        data: Option<Value>,
        reply: oneshot::Sender<Result<Envelope>>,
    },

    /// A deadline task fired for an in-flight request.
    RequestTimedOut { request_id: String },

    /// A frontend command failed before reaching the bridge; surface it.
    CommandFailed {
        session_id: SessionId,
        kind: EnvelopeKind,
        error: String,
    },

    /// An event produced by the local-reader adapter; dispatch it exactly
    /// like a bridge event.
    PublishLocal { envelope: Envelope },

    /// Reply with a state snapshot.
    Snapshot { reply: oneshot::Sender<RelaySnapshot> },
}

/// Cloneable handle for talking to the relay actor.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayCommand>,
    local_tx: broadcast::Sender<Envelope>,
}

impl RelayHandle {
    fn send(&self, command: RelayCommand) {
        if self.tx.send(command).is_err() {
            warn!("relay actor stopped; command dropped");
        }
    }

    /// Register a new session and get its id.
    ///
    /// Frontend sessions immediately receive a `STATUS` envelope on their
    /// outbound channel.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientDisconnected` if the relay actor is gone.
    pub async fn open_session(
        &self,
        role: SessionRole,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::OpenSession {
            role,
            outbound,
            reply,
        });
        rx.await
            .map_err(|_| Error::ClientDisconnected("relay actor stopped".to_string()))
    }

    /// Drop a session after its socket closed.
    pub fn close_session(&self, session_id: SessionId) {
        self.send(RelayCommand::CloseSession { session_id });
    }

    /// Hand an inbound envelope to the dispatcher.
    pub fn inbound(&self, session_id: SessionId, envelope: Envelope) {
        self.send(RelayCommand::Inbound {
            session_id,
            envelope,
        });
    }

    /// Forward a command to the bridge and await its correlated response.
    ///
    /// # Errors
    ///
    /// - `Error::BridgeNotConnected` if no bridge session exists.
    /// - `Error::RequestTimeout` if no response arrived in time.
    /// - `Error::ClientDisconnected` if the bridge dropped mid-flight.
    /// - `Error::BridgeFault` if the bridge answered with an `ERROR`.
    pub async fn send_to_bridge(
        &self,
        kind: EnvelopeKind,
        data: Option<Value>,
    ) -> Result<Envelope> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::SendToBridge { kind, data, reply });
        rx.await
            .map_err(|_| Error::ClientDisconnected("relay actor stopped".to_string()))?
    }

    /// Publish an event from the local-reader adapter.
    pub fn publish_local(&self, envelope: Envelope) {
        self.send(RelayCommand::PublishLocal { envelope });
    }

    /// Subscribe to the local-reader broadcast channel.
    ///
    /// `READ_RESULT` events pass through here regardless of whether they
    /// came from the bridge or the direct-attach adapter, so both modes
    /// look identical to in-process consumers.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<Envelope> {
        self.local_tx.subscribe()
    }

    /// Fetch a state snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientDisconnected` if the relay actor is gone.
    pub async fn snapshot(&self) -> Result<RelaySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Snapshot { reply });
        rx.await
            .map_err(|_| Error::ClientDisconnected("relay actor stopped".to_string()))
    }
}

/// The actor itself. Constructed and spawned via [`Relay::spawn`].
pub struct Relay {
    config: RelayConfig,
    rx: mpsc::UnboundedReceiver<RelayCommand>,

    /// Own sender, cloned into deadline tasks and failure waiters.
    tx: mpsc::UnboundedSender<RelayCommand>,

    registry: SessionRegistry,
    pending: PendingTable,

    /// Dispatcher-owned cache consumed by frontend status pushes.
    card_status: CardStatus,
    last_read_payload: Option<Value>,

    /// Parity channel shared with the direct-attach mode.
    local_tx: broadcast::Sender<Envelope>,
}

impl Relay {
    /// Spawn the actor task and return a handle to it.
    #[must_use]
    pub fn spawn(config: RelayConfig) -> RelayHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (local_tx, _) = broadcast::channel(64);

        let relay = Relay {
            config,
            rx,
            tx: tx.clone(),
            registry: SessionRegistry::new(),
            pending: PendingTable::new(),
            card_status: CardStatus::absent(),
            last_read_payload: None,
            local_tx: local_tx.clone(),
        };
        tokio::spawn(relay.run());

        RelayHandle { tx, local_tx }
    }

    async fn run(mut self) {
        debug!(timeout_ms = self.config.request_timeout.as_millis() as u64, "relay actor started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
        debug!("relay actor stopped");
    }

    fn handle(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::OpenSession {
                role,
                outbound,
                reply,
            } => {
                let session_id = self.registry.open(role, outbound);
                if role == SessionRole::Frontend {
                    if let Some(session) = self.registry.get(&session_id) {
                        session.send(self.status_envelope());
                    }
                }
                let _ = reply.send(session_id);
            }

            RelayCommand::CloseSession { session_id } => self.close_session(&session_id),

            RelayCommand::Inbound {
                session_id,
                envelope,
            } => match self.registry.get(&session_id).map(|s| s.role) {
                Some(SessionRole::Bridge) => {
                    self.dispatch_bridge_envelope(Some(session_id), envelope);
                }
                Some(SessionRole::Frontend) => {
                    self.dispatch_frontend_envelope(session_id, envelope);
                }
                None => {
                    trace!(session_id = %session_id, "envelope from unregistered session dropped");
                }
            },

            RelayCommand::SendToBridge { kind, data, reply } => {
                self.forward_to_bridge(kind, data, reply);
            }

            RelayCommand::RequestTimedOut { request_id } => {
                self.pending
                    .expire(&request_id, self.config.request_timeout.as_millis() as u64);
            }

            RelayCommand::CommandFailed {
                session_id,
                kind,
                error,
            } => {
                warn!(session_id = %session_id, %kind, %error, "frontend command failed");
                if let Some(session) = self.registry.get(&session_id) {
                    session.send(
                        EnvelopeBuilder::new(EnvelopeKind::Error)
                            .payload(json!({ "command": kind.as_wire() }))
                            .error(error)
                            .build(),
                    );
                }
            }

            RelayCommand::PublishLocal { envelope } => {
                self.dispatch_bridge_envelope(None, envelope);
            }

            RelayCommand::Snapshot { reply } => {
                let _ = reply.send(RelaySnapshot {
                    bridge_connected: self.registry.bridge_connected(),
                    card_status: self.card_status.clone(),
                    last_read_payload: self.last_read_payload.clone(),
                    sessions: self.registry.len(),
                    pending_requests: self.pending.len(),
                });
            }
        }
    }

    /// Handle a closed socket. Bridge closure additionally resets the
    /// card cache, eagerly rejects that bridge's pending requests, and
    /// announces the loss to frontends.
    fn close_session(&mut self, session_id: &SessionId) {
        let Some(session) = self.registry.close(session_id) else {
            return;
        };

        if session.role == SessionRole::Bridge {
            info!(session_id = %session_id, bridge_id = ?session.bridge_id, "bridge disconnected");
            self.card_status = CardStatus::absent();
            self.last_read_payload = None;
            self.pending.reject_owned_by(session_id);
            self.registry.broadcast_frontends(
                &EnvelopeBuilder::new(EnvelopeKind::BridgeDisconnected)
                    .payload(json!({ "bridgeId": session.bridge_id }))
                    .build(),
            );
        }
    }

    /// Dispatch an event envelope from the bridge (or, with `origin`
    /// `None`, from the local-reader adapter).
    fn dispatch_bridge_envelope(&mut self, origin: Option<SessionId>, envelope: Envelope) {
        trace!(kind = %envelope.kind, request_id = ?envelope.request_id, "bridge envelope");

        match &envelope.kind {
            EnvelopeKind::BridgeConnected => {
                if let Some(session_id) = &origin {
                    let bridge_id = envelope
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("bridgeId"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let readers = envelope
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("readers"))
                        .and_then(Value::as_array)
                        .map(|list| {
                            list.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    self.registry
                        .identify_bridge(session_id, bridge_id, readers);
                }
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::Heartbeat => {
                if let Some(session_id) = &origin {
                    self.registry.heartbeat(session_id);
                }
            }

            EnvelopeKind::CardDetected => {
                let uid = envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("uid"))
                    .and_then(Value::as_str)
                    .and_then(|s| CardUid::new(s).ok());
                if uid.is_none() {
                    warn!("CARD_DETECTED without a valid uid");
                }
                self.card_status = CardStatus { present: true, uid };
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::CardRemoved => {
                self.card_status = CardStatus::absent();
                self.last_read_payload = None;
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::ReadResult => {
                self.settle_response(&envelope);
                self.last_read_payload = envelope.payload.clone();
                self.registry.broadcast_frontends(&envelope);
                // Parity with the direct-attach mode: in-process consumers
                // see read results from either source on one channel.
                let _ = self.local_tx.send(envelope);
            }

            EnvelopeKind::WriteResult | EnvelopeKind::RemoveResult => {
                self.settle_response(&envelope);
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::ReaderConnected => {
                if let Some(session_id) = &origin {
                    if let Some(reader) = envelope
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("reader"))
                        .and_then(Value::as_str)
                    {
                        self.registry.add_reader(session_id, reader);
                    }
                }
                self.registry.broadcast_all(&envelope);
            }

            EnvelopeKind::ReaderDisconnected | EnvelopeKind::ReaderError => {
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::Error => {
                self.settle_response(&envelope);
                self.registry.broadcast_frontends(&envelope);
            }

            EnvelopeKind::ReadCard
            | EnvelopeKind::WriteCard
            | EnvelopeKind::RemoveCardData
            | EnvelopeKind::Status
            | EnvelopeKind::BridgeDisconnected => {
                debug!(kind = %envelope.kind, "unexpected kind from bridge side; ignored");
            }

            EnvelopeKind::Unknown(name) => {
                warn!(kind = %name, "unknown envelope kind ignored");
            }
        }
    }

    /// Dispatch an envelope from a frontend session.
    fn dispatch_frontend_envelope(&mut self, session_id: SessionId, envelope: Envelope) {
        trace!(session_id = %session_id, kind = %envelope.kind, "frontend envelope");

        match &envelope.kind {
            EnvelopeKind::Heartbeat => self.registry.heartbeat(&session_id),

            EnvelopeKind::ReadCard | EnvelopeKind::WriteCard | EnvelopeKind::RemoveCardData => {
                let kind = envelope.kind.clone();
                let (reply, rx) = oneshot::channel();
                self.forward_to_bridge(kind.clone(), envelope.data, reply);

                // Success reaches every frontend through the result
                // broadcast; only failures need a directed surface.
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Ok(Err(e)) = rx.await {
                        let _ = tx.send(RelayCommand::CommandFailed {
                            session_id,
                            kind,
                            error: e.to_string(),
                        });
                    }
                });
            }

            EnvelopeKind::Unknown(name) => {
                warn!(session_id = %session_id, kind = %name, "unknown envelope kind ignored");
            }

            other => {
                debug!(session_id = %session_id, kind = %other, "unexpected kind from frontend; ignored");
            }
        }
    }

    /// Correlate a command with a fresh request id, arm its deadline, and
    /// queue it to the authoritative bridge.
    fn forward_to_bridge(
        &mut self,
        kind: EnvelopeKind,
        data: Option<Value>,
        reply: oneshot::Sender<Result<Envelope>>,
    ) {
        let Some(bridge) = self.registry.bridge() else {
            let _ = reply.send(Err(Error::BridgeNotConnected));
            return;
        };
        let bridge_session = bridge.id.clone();

        let request_id = generate_request_id(&kind);
        let timeout = self.config.request_timeout;
        let deadline = tokio::spawn({
            let tx = self.tx.clone();
            let request_id = request_id.clone();
            async move {
                tokio::time::sleep(timeout).await;
                let _ = tx.send(RelayCommand::RequestTimedOut { request_id });
            }
        });

        self.pending
            .insert(request_id.clone(), bridge_session, reply, deadline);

        let mut builder = EnvelopeBuilder::new(kind).request_id(request_id.clone());
        if let Some(data) = data {
            builder = builder.data(data);
        }
        debug!(request_id = %request_id, in_flight = self.pending.len(), "command forwarded to bridge");
        if let Some(bridge) = self.registry.bridge() {
            bridge.send(builder.build());
        }
    }

    /// Settle a pending request matched by this response envelope, if any.
    ///
    /// A response with no matching id — already settled, or unsolicited —
    /// is left to the normal event dispatch with zero effect on the table.
    fn settle_response(&mut self, envelope: &Envelope) {
        let Some(request_id) = envelope.request_id.as_deref() else {
            return;
        };
        if !envelope.is_response() {
            return;
        }

        let result = if envelope.kind == EnvelopeKind::Error {
            Err(Error::BridgeFault(
                envelope
                    .error
                    .clone()
                    .unwrap_or_else(|| "unspecified bridge error".to_string()),
            ))
        } else {
            Ok(envelope.clone())
        };
        self.pending.settle(request_id, result);
    }

    /// The snapshot pushed to every newly connected frontend.
    fn status_envelope(&self) -> Envelope {
        let card_status =
            serde_json::to_value(&self.card_status).unwrap_or_else(|_| json!({ "present": false }));
        EnvelopeBuilder::new(EnvelopeKind::Status)
            .payload(json!({
                "bridgeConnected": self.registry.bridge_connected(),
                "cardStatus": card_status,
                "lastReadPayload": self.last_read_payload,
            }))
            .build()
    }
}
