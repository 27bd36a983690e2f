//! TCP endpoints for bridges and frontends.
//!
//! The server binds two listeners: the bridge-facing endpoint accepts the
//! hardware process attached to the physical reader, the frontend-facing
//! endpoint accepts any number of dashboard/UI sessions. Every accepted
//! socket is wrapped in `Framed` with the [`EnvelopeCodec`] and split into
//! a reader loop and a writer task; both talk only to the relay actor.
//!
//! # Architecture
//!
//! ```text
//! Bridge   ──┐                       ┌── Frontend 1
//!            ├──> RelayServer ──> Relay actor ──┤
//! (reader)  ─┘        │                         └── Frontend N
//!                     └──> EnvelopeCodec (JSON lines framing)
//! ```
//!
//! # Error handling
//!
//! A malformed envelope on any connection is logged and skipped — the
//! reader loop keeps going. I/O errors close the connection, which the
//! actor observes as a session close (with all the bridge-disconnect
//! consequences when it was the bridge).

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::relay::{Relay, RelayConfig, RelayHandle};
use cardlink_core::constants::{DEFAULT_BRIDGE_PORT, DEFAULT_FRONTEND_PORT};
use cardlink_core::{Error, Result, SessionRole};
use cardlink_protocol::EnvelopeCodec;

/// Configuration for both listening endpoints.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Address of the bridge-facing endpoint.
    pub bridge_addr: SocketAddr,

    /// Address of the frontend-facing endpoint.
    pub frontend_addr: SocketAddr,

    /// Relay tuning (request deadline).
    pub relay: RelayConfig,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bridge_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_BRIDGE_PORT)),
            frontend_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_FRONTEND_PORT)),
            relay: RelayConfig::default(),
        }
    }
}

/// The relay's network face: two listeners feeding one actor.
pub struct RelayServer {
    bridge_listener: TcpListener,
    frontend_listener: TcpListener,
    handle: RelayHandle,
}

impl RelayServer {
    /// Bind both endpoints and spawn the relay actor.
    ///
    /// # Errors
    ///
    /// Returns an error if either address cannot be bound.
    pub async fn bind(config: RelayServerConfig) -> Result<Self> {
        let bridge_listener = TcpListener::bind(config.bridge_addr).await?;
        let frontend_listener = TcpListener::bind(config.frontend_addr).await?;
        info!(
            bridge_addr = %config.bridge_addr,
            frontend_addr = %config.frontend_addr,
            "relay server listening"
        );

        Ok(Self {
            bridge_listener,
            frontend_listener,
            handle: Relay::spawn(config.relay),
        })
    }

    /// Handle to the relay actor, for the local adapter and status APIs.
    #[must_use]
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Actual bridge endpoint address; useful with port 0 in tests.
    pub fn bridge_addr(&self) -> Result<SocketAddr> {
        self.bridge_listener.local_addr().map_err(Into::into)
    }

    /// Actual frontend endpoint address; useful with port 0 in tests.
    pub fn frontend_addr(&self) -> Result<SocketAddr> {
        self.frontend_listener.local_addr().map_err(Into::into)
    }

    /// Accept connections on both endpoints until the process stops.
    ///
    /// # Errors
    ///
    /// Returns an error only on listener-level failures; per-connection
    /// errors are contained in their tasks.
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.bridge_listener.accept() => {
                    let (stream, addr) = accepted?;
                    debug!(%addr, "bridge connection accepted");
                    tokio::spawn(serve_connection(stream, addr, SessionRole::Bridge, self.handle.clone()));
                }
                accepted = self.frontend_listener.accept() => {
                    let (stream, addr) = accepted?;
                    debug!(%addr, "frontend connection accepted");
                    tokio::spawn(serve_connection(stream, addr, SessionRole::Frontend, self.handle.clone()));
                }
            }
        }
    }
}

/// Drive one socket for its whole life: register the session, pump
/// outbound envelopes from the actor, feed inbound envelopes to it, and
/// deregister on close.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    role: SessionRole,
    handle: RelayHandle,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%addr, error = %e, "failed to set TCP_NODELAY");
    }

    let framed = Framed::new(stream, EnvelopeCodec::new());
    let (mut sink, mut stream) = framed.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let session_id = match handle.open_session(role, outbound_tx).await {
        Ok(session_id) => session_id,
        Err(e) => {
            warn!(%addr, error = %e, "could not register session");
            return;
        }
    };
    info!(%addr, session_id = %session_id, %role, "session established");

    // Writer task: drain the actor-facing queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if sink.send(envelope).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: decode envelopes, swallow malformed lines, stop on I/O
    // errors.
    while let Some(decoded) = stream.next().await {
        match decoded {
            Ok(envelope) => handle.inbound(session_id.clone(), envelope),
            Err(Error::InvalidEnvelope(reason)) => {
                warn!(session_id = %session_id, %reason, "malformed envelope discarded");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "connection error, closing");
                break;
            }
        }
    }

    handle.close_session(session_id.clone());
    writer.abort();
    info!(%addr, session_id = %session_id, "session closed");
}
