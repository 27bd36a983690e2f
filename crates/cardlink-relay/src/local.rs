//! Direct-attach mode: drive a local reader instead of a remote bridge.
//!
//! The adapter polls a [`CardTransceiver`] for card presence, runs the
//! same [`CardEngine`] scan the bridge firmware would run, and publishes
//! the resulting `CARD_DETECTED` / `READ_RESULT` / `CARD_REMOVED` events
//! through the relay actor — so frontends cannot tell a locally attached
//! reader from a remote bridge.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::relay::RelayHandle;
use cardlink_card::{CardEngine, CardTransceiver};
use cardlink_core::{CardUid, Result};
use cardlink_protocol::{EnvelopeBuilder, EnvelopeKind};

/// Default presence-poll cadence.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polls a local reader and feeds its events into the relay.
pub struct LocalReaderAdapter<T: CardTransceiver> {
    engine: CardEngine,
    transceiver: T,
    handle: RelayHandle,
    poll_interval: Duration,

    /// UID seen on the previous poll, for edge detection.
    last_uid: Option<CardUid>,
}

impl<T: CardTransceiver> LocalReaderAdapter<T> {
    /// Adapter with the default engine and poll cadence.
    pub fn new(transceiver: T, handle: RelayHandle) -> Self {
        Self {
            engine: CardEngine::new(),
            transceiver,
            handle,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_uid: None,
        }
    }

    /// Override the poll cadence.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Probe the reader once and publish any insertion/removal edge.
    ///
    /// An insertion publishes `CARD_DETECTED`, immediately runs a read
    /// scan, and publishes its `READ_RESULT`. A removal publishes
    /// `CARD_REMOVED`.
    ///
    /// # Errors
    ///
    /// Propagates reader-level probe failures; card-level read failures
    /// are reported in the published `READ_RESULT` instead.
    pub async fn poll_once(&mut self) -> Result<()> {
        let uid = self.transceiver.card_present().await?;

        match (&uid, &self.last_uid) {
            (Some(uid), last) if last.as_ref() != Some(uid) => {
                debug!(uid = %uid, "local reader: card detected");
                self.handle.publish_local(
                    EnvelopeBuilder::new(EnvelopeKind::CardDetected)
                        .payload(json!({ "uid": uid.as_str() }))
                        .build(),
                );
                self.read_and_publish().await;
            }
            (None, Some(previous)) => {
                debug!(uid = %previous, "local reader: card removed");
                self.handle
                    .publish_local(EnvelopeBuilder::new(EnvelopeKind::CardRemoved).build());
            }
            _ => {}
        }

        self.last_uid = uid;
        Ok(())
    }

    /// Poll until the relay shuts down or the reader disappears for good.
    ///
    /// Transient probe failures are logged and retried at the next tick.
    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "local reader poll failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn read_and_publish(&mut self) {
        match self.engine.read_card(&mut self.transceiver).await {
            Ok(outcome) => {
                let mut builder = EnvelopeBuilder::new(EnvelopeKind::ReadResult)
                    .payload(json!({
                        "uid": outcome.uid.as_str(),
                        "payload": outcome.payload,
                    }))
                    .success(outcome.error.is_none());
                if let Some(error) = outcome.error {
                    builder = builder.error(error);
                }
                self.handle.publish_local(builder.build());
            }
            Err(e) => {
                warn!(error = %e, "local reader scan failed");
                self.handle.publish_local(
                    EnvelopeBuilder::new(EnvelopeKind::ReaderError)
                        .error(e.to_string())
                        .build(),
                );
            }
        }
    }
}
