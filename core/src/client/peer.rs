//! Seam between the session machine and a peer-connection primitive.
//!
//! `PeerConnector` opens one link per pairing; `PeerDriver` owns it on a
//! dedicated task and applies operations strictly in submission order, so an
//! offer is never created before the link exists and candidates never
//! overtake the description they depend on. Everything the primitive reports
//! comes back as epoch-tagged [`Event`]s through `PeerSignals`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    envelope::{self, EnvelopeError, IceCandidate, PeerMessage, SdpKind, SessionDescription},
    state::{Event, HandshakeStage, LinkState},
    types::{Epoch, MediaHandle, Role},
};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer connection: {0}")]
    Rtc(#[from] webrtc::Error),
    #[error("no local {0} description after negotiation")]
    MissingLocalDescription(SdpKind),
    #[error("direct channel is not open")]
    ChannelClosed,
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create an offer, set it locally and return it.
    async fn create_offer(&self) -> Result<SessionDescription, HandshakeError>;
    /// Create an answer, set it locally and return it.
    async fn create_answer(&self) -> Result<SessionDescription, HandshakeError>;
    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), HandshakeError>;
    async fn apply_candidate(&self, candidate: IceCandidate) -> Result<(), HandshakeError>;
    async fn send(&self, message: &PeerMessage) -> Result<(), HandshakeError>;
    async fn close(&self) -> Result<(), HandshakeError>;
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn open(
        &self,
        role: Role,
        local_media: Option<MediaHandle>,
        signals: PeerSignals,
    ) -> Result<Box<dyn PeerLink>, HandshakeError>;
}

// ─── Callback sink ──────────────────────────────────────────────────────────

/// Where a primitive reports asynchronous happenings. Every event is stamped
/// with the epoch of the pairing the link was opened for.
#[derive(Debug, Clone)]
pub struct PeerSignals {
    epoch: Epoch,
    events: mpsc::UnboundedSender<Event>,
}

impl PeerSignals {
    pub fn new(epoch: Epoch, events: mpsc::UnboundedSender<Event>) -> Self {
        Self { epoch, events }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::debug!(epoch = %self.epoch, "client loop gone, dropping peer event");
        }
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(Event::LocalCandidateGathered {
            epoch: self.epoch,
            candidate,
        });
    }

    pub fn link_state(&self, state: LinkState) {
        self.emit(Event::PeerLinkChanged {
            epoch: self.epoch,
            state,
        });
    }

    pub fn remote_media(&self, handle: MediaHandle) {
        self.emit(Event::RemoteMediaAttached {
            epoch: self.epoch,
            handle,
        });
    }

    pub fn channel_opened(&self) {
        self.emit(Event::DataChannelOpened { epoch: self.epoch });
    }

    pub fn channel_closed(&self) {
        self.emit(Event::DataChannelClosed { epoch: self.epoch });
    }

    /// Decode a direct-channel frame; malformed frames are dropped.
    pub fn message(&self, text: &str) {
        match envelope::decode::<PeerMessage>(text) {
            Ok(message) => self.emit(Event::PeerMessageReceived {
                epoch: self.epoch,
                message,
            }),
            Err(e) => tracing::debug!(error = %e, "ignoring malformed peer message"),
        }
    }

    fn local_description(&self, description: SessionDescription) {
        self.emit(Event::LocalDescriptionCreated {
            epoch: self.epoch,
            description,
        });
    }

    fn remote_applied(&self) {
        self.emit(Event::RemoteDescriptionApplied { epoch: self.epoch });
    }

    fn failed(&self, stage: HandshakeStage, error: &HandshakeError) {
        self.emit(Event::HandshakeFailed {
            epoch: self.epoch,
            stage,
            reason: error.to_string(),
        });
    }
}

// ─── Driver ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum PeerOp {
    CreateOffer,
    CreateAnswer,
    ApplyRemoteDescription(SessionDescription),
    ApplyCandidate(IceCandidate),
    Send(PeerMessage),
}

/// Handle to the task owning one link. Dropping it closes the link.
#[derive(Debug)]
pub struct PeerDriver {
    epoch: Epoch,
    ops: mpsc::UnboundedSender<PeerOp>,
}

impl PeerDriver {
    pub fn spawn(
        connector: Arc<dyn PeerConnector>,
        epoch: Epoch,
        role: Role,
        local_media: Option<MediaHandle>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        let signals = PeerSignals::new(epoch, events);
        tokio::spawn(drive(connector, role, local_media, signals, rx));
        Self { epoch, ops }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn submit(&self, op: PeerOp) {
        if self.ops.send(op).is_err() {
            tracing::debug!(epoch = %self.epoch, "peer link already closed");
        }
    }
}

async fn drive(
    connector: Arc<dyn PeerConnector>,
    role: Role,
    local_media: Option<MediaHandle>,
    signals: PeerSignals,
    mut ops: mpsc::UnboundedReceiver<PeerOp>,
) {
    let epoch = signals.epoch();
    let link = match connector.open(role, local_media, signals.clone()).await {
        Ok(link) => link,
        Err(e) => {
            signals.failed(HandshakeStage::Open, &e);
            return;
        }
    };
    tracing::debug!(%epoch, %role, "peer link open");

    while let Some(op) = ops.recv().await {
        match op {
            PeerOp::CreateOffer => match link.create_offer().await {
                Ok(description) => signals.local_description(description),
                Err(e) => signals.failed(HandshakeStage::CreateOffer, &e),
            },
            PeerOp::CreateAnswer => match link.create_answer().await {
                Ok(description) => signals.local_description(description),
                Err(e) => signals.failed(HandshakeStage::CreateAnswer, &e),
            },
            PeerOp::ApplyRemoteDescription(description) => {
                match link.apply_remote_description(description).await {
                    Ok(()) => signals.remote_applied(),
                    Err(e) => signals.failed(HandshakeStage::RemoteDescription, &e),
                }
            }
            PeerOp::ApplyCandidate(candidate) => {
                if let Err(e) = link.apply_candidate(candidate).await {
                    signals.failed(HandshakeStage::Candidate, &e);
                }
            }
            PeerOp::Send(message) => {
                if let Err(e) = link.send(&message).await {
                    signals.failed(HandshakeStage::Send, &e);
                }
            }
        }
    }

    match link.close().await {
        Ok(()) => tracing::debug!(%epoch, "peer link closed"),
        Err(e) => tracing::debug!(%epoch, error = %e, "peer link close failed"),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
