use crate::{
    envelope::{IceCandidate, PeerMessage, SessionDescription, SignalPayload, TranslationResult},
    types::{Epoch, Interests, MediaHandle, Role, TrackKind},
};

/// Connection state reported by the peer-connection primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Which primitive operation a `HandshakeFailed` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HandshakeStage {
    Open,
    CreateOffer,
    CreateAnswer,
    RemoteDescription,
    Candidate,
    Send,
}

#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum Event {
    // ─── User intents ───────────────────────────────────────────────────────
    FindRequested {
        interests: Interests,
    },
    NextRequested,
    RetryRequested,
    ConnectRequested,
    DisconnectRequested,
    ChatSubmitted {
        text: String,
        timestamp: u64,
    },
    ChatCleared,
    TypingChanged {
        is_typing: bool,
    },
    IcebreakerRequested,
    TranslationToggled {
        enabled: bool,
    },
    TrackToggled {
        kind: TrackKind,
    },

    // ─── Media completions (epoch-tagged) ───────────────────────────────────
    MediaGranted {
        epoch: Epoch,
        handle: MediaHandle,
    },
    MediaDenied {
        epoch: Epoch,
        reason: String,
    },

    // ─── Control channel ────────────────────────────────────────────────────
    TransportConnecting,
    TransportOpened,
    TransportClosed {
        reason: String,
    },
    WaitingForPeer,
    PeerPaired {
        role: Role,
    },
    SignalReceived {
        payload: SignalPayload,
    },
    PeerLeft,
    OnlineCountChanged {
        users: u64,
    },
    TranslationReceived {
        result: TranslationResult,
    },
    IcebreakerReceived {
        text: String,
    },

    // ─── Peer-connection primitive (epoch-tagged) ───────────────────────────
    LocalDescriptionCreated {
        epoch: Epoch,
        description: SessionDescription,
    },
    RemoteDescriptionApplied {
        epoch: Epoch,
    },
    LocalCandidateGathered {
        epoch: Epoch,
        candidate: IceCandidate,
    },
    HandshakeFailed {
        epoch: Epoch,
        stage: HandshakeStage,
        reason: String,
    },
    PeerLinkChanged {
        epoch: Epoch,
        state: LinkState,
    },
    RemoteMediaAttached {
        epoch: Epoch,
        handle: MediaHandle,
    },
    DataChannelOpened {
        epoch: Epoch,
    },
    DataChannelClosed {
        epoch: Epoch,
    },
    PeerMessageReceived {
        epoch: Epoch,
        message: PeerMessage,
    },
}

impl Event {
    /// Session epoch carried by asynchronous completions; `None` for intents
    /// and control-channel events, which are always current.
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Event::MediaGranted { epoch, .. }
            | Event::MediaDenied { epoch, .. }
            | Event::LocalDescriptionCreated { epoch, .. }
            | Event::RemoteDescriptionApplied { epoch }
            | Event::LocalCandidateGathered { epoch, .. }
            | Event::HandshakeFailed { epoch, .. }
            | Event::PeerLinkChanged { epoch, .. }
            | Event::RemoteMediaAttached { epoch, .. }
            | Event::DataChannelOpened { epoch }
            | Event::DataChannelClosed { epoch }
            | Event::PeerMessageReceived { epoch, .. } => Some(*epoch),

            Event::FindRequested { .. }
            | Event::NextRequested
            | Event::RetryRequested
            | Event::ConnectRequested
            | Event::DisconnectRequested
            | Event::ChatSubmitted { .. }
            | Event::ChatCleared
            | Event::TypingChanged { .. }
            | Event::IcebreakerRequested
            | Event::TranslationToggled { .. }
            | Event::TrackToggled { .. }
            | Event::TransportConnecting
            | Event::TransportOpened
            | Event::TransportClosed { .. }
            | Event::WaitingForPeer
            | Event::PeerPaired { .. }
            | Event::SignalReceived { .. }
            | Event::PeerLeft
            | Event::OnlineCountChanged { .. }
            | Event::TranslationReceived { .. }
            | Event::IcebreakerReceived { .. } => None,
        }
    }
}
