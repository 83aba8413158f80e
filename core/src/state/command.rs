use super::session::Phase;
use crate::{
    envelope::{ClientMessage, IceCandidate, PeerMessage, SessionDescription, SignalPayload},
    types::{ChatEntry, Epoch, MediaHandle, Role, TrackKind},
};

#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum Command {
    // ─── Control channel ────────────────────────────────────────────────────
    SendControl(ClientMessage),
    SendSignal(SignalPayload),
    ConnectTransport,
    CloseTransport,

    // ─── Local media ────────────────────────────────────────────────────────
    AcquireMedia {
        epoch: Epoch,
    },
    ToggleTrack {
        kind: TrackKind,
    },

    // ─── Peer connection (from Handshake / Outbox) ──────────────────────────
    OpenPeerConnection {
        epoch: Epoch,
        role: Role,
        local_media: Option<MediaHandle>,
    },
    CreateOffer,
    CreateAnswer,
    ApplyRemoteDescription {
        description: SessionDescription,
    },
    ApplyCandidate {
        candidate: IceCandidate,
    },
    ClosePeerConnection,
    SendPeerMessage(PeerMessage),

    // ─── UI ─────────────────────────────────────────────────────────────────
    Notify(Notification),
}

/// What the UI layer renders. The core never reads anything back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Session(SessionSnapshot),
    ChatLog(Vec<ChatEntry>),
    RemoteTyping(bool),
    OnlineCount(u64),
    Icebreaker(String),
    MediaFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub local_media: Option<MediaHandle>,
    pub remote_media: Option<MediaHandle>,
}
