use super::{
    command::Command,
    event::{Event, HandshakeStage},
};
use crate::{
    envelope::{IceCandidate, SdpKind, SignalPayload},
    traits::MealyMachine,
    types::{Epoch, MediaHandle, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RemoteDescription {
    Unset,
    Applying,
    Applied,
}

/// Offer/answer exchange for one pairing. Candidates that arrive before the
/// remote description is applied are held in `pending` and drained, in
/// arrival order, the moment it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    role: Role,
    epoch: Epoch,
    remote: RemoteDescription,
    pending: Vec<IceCandidate>,
}

impl Handshake {
    pub fn start(
        role: Role,
        epoch: Epoch,
        local_media: Option<MediaHandle>,
    ) -> (Self, Vec<Command>) {
        let handshake = Self {
            role,
            epoch,
            remote: RemoteDescription::Unset,
            pending: Vec::new(),
        };
        let open = Command::OpenPeerConnection {
            epoch,
            role,
            local_media,
        };
        let commands = match role {
            Role::Initiator => vec![open, Command::CreateOffer],
            Role::Receiver => vec![open],
        };
        (handshake, commands)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn remote(&self) -> RemoteDescription {
        self.remote
    }

    pub fn pending(&self) -> &[IceCandidate] {
        &self.pending
    }

    fn expects(&self, kind: SdpKind) -> bool {
        matches!(
            (self.role, kind),
            (Role::Receiver, SdpKind::Offer) | (Role::Initiator, SdpKind::Answer)
        )
    }
}

impl MealyMachine for Handshake {
    type Event = Event;
    type Command = Command;

    fn transition(mut self, event: Event) -> (Self, Vec<Command>) {
        let mut commands = Vec::new();

        match event {
            Event::SignalReceived {
                payload: SignalPayload::Description(description),
            } => match (self.expects(description.kind), self.remote) {
                (true, RemoteDescription::Unset) => {
                    self.remote = RemoteDescription::Applying;
                    commands.push(Command::ApplyRemoteDescription { description });
                }
                (true, RemoteDescription::Applying | RemoteDescription::Applied) | (false, _) => {
                    tracing::debug!(
                        role = %self.role,
                        kind = %description.kind,
                        remote = %self.remote,
                        "ignoring unexpected session description"
                    );
                }
            },

            Event::SignalReceived {
                payload: SignalPayload::Candidate { candidate },
            } => match self.remote {
                RemoteDescription::Applied => {
                    commands.push(Command::ApplyCandidate { candidate });
                }
                RemoteDescription::Unset | RemoteDescription::Applying => {
                    self.pending.push(candidate);
                }
            },

            Event::RemoteDescriptionApplied { .. } => match self.remote {
                RemoteDescription::Applying => {
                    self.remote = RemoteDescription::Applied;
                    commands.extend(
                        self.pending
                            .drain(..)
                            .map(|candidate| Command::ApplyCandidate { candidate }),
                    );
                    match self.role {
                        Role::Receiver => commands.push(Command::CreateAnswer),
                        Role::Initiator => {}
                    }
                }
                RemoteDescription::Unset | RemoteDescription::Applied => {}
            },

            Event::LocalDescriptionCreated { description, .. } => {
                commands.push(Command::SendSignal(SignalPayload::Description(description)));
            }

            Event::LocalCandidateGathered { candidate, .. } => {
                commands.push(Command::SendSignal(SignalPayload::Candidate { candidate }));
            }

            Event::HandshakeFailed { stage, reason, .. } => {
                tracing::warn!(role = %self.role, %stage, %reason, "handshake step failed");
                match (stage, self.remote) {
                    (HandshakeStage::RemoteDescription, RemoteDescription::Applying) => {
                        self.remote = RemoteDescription::Unset;
                    }
                    (HandshakeStage::RemoteDescription, _)
                    | (
                        HandshakeStage::Open
                        | HandshakeStage::CreateOffer
                        | HandshakeStage::CreateAnswer
                        | HandshakeStage::Candidate
                        | HandshakeStage::Send,
                        _,
                    ) => {}
                }
            }

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
            | Event::MediaGranted { .. }
            | Event::MediaDenied { .. }
            | Event::TransportConnecting
            | Event::TransportOpened
            | Event::TransportClosed { .. }
            | Event::WaitingForPeer
            | Event::PeerPaired { .. }
            | Event::PeerLeft
            | Event::OnlineCountChanged { .. }
            | Event::TranslationReceived { .. }
            | Event::IcebreakerReceived { .. }
            | Event::PeerLinkChanged { .. }
            | Event::RemoteMediaAttached { .. }
            | Event::DataChannelOpened { .. }
            | Event::DataChannelClosed { .. }
            | Event::PeerMessageReceived { .. } => {}
        }

        (self, commands)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
