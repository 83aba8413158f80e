use super::{
    command::{Command, Notification, SessionSnapshot},
    event::{Event, LinkState},
    handshake::Handshake,
    outbox::Outbox,
};
use crate::{
    envelope::{ClientMessage, FindRequest, PeerMessage, TranslationRequest},
    traits::MealyMachine,
    types::{Epoch, Interests, MediaHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    Idle,
    AcquiringMedia,
    ConnectingTransport,
    WaitingForMatch,
    Paired,
    Connected,
    Disconnected,
    PeerLeft,
    TransportError,
    MediaError,
}

impl Phase {
    /// A pairing exists or is being negotiated.
    pub fn in_session(self) -> bool {
        matches!(self, Phase::Paired | Phase::Connected)
    }
}

/// A find the user asked for. `submitted` once it went out on the control
/// channel; a `paired`/`waiting` reply is only honoured for a submitted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub interests: Interests,
    pub submitted: bool,
}

/// One client's view of a chat attempt. The only place phase changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    phase: Phase,
    epoch: Epoch,
    search: Option<SearchRequest>,
    local_media: Option<MediaHandle>,
    remote_media: Option<MediaHandle>,
    transport_open: bool,
    reconnect_attempts: u32,
    translation_enabled: bool,
    handshake: Option<Handshake>,
    outbox: Outbox,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            epoch: Epoch::initial(),
            search: None,
            local_media: None,
            remote_media: None,
            transport_open: false,
            reconnect_attempts: 0,
            translation_enabled: true,
            handshake: None,
            outbox: Outbox::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn search(&self) -> Option<&SearchRequest> {
        self.search.as_ref()
    }

    pub fn local_media(&self) -> Option<&MediaHandle> {
        self.local_media.as_ref()
    }

    pub fn remote_media(&self) -> Option<&MediaHandle> {
        self.remote_media.as_ref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn translation_enabled(&self) -> bool {
        self.translation_enabled
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            local_media: self.local_media.clone(),
            remote_media: self.remote_media.clone(),
        }
    }

    /// End the current pairing attempt. Bumping the epoch orphans every
    /// in-flight completion issued for it.
    fn teardown(&mut self) -> Vec<Command> {
        self.epoch = self.epoch.next();
        self.search = None;
        self.remote_media = None;
        let mut commands: Vec<Command> = self.outbox.detach().into_iter().collect();
        if self.handshake.take().is_some() {
            commands.push(Command::ClosePeerConnection);
        }
        commands
    }

    /// Send the pending find once media and the control channel are both
    /// available.
    fn submit_search(&mut self) -> Vec<Command> {
        match (
            self.search.as_mut(),
            self.local_media.is_some(),
            self.transport_open,
        ) {
            (Some(search), true, true) if !search.submitted => {
                search.submitted = true;
                vec![Command::SendControl(ClientMessage::Find(FindRequest {
                    interests: search.interests.clone(),
                }))]
            }
            (Some(_), ..) | (None, ..) => Vec::new(),
        }
    }

    fn search_submitted(&self) -> bool {
        self.search.as_ref().is_some_and(|search| search.submitted)
    }

    fn delegate_handshake(&mut self, event: Event) -> Vec<Command> {
        match self.handshake.take() {
            Some(handshake) => {
                let (handshake, commands) = handshake.transition(event);
                self.handshake = Some(handshake);
                commands
            }
            None => {
                tracing::debug!(event = %event, "no handshake in progress, ignoring");
                Vec::new()
            }
        }
    }

    fn delegate_outbox(&mut self, event: Event) -> Vec<Command> {
        let (outbox, commands) = std::mem::take(&mut self.outbox).transition(event);
        self.outbox = outbox;
        commands
    }
}

impl MealyMachine for Session {
    type Event = Event;
    type Command = Command;

    fn transition(mut self, event: Event) -> (Self, Vec<Command>) {
        if let Some(epoch) = event.epoch()
            && epoch != self.epoch
        {
            tracing::debug!(
                event = %event,
                %epoch,
                current = %self.epoch,
                "discarding stale completion"
            );
            return (self, Vec::new());
        }

        let before = self.snapshot();
        let mut commands = Vec::new();

        match event {
            // ─── Matchmaking ────────────────────────────────────────────────
            Event::FindRequested { interests } => match self.phase {
                Phase::Idle | Phase::PeerLeft | Phase::MediaError => {
                    self.search = Some(SearchRequest {
                        interests,
                        submitted: false,
                    });
                    match self.local_media.is_some() {
                        true => commands.extend(self.submit_search()),
                        false => {
                            self.phase = Phase::AcquiringMedia;
                            commands.push(Command::AcquireMedia { epoch: self.epoch });
                        }
                    }
                }
                Phase::AcquiringMedia
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Paired
                | Phase::Connected
                | Phase::Disconnected
                | Phase::TransportError => {
                    tracing::debug!(phase = %self.phase, "find ignored");
                }
            },

            Event::MediaGranted { handle, .. } => match self.phase {
                Phase::AcquiringMedia => {
                    tracing::info!(media = %handle, "local media granted");
                    self.local_media = Some(handle);
                    commands.extend(self.submit_search());
                }
                Phase::Idle
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Paired
                | Phase::Connected
                | Phase::Disconnected
                | Phase::PeerLeft
                | Phase::TransportError
                | Phase::MediaError => {
                    tracing::debug!(phase = %self.phase, "media grant outside acquisition");
                }
            },

            Event::MediaDenied { reason, .. } => match self.phase {
                Phase::AcquiringMedia => {
                    tracing::warn!(%reason, "local media unavailable");
                    self.phase = Phase::MediaError;
                    commands.push(Command::Notify(Notification::MediaFailure(reason)));
                }
                Phase::Idle
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Paired
                | Phase::Connected
                | Phase::Disconnected
                | Phase::PeerLeft
                | Phase::TransportError
                | Phase::MediaError => {}
            },

            Event::WaitingForPeer => match self.search_submitted() {
                true => self.phase = Phase::WaitingForMatch,
                false => tracing::debug!("waiting notice without a pending find"),
            },

            Event::PeerPaired { role } => match self.search_submitted() {
                true => {
                    self.search = None;
                    self.phase = Phase::Paired;
                    let (handshake, cmds) =
                        Handshake::start(role, self.epoch, self.local_media.clone());
                    self.handshake = Some(handshake);
                    commands.extend(cmds);
                }
                false => {
                    tracing::debug!(%role, "stale pairing, leaving");
                    commands.push(Command::SendControl(ClientMessage::Leave));
                }
            },

            Event::PeerLeft => match self.phase {
                Phase::Paired | Phase::Connected => {
                    commands.extend(self.teardown());
                    self.phase = Phase::PeerLeft;
                }
                Phase::Idle
                | Phase::AcquiringMedia
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Disconnected
                | Phase::PeerLeft
                | Phase::TransportError
                | Phase::MediaError => {}
            },

            Event::NextRequested => match (self.phase, self.search.is_some()) {
                (Phase::Idle, false) => {}
                _ => {
                    commands.extend(self.teardown());
                    commands.push(Command::SendControl(ClientMessage::Leave));
                    commands.push(self.outbox.clear());
                    self.phase = Phase::Idle;
                    if !self.transport_open {
                        commands.push(Command::ConnectTransport);
                    }
                }
            },

            Event::RetryRequested => match self.phase {
                Phase::MediaError => {
                    self.phase = Phase::AcquiringMedia;
                    commands.push(Command::AcquireMedia { epoch: self.epoch });
                }
                Phase::TransportError | Phase::Disconnected => {
                    self.phase = Phase::ConnectingTransport;
                    commands.push(Command::ConnectTransport);
                }
                Phase::Idle
                | Phase::AcquiringMedia
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Paired
                | Phase::Connected
                | Phase::PeerLeft => {}
            },

            // ─── Control channel ────────────────────────────────────────────
            Event::ConnectRequested => {
                match self.phase {
                    Phase::Idle | Phase::TransportError | Phase::Disconnected => {
                        match self.transport_open {
                            true => {}
                            false => self.phase = Phase::ConnectingTransport,
                        }
                    }
                    Phase::AcquiringMedia
                    | Phase::ConnectingTransport
                    | Phase::WaitingForMatch
                    | Phase::Paired
                    | Phase::Connected
                    | Phase::PeerLeft
                    | Phase::MediaError => {}
                }
                match self.transport_open {
                    true => {}
                    false => commands.push(Command::ConnectTransport),
                }
            }

            Event::DisconnectRequested => {
                commands.extend(self.teardown());
                commands.push(Command::SendControl(ClientMessage::Leave));
                commands.push(Command::CloseTransport);
                self.phase = Phase::Disconnected;
            }

            Event::TransportConnecting => match self.phase {
                Phase::Idle | Phase::TransportError | Phase::Disconnected => {
                    self.phase = Phase::ConnectingTransport;
                }
                Phase::AcquiringMedia
                | Phase::ConnectingTransport
                | Phase::WaitingForMatch
                | Phase::Paired
                | Phase::Connected
                | Phase::PeerLeft
                | Phase::MediaError => {}
            },

            Event::TransportOpened => {
                self.transport_open = true;
                self.reconnect_attempts = 0;
                match self.phase {
                    Phase::ConnectingTransport | Phase::TransportError | Phase::Disconnected => {
                        self.phase = Phase::Idle;
                    }
                    Phase::Idle
                    | Phase::AcquiringMedia
                    | Phase::WaitingForMatch
                    | Phase::Paired
                    | Phase::Connected
                    | Phase::PeerLeft
                    | Phase::MediaError => {}
                }
                commands.extend(self.submit_search());
            }

            Event::TransportClosed { reason } => {
                self.transport_open = false;
                self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                match self.phase {
                    Phase::Idle | Phase::PeerLeft | Phase::Disconnected => {
                        self.search = None;
                    }
                    Phase::AcquiringMedia
                    | Phase::ConnectingTransport
                    | Phase::WaitingForMatch
                    | Phase::Paired
                    | Phase::Connected
                    | Phase::TransportError
                    | Phase::MediaError => {
                        tracing::warn!(
                            %reason,
                            phase = %self.phase,
                            attempts = self.reconnect_attempts,
                            "control channel lost"
                        );
                        commands.extend(self.teardown());
                        self.phase = Phase::TransportError;
                    }
                }
            }

            Event::OnlineCountChanged { users } => {
                commands.push(Command::Notify(Notification::OnlineCount(users)));
            }

            Event::IcebreakerRequested => {
                commands.push(Command::SendControl(ClientMessage::Icebreaker));
            }

            Event::IcebreakerReceived { text } => {
                commands.push(Command::Notify(Notification::Icebreaker(text)));
            }

            Event::TranslationToggled { enabled } => {
                self.translation_enabled = enabled;
            }

            Event::TrackToggled { kind } => match self.local_media {
                Some(_) => commands.push(Command::ToggleTrack { kind }),
                None => tracing::debug!(%kind, "no local media to toggle"),
            },

            // ─── Handshake ──────────────────────────────────────────────────
            event @ (Event::SignalReceived { .. }
            | Event::LocalDescriptionCreated { .. }
            | Event::RemoteDescriptionApplied { .. }
            | Event::LocalCandidateGathered { .. }
            | Event::HandshakeFailed { .. }) => {
                commands.extend(self.delegate_handshake(event));
            }

            Event::PeerLinkChanged { state, .. } => {
                tracing::info!(%state, "peer link changed");
                match (state, self.phase) {
                    (LinkState::Connected, Phase::Paired) => self.phase = Phase::Connected,
                    (LinkState::Failed | LinkState::Closed, _) => self.remote_media = None,
                    (LinkState::Connected, _)
                    | (LinkState::Connecting | LinkState::Disconnected, _) => {}
                }
            }

            Event::RemoteMediaAttached { handle, .. } => match self.phase.in_session() {
                true => self.remote_media = Some(handle),
                false => tracing::debug!(media = %handle, "remote media outside a session"),
            },

            // ─── Direct channel ─────────────────────────────────────────────
            Event::PeerMessageReceived { epoch, message } => {
                if let (PeerMessage::Chat(chat), true) = (&message, self.translation_enabled) {
                    commands.push(Command::SendControl(ClientMessage::Translate(
                        TranslationRequest {
                            text: chat.text.clone(),
                            timestamp: chat.timestamp,
                        },
                    )));
                }
                commands.extend(self.delegate_outbox(Event::PeerMessageReceived { epoch, message }));
            }

            event @ (Event::ChatSubmitted { .. }
            | Event::ChatCleared
            | Event::TypingChanged { .. }
            | Event::TranslationReceived { .. }
            | Event::DataChannelOpened { .. }
            | Event::DataChannelClosed { .. }) => {
                commands.extend(self.delegate_outbox(event));
            }
        }

        let after = self.snapshot();
        match before == after {
            true => {}
            false => commands.push(Command::Notify(Notification::Session(after))),
        }

        (self, commands)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        envelope::{ChatPayload, SdpKind, SessionDescription, SignalPayload},
        state::event::HandshakeStage,
        test_utils::{arb_interests, arb_phase, arb_role, run_events},
        types::{DeliveryStatus, Role},
    };

    fn media() -> MediaHandle {
        MediaHandle::new("local-0")
    }

    fn sends(commands: &[Command]) -> Vec<ClientMessage> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::SendControl(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// A session whose transport is open and whose find is out.
    fn searching(interests: Interests) -> Session {
        let (session, _) = run_events(
            Session::new(),
            vec![
                Event::TransportConnecting,
                Event::TransportOpened,
                Event::FindRequested { interests },
            ],
        );
        let epoch = session.epoch();
        let (session, _) = run_events(
            session,
            vec![Event::MediaGranted {
                epoch,
                handle: media(),
            }],
        );
        session
    }

    fn connected(role: Role) -> Session {
        let session = searching(Interests::empty());
        let epoch = session.epoch();
        let (session, _) = run_events(
            session,
            vec![
                Event::WaitingForPeer,
                Event::PeerPaired { role },
                Event::PeerLinkChanged {
                    epoch,
                    state: LinkState::Connected,
                },
            ],
        );
        session
    }

    #[test]
    fn find_without_media_acquires_first() {
        let (session, commands) = run_events(
            Session::new(),
            vec![Event::TransportOpened, Event::FindRequested {
                interests: Interests::new(["games"]),
            }],
        );
        assert_eq!(session.phase(), Phase::AcquiringMedia);
        assert!(commands.contains(&Command::AcquireMedia {
            epoch: session.epoch()
        }));
        assert!(sends(&commands).is_empty());
    }

    #[test]
    fn media_grant_sends_find_and_keeps_phase() {
        let session = searching(Interests::new(["games"]));
        assert_eq!(session.phase(), Phase::AcquiringMedia);
        assert!(session.search().is_some_and(|search| search.submitted));
        assert_eq!(session.local_media(), Some(&media()));
    }

    #[test]
    fn find_with_media_sends_immediately() {
        let session = connected(Role::Initiator);
        let (session, _) = session.transition(Event::PeerLeft);
        let (session, commands) = session.transition(Event::FindRequested {
            interests: Interests::new(["art"]),
        });
        assert_eq!(
            sends(&commands),
            vec![ClientMessage::Find(FindRequest {
                interests: Interests::new(["art"]),
            })]
        );
        assert_eq!(session.phase(), Phase::PeerLeft);
        let (session, _) = session.transition(Event::WaitingForPeer);
        assert_eq!(session.phase(), Phase::WaitingForMatch);
    }

    #[test]
    fn media_denied_is_reported_and_retryable() {
        let (session, _) = run_events(
            Session::new(),
            vec![Event::TransportOpened, Event::FindRequested {
                interests: Interests::empty(),
            }],
        );
        let epoch = session.epoch();
        let (session, commands) = session.transition(Event::MediaDenied {
            epoch,
            reason: "permission denied".to_string(),
        });
        assert_eq!(session.phase(), Phase::MediaError);
        assert!(commands.contains(&Command::Notify(Notification::MediaFailure(
            "permission denied".to_string()
        ))));

        let (session, commands) = session.transition(Event::RetryRequested);
        assert_eq!(session.phase(), Phase::AcquiringMedia);
        assert!(commands.contains(&Command::AcquireMedia { epoch }));
    }

    #[test]
    fn initiator_pairing_starts_offer() {
        let session = searching(Interests::empty());
        let (session, commands) = session.transition(Event::PeerPaired {
            role: Role::Initiator,
        });
        assert_eq!(session.phase(), Phase::Paired);
        assert!(commands.contains(&Command::CreateOffer));
        assert!(matches!(
            commands.first(),
            Some(Command::OpenPeerConnection { role: Role::Initiator, local_media: Some(_), .. })
        ));
    }

    #[test]
    fn only_primitive_connected_promotes() {
        let session = searching(Interests::empty());
        let epoch = session.epoch();
        let (session, _) = session.transition(Event::PeerPaired {
            role: Role::Receiver,
        });
        let (session, _) = session.transition(Event::DataChannelOpened { epoch });
        assert_eq!(session.phase(), Phase::Paired);
        let (session, _) = session.transition(Event::PeerLinkChanged {
            epoch,
            state: LinkState::Connected,
        });
        assert_eq!(session.phase(), Phase::Connected);
    }

    #[test]
    fn link_failure_clears_remote_media_only() {
        let session = connected(Role::Receiver);
        let epoch = session.epoch();
        let (session, _) = session.transition(Event::RemoteMediaAttached {
            epoch,
            handle: MediaHandle::new("remote-1"),
        });
        assert!(session.remote_media().is_some());
        let (session, commands) = session.transition(Event::PeerLinkChanged {
            epoch,
            state: LinkState::Failed,
        });
        assert_eq!(session.phase(), Phase::Connected);
        assert!(session.remote_media().is_none());
        assert!(commands.iter().any(|command| matches!(
            command,
            Command::Notify(Notification::Session(SessionSnapshot { remote_media: None, .. }))
        )));
    }

    #[test]
    fn peer_left_tears_down() {
        let session = connected(Role::Initiator);
        let (session, commands) = session.transition(Event::PeerLeft);
        assert_eq!(session.phase(), Phase::PeerLeft);
        assert!(commands.contains(&Command::ClosePeerConnection));
        assert!(session.handshake().is_none());
        assert!(sends(&commands).is_empty());
    }

    #[test]
    fn next_during_media_acquisition_discards_late_grant() {
        let (session, _) = run_events(
            Session::new(),
            vec![Event::TransportOpened, Event::FindRequested {
                interests: Interests::empty(),
            }],
        );
        let stale = session.epoch();
        let (session, commands) = session.transition(Event::NextRequested);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(sends(&commands).contains(&ClientMessage::Leave));

        let (session, commands) = session.transition(Event::MediaGranted {
            epoch: stale,
            handle: media(),
        });
        assert!(commands.is_empty());
        assert!(session.local_media().is_none());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn unexpected_close_mid_session_is_transport_error() {
        let session = connected(Role::Initiator);
        let (session, commands) = session.transition(Event::TransportClosed {
            reason: "reset".to_string(),
        });
        assert_eq!(session.phase(), Phase::TransportError);
        assert_eq!(session.reconnect_attempts(), 1);
        assert!(commands.contains(&Command::ClosePeerConnection));

        let (session, commands) = session.transition(Event::RetryRequested);
        assert_eq!(session.phase(), Phase::ConnectingTransport);
        assert!(commands.contains(&Command::ConnectTransport));

        let (session, _) = session.transition(Event::TransportOpened);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.reconnect_attempts(), 0);
    }

    #[test]
    fn close_while_idle_keeps_phase() {
        let (session, _) = run_events(Session::new(), vec![Event::TransportOpened]);
        let (session, _) = session.transition(Event::TransportClosed {
            reason: "eof".to_string(),
        });
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn stale_pairing_is_declined() {
        let (session, _) = run_events(Session::new(), vec![Event::TransportOpened]);
        let (session, commands) = session.transition(Event::PeerPaired {
            role: Role::Initiator,
        });
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(sends(&commands), vec![ClientMessage::Leave]);
    }

    #[test]
    fn disconnect_closes_transport() {
        let session = connected(Role::Receiver);
        let (session, commands) = session.transition(Event::DisconnectRequested);
        assert_eq!(session.phase(), Phase::Disconnected);
        assert!(commands.contains(&Command::CloseTransport));
        assert!(sends(&commands).contains(&ClientMessage::Leave));

        let (session, _) = session.transition(Event::TransportClosed {
            reason: "closed".to_string(),
        });
        assert_eq!(session.phase(), Phase::Disconnected);

        let (session, commands) = session.transition(Event::ConnectRequested);
        assert_eq!(session.phase(), Phase::ConnectingTransport);
        assert!(commands.contains(&Command::ConnectTransport));
    }

    #[test]
    fn remote_chat_requests_translation_when_enabled() {
        let session = connected(Role::Initiator);
        let epoch = session.epoch();
        let chat = PeerMessage::Chat(ChatPayload {
            text: "bonjour".to_string(),
            timestamp: 5,
        });
        let (session, commands) = session.transition(Event::PeerMessageReceived {
            epoch,
            message: chat.clone(),
        });
        assert_eq!(
            sends(&commands),
            vec![ClientMessage::Translate(TranslationRequest {
                text: "bonjour".to_string(),
                timestamp: 5,
            })]
        );

        let (session, _) = session.transition(Event::TranslationToggled { enabled: false });
        let (_, commands) = session.transition(Event::PeerMessageReceived {
            epoch,
            message: chat,
        });
        assert!(sends(&commands).is_empty());
    }

    #[test]
    fn chat_while_waiting_is_flushed_once_the_channel_opens() {
        let session = searching(Interests::empty());
        let epoch = session.epoch();
        let (session, _) = session.transition(Event::WaitingForPeer);
        assert_eq!(session.phase(), Phase::WaitingForMatch);

        let (session, commands) = session.transition(Event::ChatSubmitted {
            text: "hi".to_string(),
            timestamp: 1,
        });
        assert_eq!(session.outbox().queued(), 1);
        assert_eq!(session.outbox().log()[0].status, DeliveryStatus::Queued);
        assert!(
            !commands
                .iter()
                .any(|command| matches!(command, Command::SendPeerMessage(_)))
        );

        let (session, _) = session.transition(Event::PeerPaired {
            role: Role::Receiver,
        });
        let (session, commands) = session.transition(Event::DataChannelOpened { epoch });
        assert!(commands.contains(&Command::SendPeerMessage(PeerMessage::Chat(ChatPayload {
            text: "hi".to_string(),
            timestamp: 1,
        }))));
        assert_eq!(session.outbox().queued(), 0);
        assert_eq!(session.outbox().log()[0].status, DeliveryStatus::Sent);
    }

    #[test]
    fn peer_left_drops_chat_that_never_went_out() {
        let session = connected(Role::Initiator);
        let epoch = session.epoch();
        let (session, _) = session.transition(Event::DataChannelOpened { epoch });
        let (session, _) = session.transition(Event::ChatSubmitted {
            text: "hello".to_string(),
            timestamp: 1,
        });
        let (session, _) = session.transition(Event::DataChannelClosed { epoch });
        let (session, _) = session.transition(Event::ChatSubmitted {
            text: "still there?".to_string(),
            timestamp: 2,
        });
        assert_eq!(session.outbox().queued(), 1);

        let (session, commands) = session.transition(Event::PeerLeft);
        assert_eq!(session.phase(), Phase::PeerLeft);
        let log = session.outbox().log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "hello");
        assert!(commands.contains(&Command::Notify(Notification::ChatLog(log.to_vec()))));
        assert!(commands.contains(&Command::ClosePeerConnection));
    }

    #[test]
    fn next_after_disconnect_reopens_the_transport() {
        let session = connected(Role::Receiver);
        let (session, _) = session.transition(Event::DisconnectRequested);
        let (session, _) = session.transition(Event::TransportClosed {
            reason: "closed".to_string(),
        });
        assert_eq!(session.phase(), Phase::Disconnected);

        let (session, commands) = session.transition(Event::NextRequested);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(commands.contains(&Command::ConnectTransport));

        let (session, _) = run_events(
            session,
            vec![Event::TransportConnecting, Event::TransportOpened],
        );
        let (session, commands) = session.transition(Event::FindRequested {
            interests: Interests::new(["art"]),
        });
        assert_eq!(
            sends(&commands),
            vec![ClientMessage::Find(FindRequest {
                interests: Interests::new(["art"]),
            })]
        );
        assert!(session.search().is_some_and(|search| search.submitted));
    }

    #[test]
    fn next_with_open_transport_does_not_reconnect() {
        let session = connected(Role::Initiator);
        let (_, commands) = session.transition(Event::NextRequested);
        assert!(!commands.contains(&Command::ConnectTransport));
    }

    #[test]
    fn track_toggle_needs_local_media() {
        let (_, commands) = Session::new().transition(Event::TrackToggled {
            kind: crate::types::TrackKind::Audio,
        });
        assert!(commands.is_empty());
    }

    proptest! {
        #[test]
        fn stale_completions_never_change_state(
            role in arb_role(),
            interests in arb_interests(),
        ) {
            let session = searching(interests);
            let stale = session.epoch();
            let (session, _) = session.transition(Event::PeerPaired { role });
            let (session, _) = session.transition(Event::NextRequested);

            let stale_events = vec![
                Event::PeerLinkChanged { epoch: stale, state: LinkState::Connected },
                Event::RemoteMediaAttached { epoch: stale, handle: MediaHandle::new("late") },
                Event::DataChannelOpened { epoch: stale },
                Event::LocalDescriptionCreated {
                    epoch: stale,
                    description: SessionDescription { kind: SdpKind::Offer, sdp: "v=0".to_string() },
                },
                Event::HandshakeFailed {
                    epoch: stale,
                    stage: HandshakeStage::CreateOffer,
                    reason: "late".to_string(),
                },
            ];
            let (after, commands) = run_events(session.clone(), stale_events);
            prop_assert!(commands.is_empty());
            prop_assert_eq!(after, session);
        }

        #[test]
        fn next_always_lands_idle_with_clean_session(
            role in arb_role(),
            interests in arb_interests(),
        ) {
            let session = searching(interests);
            let epoch = session.epoch();
            let (session, _) = run_events(session, vec![
                Event::PeerPaired { role },
                Event::RemoteMediaAttached { epoch, handle: MediaHandle::new("remote") },
            ]);
            let (session, commands) = session.transition(Event::NextRequested);
            prop_assert_eq!(session.phase(), Phase::Idle);
            prop_assert!(session.handshake().is_none());
            prop_assert!(session.remote_media().is_none());
            prop_assert!(session.search().is_none());
            prop_assert!(commands.contains(&Command::ClosePeerConnection));
            prop_assert!(sends(&commands).contains(&ClientMessage::Leave));
        }

        #[test]
        fn remote_signals_reach_handshake_only_when_paired(role in arb_role()) {
            let session = searching(Interests::empty());
            let signal = Event::SignalReceived {
                payload: SignalPayload::Description(SessionDescription {
                    kind: match role {
                        Role::Initiator => SdpKind::Answer,
                        Role::Receiver => SdpKind::Offer,
                    },
                    sdp: "v=0".to_string(),
                }),
            };
            let (_, before_pairing) = session.clone().transition(signal.clone());
            prop_assert!(before_pairing.is_empty());

            let (session, _) = session.transition(Event::PeerPaired { role });
            let (_, after_pairing) = session.transition(signal);
            let applied = after_pairing
                .iter()
                .any(|command| matches!(command, Command::ApplyRemoteDescription { .. }));
            prop_assert!(applied);
        }

        #[test]
        fn only_paired_and_connected_are_in_session(phase in arb_phase()) {
            let expected = matches!(phase, Phase::Paired | Phase::Connected);
            prop_assert_eq!(phase.in_session(), expected);
        }
    }
}
