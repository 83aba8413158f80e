use crate::{
    envelope::{ServerMessage, SignalPayload},
    state::Event,
    types::{Interests, TrackKind},
};

use super::transport::TransportEvent;

/// What the user asked for, as submitted by a UI front end.
#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum Intent {
    Find { interests: Interests },
    Next,
    Retry,
    Connect,
    Disconnect,
    Chat { text: String },
    Typing(bool),
    Icebreaker,
    Translation(bool),
    ToggleTrack(TrackKind),
    ClearChat,
}

/// `now_ms` stamps outgoing chat lines; it doubles as the key a translation
/// result is matched back on.
pub fn translate_intent(intent: Intent, now_ms: u64) -> Event {
    match intent {
        Intent::Find { interests } => Event::FindRequested { interests },
        Intent::Next => Event::NextRequested,
        Intent::Retry => Event::RetryRequested,
        Intent::Connect => Event::ConnectRequested,
        Intent::Disconnect => Event::DisconnectRequested,
        Intent::Chat { text } => Event::ChatSubmitted {
            text,
            timestamp: now_ms,
        },
        Intent::Typing(is_typing) => Event::TypingChanged { is_typing },
        Intent::Icebreaker => Event::IcebreakerRequested,
        Intent::Translation(enabled) => Event::TranslationToggled { enabled },
        Intent::ToggleTrack(kind) => Event::TrackToggled { kind },
        Intent::ClearChat => Event::ChatCleared,
    }
}

pub fn translate_transport(event: TransportEvent) -> Option<Event> {
    match event {
        TransportEvent::Connecting => Some(Event::TransportConnecting),
        TransportEvent::Opened => Some(Event::TransportOpened),
        TransportEvent::Closed { reason } => Some(Event::TransportClosed { reason }),
        TransportEvent::Message(message) => translate_server_message(message),
    }
}

fn translate_server_message(message: ServerMessage) -> Option<Event> {
    match message {
        ServerMessage::Stats(stats) => Some(Event::OnlineCountChanged { users: stats.users }),
        ServerMessage::Waiting => Some(Event::WaitingForPeer),
        ServerMessage::Paired(notice) => Some(Event::PeerPaired { role: notice.role }),
        ServerMessage::Signal(value) => match SignalPayload::from_value(value) {
            Ok(payload) => Some(Event::SignalReceived { payload }),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unrecognised signal payload");
                None
            }
        },
        ServerMessage::PeerLeft => Some(Event::PeerLeft),
        ServerMessage::TranslationResult(result) => Some(Event::TranslationReceived { result }),
        ServerMessage::IcebreakerResult(suggestion) => Some(Event::IcebreakerReceived {
            text: suggestion.text,
        }),
    }
}
