use std::collections::{HashSet, VecDeque};

use super::{
    command::{Command, Notification},
    event::Event,
};
use crate::{
    envelope::{ChatPayload, PeerMessage, TypingPayload},
    traits::MealyMachine,
    types::{ChatEntry, ChatSender, DeliveryStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedChatMessage {
    text: String,
    timestamp: u64,
    /// Index of the matching local entry in the log.
    entry: usize,
}

/// Chat log plus the FIFO of payloads waiting for the direct channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    log: Vec<ChatEntry>,
    queue: VecDeque<QueuedChatMessage>,
    channel_open: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[ChatEntry] {
        &self.log
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_open(&self) -> bool {
        self.channel_open
    }

    /// Session over: the channel is gone and unsent payloads go with it,
    /// together with their log entries. Delivered history stays visible.
    pub fn detach(&mut self) -> Option<Command> {
        self.channel_open = false;
        match self.queue.is_empty() {
            true => None,
            false => {
                let dropped: HashSet<usize> =
                    self.queue.drain(..).map(|queued| queued.entry).collect();
                tracing::debug!(dropped = dropped.len(), "dropping undelivered chat");
                let mut index = 0;
                self.log.retain(|_| {
                    let keep = !dropped.contains(&index);
                    index += 1;
                    keep
                });
                Some(self.log_notification())
            }
        }
    }

    pub fn clear(&mut self) -> Command {
        self.log.clear();
        self.queue.clear();
        self.log_notification()
    }

    fn log_notification(&self) -> Command {
        Command::Notify(Notification::ChatLog(self.log.clone()))
    }

    fn flush(&mut self) -> Vec<Command> {
        let drained: Vec<QueuedChatMessage> = self.queue.drain(..).collect();
        drained
            .into_iter()
            .map(|queued| {
                if let Some(entry) = self.log.get_mut(queued.entry) {
                    entry.status = DeliveryStatus::Sent;
                }
                Command::SendPeerMessage(PeerMessage::Chat(ChatPayload {
                    text: queued.text,
                    timestamp: queued.timestamp,
                }))
            })
            .collect()
    }
}

impl MealyMachine for Outbox {
    type Event = Event;
    type Command = Command;

    fn transition(mut self, event: Event) -> (Self, Vec<Command>) {
        let mut commands = Vec::new();

        match event {
            Event::ChatSubmitted { text, timestamp } => {
                let status = match self.channel_open {
                    true => DeliveryStatus::Sent,
                    false => DeliveryStatus::Queued,
                };
                self.log.push(ChatEntry {
                    sender: ChatSender::Local,
                    text: text.clone(),
                    translated_text: None,
                    timestamp,
                    status,
                });
                match self.channel_open {
                    true => commands.push(Command::SendPeerMessage(PeerMessage::Chat(
                        ChatPayload { text, timestamp },
                    ))),
                    false => self.queue.push_back(QueuedChatMessage {
                        text,
                        timestamp,
                        entry: self.log.len() - 1,
                    }),
                }
                commands.push(self.log_notification());
            }

            Event::DataChannelOpened { .. } => {
                self.channel_open = true;
                match self.queue.is_empty() {
                    true => {}
                    false => {
                        tracing::debug!(queued = self.queue.len(), "flushing queued chat");
                        commands.extend(self.flush());
                        commands.push(self.log_notification());
                    }
                }
            }

            Event::DataChannelClosed { .. } => {
                self.channel_open = false;
            }

            Event::PeerMessageReceived { message, .. } => match message {
                PeerMessage::Chat(ChatPayload { text, timestamp }) => {
                    self.log.push(ChatEntry {
                        sender: ChatSender::Remote,
                        text,
                        translated_text: None,
                        timestamp,
                        status: DeliveryStatus::Sent,
                    });
                    commands.push(self.log_notification());
                }
                PeerMessage::Typing(TypingPayload { is_typing }) => {
                    commands.push(Command::Notify(Notification::RemoteTyping(is_typing)));
                }
            },

            Event::TypingChanged { is_typing } => match self.channel_open {
                true => commands.push(Command::SendPeerMessage(PeerMessage::Typing(
                    TypingPayload { is_typing },
                ))),
                false => {}
            },

            Event::TranslationReceived { result } => {
                let target = self.log.iter_mut().rev().find(|entry| {
                    entry.sender == ChatSender::Remote
                        && entry.timestamp == result.request.timestamp
                        && entry.text == result.request.text
                });
                match target {
                    Some(entry) => {
                        entry.translated_text = Some(result.translated_text);
                        commands.push(self.log_notification());
                    }
                    None => {
                        tracing::debug!(
                            timestamp = result.request.timestamp,
                            "translation for unknown message dropped"
                        );
                    }
                }
            }

            Event::ChatCleared => {
                commands.push(self.clear());
            }

            Event::FindRequested { .. }
            | Event::NextRequested
            | Event::RetryRequested
            | Event::ConnectRequested
            | Event::DisconnectRequested
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
            | Event::SignalReceived { .. }
            | Event::PeerLeft
            | Event::OnlineCountChanged { .. }
            | Event::IcebreakerReceived { .. }
            | Event::LocalDescriptionCreated { .. }
            | Event::RemoteDescriptionApplied { .. }
            | Event::LocalCandidateGathered { .. }
            | Event::HandshakeFailed { .. }
            | Event::PeerLinkChanged { .. }
            | Event::RemoteMediaAttached { .. } => {}
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
        envelope::{TranslationRequest, TranslationResult},
        test_utils::arb_chat_lines,
        types::Epoch,
    };

    fn submit(outbox: Outbox, text: &str, timestamp: u64) -> (Outbox, Vec<Command>) {
        outbox.transition(Event::ChatSubmitted {
            text: text.to_string(),
            timestamp,
        })
    }

    fn sent_chats(commands: &[Command]) -> Vec<ChatPayload> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::SendPeerMessage(PeerMessage::Chat(payload)) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn open() -> Event {
        Event::DataChannelOpened {
            epoch: Epoch::initial(),
        }
    }

    #[test]
    fn closed_channel_queues_and_logs() {
        let (outbox, commands) = submit(Outbox::new(), "hello", 1);
        assert!(sent_chats(&commands).is_empty());
        assert_eq!(outbox.queued(), 1);
        assert_eq!(outbox.log()[0].status, DeliveryStatus::Queued);
        assert!(matches!(
            commands.last(),
            Some(Command::Notify(Notification::ChatLog(_)))
        ));
    }

    #[test]
    fn open_channel_sends_directly() {
        let (outbox, _) = Outbox::new().transition(open());
        let (outbox, commands) = submit(outbox, "hello", 1);
        assert_eq!(
            sent_chats(&commands),
            vec![ChatPayload {
                text: "hello".to_string(),
                timestamp: 1,
            }]
        );
        assert_eq!(outbox.log()[0].status, DeliveryStatus::Sent);
        assert_eq!(outbox.queued(), 0);
    }

    #[test]
    fn typing_is_never_queued() {
        let (outbox, commands) = Outbox::new().transition(Event::TypingChanged { is_typing: true });
        assert!(commands.is_empty());
        assert_eq!(outbox.queued(), 0);

        let (outbox, _) = outbox.transition(open());
        let (_, commands) = outbox.transition(Event::TypingChanged { is_typing: true });
        assert_eq!(
            commands,
            vec![Command::SendPeerMessage(PeerMessage::Typing(TypingPayload {
                is_typing: true
            }))]
        );
    }

    #[test]
    fn translation_attaches_to_matching_remote_entry() {
        let (outbox, _) = Outbox::new().transition(Event::PeerMessageReceived {
            epoch: Epoch::initial(),
            message: PeerMessage::Chat(ChatPayload {
                text: "hola".to_string(),
                timestamp: 9,
            }),
        });
        let (outbox, commands) = outbox.transition(Event::TranslationReceived {
            result: TranslationResult {
                request: TranslationRequest {
                    text: "hola".to_string(),
                    timestamp: 9,
                },
                translated_text: "hello".to_string(),
            },
        });
        assert_eq!(outbox.log()[0].translated_text.as_deref(), Some("hello"));
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn detach_drops_undelivered_entries_but_keeps_history() {
        let (outbox, _) = outbox_with_history();
        let (mut outbox, _) = submit(outbox, "bye", 3);
        assert_eq!(outbox.log().len(), 3);

        let notification = outbox.detach();
        assert_eq!(outbox.queued(), 0);
        let texts: Vec<&str> = outbox.log().iter().map(|entry| entry.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hey"]);
        assert!(outbox.log().iter().all(|entry| entry.status == DeliveryStatus::Sent));
        assert_eq!(
            notification,
            Some(Command::Notify(Notification::ChatLog(outbox.log().to_vec())))
        );

        let (_, commands) = outbox.transition(open());
        assert!(sent_chats(&commands).is_empty());
    }

    #[test]
    fn detach_with_empty_queue_is_silent() {
        let (mut outbox, _) = outbox_with_history();
        assert_eq!(outbox.detach(), None);
        assert_eq!(outbox.log().len(), 2);
        assert!(!outbox.is_open());
    }

    /// One sent local line and one remote line, channel closed again.
    fn outbox_with_history() -> (Outbox, Vec<Command>) {
        let (outbox, _) = Outbox::new().transition(open());
        let (outbox, _) = submit(outbox, "hi", 1);
        let (outbox, _) = outbox.transition(Event::PeerMessageReceived {
            epoch: Epoch::initial(),
            message: PeerMessage::Chat(ChatPayload {
                text: "hey".to_string(),
                timestamp: 2,
            }),
        });
        outbox.transition(Event::DataChannelClosed {
            epoch: Epoch::initial(),
        })
    }

    proptest! {
        #[test]
        fn queued_chat_flushes_in_order_exactly_once(lines in arb_chat_lines()) {
            let (outbox, _) = lines
                .iter()
                .enumerate()
                .fold((Outbox::new(), Vec::new()), |(state, mut all), (i, line)| {
                    let (state, commands) = submit(state, line, i as u64);
                    all.extend(commands);
                    (state, all)
                });

            let (outbox, flushed) = outbox.transition(open());
            let expected: Vec<ChatPayload> = lines
                .iter()
                .enumerate()
                .map(|(i, line)| ChatPayload { text: line.clone(), timestamp: i as u64 })
                .collect();
            prop_assert_eq!(sent_chats(&flushed), expected);
            prop_assert_eq!(outbox.queued(), 0);
            prop_assert!(outbox.log().iter().all(|entry| entry.status == DeliveryStatus::Sent));

            let (closed, _) = outbox.transition(Event::DataChannelClosed { epoch: Epoch::initial() });
            let (_, reopened) = closed.transition(open());
            prop_assert!(sent_chats(&reopened).is_empty());
        }

        #[test]
        fn later_sends_follow_flushed_queue(
            before in arb_chat_lines(),
            after in arb_chat_lines(),
        ) {
            let mut outbox = Outbox::new();
            let mut sent = Vec::new();
            for line in &before {
                let (next, commands) = submit(outbox, line, 0);
                outbox = next;
                sent.extend(sent_chats(&commands));
            }
            let (next, commands) = outbox.transition(open());
            outbox = next;
            sent.extend(sent_chats(&commands));
            for line in &after {
                let (next, commands) = submit(outbox, line, 0);
                outbox = next;
                sent.extend(sent_chats(&commands));
            }
            let texts: Vec<String> = sent.into_iter().map(|payload| payload.text).collect();
            let expected: Vec<String> = before.into_iter().chain(after).collect();
            prop_assert_eq!(texts, expected);
        }
    }
}
