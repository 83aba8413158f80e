//! Line-oriented terminal front end for the headless peer.
//!
//! Plain lines are chat; lines starting with `/` are commands.

use popchat_core::{
    client::translate::Intent,
    state::{Notification, Phase},
    types::{ChatEntry, ChatSender, DeliveryStatus, Interests, TrackKind},
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

pub const HELP: &str = "\
commands:
  /find [tags...]      search for a partner (defaults to the configured interests)
  /next                leave the current partner and stop searching
  /retry               retry media or reconnect the control channel
  /connect             reconnect the control channel
  /disconnect          leave and close the control channel
  /icebreaker          ask for a conversation starter
  /translate on|off    translate incoming messages
  /mute                toggle the microphone
  /camera              toggle the camera
  /clear               clear the chat log
  /quit                exit
anything else is sent as a chat message";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Intent(Intent),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '/{0}', try /help")]
    UnknownCommand(String),
    #[error("usage: /translate on|off")]
    TranslateUsage,
}

pub fn parse_line(line: &str, default_interests: &Interests) -> Result<Option<Input>, ConsoleError> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Ok(match line.is_empty() {
            true => None,
            false => Some(Input::Intent(Intent::Chat {
                text: line.to_string(),
            })),
        });
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    let input = match name.as_str() {
        "find" => {
            let tags: Vec<&str> = words.collect();
            let interests = match tags.is_empty() {
                true => default_interests.clone(),
                false => Interests::new(tags),
            };
            Input::Intent(Intent::Find { interests })
        }
        "next" => Input::Intent(Intent::Next),
        "retry" => Input::Intent(Intent::Retry),
        "connect" => Input::Intent(Intent::Connect),
        "disconnect" => Input::Intent(Intent::Disconnect),
        "icebreaker" => Input::Intent(Intent::Icebreaker),
        "translate" => match words.next() {
            Some("on") => Input::Intent(Intent::Translation(true)),
            Some("off") => Input::Intent(Intent::Translation(false)),
            Some(_) | None => return Err(ConsoleError::TranslateUsage),
        },
        "mute" => Input::Intent(Intent::ToggleTrack(TrackKind::Audio)),
        "camera" => Input::Intent(Intent::ToggleTrack(TrackKind::Video)),
        "clear" => Input::Intent(Intent::ClearChat),
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(input))
}

// ─── Rendering ──────────────────────────────────────────────────────────────

/// Turns the stream of notifications into terminal lines, printing only what
/// changed since the previous chat-log snapshot.
#[derive(Debug, Default)]
pub struct Renderer {
    shown: Vec<ChatEntry>,
    phase: Option<Phase>,
}

impl Renderer {
    pub fn render(&mut self, notification: Notification) -> Vec<String> {
        match notification {
            Notification::Session(snapshot) => match self.phase == Some(snapshot.phase) {
                true => Vec::new(),
                false => {
                    self.phase = Some(snapshot.phase);
                    vec![format!("* {}", describe(snapshot.phase))]
                }
            },
            Notification::ChatLog(entries) => self.render_log(entries),
            Notification::RemoteTyping(true) => vec!["* stranger is typing...".to_string()],
            Notification::RemoteTyping(false) => Vec::new(),
            Notification::OnlineCount(users) => vec![format!("* {users} online")],
            Notification::Icebreaker(text) => vec![format!("* icebreaker: {text}")],
            Notification::MediaFailure(reason) => {
                vec![format!("* camera/microphone unavailable: {reason} (/retry)")]
            }
        }
    }

    fn render_log(&mut self, entries: Vec<ChatEntry>) -> Vec<String> {
        let mut lines = Vec::new();
        match (entries.is_empty(), self.shown.len().checked_sub(entries.len())) {
            (_, None | Some(0)) => {}
            (true, Some(_)) => {
                lines.push("* chat cleared".to_string());
                self.shown.clear();
            }
            (false, Some(dropped)) => {
                lines.push(format!("* {dropped} undelivered message(s) dropped"));
                self.shown.truncate(entries.len());
            }
        }
        for (index, entry) in entries.iter().enumerate() {
            match self.shown.get(index) {
                None => lines.push(format_entry(entry)),
                Some(previous) => {
                    if previous.status == DeliveryStatus::Queued
                        && entry.status == DeliveryStatus::Sent
                    {
                        lines.push(format!("  (delivered) {}", entry.text));
                    }
                    if previous.translated_text.is_none()
                        && let Some(translated) = &entry.translated_text
                    {
                        lines.push(format!("  (translated) {translated}"));
                    }
                }
            }
        }
        self.shown = entries;
        lines
    }
}

fn format_entry(entry: &ChatEntry) -> String {
    let who = match entry.sender {
        ChatSender::Local => "you",
        ChatSender::Remote => "stranger",
    };
    match entry.status {
        DeliveryStatus::Queued => format!("{who}: {} (queued)", entry.text),
        DeliveryStatus::Sent => format!("{who}: {}", entry.text),
    }
}

fn describe(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle, /find to look for someone",
        Phase::AcquiringMedia => "requesting camera and microphone",
        Phase::ConnectingTransport => "connecting to server",
        Phase::WaitingForMatch => "looking for someone",
        Phase::Paired => "matched, connecting",
        Phase::Connected => "connected, say hi",
        Phase::Disconnected => "disconnected, /connect to reconnect",
        Phase::PeerLeft => "stranger left, /find for someone new",
        Phase::TransportError => "lost the server, reconnecting (/retry)",
        Phase::MediaError => "media unavailable (/retry)",
    }
}

// ─── I/O ────────────────────────────────────────────────────────────────────

/// Forward stdin lines as intents until `/quit` or end of input.
pub async fn read_intents(default_interests: Interests, intents: mpsc::UnboundedSender<Intent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        match parse_line(&line, &default_interests) {
            Ok(Some(Input::Intent(intent))) => {
                if intents.send(intent).is_err() {
                    break;
                }
            }
            Ok(Some(Input::Help)) => println!("{HELP}"),
            Ok(Some(Input::Quit)) => break,
            Ok(None) => {}
            Err(e) => println!("* {e}"),
        }
    }
}

pub async fn print_notifications(mut notifications: mpsc::UnboundedReceiver<Notification>) {
    let mut renderer = Renderer::default();
    while let Some(notification) = notifications.recv().await {
        for line in renderer.render(notification) {
            println!("{line}");
        }
    }
}
