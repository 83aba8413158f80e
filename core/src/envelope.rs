//! Wire formats.
//!
//! Control channel (both directions): `{"type": "...", "payload": {...}}`,
//! `payload` omitted for bare notices such as `leave` or `waiting`.
//! Direct peer channel: `{"type": "chat"|"typing", "payload": {...}}`.
//!
//! `signal` payloads travel through the server as raw JSON; only the client
//! interprets them as [`SignalPayload`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    protocol::MAX_ENVELOPE_BYTES,
    types::{Interests, Role},
};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope too large: {0} bytes")]
    TooLarge(usize),
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, EnvelopeError> {
    match text.len() > MAX_ENVELOPE_BYTES {
        true => Err(EnvelopeError::TooLarge(text.len())),
        false => Ok(serde_json::from_str(text)?),
    }
}

// ─── Control channel: client → server ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ClientMessage {
    Find(FindRequest),
    Signal(serde_json::Value),
    Leave,
    Translate(TranslationRequest),
    Icebreaker,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindRequest {
    #[serde(default)]
    pub interests: Interests,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub timestamp: u64,
}

// ─── Control channel: server → client ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ServerMessage {
    Stats(OnlineStats),
    Waiting,
    Paired(PairedNotice),
    Signal(serde_json::Value),
    PeerLeft,
    TranslationResult(TranslationResult),
    IcebreakerResult(IcebreakerSuggestion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStats {
    pub users: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedNotice {
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    #[serde(flatten)]
    pub request: TranslationRequest,
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebreakerSuggestion {
    pub text: String,
}

// ─── Handshake payloads (inside `signal`) ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// Browser-compatible handshake payload: either `{candidate: {...}}` or a
/// bare session description `{type: "offer"|"answer", sdp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Candidate { candidate: IceCandidate },
    Description(SessionDescription),
}

impl SignalPayload {
    pub fn into_message(self) -> Result<ClientMessage, EnvelopeError> {
        Ok(ClientMessage::Signal(serde_json::to_value(self)?))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_value(value)?)
    }
}

// ─── Direct peer channel ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeerMessage {
    Chat(ChatPayload),
    Typing(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
