use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ─── ConnId ─────────────────────────────────────────────────────────────────

/// Server-side identity of one accepted control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ─── Interests ──────────────────────────────────────────────────────────────

/// Normalized interest tags: trimmed, lowercased, non-empty, deduplicated
/// in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Interests(Vec<Arc<str>>);

impl Interests {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .fold(Vec::<Arc<str>>::new(), |mut acc, tag| {
                if !acc.iter().any(|existing| existing.as_ref() == tag) {
                    acc.push(tag.into());
                }
                acc
            });
        Self(normalized)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|tag| tag.as_ref())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.iter().any(|own| own == tag)
    }

    /// Two sets are compatible when they share a tag, or when both are
    /// empty (the wildcard "anyone" search).
    pub fn matches(&self, other: &Interests) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => true,
            (false, false) => self.iter().any(|tag| other.contains(tag)),
            (true, false) | (false, true) => false,
        }
    }
}

impl Serialize for Interests {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Interests {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::new(tags))
    }
}

impl FromStr for Interests {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

impl fmt::Display for Interests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_empty() {
            true => f.write_str("*"),
            false => f.write_str(&self.iter().collect::<Vec<_>>().join(",")),
        }
    }
}

// ─── Role ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Initiator,
    Receiver,
}

// ─── Epoch ──────────────────────────────────────────────────────────────────

/// Session token stamped on every asynchronous completion. A completion
/// whose epoch differs from the session's current one is discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── MediaHandle ────────────────────────────────────────────────────────────

/// Opaque reference to a media stream owned by the media layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle(Arc<str>);

impl MediaHandle {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

// ─── Chat log ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChatSender {
    Local,
    Remote,
}

/// `Sent` means handed to the direct channel, not acknowledged by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub sender: ChatSender,
    pub text: String,
    pub translated_text: Option<String>,
    pub timestamp: u64,
    pub status: DeliveryStatus,
}

// ─── ServerUrl ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ServerUrlError {
    #[error("invalid server url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme '{0}': expected http, https, ws or wss")]
    UnsupportedScheme(String),
}

/// Derive the signaling endpoint from the serving origin: `http` maps to
/// `ws`, `https` to `wss`, and the path is replaced by `path`.
pub fn signaling_url(origin: &str, path: &str) -> Result<url::Url, ServerUrlError> {
    let mut url = url::Url::parse(origin)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ServerUrlError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| ServerUrlError::UnsupportedScheme(scheme.to_string()))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
