use std::time::Duration;

pub const SIGNAL_PATH: &str = "/ws";
pub const HEALTH_PATH: &str = "/health";
pub const HEALTH_BODY: &str = "OK";

pub const DATA_CHANNEL_LABEL: &str = "chat";

pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

pub const RECONNECT_BASE: Duration = Duration::from_millis(1000);
pub const RECONNECT_CAP: Duration = Duration::from_millis(5000);

pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-3-flash-preview";
pub const GENERATION_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;
/// Server messages buffered per client before the client is dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;
