pub mod command;
pub mod event;
pub mod handshake;
pub mod outbox;
pub mod session;

pub use command::{Command, Notification, SessionSnapshot};
pub use event::{Event, HandshakeStage, LinkState};
pub use handshake::{Handshake, RemoteDescription};
pub use outbox::Outbox;
pub use session::{Phase, SearchRequest, Session};
