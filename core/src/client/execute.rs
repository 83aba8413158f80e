use std::sync::Arc;

use tokio::sync::mpsc;

use super::{
    media::MediaSource,
    peer::{PeerConnector, PeerDriver, PeerOp},
    transport::TransportHandle,
};
use crate::state::{Command, Event, Notification};

pub struct ExecutionContext {
    pub transport: TransportHandle,
    pub media: Arc<dyn MediaSource>,
    pub connector: Arc<dyn PeerConnector>,
    /// Link of the current pairing; replacing or clearing it closes the old one.
    pub peer: Option<PeerDriver>,
    pub completions: mpsc::UnboundedSender<Event>,
    pub notifications: mpsc::UnboundedSender<Notification>,
}

impl ExecutionContext {
    fn submit(&self, op: PeerOp) {
        match &self.peer {
            Some(driver) => driver.submit(op),
            None => tracing::debug!(?op, "no peer link, dropping operation"),
        }
    }
}

pub fn execute_commands(commands: Vec<Command>, ctx: &mut ExecutionContext) {
    for cmd in commands {
        match cmd {
            Command::SendControl(message) => ctx.transport.send(message),
            Command::SendSignal(payload) => match payload.into_message() {
                Ok(message) => ctx.transport.send(message),
                Err(e) => tracing::warn!(error = %e, "failed to wrap handshake payload"),
            },
            Command::ConnectTransport => ctx.transport.connect(),
            Command::CloseTransport => ctx.transport.close(),

            Command::AcquireMedia { epoch } => {
                let media = Arc::clone(&ctx.media);
                let completions = ctx.completions.clone();
                tokio::spawn(async move {
                    let event = match media.acquire().await {
                        Ok(handle) => Event::MediaGranted { epoch, handle },
                        Err(e) => Event::MediaDenied {
                            epoch,
                            reason: e.to_string(),
                        },
                    };
                    let _ = completions.send(event);
                });
            }
            Command::ToggleTrack { kind } => {
                let enabled = ctx.media.toggle(kind);
                tracing::info!(%kind, enabled, "local track toggled");
            }

            Command::OpenPeerConnection {
                epoch,
                role,
                local_media,
            } => {
                tracing::info!(%epoch, %role, "opening peer connection");
                ctx.peer = Some(PeerDriver::spawn(
                    Arc::clone(&ctx.connector),
                    epoch,
                    role,
                    local_media,
                    ctx.completions.clone(),
                ));
            }
            Command::CreateOffer => ctx.submit(PeerOp::CreateOffer),
            Command::CreateAnswer => ctx.submit(PeerOp::CreateAnswer),
            Command::ApplyRemoteDescription { description } => {
                ctx.submit(PeerOp::ApplyRemoteDescription(description));
            }
            Command::ApplyCandidate { candidate } => ctx.submit(PeerOp::ApplyCandidate(candidate)),
            Command::SendPeerMessage(message) => ctx.submit(PeerOp::Send(message)),
            Command::ClosePeerConnection => {
                if let Some(driver) = ctx.peer.take() {
                    tracing::info!(epoch = %driver.epoch(), "closing peer connection");
                }
            }

            Command::Notify(notification) => {
                if ctx.notifications.send(notification).is_err() {
                    tracing::debug!("no UI attached, dropping notification");
                }
            }
        }
    }
}
