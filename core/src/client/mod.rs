//! Headless chat peer: one session machine fed by user intents, the control
//! channel and the peer-connection primitive, with every command executed
//! against the real I/O.

pub mod backoff;
pub mod execute;
pub mod media;
pub mod peer;
pub mod rtc;
pub mod translate;
pub mod transport;

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use tokio::sync::mpsc;
use url::Url;

use self::{
    backoff::ReconnectBackoff,
    execute::{ExecutionContext, execute_commands},
    media::MediaSource,
    peer::PeerConnector,
    translate::{Intent, translate_intent, translate_transport},
};
use crate::{
    state::{Event, Notification, Phase, Session},
    traits::MealyMachine,
    types::Interests,
};

const TRANSPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Signaling endpoint, e.g. `ws://localhost:3000/ws`.
    pub server: Url,
    /// Submitted as a find as soon as the client starts.
    pub auto_find: Option<Interests>,
    pub backoff: ReconnectBackoff,
}

impl ClientConfig {
    pub fn new(server: Url) -> Self {
        Self {
            server,
            auto_find: None,
            backoff: ReconnectBackoff::default(),
        }
    }
}

/// Run the peer until `shutdown` resolves or the intent stream ends. On the
/// way out the current partner is left and the control channel closed.
pub async fn run(
    config: ClientConfig,
    media: Arc<dyn MediaSource>,
    connector: Arc<dyn PeerConnector>,
    mut intents: mpsc::UnboundedReceiver<Intent>,
    notifications: mpsc::UnboundedSender<Notification>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tracing::info!(server = %config.server, "starting chat peer");

    let (transport_tx, mut transport_events) = mpsc::unbounded_channel();
    let (transport, transport_task) = transport::spawn(config.server, config.backoff, transport_tx);
    let (completions_tx, mut completions) = mpsc::unbounded_channel();

    let mut ctx = ExecutionContext {
        transport,
        media,
        connector,
        peer: None,
        completions: completions_tx,
        notifications,
    };

    let mut session = Session::new();
    if let Some(interests) = config.auto_find {
        session = step(session, Event::FindRequested { interests }, &mut ctx);
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            intent = intents.recv() => match intent {
                Some(intent) => {
                    tracing::debug!(%intent, "user intent");
                    session = step(session, translate_intent(intent, now_ms()), &mut ctx);
                }
                None => {
                    tracing::info!("intent stream closed");
                    break;
                }
            },

            Some(event) = transport_events.recv() => {
                if let Some(event) = translate_transport(event) {
                    session = step(session, event, &mut ctx);
                }
            }

            Some(event) = completions.recv() => {
                session = step(session, event, &mut ctx);
            }

            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    match session.phase() {
        Phase::Disconnected => {}
        Phase::Idle
        | Phase::AcquiringMedia
        | Phase::ConnectingTransport
        | Phase::WaitingForMatch
        | Phase::Paired
        | Phase::Connected
        | Phase::PeerLeft
        | Phase::TransportError
        | Phase::MediaError => {
            step(session, Event::DisconnectRequested, &mut ctx);
        }
    }

    drop(ctx);
    match tokio::time::timeout(TRANSPORT_DRAIN_TIMEOUT, transport_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "transport task failed"),
        Err(_) => tracing::warn!("transport did not close in time"),
    }

    tracing::info!("chat peer stopped");
    Ok(())
}

fn step(session: Session, event: Event, ctx: &mut ExecutionContext) -> Session {
    let old_phase = session.phase();
    let event_label = event.to_string();
    let (session, commands) = session.transition(event);
    tracing::debug!(event = %event_label, commands = commands.len(), "event processed");
    log_phase_transition(old_phase, session.phase(), commands.len());
    execute_commands(commands, ctx);
    session
}

fn log_phase_transition(old: Phase, new: Phase, commands: usize) {
    match old == new {
        true => {}
        false => {
            tracing::info!(
                from = %old,
                to = %new,
                commands,
                "phase transition"
            );
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
