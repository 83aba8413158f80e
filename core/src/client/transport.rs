//! Auto-reconnecting control channel.
//!
//! One task owns the socket. While it is not open, outbound envelopes are
//! dropped rather than queued. After an unexpected close it waits
//! `min(base * 2^attempt, cap)` and tries again, indefinitely; a manual
//! connect cuts the wait short and an explicit close stops retrying until the
//! next connect.

use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message as WsMessage};
use url::Url;

use super::backoff::ReconnectBackoff;
use crate::envelope::{self, ClientMessage, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum TransportEvent {
    Connecting,
    Opened,
    Closed { reason: String },
    Message(ServerMessage),
}

#[derive(Debug)]
enum TransportControl {
    Send(ClientMessage),
    Connect,
    Close,
}

#[derive(Debug, Clone)]
pub struct TransportHandle {
    controls: mpsc::UnboundedSender<TransportControl>,
}

impl TransportHandle {
    fn control(&self, control: TransportControl) {
        if let Err(e) = self.controls.send(control) {
            tracing::debug!(control = ?e.0, "transport task gone");
        }
    }

    pub fn send(&self, message: ClientMessage) {
        self.control(TransportControl::Send(message));
    }

    pub fn connect(&self) {
        self.control(TransportControl::Connect);
    }

    pub fn close(&self) {
        self.control(TransportControl::Close);
    }
}

/// Start the transport task; it connects immediately and stops once every
/// handle is dropped.
pub fn spawn(
    url: Url,
    backoff: ReconnectBackoff,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> (TransportHandle, JoinHandle<()>) {
    let (controls, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(url, backoff, rx, events));
    (TransportHandle { controls }, task)
}

enum Attempt {
    Connected(Box<Socket>),
    Failed(String),
    Cancelled,
    Shutdown,
}

enum Outcome {
    Lost(String),
    ClosedByClient,
    Shutdown,
}

enum Wake {
    Attempt,
    Shutdown,
}

async fn run(
    url: Url,
    mut backoff: ReconnectBackoff,
    mut controls: mpsc::UnboundedReceiver<TransportControl>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut auto_reconnect = true;

    loop {
        tracing::info!(%url, attempt = backoff.attempt(), "connecting control channel");
        let _ = events.send(TransportEvent::Connecting);

        let outcome = match attempt(&url, &mut controls).await {
            Attempt::Connected(socket) => {
                backoff.reset();
                tracing::info!(%url, "control channel open");
                let _ = events.send(TransportEvent::Opened);
                pump(*socket, &mut controls, &events).await
            }
            Attempt::Failed(reason) => Outcome::Lost(reason),
            Attempt::Cancelled => Outcome::ClosedByClient,
            Attempt::Shutdown => Outcome::Shutdown,
        };

        let delay = match outcome {
            Outcome::Lost(reason) => {
                let delay = match auto_reconnect {
                    true => Some(backoff.schedule_reconnect()),
                    false => None,
                };
                tracing::warn!(%reason, ?delay, "control channel closed");
                let _ = events.send(TransportEvent::Closed { reason });
                delay
            }
            Outcome::ClosedByClient => {
                auto_reconnect = false;
                tracing::info!("control channel closed by client");
                let _ = events.send(TransportEvent::Closed {
                    reason: "closed by client".to_string(),
                });
                None
            }
            Outcome::Shutdown => return,
        };

        match idle(delay, &mut controls).await {
            Wake::Attempt => auto_reconnect = true,
            Wake::Shutdown => return,
        }
    }
}

async fn attempt(url: &Url, controls: &mut mpsc::UnboundedReceiver<TransportControl>) -> Attempt {
    let connecting = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connecting);

    loop {
        tokio::select! {
            result = &mut connecting => {
                return match result {
                    Ok((socket, _)) => Attempt::Connected(Box::new(socket)),
                    Err(e) => Attempt::Failed(e.to_string()),
                };
            }
            control = controls.recv() => match control {
                Some(TransportControl::Send(message)) => {
                    tracing::debug!(kind = %message, "control channel connecting, dropping");
                }
                Some(TransportControl::Connect) => {}
                Some(TransportControl::Close) => return Attempt::Cancelled,
                None => return Attempt::Shutdown,
            },
        }
    }
}

async fn pump(
    socket: Socket,
    controls: &mut mpsc::UnboundedReceiver<TransportControl>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Outcome {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            control = controls.recv() => match control {
                Some(TransportControl::Send(message)) => match envelope::encode(&message) {
                    Ok(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            return Outcome::Lost(e.to_string());
                        }
                    }
                    Err(e) => tracing::warn!(kind = %message, error = %e, "failed to encode envelope"),
                },
                Some(TransportControl::Connect) => {}
                Some(TransportControl::Close) => {
                    let _ = sink.close().await;
                    return Outcome::ClosedByClient;
                }
                None => {
                    let _ = sink.close().await;
                    return Outcome::Shutdown;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match envelope::decode::<ServerMessage>(text.as_str()) {
                    Ok(message) => {
                        let _ = events.send(TransportEvent::Message(message));
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring malformed server envelope"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Outcome::Lost(reason);
                }
                Some(Ok(
                    WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_),
                )) => {}
                Some(Err(e)) => return Outcome::Lost(e.to_string()),
                None => return Outcome::Lost("connection reset".to_string()),
            },
        }
    }
}

/// Wait for the reconnect deadline, if any, or a manual connect. Envelopes
/// submitted meanwhile are dropped.
async fn idle(
    delay: Option<std::time::Duration>,
    controls: &mut mpsc::UnboundedReceiver<TransportControl>,
) -> Wake {
    let mut deadline = delay.map(|delay| Instant::now() + delay);

    loop {
        tokio::select! {
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                return Wake::Attempt;
            }
            control = controls.recv() => match control {
                Some(TransportControl::Send(message)) => {
                    tracing::debug!(kind = %message, "control channel not open, dropping");
                }
                Some(TransportControl::Connect) => return Wake::Attempt,
                Some(TransportControl::Close) => deadline = None,
                None => return Wake::Shutdown,
            },
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::envelope::{OnlineStats, ServerMessage};

    async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("transport event within timeout")
            .expect("transport task alive")
    }

    /// A loopback address nobody listens on.
    async fn dead_url() -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("bound address");
        drop(listener);
        Url::parse(&format!("ws://{addr}/ws")).expect("valid url")
    }

    #[tokio::test]
    async fn failed_connect_schedules_reconnect_and_manual_connect_skips_wait() {
        let url = dead_url().await;
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(Duration::from_secs(60), Duration::from_secs(60));
        let (handle, _task) = spawn(url, backoff, events_tx);

        assert_eq!(next_event(&mut events).await, TransportEvent::Connecting);
        assert!(matches!(next_event(&mut events).await, TransportEvent::Closed { .. }));

        // The scheduled retry is a minute away; a manual connect goes now.
        handle.connect();
        assert_eq!(next_event(&mut events).await, TransportEvent::Connecting);
    }

    #[tokio::test]
    async fn delivers_server_messages_and_sends_envelopes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("bound address");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("client connects");
            let mut socket = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket handshake");
            let stats = envelope::encode(&ServerMessage::Stats(OnlineStats { users: 3 }))
                .expect("encodable");
            socket
                .send(WsMessage::Text(stats.into()))
                .await
                .expect("send stats");
            match socket.next().await {
                Some(Ok(WsMessage::Text(text))) => text.as_str().to_string(),
                other => panic!("expected text frame, got {other:?}"),
            }
        });

        let url = Url::parse(&format!("ws://{addr}/ws")).expect("valid url");
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (handle, _task) = spawn(url, ReconnectBackoff::default(), events_tx);

        assert_eq!(next_event(&mut events).await, TransportEvent::Connecting);
        assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message(ServerMessage::Stats(OnlineStats { users: 3 }))
        );

        handle.send(ClientMessage::Leave);
        let received = server.await.expect("server task");
        assert_eq!(received, r#"{"type":"leave"}"#);
    }

    #[tokio::test]
    async fn explicit_close_stops_reconnecting() {
        let url = dead_url().await;
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(Duration::from_millis(10), Duration::from_millis(10));
        let (handle, _task) = spawn(url, backoff, events_tx);

        assert_eq!(next_event(&mut events).await, TransportEvent::Connecting);
        assert!(matches!(next_event(&mut events).await, TransportEvent::Closed { .. }));
        handle.close();

        // Drain whatever raced the close, then expect silence.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while events.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
    }
}
