use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::mpsc;

use super::{
    generation::Generator,
    hub::{HubError, HubHandle, Registration},
};
use crate::{
    envelope::{self, ClientMessage, IcebreakerSuggestion, ServerMessage, TranslationResult},
    types::ConnId,
};

/// Drive one accepted control connection until either side closes it.
pub async fn serve_socket(socket: WebSocket, hub: HubHandle, generator: Arc<dyn Generator>) {
    let Registration { conn, mut outbound } = match hub.register().await {
        Ok(registration) => registration,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting connection");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (replies_tx, mut replies) = mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = send(&mut sink, &message).await {
                        tracing::debug!(%conn, error = %e, "send failed");
                        break;
                    }
                }
                None => {
                    tracing::info!(%conn, "hub dropped the connection");
                    break;
                }
            },

            Some(message) = replies.recv() => {
                if let Err(e) = send(&mut sink, &message).await {
                    tracing::debug!(%conn, error = %e, "send failed");
                    break;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = dispatch(conn, text.as_str(), &hub, &generator, &replies_tx) {
                        tracing::warn!(%conn, error = %e, "dropping connection");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    tracing::debug!(%conn, error = %e, "socket error");
                    break;
                }
            },
        }
    }

    if let Err(e) = hub.unregister(conn) {
        tracing::debug!(%conn, error = %e, "hub gone before unregister");
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match envelope::encode(message) {
        Ok(text) => sink.send(Message::Text(text.into())).await,
        Err(e) => {
            tracing::warn!(kind = %message, error = %e, "failed to encode server message");
            Ok(())
        }
    }
}

fn dispatch(
    conn: ConnId,
    text: &str,
    hub: &HubHandle,
    generator: &Arc<dyn Generator>,
    replies: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<(), HubError> {
    let message: ClientMessage = match envelope::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%conn, error = %e, "ignoring malformed envelope");
            return Ok(());
        }
    };
    tracing::debug!(%conn, kind = %message, "client message");

    match message {
        ClientMessage::Find(request) => hub.find(conn, request.interests),
        ClientMessage::Signal(payload) => hub.signal(conn, payload),
        ClientMessage::Leave => hub.leave(conn),
        ClientMessage::Translate(request) => {
            let generator = Arc::clone(generator);
            let replies = replies.clone();
            tokio::spawn(async move {
                match generator.translate(&request.text).await {
                    Ok(translated_text) => {
                        let _ = replies.send(ServerMessage::TranslationResult(TranslationResult {
                            request,
                            translated_text,
                        }));
                    }
                    Err(e) => tracing::warn!(%conn, error = %e, "translation failed"),
                }
            });
            Ok(())
        }
        ClientMessage::Icebreaker => {
            let generator = Arc::clone(generator);
            let replies = replies.clone();
            tokio::spawn(async move {
                match generator.icebreaker().await {
                    Ok(text) => {
                        let _ = replies.send(ServerMessage::IcebreakerResult(IcebreakerSuggestion {
                            text,
                        }));
                    }
                    Err(e) => tracing::warn!(%conn, error = %e, "icebreaker generation failed"),
                }
            });
            Ok(())
        }
    }
}
