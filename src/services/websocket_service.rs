use std::{sync::Arc, time::Duration};

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{Identification, Message},
    player::{SharedPlayer, WsPlayer},
    services::restrictions::RestrictionError,
    state::SharedState,
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of one player's WebSocket connection.
///
/// The first frame must be an [`Identification`]. The user is then checked against the
/// restriction rules and handed to the engine; later frames feed the player's inbound stream
/// until the socket closes.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => text,
        Ok(Some(Ok(WsMessage::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            reject(&outbound_tx, close_code::UNSUPPORTED, "identification expected");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identification = match Identification::from_json_str(&initial_message) {
        Ok(identification) => identification,
        Err(err) => {
            warn!(error = %err, "failed to parse or validate identification");
            reject(&outbound_tx, close_code::INVALID, "invalid identification");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    let user_id = identification.user_id;
    let challenge_id = identification.challenge_id;

    match state
        .restrictions()
        .is_user_restricted(challenge_id, user_id, true)
        .await
    {
        Ok(_) => {}
        Err(RestrictionError::Denied(reason)) => {
            reject(&outbound_tx, close_code::POLICY, &reason.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(challenge_id = %challenge_id, user_id = %user_id, error = %err, "restriction check failed");
            reject(&outbound_tx, close_code::ERROR, "challenge unavailable");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    }

    let (player, inbound_tx) = WsPlayer::new(identification, outbound_tx.clone());
    let player: SharedPlayer = Arc::new(player);

    if let Err(err) = state.engine().add_player(player.clone()).await {
        warn!(challenge_id = %challenge_id, user_id = %user_id, error = %err, "failed to join a room");
        reject(&outbound_tx, close_code::ERROR, "no room available");
        let _ = player.close().await;
        finalize(writer_task, outbound_tx).await;
        return;
    }

    info!(challenge_id = %challenge_id, user_id = %user_id, "player connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match Message::from_json_str(&text) {
                Ok(Message::Unknown) => {
                    debug!(user_id = %user_id, payload = %text.as_str(), "ignoring unknown message kind");
                }
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        // The room stopped listening to this player.
                        break;
                    }
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "failed to parse player message");
                }
            },
            Ok(WsMessage::Ping(payload)) => {
                let _ = outbound_tx.send(WsMessage::Pong(payload));
            }
            Ok(WsMessage::Close(_)) => {
                info!(user_id = %user_id, "player closed the connection");
                break;
            }
            Ok(WsMessage::Binary(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Ending the inbound stream is what tells the room the player left.
    drop(inbound_tx);
    let _ = player.close().await;
    info!(challenge_id = %challenge_id, user_id = %user_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Queue a close frame explaining why the connection is refused.
fn reject(tx: &mpsc::UnboundedSender<WsMessage>, code: u16, reason: &str) {
    info!(code, reason, "refusing websocket player");
    let _ = tx.send(WsMessage::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    })));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<WsMessage>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
