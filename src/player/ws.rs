use std::sync::{Mutex, PoisonError};

use axum::extract::ws::Message as WsMessage;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    dto::ws::{Identification, Message},
    player::{INBOUND_CAPACITY, Player, PlayerError},
};

/// Player connected through an axum WebSocket.
///
/// The socket itself is driven by `websocket_service::handle_socket`: a writer task drains
/// `outbound`, the reader loop feeds the sender returned by [`WsPlayer::new`].
pub struct WsPlayer {
    id: Uuid,
    username: String,
    challenge_id: Uuid,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    inbound: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl WsPlayer {
    pub fn new(
        identification: Identification,
        outbound: mpsc::UnboundedSender<WsMessage>,
    ) -> (Self, mpsc::Sender<Message>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let player = Self {
            id: identification.user_id,
            username: identification.username,
            challenge_id: identification.challenge_id,
            outbound: Mutex::new(Some(outbound)),
            inbound: Mutex::new(Some(inbound_rx)),
        };
        (player, inbound_tx)
    }
}

impl Player for WsPlayer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn challenge_id(&self) -> Uuid {
        self.challenge_id
    }

    fn start(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        // The socket is already upgraded and identified when the player is built.
        async { Ok(()) }.boxed()
    }

    fn send_message(&self, message: &Message) -> Result<(), PlayerError> {
        let payload = serde_json::to_string(message)?;
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .ok_or(PlayerError::ConnectionClosed)?
            .send(WsMessage::Text(payload.into()))
            .map_err(|_| PlayerError::ConnectionClosed)
    }

    fn take_message_stream(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        if let Some(tx) = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(WsMessage::Close(None));
        }
        // Never handed to a room: drop it so the socket reader stops queueing frames.
        drop(
            self.inbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        async { Ok(()) }.boxed()
    }
}
