use std::sync::{Mutex, PoisonError};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    dto::ws::Message,
    player::{INBOUND_CAPACITY, Player, PlayerError},
};

/// In-process player: messages travel over plain channels to a [`LocalClient`].
pub struct LocalPlayer {
    id: Uuid,
    username: String,
    challenge_id: Uuid,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    inbound: Mutex<Option<mpsc::Receiver<Message>>>,
}

/// Client side of a [`LocalPlayer`].
pub struct LocalClient {
    user_id: Uuid,
    inbound_tx: mpsc::Sender<Message>,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
}

impl LocalPlayer {
    pub fn new(id: Uuid, username: impl Into<String>, challenge_id: Uuid) -> (Self, LocalClient) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let player = Self {
            id,
            username: username.into(),
            challenge_id,
            outbound: Mutex::new(Some(outbound_tx)),
            inbound: Mutex::new(Some(inbound_rx)),
        };
        let client = LocalClient {
            user_id: id,
            inbound_tx,
            outbound_rx,
        };
        (player, client)
    }
}

impl Player for LocalPlayer {
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
        async { Ok(()) }.boxed()
    }

    fn send_message(&self, message: &Message) -> Result<(), PlayerError> {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(PlayerError::ConnectionClosed)?;
        tx.send(message.clone())
            .map_err(|_| PlayerError::ConnectionClosed)
    }

    fn take_message_stream(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        async { Ok(()) }.boxed()
    }
}

impl LocalClient {
    /// Next message pushed to the player; `None` once the player was closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.outbound_rx.recv().await
    }

    pub async fn send(&self, message: Message) -> Result<(), PlayerError> {
        self.inbound_tx
            .send(message)
            .await
            .map_err(|_| PlayerError::ConnectionClosed)
    }

    /// Submit an answer the way a remote client would.
    pub async fn answer(&self, question_id: Uuid, answer_id: Uuid) -> Result<(), PlayerError> {
        self.send(Message::Answer {
            user_id: self.user_id.to_string(),
            question_id: question_id.to_string(),
            answer_id: answer_id.to_string(),
        })
        .await
    }
}
