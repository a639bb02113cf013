//! Players reached through a subject-based publish/subscribe bus.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::BoxStream,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::Message,
    player::{INBOUND_CAPACITY, Player, PlayerError},
};

/// Minimal publish/subscribe contract needed to reach a remote player.
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish of a text payload.
    fn publish(&self, subject: &str, payload: String) -> Result<(), PlayerError>;
    /// Stream of payloads published on `subject` from now on.
    fn subscribe(&self, subject: &str) -> BoxFuture<'static, Result<BoxStream<'static, String>, PlayerError>>;
}

/// Subject a player's client listens on.
pub fn outbound_subject(challenge_id: Uuid, user_id: Uuid) -> String {
    format!("quiz.{challenge_id}.{user_id}.out")
}

/// Subject a player's client publishes answers on.
pub fn inbound_subject(challenge_id: Uuid, user_id: Uuid) -> String {
    format!("quiz.{challenge_id}.{user_id}.in")
}

/// Player whose messages are JSON payloads on two bus subjects.
pub struct BusPlayer {
    id: Uuid,
    username: String,
    challenge_id: Uuid,
    bus: Arc<dyn MessageBus>,
    inbound_tx: Mutex<Option<mpsc::Sender<Message>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BusPlayer {
    pub fn new(id: Uuid, username: impl Into<String>, challenge_id: Uuid, bus: Arc<dyn MessageBus>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            id,
            username: username.into(),
            challenge_id,
            bus,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            forwarder: Mutex::new(None),
        }
    }
}

impl Player for BusPlayer {
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
        async move {
            let Some(inbound_tx) = self
                .inbound_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            else {
                debug!(user_id = %self.id, "bus player already started");
                return Ok(());
            };

            let subject = inbound_subject(self.challenge_id, self.id);
            let mut stream = self.bus.subscribe(&subject).await?;
            let user_id = self.id;

            let forwarder = tokio::spawn(async move {
                while let Some(payload) = stream.next().await {
                    match Message::from_json_str(&payload) {
                        Ok(message) => {
                            if inbound_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "dropping malformed bus payload");
                        }
                    }
                }
                debug!(user_id = %user_id, "bus subscription ended");
            });

            *self.forwarder.lock().unwrap_or_else(PoisonError::into_inner) = Some(forwarder);
            info!(user_id = %self.id, subject = %subject, "bus player subscribed");
            Ok(())
        }
        .boxed()
    }

    fn send_message(&self, message: &Message) -> Result<(), PlayerError> {
        let payload = serde_json::to_string(message)?;
        self.bus
            .publish(&outbound_subject(self.challenge_id, self.id), payload)
    }

    fn take_message_stream(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            forwarder.abort();
        }
        async { Ok(()) }.boxed()
    }
}

/// Process-local bus with one broadcast channel per subject.
#[derive(Clone)]
pub struct InMemoryBus {
    subjects: Arc<DashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl InMemoryBus {
    /// Bus whose subjects buffer up to `capacity` payloads per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            subjects: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Subscribe under the entry guard so a concurrent sweep cannot orphan the new receiver.
    fn receiver(&self, subject: &str) -> broadcast::Receiver<String> {
        // Subjects whose subscribers all went away are released here.
        self.subjects.retain(|_, sender| sender.receiver_count() > 0);
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, subject: &str, payload: String) -> Result<(), PlayerError> {
        let sender = self.subjects.get(subject).map(|entry| entry.value().clone());
        match sender {
            Some(sender) if sender.send(payload).is_ok() => {}
            Some(_) => {
                self.subjects
                    .remove_if(subject, |_, sender| sender.receiver_count() == 0);
                debug!(subject = %subject, "published with no subscribers");
            }
            None => debug!(subject = %subject, "published with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self, subject: &str) -> BoxFuture<'static, Result<BoxStream<'static, String>, PlayerError>> {
        let receiver = self.receiver(subject);
        let subject = subject.to_string();
        async move {
            let stream = BroadcastStream::new(receiver)
                .filter_map(move |item| {
                    let payload = match item {
                        Ok(payload) => Some(payload),
                        Err(err) => {
                            warn!(subject = %subject, error = %err, "bus subscriber lagged");
                            None
                        }
                    };
                    futures::future::ready(payload)
                })
                .boxed();
            Ok(stream)
        }
        .boxed()
    }
}
