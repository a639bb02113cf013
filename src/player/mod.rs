//! Connected participants and the transports carrying their messages.

pub mod bus;
pub mod local;
pub mod ws;

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dto::ws::Message;

pub use self::bus::{BusPlayer, InMemoryBus, MessageBus};
pub use self::local::{LocalClient, LocalPlayer};
pub use self::ws::WsPlayer;

/// Shared handle to a player, as stored by rooms and the engine.
pub type SharedPlayer = Arc<dyn Player>;

/// Capacity of the per-player inbound message queue.
pub const INBOUND_CAPACITY: usize = 10;

/// Failures of delivering messages to a player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The transport is gone; nothing can be delivered anymore.
    #[error("player connection closed")]
    ConnectionClosed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Capability contract of one connected participant.
///
/// Identity, outbound messaging, an inbound message stream and connect/disconnect hooks.
/// The inbound stream ending is the disconnect notification.
pub trait Player: Send + Sync {
    /// User id the player identified with.
    fn id(&self) -> Uuid;
    fn username(&self) -> &str;
    /// Challenge the player wants to play.
    fn challenge_id(&self) -> Uuid;
    /// Subscribe to the transport. Called once by the room before the player is registered.
    fn start(&self) -> BoxFuture<'_, Result<(), PlayerError>>;
    /// Push a message to the player without waiting for delivery.
    fn send_message(&self, message: &Message) -> Result<(), PlayerError>;
    /// Hand out the inbound stream; only the first call returns it.
    fn take_message_stream(&self) -> Option<mpsc::Receiver<Message>>;
    /// Release the transport. Later sends fail.
    fn close(&self) -> BoxFuture<'_, Result<(), PlayerError>>;
}
