use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::EngineError,
    player::SharedPlayer,
    room::{Room, RoomError, RoomFactory, SharedRoom},
};

struct Assignment {
    player: SharedPlayer,
    ack: oneshot::Sender<Result<(), EngineError>>,
}

/// Dispatcher routing connecting players into the room of their challenge.
///
/// Every routing decision goes through a single task, so the room registry needs no locking.
/// A room stops receiving players as soon as it is full; it keeps running on its own until it
/// closes, and the next player for the same challenge opens a fresh room.
pub struct Engine {
    assignments: mpsc::Sender<Assignment>,
    shutdown: watch::Sender<bool>,
    pending: Mutex<Option<EngineLoop>>,
}

impl Engine {
    /// Engine opening rooms through `factory`. Nothing is routed before [`Engine::start`].
    pub fn new(factory: Arc<dyn RoomFactory>, config: EngineConfig) -> Self {
        let (assignments_tx, assignments_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_loop = EngineLoop {
            factory,
            registration_settle: config.registration_settle,
            assignments: assignments_rx,
            shutdown: shutdown_rx,
            rooms: HashMap::new(),
        };
        Self {
            assignments: assignments_tx,
            shutdown: shutdown_tx,
            pending: Mutex::new(Some(engine_loop)),
        }
    }

    /// Spawn the routing loop. Only the first call succeeds.
    pub fn start(&self) -> Result<JoinHandle<()>, EngineError> {
        let engine_loop = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::AlreadyStarted)?;
        info!("engine started");
        Ok(tokio::spawn(engine_loop.run()))
    }

    /// Hand a player to the engine and wait until it was routed to a room.
    pub async fn add_player(&self, player: SharedPlayer) -> Result<(), EngineError> {
        if self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Err(EngineError::NotRunning);
        }
        let (ack, ack_rx) = oneshot::channel();
        self.assignments
            .send(Assignment { player, ack })
            .await
            .map_err(|_| EngineError::NotRunning)?;
        ack_rx.await.map_err(|_| EngineError::NotRunning)?
    }

    /// Stop routing players. Rooms already running are left alone.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

struct EngineLoop {
    factory: Arc<dyn RoomFactory>,
    registration_settle: Duration,
    assignments: mpsc::Receiver<Assignment>,
    shutdown: watch::Receiver<bool>,
    rooms: HashMap<Uuid, SharedRoom>,
}

impl EngineLoop {
    async fn run(mut self) {
        loop {
            let assignment = tokio::select! {
                biased;
                _ = self.shutdown.wait_for(|stopped| *stopped) => break,
                assignment = self.assignments.recv() => match assignment {
                    Some(assignment) => assignment,
                    None => break,
                },
            };

            let Assignment { player, ack } = assignment;
            let challenge_id = player.challenge_id();
            let user_id = player.id();
            match self.route(player).await {
                Ok(room) => {
                    let _ = ack.send(Ok(()));
                    sleep(self.registration_settle).await;
                    if room.is_full() {
                        info!(
                            challenge_id = %challenge_id,
                            room_id = %room.room_id(),
                            "room is full; new players get a fresh room"
                        );
                        self.rooms.remove(&challenge_id);
                    }
                }
                Err(err) => {
                    warn!(challenge_id = %challenge_id, user_id = %user_id, error = %err, "failed to route player");
                    let _ = ack.send(Err(err));
                }
            }
        }
        info!(rooms = self.rooms.len(), "engine stopped");
    }

    /// Put `player` into the room of its challenge, opening one when needed.
    async fn route(&mut self, player: SharedPlayer) -> Result<SharedRoom, EngineError> {
        self.rooms.retain(|challenge_id, room| {
            let open = !room.is_closed();
            if !open {
                debug!(challenge_id = %challenge_id, room_id = %room.room_id(), "pruning closed room");
            }
            open
        });

        let challenge_id = player.challenge_id();
        if let Some(room) = self.rooms.get(&challenge_id).cloned() {
            match room.add_player(player.clone()).await {
                Ok(()) => return Ok(room),
                // Closed between the prune and the hand-over; fall through to a new room.
                Err(RoomError::Closed(_)) => {
                    self.rooms.remove(&challenge_id);
                }
                Err(source) => return Err(EngineError::Room { challenge_id, source }),
            }
        }

        let room = self
            .factory
            .create(challenge_id)
            .await
            .map_err(|source| EngineError::Room { challenge_id, source })?;
        info!(challenge_id = %challenge_id, room_id = %room.room_id(), "room opened");
        self.rooms.insert(challenge_id, room.clone());
        room.add_player(player)
            .await
            .map_err(|source| EngineError::Room { challenge_id, source })?;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::{FutureExt, future::BoxFuture};

    use super::*;
    use crate::{player::LocalPlayer, quiz::QuestionError, room::RoomStatus};

    struct FakeRoom {
        challenge_id: Uuid,
        room_id: Uuid,
        capacity: usize,
        players: Mutex<Vec<Uuid>>,
        done: watch::Sender<bool>,
    }

    impl Room for FakeRoom {
        fn challenge_id(&self) -> Uuid {
            self.challenge_id
        }

        fn room_id(&self) -> Uuid {
            self.room_id
        }

        fn add_player(&self, player: SharedPlayer) -> BoxFuture<'_, Result<(), RoomError>> {
            async move {
                if self.is_closed() {
                    return Err(RoomError::Closed(self.room_id));
                }
                self.players.lock().unwrap().push(player.id());
                Ok(())
            }
            .boxed()
        }

        fn is_full(&self) -> bool {
            self.players.lock().unwrap().len() >= self.capacity
        }

        fn status(&self) -> RoomStatus {
            RoomStatus::GatheringPlayers
        }

        fn close(&self) {
            self.done.send_replace(true);
        }

        fn closed(&self) -> watch::Receiver<bool> {
            self.done.subscribe()
        }
    }

    struct FakeFactory {
        capacity: usize,
        known: Uuid,
        created: AtomicUsize,
        rooms: Mutex<Vec<Arc<FakeRoom>>>,
    }

    impl FakeFactory {
        fn new(capacity: usize, known: Uuid) -> Arc<Self> {
            Arc::new(Self {
                capacity,
                known,
                created: AtomicUsize::new(0),
                rooms: Mutex::new(Vec::new()),
            })
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn room(&self, index: usize) -> Arc<FakeRoom> {
            self.rooms.lock().unwrap()[index].clone()
        }
    }

    impl RoomFactory for FakeFactory {
        fn create(&self, challenge_id: Uuid) -> BoxFuture<'_, Result<SharedRoom, RoomError>> {
            async move {
                if challenge_id != self.known {
                    return Err(QuestionError::ChallengeNotFound(challenge_id).into());
                }
                self.created.fetch_add(1, Ordering::SeqCst);
                let (done, _) = watch::channel(false);
                let room = Arc::new(FakeRoom {
                    challenge_id,
                    room_id: Uuid::new_v4(),
                    capacity: self.capacity,
                    players: Mutex::new(Vec::new()),
                    done,
                });
                self.rooms.lock().unwrap().push(room.clone());
                Ok(room as SharedRoom)
            }
            .boxed()
        }
    }

    fn player(challenge_id: Uuid) -> SharedPlayer {
        let (player, _client) = LocalPlayer::new(Uuid::new_v4(), "player", challenge_id);
        Arc::new(player)
    }

    fn engine(factory: Arc<FakeFactory>) -> Engine {
        let engine = Engine::new(factory, EngineConfig::default());
        engine.start().unwrap();
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn full_room_is_evicted_and_replaced() {
        let challenge_id = Uuid::new_v4();
        let factory = FakeFactory::new(2, challenge_id);
        let engine = engine(factory.clone());

        engine.add_player(player(challenge_id)).await.unwrap();
        engine.add_player(player(challenge_id)).await.unwrap();
        assert_eq!(factory.created(), 1);

        engine.add_player(player(challenge_id)).await.unwrap();
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.room(0).players.lock().unwrap().len(), 2);
        assert_eq!(factory.room(1).players.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_room_is_pruned() {
        let challenge_id = Uuid::new_v4();
        let factory = FakeFactory::new(5, challenge_id);
        let engine = engine(factory.clone());

        engine.add_player(player(challenge_id)).await.unwrap();
        factory.room(0).close();
        engine.add_player(player(challenge_id)).await.unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.room(1).players.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn room_creation_errors_reach_the_caller() {
        let factory = FakeFactory::new(2, Uuid::new_v4());
        let engine = engine(factory.clone());

        let unknown = Uuid::new_v4();
        let result = engine.add_player(player(unknown)).await;
        assert!(matches!(
            result,
            Err(EngineError::Room {
                challenge_id,
                source: RoomError::Questions(QuestionError::ChallengeNotFound(_)),
            }) if challenge_id == unknown
        ));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_not_started_refuses_players() {
        let challenge_id = Uuid::new_v4();
        let factory = FakeFactory::new(2, challenge_id);
        let engine = Engine::new(factory.clone(), EngineConfig::default());

        assert!(matches!(
            engine.add_player(player(challenge_id)).await,
            Err(EngineError::NotRunning)
        ));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_engine_refuses_players() {
        let challenge_id = Uuid::new_v4();
        let factory = FakeFactory::new(2, challenge_id);
        let engine = Engine::new(factory.clone(), EngineConfig::default());
        let handle = engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));

        engine.close();
        handle.await.unwrap();

        assert!(matches!(
            engine.add_player(player(challenge_id)).await,
            Err(EngineError::NotRunning)
        ));
        assert_eq!(factory.created(), 0);
    }
}
