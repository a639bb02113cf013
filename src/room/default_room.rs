use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::RoomConfig,
    dao::membership::RoomMembershipStore,
    dto::ws::{Message, QuestionPayload},
    player::SharedPlayer,
    quiz::{PrizeDistribution, QuestionContainer, QuizEngine},
    room::{
        PlayersMap, RewardsSink, Room, RoomError,
        status::{RoomStatus, StatusTransactor},
    },
};

/// Input forwarded by a player watcher to the room loop.
enum PlayerInput {
    Answer {
        player_id: Uuid,
        user_id: String,
        question_id: String,
        answer_id: String,
        answered_at: OffsetDateTime,
    },
    /// The player's inbound stream ended.
    Disconnected(Uuid),
}

enum RoomEvent {
    NewPlayer(SharedPlayer),
    Countdown(u32),
    Question(usize, QuestionPayload),
    Input(PlayerInput),
    Status(RoomStatus),
    Closed,
}

/// Room running one challenge's game on a dedicated task.
///
/// The handle only queues players and reads shared state; the quiz itself lives in the task
/// started by [`DefaultRoom::start`].
pub struct DefaultRoom {
    challenge_id: Uuid,
    room_id: Uuid,
    players_to_start: usize,
    new_players: mpsc::Sender<SharedPlayer>,
    players: Arc<PlayersMap>,
    status: Arc<StatusTransactor>,
    done: Arc<watch::Sender<bool>>,
    pending: Mutex<Option<RoomLoop>>,
}

impl DefaultRoom {
    pub fn new(
        questions: QuestionContainer,
        membership: Arc<dyn RoomMembershipStore>,
        rewards: Arc<dyn RewardsSink>,
        config: RoomConfig,
    ) -> Self {
        let challenge = questions.challenge();
        let challenge_id = challenge.id;
        let room_id = Uuid::new_v4();
        let players_to_start = from_challenge(challenge.players_to_start, config.players_to_start);
        let winners_num = from_challenge(challenge.winners_number, config.winners_number);

        let capacity = config.channel_capacity;
        let (new_players_tx, new_players_rx) = mpsc::channel(capacity);
        let (countdown_tx, countdown_rx) = mpsc::channel(capacity);
        let (question_tx, question_rx) = mpsc::channel(capacity);
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (status, status_rx) = StatusTransactor::new(room_id, capacity);
        let (done_tx, done_rx) = watch::channel(false);

        let players = Arc::new(PlayersMap::new(challenge_id, membership));
        let status = Arc::new(status);
        let done = Arc::new(done_tx);

        let room_loop = RoomLoop {
            challenge_id,
            room_id,
            players_to_start,
            config,
            quiz: QuizEngine::new(questions, winners_num),
            players: players.clone(),
            status: status.clone(),
            rewards,
            distribution: None,
            done: done.clone(),
            done_rx,
            new_players_rx,
            countdown_tx,
            countdown_rx,
            question_tx,
            question_rx,
            input_tx,
            input_rx,
            status_rx,
        };

        Self {
            challenge_id,
            room_id,
            players_to_start,
            new_players: new_players_tx,
            players,
            status,
            done,
            pending: Mutex::new(Some(room_loop)),
        }
    }

    /// Spawn the room loop. Only the first call succeeds.
    pub fn start(&self) -> Result<JoinHandle<()>, RoomError> {
        let room_loop = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RoomError::AlreadyStarted(self.room_id))?;
        info!(
            challenge_id = %self.challenge_id,
            room_id = %self.room_id,
            players_to_start = self.players_to_start,
            "room started"
        );
        Ok(tokio::spawn(room_loop.run()))
    }

    pub fn players_count(&self) -> usize {
        self.players.len()
    }
}

impl Room for DefaultRoom {
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
            self.new_players
                .send(player)
                .await
                .map_err(|_| RoomError::Closed(self.room_id))
        }
        .boxed()
    }

    fn is_full(&self) -> bool {
        self.players.len() >= self.players_to_start
    }

    fn status(&self) -> RoomStatus {
        self.status.status()
    }

    fn close(&self) {
        close_room(&self.done, self.room_id);
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

fn from_challenge(value: Option<u32>, fallback: usize) -> usize {
    value
        .filter(|count| *count > 0)
        .map(|count| count as usize)
        .unwrap_or(fallback)
}

fn close_room(done: &watch::Sender<bool>, room_id: Uuid) {
    let closed_now = done.send_if_modified(|closed| !std::mem::replace(closed, true));
    if closed_now {
        debug!(room_id = %room_id, "room close requested");
    }
}

/// Run `task` until it completes or the room closes, whichever comes first.
async fn unless_closed(mut done: watch::Receiver<bool>, task: impl Future<Output = ()>) {
    tokio::select! {
        _ = task => {}
        _ = done.wait_for(|closed| *closed) => {}
    }
}

/// State owned by the room task. Nothing here is touched from elsewhere.
struct RoomLoop {
    challenge_id: Uuid,
    room_id: Uuid,
    players_to_start: usize,
    config: RoomConfig,
    quiz: QuizEngine,
    players: Arc<PlayersMap>,
    status: Arc<StatusTransactor>,
    rewards: Arc<dyn RewardsSink>,
    distribution: Option<PrizeDistribution>,
    done: Arc<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
    new_players_rx: mpsc::Receiver<SharedPlayer>,
    countdown_tx: mpsc::Sender<u32>,
    countdown_rx: mpsc::Receiver<u32>,
    question_tx: mpsc::Sender<(usize, QuestionPayload)>,
    question_rx: mpsc::Receiver<(usize, QuestionPayload)>,
    input_tx: mpsc::Sender<PlayerInput>,
    input_rx: mpsc::Receiver<PlayerInput>,
    status_rx: mpsc::Receiver<RoomStatus>,
}

impl RoomLoop {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.done_rx.wait_for(|closed| *closed) => RoomEvent::Closed,
                Some(status) = self.status_rx.recv() => RoomEvent::Status(status),
                Some((num, payload)) = self.question_rx.recv() => RoomEvent::Question(num, payload),
                Some(seconds) = self.countdown_rx.recv() => RoomEvent::Countdown(seconds),
                Some(player) = self.new_players_rx.recv() => RoomEvent::NewPlayer(player),
                Some(input) = self.input_rx.recv() => RoomEvent::Input(input),
            };

            match event {
                RoomEvent::Closed => break,
                RoomEvent::Status(status) => self.on_status(status).await,
                RoomEvent::Question(num, payload) => self.on_question(num, payload),
                RoomEvent::Countdown(seconds_left) => {
                    self.players.broadcast(&Message::Countdown { seconds_left });
                }
                RoomEvent::NewPlayer(player) => self.on_new_player(player).await,
                RoomEvent::Input(PlayerInput::Answer {
                    player_id,
                    user_id,
                    question_id,
                    answer_id,
                    answered_at,
                }) => self.on_answer(player_id, &user_id, &question_id, &answer_id, answered_at),
                RoomEvent::Input(PlayerInput::Disconnected(user_id)) => {
                    self.on_disconnect(user_id).await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn on_new_player(&mut self, player: SharedPlayer) {
        let user_id = player.id();
        let status = self.status.status();
        if status != RoomStatus::GatheringPlayers || self.players.get(user_id).is_some() {
            info!(
                room_id = %self.room_id,
                user_id = %user_id,
                ?status,
                "player cannot join this room"
            );
            let unavailable = Message::RoomUnavailable {
                challenge_id: self.challenge_id,
            };
            if let Err(err) = player.send_message(&unavailable) {
                debug!(user_id = %user_id, error = %err, "failed to notify rejected player");
            }
            if let Err(err) = player.close().await {
                debug!(user_id = %user_id, error = %err, "failed to close rejected player");
            }
            return;
        }

        if let Err(err) = player.start().await {
            warn!(room_id = %self.room_id, user_id = %user_id, error = %err, "player transport failed to start");
            let _ = player.close().await;
            return;
        }
        // Grace period for the transport subscription to settle.
        sleep(self.config.join_settle).await;

        if let Err(err) = self.players.add(player.clone()).await {
            warn!(room_id = %self.room_id, user_id = %user_id, error = %err, "failed to register player");
            let _ = player.close().await;
            return;
        }
        self.quiz.register_player(user_id);
        self.spawn_player_watcher(&player);

        let players_count = self.players.len();
        info!(
            room_id = %self.room_id,
            user_id = %user_id,
            players_count,
            "player joined"
        );
        self.players.broadcast(&Message::PlayerJoined {
            user_id,
            username: player.username().to_string(),
            players_count,
        });

        if players_count >= self.players_to_start {
            self.status.set_status(RoomStatus::RoomIsFull);
        }
    }

    async fn on_disconnect(&mut self, user_id: Uuid) {
        if self.status.status() != RoomStatus::GatheringPlayers {
            debug!(room_id = %self.room_id, user_id = %user_id, "player left a running game");
            return;
        }
        match self.players.remove(user_id).await {
            Ok(Some(player)) => {
                info!(room_id = %self.room_id, user_id = %user_id, "player left before the start");
                let _ = player.close().await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(room_id = %self.room_id, user_id = %user_id, error = %err, "failed to unregister player");
            }
        }
    }

    fn on_question(&mut self, question_num: usize, payload: QuestionPayload) {
        // Recorded before the broadcast so no answer can precede its send time.
        if let Err(err) = self.quiz.register_question_sending_event(question_num) {
            warn!(room_id = %self.room_id, question_num, error = %err, "failed to register question");
            return;
        }
        debug!(room_id = %self.room_id, question_num, "question sent");
        self.players.broadcast(&Message::Question(payload));
    }

    fn on_answer(
        &mut self,
        player_id: Uuid,
        user_id: &str,
        question_id: &str,
        answer_id: &str,
        answered_at: OffsetDateTime,
    ) {
        if self.status.status() >= RoomStatus::WinnersTableSent {
            debug!(room_id = %self.room_id, user_id = %player_id, "answer after the results, ignored");
            return;
        }
        let (Ok(user_id), Ok(question_id), Ok(answer_id)) = (
            Uuid::parse_str(user_id),
            Uuid::parse_str(question_id),
            Uuid::parse_str(answer_id),
        ) else {
            warn!(
                room_id = %self.room_id,
                user_id = %player_id,
                question_id,
                answer_id,
                "malformed answer dropped"
            );
            return;
        };
        if user_id != player_id {
            warn!(
                room_id = %self.room_id,
                expected = %player_id,
                got = %user_id,
                "answer ignored: mismatched user id"
            );
            return;
        }

        let outcome = match self
            .quiz
            .check_and_register_answer(question_id, answer_id, user_id, answered_at)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(room_id = %self.room_id, user_id = %user_id, error = %err, "answer rejected");
                return;
            }
        };

        let reply = Message::AnswerReply {
            question_id,
            success: outcome.is_correct(),
            segment: outcome.cell.find_segment_num(),
            is_fastest: outcome.cell.is_first_correct_answer(),
            points: outcome.cell.pts(),
        };
        let Some(player) = self.players.get(user_id) else {
            return;
        };
        if let Err(err) = player.send_message(&reply) {
            warn!(room_id = %self.room_id, user_id = %user_id, error = %err, "failed to deliver answer reply");
        }
    }

    async fn on_status(&mut self, status: RoomStatus) {
        info!(challenge_id = %self.challenge_id, room_id = %self.room_id, ?status, "room status");
        match status {
            RoomStatus::RoomIsFull => self.spawn_countdown(),
            RoomStatus::CountdownFinished => self.spawn_questions(),
            RoomStatus::QuestionsAreSent => self.send_winners_table(),
            RoomStatus::WinnersTableSent => self.spawn_rewards(),
            RoomStatus::RewardsSent => {
                self.status.set_status(RoomStatus::RoomFinished);
            }
            RoomStatus::RoomFinished => {
                // Let the last replies flush before the transports go away.
                sleep(self.config.finish_drain).await;
                close_room(&self.done, self.room_id);
            }
            RoomStatus::GatheringPlayers | RoomStatus::RoomClosed => {}
        }
    }

    fn spawn_countdown(&self) {
        let countdown = self.countdown_tx.clone();
        let status = self.status.clone();
        let seconds = self.config.countdown_seconds;
        let tick = self.config.countdown_tick;
        let settle = self.config.countdown_settle;

        tokio::spawn(unless_closed(self.done_rx.clone(), async move {
            for seconds_left in (1..=seconds).rev() {
                if countdown.send(seconds_left).await.is_err() {
                    return;
                }
                if seconds_left > 1 {
                    sleep(tick).await;
                }
            }
            sleep(settle).await;
            status.set_status(RoomStatus::CountdownFinished);
        }));
    }

    fn spawn_questions(&self) {
        let entities = self.quiz.questions().questions();
        let total = entities.len();
        let payloads: Vec<QuestionPayload> = entities
            .iter()
            .enumerate()
            .map(|(num, entity)| QuestionPayload::from_entity(entity, num, total))
            .collect();
        let questions = self.question_tx.clone();
        let status = self.status.clone();
        let delay = self.config.question_delay;
        let settle = self.config.questions_settle;

        tokio::spawn(unless_closed(self.done_rx.clone(), async move {
            for (num, payload) in payloads.into_iter().enumerate() {
                if num > 0 {
                    sleep(delay).await;
                }
                if questions.send((num, payload)).await.is_err() {
                    return;
                }
            }
            sleep(settle).await;
            status.set_status(RoomStatus::QuestionsAreSent);
        }));
    }

    fn send_winners_table(&mut self) {
        let distribution = self.quiz.get_prize_pool_distribution();
        let mut winners = IndexMap::with_capacity(distribution.len());
        for (user_id, amount) in &distribution {
            let name = self
                .players
                .username(*user_id)
                .filter(|name| !winners.contains_key(name))
                .unwrap_or_else(|| user_id.to_string());
            winners.insert(name, *amount);
        }

        info!(room_id = %self.room_id, winners = winners.len(), "sending winners table");
        self.players.broadcast(&Message::WinnersTable { winners });
        self.distribution = Some(distribution);
        self.status.set_status(RoomStatus::WinnersTableSent);
    }

    fn spawn_rewards(&mut self) {
        let distribution = self.distribution.take().unwrap_or_default();
        let participants: Vec<Uuid> = self.players.all().iter().map(|player| player.id()).collect();
        let settlement = self
            .rewards
            .settle(self.challenge_id, distribution, participants);
        let status = self.status.clone();
        let challenge_id = self.challenge_id;

        tokio::spawn(async move {
            if let Err(err) = settlement.await {
                warn!(challenge_id = %challenge_id, error = %err, "failed to settle rewards");
            }
            status.set_status(RoomStatus::RewardsSent);
        });
    }

    async fn shutdown(self) {
        if self.status.status() == RoomStatus::RoomFinished {
            self.status.set_status(RoomStatus::RoomClosed);
        }
        info!(
            challenge_id = %self.challenge_id,
            room_id = %self.room_id,
            status = ?self.status.status(),
            "room closed"
        );
        self.players.drain().await;
    }

    fn spawn_player_watcher(&self, player: &SharedPlayer) {
        let player_id = player.id();
        let Some(mut stream) = player.take_message_stream() else {
            warn!(room_id = %self.room_id, user_id = %player_id, "player stream already taken");
            return;
        };
        let inputs = self.input_tx.clone();

        tokio::spawn(unless_closed(self.done_rx.clone(), async move {
            while let Some(message) = stream.recv().await {
                match message {
                    Message::Answer {
                        user_id,
                        question_id,
                        answer_id,
                    } => {
                        let input = PlayerInput::Answer {
                            player_id,
                            user_id,
                            question_id,
                            answer_id,
                            answered_at: OffsetDateTime::now_utc(),
                        };
                        if inputs.send(input).await.is_err() {
                            return;
                        }
                    }
                    other => {
                        debug!(user_id = %player_id, message = ?other, "ignoring player message");
                    }
                }
            }
            let _ = inputs.send(PlayerInput::Disconnected(player_id)).await;
        }));
    }
}
