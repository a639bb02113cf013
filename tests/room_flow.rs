use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use quiz_arena_back::{
    config::{EngineConfig, RoomConfig},
    dao::{
        challenge_store::InMemoryChallengeStore,
        membership::{InMemoryRoomMembers, RoomMembershipStore},
        models::{AnswerOptionEntity, QuestionEntity, RawChallenge},
    },
    dto::ws::{Message, QuestionPayload},
    player::{
        BusPlayer, InMemoryBus, LocalClient, LocalPlayer, MessageBus,
        bus::{inbound_subject, outbound_subject},
    },
    room::DefaultRoomFactory,
    services::{
        engine::Engine,
        restrictions::{Restriction, RestrictionManager, RestrictionReason},
    },
};
use uuid::Uuid;

fn seed(store: &InMemoryChallengeStore, questions: u32) -> Uuid {
    let challenge = RawChallenge {
        id: Uuid::new_v4(),
        prize_pool_amount: 250.0,
        time_per_question_sec: 8,
        players_to_start: Some(2),
        winners_number: Some(2),
        user_max_attempts: Some(3),
    };
    let challenge_id = challenge.id;
    let questions = (1..=questions)
        .map(|order| QuestionEntity {
            id: Uuid::new_v4(),
            question: format!("Q{order}"),
            order,
            time_for_answer: 8,
            answer_options: vec![
                AnswerOptionEntity {
                    id: Uuid::new_v4(),
                    option: "wrong".into(),
                    is_correct: false,
                },
                AnswerOptionEntity {
                    id: Uuid::new_v4(),
                    option: "right".into(),
                    is_correct: true,
                },
            ],
        })
        .collect();
    store.insert_challenge(challenge, questions);
    challenge_id
}

fn right_option(question: &QuestionPayload) -> Uuid {
    question
        .answer_options
        .iter()
        .find(|option| option.option == "right")
        .map(|option| option.id)
        .expect("fixture questions have a right option")
}

async fn local_next(client: &mut LocalClient) -> Message {
    client.recv().await.expect("local player closed too early")
}

async fn bus_next(stream: &mut BoxStream<'static, String>) -> Message {
    let payload = stream.next().await.expect("bus subject closed");
    Message::from_json_str(&payload).expect("room publishes valid messages")
}

#[tokio::test(start_paused = true)]
async fn two_players_across_transports_share_the_prize_pool() {
    let store = Arc::new(InMemoryChallengeStore::new());
    let challenge_id = seed(&store, 2);
    let membership = Arc::new(InMemoryRoomMembers::new());
    let restrictions = RestrictionManager::new(store.clone());
    let factory = DefaultRoomFactory::new(
        store.clone(),
        membership.clone(),
        Arc::new(restrictions.clone()),
        RoomConfig::default(),
    );
    let engine = Engine::new(Arc::new(factory), EngineConfig::default());
    engine.start().unwrap();

    let alice_id = Uuid::new_v4();
    let (alice, mut alice_client) = LocalPlayer::new(alice_id, "alice", challenge_id);

    let bus = Arc::new(InMemoryBus::new(64));
    let bob_id = Uuid::new_v4();
    let mut bob_stream = bus
        .subscribe(&outbound_subject(challenge_id, bob_id))
        .await
        .unwrap();
    let bob = BusPlayer::new(bob_id, "bob", challenge_id, bus.clone());

    for user_id in [alice_id, bob_id] {
        assert_eq!(
            restrictions
                .is_user_restricted(challenge_id, user_id, true)
                .await
                .unwrap(),
            Restriction::Allowed
        );
    }
    engine.add_player(Arc::new(alice)).await.unwrap();
    engine.add_player(Arc::new(bob)).await.unwrap();

    let mut answered = 0;
    let winners = loop {
        let message = local_next(&mut alice_client).await;
        match message {
            Message::Question(question) => {
                let answer = right_option(&question);
                alice_client
                    .answer(question.question_id, answer)
                    .await
                    .unwrap();
                assert!(matches!(
                    local_next(&mut alice_client).await,
                    Message::AnswerReply {
                        success: true,
                        is_fastest: true,
                        points: 6,
                        ..
                    }
                ));

                let bob_question = loop {
                    if let Message::Question(question) = bus_next(&mut bob_stream).await {
                        break question;
                    }
                };
                assert_eq!(bob_question, question);
                let bob_answer = Message::Answer {
                    user_id: bob_id.to_string(),
                    question_id: question.question_id.to_string(),
                    answer_id: answer.to_string(),
                };
                bus.publish(
                    &inbound_subject(challenge_id, bob_id),
                    serde_json::to_string(&bob_answer).unwrap(),
                )
                .unwrap();
                assert!(matches!(
                    bus_next(&mut bob_stream).await,
                    Message::AnswerReply {
                        success: true,
                        is_fastest: false,
                        points: 4,
                        ..
                    }
                ));
                answered += 1;
            }
            Message::WinnersTable { winners } => break winners,
            _ => {}
        }
    };

    assert_eq!(answered, 2);
    assert_eq!(winners.get_index(0), Some((&"alice".to_string(), &150.0)));
    assert_eq!(winners.get_index(1), Some((&"bob".to_string(), &100.0)));
    assert_eq!(winners.values().sum::<f64>(), 250.0);

    // The room closes the local transport once rewards are settled.
    assert_eq!(alice_client.recv().await, None);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(membership.count_players(challenge_id).await.unwrap(), 0);

    assert!(matches!(
        restrictions
            .is_user_restricted(challenge_id, alice_id, false)
            .await
            .unwrap(),
        Restriction::Restricted(RestrictionReason::RewardAlreadyEarned { .. })
    ));
    assert!(matches!(
        restrictions
            .is_user_restricted(challenge_id, bob_id, false)
            .await
            .unwrap(),
        Restriction::Restricted(RestrictionReason::RewardAlreadyEarned { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn unknown_challenge_is_reported_to_the_caller() {
    let store = Arc::new(InMemoryChallengeStore::new());
    let restrictions = RestrictionManager::new(store.clone());
    let factory = DefaultRoomFactory::new(
        store,
        Arc::new(InMemoryRoomMembers::new()),
        Arc::new(restrictions),
        RoomConfig::default(),
    );
    let engine = Engine::new(Arc::new(factory), EngineConfig::default());
    engine.start().unwrap();

    let (player, _client) = LocalPlayer::new(Uuid::new_v4(), "ghost", Uuid::new_v4());
    assert!(engine.add_player(Arc::new(player)).await.is_err());
}
