use sports_quiz::client::ClientProjection;
use sports_quiz::config::GameConfig;
use sports_quiz::error::SessionError;
use sports_quiz::protocol::{ClientMessage, ServerMessage, SessionSnapshot};
use sports_quiz::questions::QuestionBank;
use sports_quiz::state::AppState;
use sports_quiz::types::{Category, GameMode, GamePhase};
use sports_quiz::ws::handlers::handle_message;
use sports_quiz::ws::{release_connection, ConnectionContext};
use std::sync::Arc;
use std::time::Duration;

/// A connected player: their connection plus what the server told them
struct Client {
    ctx: ConnectionContext,
    code: String,
    player_id: String,
    token: String,
}

async fn create(state: &Arc<AppState>, mode: GameMode, category: Category, name: &str) -> Client {
    let mut ctx = ConnectionContext::new();
    let reply = handle_message(
        ClientMessage::CreateSession {
            mode,
            category,
            display_name: name.to_string(),
        },
        &mut ctx,
        state,
    )
    .await;

    match reply {
        Some(ServerMessage::SessionCreated {
            snapshot,
            player_id,
            player_token,
        }) => Client {
            ctx,
            code: snapshot.session_code,
            player_id,
            token: player_token,
        },
        other => panic!("Expected SessionCreated, got {:?}", other),
    }
}

async fn join(state: &Arc<AppState>, code: &str, name: &str) -> Client {
    let mut ctx = ConnectionContext::new();
    let reply = handle_message(
        ClientMessage::JoinSession {
            session_code: code.to_string(),
            display_name: name.to_string(),
        },
        &mut ctx,
        state,
    )
    .await;

    match reply {
        Some(ServerMessage::SessionJoined {
            snapshot,
            player_id,
            player_token,
        }) => Client {
            ctx,
            code: snapshot.session_code,
            player_id,
            token: player_token,
        },
        other => panic!("Expected SessionJoined, got {:?}", other),
    }
}

async fn send(state: &Arc<AppState>, client: &mut Client, msg: ClientMessage) -> Option<ServerMessage> {
    handle_message(msg, &mut client.ctx, state).await
}

async fn ready(state: &Arc<AppState>, client: &mut Client) {
    let code = client.code.clone();
    let reply = send(state, client, ClientMessage::SetReady { session_code: code }).await;
    assert!(reply.is_none(), "setReady should not reply, got {:?}", reply);
}

async fn answer(
    state: &Arc<AppState>,
    client: &mut Client,
    text: Option<&str>,
    time_remaining: f64,
    question_index: usize,
) -> Option<ServerMessage> {
    let msg = ClientMessage::SubmitAnswer {
        session_code: client.code.clone(),
        player_id: client.player_id.clone(),
        answer: text.map(str::to_string),
        time_remaining,
        points: None,
        total_score: None,
        elapsed_seconds: Some(15.0 - time_remaining),
        all_elapsed_seconds: None,
        question_index: Some(question_index),
    };
    send(state, client, msg).await
}

/// Receive room messages until one matches, checking every snapshot on the way
async fn next_matching<F>(client: &mut Client, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    let rx = client.ctx.room_rx.as_mut().expect("client should be in a room");
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let msg = rx.recv().await.expect("room channel closed");
            if let Some(snapshot) = msg.snapshot() {
                assert!(
                    snapshot.answered_this_round.len() <= snapshot.players.len(),
                    "answered set larger than roster"
                );
            }
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("timed out waiting for room message")
}

async fn next_snapshot(client: &mut Client, tag: &str) -> SessionSnapshot {
    let msg = next_matching(client, |m| {
        serde_json::to_value(m).map(|v| v["t"] == tag).unwrap_or(false)
    })
    .await;
    msg.snapshot().cloned().expect("message should carry a snapshot")
}

fn correct_answer(snapshot: &SessionSnapshot) -> String {
    snapshot
        .current_question()
        .expect("active question")
        .correct_answer
        .clone()
}

fn wrong_answer(snapshot: &SessionSnapshot) -> String {
    let question = snapshot.current_question().expect("active question");
    question
        .options
        .iter()
        .find(|o| **o != question.correct_answer)
        .cloned()
        .expect("a wrong option")
}

async fn started_match(state: &Arc<AppState>) -> (Client, Client, SessionSnapshot) {
    let mut alice = create(state, GameMode::HeadToHead, Category::Football, "Alice").await;
    let mut bob = join(state, &alice.code, "Bob").await;
    ready(state, &mut alice).await;
    ready(state, &mut bob).await;

    let started = next_snapshot(&mut alice, "sessionStarted").await;
    next_snapshot(&mut bob, "sessionStarted").await;
    (alice, bob, started)
}

/// Create -> join -> ready -> countdown -> first question -> next question
#[tokio::test(start_paused = true)]
async fn test_head_to_head_first_question_flow() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, started) = started_match(&state).await;

    assert_eq!(started.phase, GamePhase::InProgress);
    assert_eq!(started.progression_index, 0);
    assert_eq!(started.countdown_ticks, None);

    let correct = correct_answer(&started);
    let wrong = wrong_answer(&started);
    assert!(answer(&state, &mut alice, Some(&correct), 9.0, 0).await.is_none());

    let alice_score = next_matching(&mut bob, |m| {
        matches!(m, ServerMessage::ScoreUpdate { player_id, .. } if *player_id == alice.player_id)
    })
    .await;
    assert!(matches!(alice_score, ServerMessage::ScoreUpdate { score: 13, .. }));

    assert!(answer(&state, &mut bob, Some(&wrong), 5.0, 0).await.is_none());

    let next = next_snapshot(&mut alice, "nextQuestion").await;
    assert_eq!(next.phase, GamePhase::InProgress);
    assert_eq!(next.progression_index, 1);
    assert!(next.answered_this_round.is_empty());
    assert_eq!(next.player(&alice.player_id).unwrap().score, 13);
    assert_eq!(next.player(&bob.player_id).unwrap().score, 0);
    assert_eq!(next.player(&alice.player_id).unwrap().response_times, vec![6.0]);
}

/// All ten questions, game over, then a rematch back to the lobby
#[tokio::test(start_paused = true)]
async fn test_full_game_then_rematch() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, mut current) = started_match(&state).await;
    let question_count = current.questions.len();
    assert_eq!(question_count, 10);

    for index in 0..question_count {
        assert_eq!(current.progression_index, index);
        let correct = correct_answer(&current);
        answer(&state, &mut alice, Some(&correct), 12.0, index).await;
        answer(&state, &mut bob, Some(&correct), 4.0, index).await;

        let tag = if index + 1 == question_count {
            "sessionOver"
        } else {
            "nextQuestion"
        };
        current = next_snapshot(&mut alice, tag).await;
        next_snapshot(&mut bob, tag).await;
    }

    assert_eq!(current.phase, GamePhase::GameOver);
    assert!(current.completion_time.is_some());
    // 14 points per question for Alice, 11 for Bob
    assert_eq!(current.player(&alice.player_id).unwrap().score, 140);
    assert_eq!(current.player(&bob.player_id).unwrap().score, 110);
    assert_eq!(current.player(&alice.player_id).unwrap().response_times.len(), 10);

    // Answers after the end are stale and silently dropped
    assert!(answer(&state, &mut alice, Some("Argentina"), 10.0, 9).await.is_none());

    let rematch = |client: &Client| ClientMessage::RequestRematch {
        session_code: client.code.clone(),
        player_id: client.player_id.clone(),
    };
    let first = rematch(&alice);
    assert!(send(&state, &mut alice, first.clone()).await.is_none());
    // A repeat from the same player is absorbed
    assert!(send(&state, &mut alice, first).await.is_none());
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(snapshot.phase, GamePhase::GameOver);

    let second = rematch(&bob);
    assert!(send(&state, &mut bob, second).await.is_none());

    let lobby = next_snapshot(&mut alice, "returnToLobby").await;
    assert_eq!(lobby.phase, GamePhase::Lobby);
    assert_eq!(lobby.progression_index, 0);
    assert!(lobby.players.iter().all(|p| p.score == 0 && !p.is_ready));
    assert!(lobby.scores.iter().all(|(_, score)| *score == 0));
    assert_eq!(lobby.questions, QuestionBank::builtin().select(Category::Football, 10));
    assert!(lobby.completion_time.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_speed_bonus_separates_equal_answers() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, started) = started_match(&state).await;
    let correct = correct_answer(&started);

    answer(&state, &mut alice, Some(&correct), 12.0, 0).await;
    answer(&state, &mut bob, Some(&correct), 4.0, 0).await;

    let snapshot = state.snapshot(&alice.code).await.unwrap();
    let alice_score = snapshot.player(&alice.player_id).unwrap().score;
    let bob_score = snapshot.player(&bob.player_id).unwrap().score;
    assert_eq!(alice_score, 14);
    assert_eq!(bob_score, 11);
    assert!(alice_score > bob_score);
}

#[tokio::test]
async fn test_question_sets_are_deterministic() {
    let state = Arc::new(AppState::new());
    let a = create(&state, GameMode::HeadToHead, Category::Basketball, "Alice").await;
    let b = create(&state, GameMode::Group, Category::Basketball, "Bob").await;

    let first = state.snapshot(&a.code).await.unwrap();
    let second = state.snapshot(&b.code).await.unwrap();
    let ids = |s: &SessionSnapshot| s.questions.iter().map(|q| q.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(ids(&first)[..2], ["basketball-1", "basketball-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_sole_player_disconnect_destroys_session() {
    let state = Arc::new(AppState::new());
    let mut alice = create(&state, GameMode::HeadToHead, Category::Tennis, "Alice").await;

    release_connection(&state, &mut alice.ctx).await;
    // Seat is held during the grace window
    assert!(state.get_session(&alice.code).await.is_ok());

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(matches!(
        state.get_session(&alice.code).await,
        Err(SessionError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_zero_grace_destroys_at_once() {
    let config = GameConfig {
        reconnect_grace: Duration::ZERO,
        ..GameConfig::default()
    };
    let state = Arc::new(AppState::with_config(config, QuestionBank::builtin()));
    let mut alice = create(&state, GameMode::Group, Category::Tennis, "Alice").await;

    release_connection(&state, &mut alice.ctx).await;
    assert!(state.snapshot(&alice.code).await.is_err());
    assert_eq!(state.session_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_on_new_connection() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, _) = started_match(&state).await;

    // Alice's socket drops mid-game
    release_connection(&state, &mut alice.ctx).await;
    let detached = next_snapshot(&mut bob, "sessionUpdated").await;
    assert!(!detached.player(&alice.player_id).unwrap().connected);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let mut ctx = ConnectionContext::new();
    let reply = handle_message(
        ClientMessage::ResumeSession {
            session_code: alice.code.to_lowercase(),
            player_token: alice.token.clone(),
        },
        &mut ctx,
        &state,
    )
    .await;

    match reply {
        Some(ServerMessage::SessionResumed { snapshot, player_id }) => {
            assert_eq!(player_id, alice.player_id);
            assert_eq!(snapshot.phase, GamePhase::InProgress);
            assert!(snapshot.player(&player_id).unwrap().connected);
        }
        other => panic!("Expected SessionResumed, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.phase, GamePhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_stale_countdown_cannot_drive_new_countdown() {
    let state = Arc::new(AppState::new());
    let mut alice = create(&state, GameMode::HeadToHead, Category::Olympics, "Alice").await;
    let mut bob = join(&state, &alice.code, "Bob").await;
    ready(&state, &mut alice).await;
    ready(&state, &mut bob).await;
    assert_eq!(
        state.snapshot(&alice.code).await.unwrap().phase,
        GamePhase::Countdown
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    let code = bob.code.clone();
    send(&state, &mut bob, ClientMessage::LeaveSession { session_code: code }).await;

    let rolled_back = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(rolled_back.phase, GamePhase::Lobby);
    assert!(rolled_back.players.iter().all(|p| !p.is_ready));

    let mut carol = join(&state, &alice.code, "Carol").await;
    ready(&state, &mut alice).await;
    ready(&state, &mut carol).await;

    // The first countdown's tick (t=1.0s) must not touch the new one
    tokio::time::sleep(Duration::from_millis(700)).await;
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(snapshot.phase, GamePhase::Countdown);
    assert_eq!(snapshot.countdown_ticks, Some(3));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(snapshot.countdown_ticks, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_group_asynchronous_finish_and_host_promotion() {
    let config = GameConfig {
        questions_per_session: 2,
        ..GameConfig::default()
    };
    let state = Arc::new(AppState::with_config(config, QuestionBank::builtin()));

    let mut alice = create(&state, GameMode::Group, Category::Mixed, "Alice").await;
    let mut bob = join(&state, &alice.code, "Bob").await;
    let mut carol = join(&state, &alice.code, "Carol").await;

    // Host leaves the lobby: Bob takes over
    let code = alice.code.clone();
    send(&state, &mut alice, ClientMessage::LeaveSession { session_code: code.clone() }).await;
    let snapshot = state.snapshot(&code).await.unwrap();
    assert!(snapshot.player(&bob.player_id).unwrap().is_host);

    // Only the new host may change the category
    let reply = send(
        &state,
        &mut carol,
        ClientMessage::UpdateCategory {
            session_code: code.clone(),
            category: Category::Tennis,
        },
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Error { code, .. }) if code == "UNAUTHORIZED"));
    let reply = send(
        &state,
        &mut bob,
        ClientMessage::UpdateCategory {
            session_code: code.clone(),
            category: Category::Tennis,
        },
    )
    .await;
    assert!(reply.is_none());
    let updated = next_snapshot(&mut carol, "categoryUpdated").await;
    assert_eq!(updated.category, Category::Tennis);

    ready(&state, &mut bob).await;
    ready(&state, &mut carol).await;
    let mut current = next_snapshot(&mut bob, "sessionStarted").await;

    for index in 0..2 {
        let correct = correct_answer(&current);
        answer(&state, &mut bob, Some(&correct), 10.0, index).await;
        answer(&state, &mut carol, None, 0.0, index).await;
        if index == 0 {
            current = next_snapshot(&mut bob, "nextQuestion").await;
        }
    }

    // Final question answered: still in progress until everyone reports finished
    let snapshot = state.snapshot(&code).await.unwrap();
    assert_eq!(snapshot.phase, GamePhase::InProgress);
    assert!(snapshot.answered_this_round.is_empty());

    let finished = |client: &Client| ClientMessage::PlayerFinished {
        session_code: client.code.clone(),
        player_id: client.player_id.clone(),
    };
    let msg = finished(&bob);
    send(&state, &mut bob, msg).await;
    let event = next_matching(&mut carol, |m| matches!(m, ServerMessage::PlayerFinished { .. })).await;
    assert!(matches!(event, ServerMessage::PlayerFinished { player_id } if player_id == bob.player_id));
    assert_eq!(state.snapshot(&code).await.unwrap().phase, GamePhase::InProgress);

    let msg = finished(&carol);
    send(&state, &mut carol, msg).await;
    let over = next_snapshot(&mut bob, "sessionOver").await;
    assert_eq!(over.phase, GamePhase::GameOver);
    assert_eq!(over.finished_players.len(), 2);
    assert_eq!(over.player(&bob.player_id).unwrap().score, 26);
    assert_eq!(over.player(&carol.player_id).unwrap().score, 0);

    // Rematch is head-to-head only
    let msg = ClientMessage::RequestRematch {
        session_code: code.clone(),
        player_id: bob.player_id.clone(),
    };
    let reply = send(&state, &mut bob, msg).await;
    assert!(matches!(reply, Some(ServerMessage::Error { code, .. }) if code == "REMATCH_UNAVAILABLE"));
}

#[tokio::test(start_paused = true)]
async fn test_join_rules() {
    let state = Arc::new(AppState::new());
    let (alice, _bob, _) = started_match(&state).await;

    let mut ctx = ConnectionContext::new();
    let reply = handle_message(
        ClientMessage::JoinSession {
            session_code: alice.code.clone(),
            display_name: "Carol".to_string(),
        },
        &mut ctx,
        &state,
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Error { code, .. }) if code == "INVALID_PHASE"));

    let reply = handle_message(
        ClientMessage::JoinSession {
            session_code: "NOPE99".to_string(),
            display_name: "Carol".to_string(),
        },
        &mut ctx,
        &state,
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Error { code, .. }) if code == "SESSION_NOT_FOUND"));
}

#[tokio::test(start_paused = true)]
async fn test_chat_reaches_room() {
    let state = Arc::new(AppState::new());
    let mut alice = create(&state, GameMode::HeadToHead, Category::Football, "Alice").await;
    let mut bob = join(&state, &alice.code, "Bob").await;

    let code = alice.code.clone();
    let reply = send(
        &state,
        &mut alice,
        ClientMessage::SendChatMessage {
            session_code: code,
            text: "Good luck!".to_string(),
        },
    )
    .await;
    assert!(reply.is_none());

    match next_matching(&mut bob, |m| matches!(m, ServerMessage::NewChatMessage { .. })).await {
        ServerMessage::NewChatMessage { message } => {
            assert_eq!(message.player_name, "Alice");
            assert_eq!(message.message, "Good luck!");
        }
        other => panic!("Expected NewChatMessage, got {:?}", other),
    }
}

/// The client mirror follows the room and drops its prediction on advance
#[tokio::test(start_paused = true)]
async fn test_client_projection_follows_room() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, started) = started_match(&state).await;

    let mut projection = ClientProjection::for_player(alice.player_id.clone());
    assert!(projection.apply_snapshot(started.clone()));

    let msg = projection
        .submit_answer(Some(correct_answer(&started)), 12.0, 3.0)
        .expect("answer should be accepted locally");
    assert!(projection.is_transitioning());
    assert!(send(&state, &mut alice, msg).await.is_none());

    let wrong = wrong_answer(&started);
    answer(&state, &mut bob, Some(&wrong), 8.0, 0).await;

    loop {
        let msg = next_matching(&mut alice, |_| true).await;
        projection.apply(&msg);
        if matches!(msg, ServerMessage::NextQuestion { .. }) {
            break;
        }
    }

    assert_eq!(projection.snapshot().unwrap().progression_index, 1);
    assert_eq!(projection.pending_index(), None);
    assert!(!projection.is_transitioning());
    assert!(!projection.has_answered());
    assert_eq!(projection.current_player().unwrap().score, 14);
    assert_eq!(projection.response_times(), &[3.0]);

    // An old snapshot arriving late changes nothing
    assert!(!projection.apply_snapshot(started));
    assert_eq!(projection.snapshot().unwrap().progression_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dead_socket_noticed_after_resume_keeps_player() {
    let state = Arc::new(AppState::new());
    let (mut alice, mut bob, _) = started_match(&state).await;

    // Alice reconnects on a fresh socket while the old one still looks open
    let mut fresh = ConnectionContext::new();
    let reply = handle_message(
        ClientMessage::ResumeSession {
            session_code: alice.code.clone(),
            player_token: alice.token.clone(),
        },
        &mut fresh,
        &state,
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::SessionResumed { .. })));

    // Only now does the server notice the old socket is gone
    release_connection(&state, &mut alice.ctx).await;
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert!(snapshot.player(&alice.player_id).unwrap().connected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = state.snapshot(&alice.code).await.unwrap();
    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.phase, GamePhase::InProgress);
    assert_eq!(fresh.membership.as_ref().unwrap().player_id, alice.player_id);

    // Bob never saw Alice marked as detached
    while let Ok(msg) = bob.ctx.room_rx.as_mut().unwrap().try_recv() {
        if let Some(snapshot) = msg.snapshot() {
            assert!(snapshot.players.iter().all(|p| p.connected));
        }
    }
}

#[tokio::test]
async fn test_failed_join_keeps_current_seat() {
    let state = Arc::new(AppState::new());
    let alice = create(&state, GameMode::HeadToHead, Category::Football, "Alice").await;
    let mut bob = join(&state, &alice.code, "Bob").await;

    let carol = create(&state, GameMode::HeadToHead, Category::Football, "Carol").await;
    let _dave = join(&state, &carol.code, "Dave").await;

    let reply = send(
        &state,
        &mut bob,
        ClientMessage::JoinSession {
            session_code: carol.code.clone(),
            display_name: "Bob".to_string(),
        },
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "SESSION_FULL"));

    let membership = bob.ctx.membership.clone().expect("Bob should keep his seat");
    assert_eq!(membership.session_code, alice.code);
    assert!(bob.ctx.room_rx.is_some());
    assert_eq!(state.snapshot(&alice.code).await.unwrap().players.len(), 2);
    assert_eq!(state.snapshot(&carol.code).await.unwrap().players.len(), 2);

    let reply = send(
        &state,
        &mut bob,
        ClientMessage::ResumeSession {
            session_code: carol.code.clone(),
            player_token: "forged".to_string(),
        },
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "UNAUTHORIZED"));
    assert_eq!(bob.ctx.membership.as_ref().unwrap().session_code, alice.code);
    assert_eq!(state.snapshot(&alice.code).await.unwrap().players.len(), 2);
}
