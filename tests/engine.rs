use antakshari::message::{Elimination, EliminationReason, WinReason};
use antakshari::validator::InvalidReason;
use antakshari::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn dictionary() -> Arc<Dictionary> {
    Arc::new(Dictionary::from_parts(
        [
            "india",
            "agra",
            "amsterdam",
            "madrid",
            "delhi",
            "kyrgyzstan",
            "nairobi",
            "islamabad",
            "mumbai",
            "yerevan",
            "nottingham",
        ],
        ["kyrgyzstan"],
        [("mumbai", "bombay")],
    ))
}

fn engine_with(config: GameConfig) -> (GameEngine, Arc<MemoryStatsSink>) {
    let sink = Arc::new(MemoryStatsSink::new());
    let engine = GameEngine::new(config, dictionary(), sink.clone());
    (engine, sink)
}

fn engine() -> (GameEngine, Arc<MemoryStatsSink>) {
    engine_with(GameConfig::default())
}

async fn next_event(rx: &mut broadcast::Receiver<RoomEvent>, room_id: RoomId) -> Outcome {
    loop {
        let event = rx.recv().await.expect("event channel closed");
        if event.room_id == room_id {
            return event.outcome;
        }
    }
}

/// Start a game with players 1..=n and wait for the join window to close
async fn active_game(
    engine: &GameEngine,
    rx: &mut broadcast::Receiver<RoomEvent>,
    room_id: RoomId,
    names: &[&str],
) {
    engine.start(room_id, 1, names[0]).await.unwrap();
    for (i, name) in names.iter().enumerate().skip(1) {
        engine.join(room_id, i as UserId + 1, name).await.unwrap();
    }
    loop {
        if let Outcome::GameStarted { .. } = next_event(rx, room_id).await {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_word_leaves_last_player_standing() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 1, &["asha", "bala"]).await;

    let snapshot = engine.get_info(1).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.round, 1);
    assert_eq!(snapshot.current_player.unwrap().id, 1);

    match engine.submit_word(1, 1, "asha", "India").await {
        Outcome::Correct {
            points,
            streak,
            next_letter,
            next_player,
            ..
        } => {
            assert_eq!((points, streak), (10, 1));
            assert_eq!(next_letter, Some('a'));
            assert_eq!(next_player.id, 2);
        }
        other => panic!("unexpected {:?}", other),
    }

    match engine.submit_word(1, 2, "bala", " Agra").await {
        Outcome::Correct { next_player, .. } => assert_eq!(next_player.id, 1),
        other => panic!("unexpected {:?}", other),
    }

    match engine.submit_word(1, 1, "asha", "agra").await {
        Outcome::Won {
            winner,
            reason,
            eliminated,
            scores,
        } => {
            assert_eq!(winner.id, 2);
            assert_eq!(reason, WinReason::LastStanding);
            let Elimination { player, reason } = eliminated.unwrap();
            assert_eq!(player.id, 1);
            assert_eq!(
                reason,
                EliminationReason::InvalidWord {
                    reason: InvalidReason::AlreadyUsed
                }
            );
            assert_eq!(scores.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(engine.get_info(1).await.is_none());
    assert!(engine.armed_timers(1).await.is_none());
    assert!(engine.active_rooms().is_empty());

    engine.flush_stats().await;
    let asha = sink.query_player(1).await.unwrap();
    assert_eq!((asha.correct_words, asha.wrong_words), (1, 1));
    assert_eq!((asha.games_played, asha.games_won), (1, 0));
    let bala = sink.query_player(2).await.unwrap();
    assert_eq!((bala.games_played, bala.games_won), (1, 1));
    assert_eq!(bala.best_score, 10);
    assert!(sink.live_game(1).is_none());
    assert_eq!(sink.history(1).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lone_player_is_cancelled_when_join_window_closes() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();

    let snapshot = engine.start(2, 1, "asha").await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Joining);
    assert_eq!(snapshot.players.len(), 1);
    assert!(matches!(next_event(&mut rx, 2).await, Outcome::Started { .. }));

    match next_event(&mut rx, 2).await {
        Outcome::CancelledInsufficientPlayers { remaining } => {
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].id, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.get_info(2).await.is_none());

    engine.flush_stats().await;
    assert_eq!(sink.history(2).len(), 1);

    // the room is free again
    assert!(engine.start(2, 1, "asha").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn timeout_eliminates_current_player_and_rearms_once() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 3, &["asha", "bala", "chitra"]).await;

    engine.submit_word(3, 1, "asha", "india").await;
    engine.submit_word(3, 2, "bala", "agra").await;
    let before = engine.armed_timers(3).await.unwrap();
    assert!(before.turn_armed);
    assert!(!before.join_armed);

    match next_event(&mut rx, 3).await {
        Outcome::Correct { .. } => {}
        other => panic!("unexpected {:?}", other),
    }
    match next_event(&mut rx, 3).await {
        Outcome::Correct { .. } => {}
        other => panic!("unexpected {:?}", other),
    }

    match next_event(&mut rx, 3).await {
        Outcome::Eliminated {
            elimination,
            next_player,
            remaining,
        } => {
            assert_eq!(elimination.player.id, 3);
            assert_eq!(elimination.reason, EliminationReason::Timeout);
            assert_eq!(next_player.id, 1);
            assert_eq!(remaining, 2);
        }
        other => panic!("unexpected {:?}", other),
    }

    let snapshot = engine.get_info(3).await.unwrap();
    let ids: Vec<UserId> = snapshot.players.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(snapshot.current_turn < 2);

    let after = engine.armed_timers(3).await.unwrap();
    assert!(after.turn_armed);
    assert_eq!(after.times_armed, before.times_armed + 1);

    engine.flush_stats().await;
    let chitra = sink.query_player(3).await.unwrap();
    assert_eq!((chitra.games_played, chitra.games_won), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn timeout_with_two_players_leaves_last_standing() {
    let (engine, _sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 4, &["asha", "bala"]).await;

    match next_event(&mut rx, 4).await {
        Outcome::Won {
            winner,
            reason,
            eliminated,
            ..
        } => {
            assert_eq!(winner.id, 2);
            assert_eq!(reason, WinReason::LastStanding);
            assert_eq!(eliminated.unwrap().reason, EliminationReason::Timeout);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.get_info(4).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn rare_opener_can_reach_the_win_score() {
    let config = GameConfig {
        win_score: 15,
        ..GameConfig::default()
    };
    let (engine, sink) = engine_with(config);
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 5, &["asha", "bala"]).await;

    match engine.submit_word(5, 1, "asha", "Kyrgyzstan").await {
        Outcome::Won {
            winner,
            reason,
            scores,
            eliminated,
        } => {
            assert_eq!(winner.id, 1);
            assert_eq!(winner.score, 15);
            assert_eq!(reason, WinReason::ScoreThreshold);
            assert_eq!(scores.len(), 2);
            assert!(eliminated.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.armed_timers(5).await.is_none());

    engine.flush_stats().await;
    let asha = sink.query_player(1).await.unwrap();
    assert_eq!((asha.games_won, asha.total_points), (1, 15));
    let bala = sink.query_player(2).await.unwrap();
    assert_eq!((bala.games_played, bala.games_won), (1, 0));

    let top = engine.leaderboard(10).await;
    assert_eq!(top[0].user_id, 1);
}

#[tokio::test(start_paused = true)]
async fn round_limit_ends_the_game_with_the_leader() {
    let config = GameConfig {
        max_rounds: 2,
        ..GameConfig::default()
    };
    let (engine, _sink) = engine_with(config);
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 6, &["asha", "bala"]).await;

    engine.submit_word(6, 1, "asha", "india").await;
    match engine.submit_word(6, 2, "bala", "amsterdam").await {
        Outcome::Won { winner, reason, .. } => {
            // both on 10 points, the earlier player wins the tie
            assert_eq!(winner.id, 1);
            assert_eq!(reason, WinReason::MaxRounds);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn words_from_other_players_are_ignored() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();

    assert_eq!(engine.submit_word(7, 1, "asha", "india").await, Outcome::NotYourTurn);

    engine.start(7, 1, "asha").await.unwrap();
    engine.join(7, 2, "bala").await.unwrap();
    // still in the join window
    assert_eq!(engine.submit_word(7, 1, "asha", "india").await, Outcome::NotYourTurn);

    loop {
        if let Outcome::GameStarted { .. } = next_event(&mut rx, 7).await {
            break;
        }
    }
    assert_eq!(engine.submit_word(7, 2, "bala", "xyz").await, Outcome::NotYourTurn);
    assert_eq!(engine.submit_word(7, 9, "zara", "india").await, Outcome::NotYourTurn);

    let snapshot = engine.get_info(7).await.unwrap();
    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.used_words, 0);
    assert_eq!(snapshot.current_player.unwrap().id, 1);

    engine.flush_stats().await;
    assert!(sink.query_player(2).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn command_errors() {
    let config = GameConfig {
        max_players: 2,
        ..GameConfig::default()
    };
    let (engine, _sink) = engine_with(config);
    let mut rx = engine.subscribe();

    assert_eq!(engine.join(8, 2, "bala").await, Err(GameError::NoSession));
    assert_eq!(engine.leave(8, 2).await, Err(GameError::NoSession));
    assert_eq!(engine.end_game(8).await, Err(GameError::NoSession));

    engine.start(8, 1, "asha").await.unwrap();
    assert_eq!(engine.start(8, 2, "bala").await, Err(GameError::AlreadyActive));
    assert_eq!(engine.join(8, 1, "asha").await, Err(GameError::AlreadyJoined));
    engine.join(8, 2, "bala").await.unwrap();
    assert_eq!(engine.join(8, 3, "chitra").await, Err(GameError::Full));
    assert_eq!(engine.leave(8, 3).await, Err(GameError::NotInGame));

    loop {
        if let Outcome::GameStarted { .. } = next_event(&mut rx, 8).await {
            break;
        }
    }
    assert_eq!(engine.join(8, 3, "chitra").await, Err(GameError::AlreadyStarted));
}

#[tokio::test(start_paused = true)]
async fn ending_a_game_cancels_its_timers() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();

    engine.start(9, 1, "asha").await.unwrap();
    engine.join(9, 2, "bala").await.unwrap();
    match engine.end_game(9).await.unwrap() {
        Outcome::Ended { snapshot } => {
            assert_eq!(snapshot.status, SessionStatus::Terminal);
            assert_eq!(snapshot.players.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(engine.end_game(9).await, Err(GameError::NoSession));

    assert!(matches!(next_event(&mut rx, 9).await, Outcome::Started { .. }));
    assert!(matches!(next_event(&mut rx, 9).await, Outcome::Joined { .. }));
    assert!(matches!(next_event(&mut rx, 9).await, Outcome::Ended { .. }));

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    engine.flush_stats().await;
    assert!(sink.live_game(9).is_none());
    assert_eq!(sink.history(9).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timers_of_an_ended_game_do_not_touch_its_successor() {
    let (engine, _sink) = engine();
    let mut rx = engine.subscribe();

    engine.start(10, 1, "asha").await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    engine.end_game(10).await.unwrap();

    let successor = engine.start(10, 1, "asha").await.unwrap();
    engine.join(10, 2, "bala").await.unwrap();

    // the first join window would have closed here
    tokio::time::sleep(Duration::from_secs(45)).await;
    let snapshot = engine.get_info(10).await.unwrap();
    assert_eq!(snapshot.game_id, successor.game_id);
    assert_eq!(snapshot.status, SessionStatus::Joining);

    loop {
        match next_event(&mut rx, 10).await {
            Outcome::GameStarted { snapshot } => {
                assert_eq!(snapshot.game_id, successor.game_id);
                break;
            }
            Outcome::CancelledInsufficientPlayers { .. } => panic!("stale join timer fired"),
            _ => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn leaving_below_minimum_cancels_the_game() {
    let (engine, _sink) = engine();

    engine.start(11, 1, "asha").await.unwrap();
    engine.join(11, 2, "bala").await.unwrap();

    match engine.leave(11, 2).await.unwrap() {
        Outcome::CancelledInsufficientPlayers { remaining } => {
            assert_eq!(remaining.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.get_info(11).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn leaving_an_active_game_below_minimum_cancels_it() {
    let (engine, sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 14, &["asha", "bala"]).await;
    assert!(engine.armed_timers(14).await.unwrap().turn_armed);

    match engine.leave(14, 2).await.unwrap() {
        Outcome::CancelledInsufficientPlayers { remaining } => {
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].id, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.get_info(14).await.is_none());
    assert!(matches!(
        next_event(&mut rx, 14).await,
        Outcome::CancelledInsufficientPlayers { .. }
    ));

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    engine.flush_stats().await;
    assert!(sink.live_game(14).is_none());
    assert_eq!(sink.history(14).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sole_player_timing_out_ends_without_winner() {
    let config = GameConfig {
        min_players: 1,
        ..GameConfig::default()
    };
    let (engine, sink) = engine_with(config);
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 15, &["asha"]).await;

    match next_event(&mut rx, 15).await {
        Outcome::NoWinner {
            elimination: Elimination { player, reason },
        } => {
            assert_eq!(player.id, 1);
            assert_eq!(reason, EliminationReason::Timeout);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.get_info(15).await.is_none());
    assert!(engine.active_rooms().is_empty());

    engine.flush_stats().await;
    assert!(sink.live_game(15).is_none());
    assert_eq!(sink.history(15).len(), 1);
    let stats = engine.player_stats(1).await.unwrap();
    assert_eq!((stats.games_played, stats.games_won), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn room_history_lists_finished_games_newest_first() {
    let (engine, _sink) = engine();

    let first = engine.start(16, 1, "asha").await.unwrap();
    engine.end_game(16).await.unwrap();
    let second = engine.start(16, 2, "bala").await.unwrap();
    engine.end_game(16).await.unwrap();
    engine.flush_stats().await;

    let history = engine.room_history(16, 5).await;
    let ids: Vec<_> = history.iter().map(|game| game.game_id).collect();
    assert_eq!(ids, vec![second.game_id, first.game_id]);
    assert_eq!(engine.room_history(16, 1).await.len(), 1);
    assert!(engine.room_history(17, 5).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_on_your_turn_rearms_the_timer() {
    let (engine, _sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 12, &["asha", "bala", "chitra"]).await;

    let before = engine.armed_timers(12).await.unwrap();
    match engine.leave(12, 1).await.unwrap() {
        Outcome::Left {
            player,
            next_player,
            snapshot,
        } => {
            assert_eq!(player.id, 1);
            assert_eq!(next_player.unwrap().id, 2);
            assert_eq!(snapshot.players.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    let after = engine.armed_timers(12).await.unwrap();
    assert_eq!(after.times_armed, before.times_armed + 1);

    assert_eq!(engine.join(12, 4, "dev").await, Err(GameError::AlreadyStarted));
    match engine.submit_word(12, 2, "bala", "madrid").await {
        Outcome::Correct { next_player, .. } => assert_eq!(next_player.id, 3),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_admit_one_session() {
    let (engine, _sink) = engine();

    let mut tasks = Vec::new();
    for user_id in 1..=16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.start(13, user_id, "player").await
        }));
    }

    let mut started = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => started += 1,
            Err(e) => assert_eq!(e, GameError::AlreadyActive),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(engine.get_info(13).await.unwrap().players.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn alias_of_a_played_word_is_rejected() {
    let (engine, _sink) = engine();
    let mut rx = engine.subscribe();
    active_game(&engine, &mut rx, 14, &["asha", "bala", "chitra"]).await;

    // "bombay" is only known as the old name of mumbai
    match engine.submit_word(14, 1, "asha", "Bombay").await {
        Outcome::Correct { next_letter, .. } => assert_eq!(next_letter, Some('y')),
        other => panic!("unexpected {:?}", other),
    }
    engine.submit_word(14, 2, "bala", "yerevan").await;
    engine.submit_word(14, 3, "chitra", "nottingham").await;

    match engine.submit_word(14, 1, "asha", "mumbai").await {
        Outcome::Eliminated {
            elimination,
            next_player,
            remaining,
        } => {
            assert_eq!(elimination.player.id, 1);
            assert_eq!(
                elimination.reason,
                EliminationReason::InvalidWord {
                    reason: InvalidReason::AlreadyUsed
                }
            );
            assert_eq!(next_player.id, 2);
            assert_eq!(remaining, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}
