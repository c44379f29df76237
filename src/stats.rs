use crate::game::{RoomId, UserId};
use crate::message::SessionSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordKind {
    Correct,
    Wrong,
}

/// Lifetime statistics of one player across games
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub user_id: UserId,
    pub user_name: String,
    pub games_played: u32,
    pub games_won: u32,
    pub total_points: u64,
    pub best_score: u32,
    pub correct_words: u32,
    pub wrong_words: u32,
    pub first_played: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
}

impl PlayerStats {
    pub fn new(user_id: UserId, user_name: &str) -> Self {
        let now = Utc::now();
        PlayerStats {
            user_id,
            user_name: user_name.to_string(),
            games_played: 0,
            games_won: 0,
            total_points: 0,
            best_score: 0,
            correct_words: 0,
            wrong_words: 0,
            first_played: now,
            last_played: now,
        }
    }

    pub fn apply_word(&mut self, user_name: &str, kind: WordKind, points: u32) {
        match kind {
            WordKind::Correct => {
                self.correct_words += 1;
                self.total_points += u64::from(points);
            }
            WordKind::Wrong => self.wrong_words += 1,
        }
        self.touch(user_name);
    }

    pub fn apply_game_end(&mut self, user_name: &str, score: u32, won: bool) {
        self.games_played += 1;
        if won {
            self.games_won += 1;
        }
        self.best_score = self.best_score.max(score);
        self.touch(user_name);
    }

    fn touch(&mut self, user_name: &str) {
        // display names change; keep the latest
        self.user_name = user_name.to_string();
        self.last_played = Utc::now();
    }
}

/// Persistence for player statistics and live game snapshots.
///
/// Implementations log and swallow their own failures; a broken store must
/// never affect a running game.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_word(&self, user_id: UserId, user_name: &str, kind: WordKind, points: u32);

    async fn record_game_end(&self, user_id: UserId, user_name: &str, score: u32, won: bool);

    async fn persist_create(&self, snapshot: &SessionSnapshot);

    async fn persist_update(&self, snapshot: &SessionSnapshot);

    /// Archive the final snapshot and drop the live one
    async fn persist_end(&self, snapshot: &SessionSnapshot);

    /// Players ordered by total points, highest first
    async fn query_top(&self, limit: usize) -> Vec<PlayerStats>;

    async fn query_player(&self, user_id: UserId) -> Option<PlayerStats>;

    /// Finished games of a room, newest first
    async fn query_history(&self, room_id: RoomId, limit: usize) -> Vec<SessionSnapshot>;
}

/// In-process sink, used when Redis is disabled and in tests
#[derive(Default)]
pub struct MemoryStatsSink {
    players: DashMap<UserId, PlayerStats>,
    live: DashMap<RoomId, SessionSnapshot>,
    history: DashMap<RoomId, Vec<SessionSnapshot>>,
}

impl MemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_game(&self, room_id: RoomId) -> Option<SessionSnapshot> {
        self.live.get(&room_id).map(|s| s.value().clone())
    }

    pub fn history(&self, room_id: RoomId) -> Vec<SessionSnapshot> {
        self.history
            .get(&room_id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatsSink for MemoryStatsSink {
    async fn record_word(&self, user_id: UserId, user_name: &str, kind: WordKind, points: u32) {
        self.players
            .entry(user_id)
            .or_insert_with(|| PlayerStats::new(user_id, user_name))
            .apply_word(user_name, kind, points);
    }

    async fn record_game_end(&self, user_id: UserId, user_name: &str, score: u32, won: bool) {
        self.players
            .entry(user_id)
            .or_insert_with(|| PlayerStats::new(user_id, user_name))
            .apply_game_end(user_name, score, won);
    }

    async fn persist_create(&self, snapshot: &SessionSnapshot) {
        self.live.insert(snapshot.room_id, snapshot.clone());
    }

    async fn persist_update(&self, snapshot: &SessionSnapshot) {
        self.live.insert(snapshot.room_id, snapshot.clone());
    }

    async fn persist_end(&self, snapshot: &SessionSnapshot) {
        self.live.remove(&snapshot.room_id);
        self.history
            .entry(snapshot.room_id)
            .or_default()
            .push(snapshot.clone());
    }

    async fn query_top(&self, limit: usize) -> Vec<PlayerStats> {
        let mut all: Vec<PlayerStats> = self.players.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then(a.user_id.cmp(&b.user_id))
        });
        all.truncate(limit);
        all
    }

    async fn query_player(&self, user_id: UserId) -> Option<PlayerStats> {
        self.players.get(&user_id).map(|p| p.value().clone())
    }

    async fn query_history(&self, room_id: RoomId, limit: usize) -> Vec<SessionSnapshot> {
        self.history
            .get(&room_id)
            .map(|h| h.value().iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

/// A queued sink call
#[derive(Debug)]
pub enum StatsCommand {
    Word {
        user_id: UserId,
        user_name: String,
        kind: WordKind,
        points: u32,
    },
    GameEnd {
        user_id: UserId,
        user_name: String,
        score: u32,
        won: bool,
    },
    Create(SessionSnapshot),
    Update(SessionSnapshot),
    End(SessionSnapshot),
    /// Answered once every command queued before it has run
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front of a `StatsSink`.
///
/// Commands run one at a time, in submission order, on a background task.
#[derive(Clone)]
pub struct StatsDispatcher {
    tx: mpsc::UnboundedSender<StatsCommand>,
    sink: Arc<dyn StatsSink>,
}

impl StatsDispatcher {
    /// Start the worker; must be called inside a tokio runtime
    pub fn spawn(sink: Arc<dyn StatsSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(sink.clone(), rx));
        StatsDispatcher { tx, sink }
    }

    pub fn send(&self, command: StatsCommand) {
        if self.tx.send(command).is_err() {
            warn!("stats worker stopped, dropping command");
        }
    }

    pub fn record_word(&self, user_id: UserId, user_name: &str, kind: WordKind, points: u32) {
        self.send(StatsCommand::Word {
            user_id,
            user_name: user_name.to_string(),
            kind,
            points,
        });
    }

    pub fn record_game_end(&self, user_id: UserId, user_name: &str, score: u32, won: bool) {
        self.send(StatsCommand::GameEnd {
            user_id,
            user_name: user_name.to_string(),
            score,
            won,
        });
    }

    /// Wait until everything queued so far has reached the sink
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StatsCommand::Flush(done_tx));
        let _ = done_rx.await;
    }

    pub fn sink(&self) -> &Arc<dyn StatsSink> {
        &self.sink
    }
}

async fn run_worker(sink: Arc<dyn StatsSink>, mut rx: mpsc::UnboundedReceiver<StatsCommand>) {
    while let Some(command) = rx.recv().await {
        if let StatsCommand::Flush(done) = command {
            let _ = done.send(());
            continue;
        }

        if AssertUnwindSafe(apply(sink.as_ref(), command))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("stats sink panicked, command dropped");
        }
    }
    debug!("stats worker exiting");
}

async fn apply(sink: &dyn StatsSink, command: StatsCommand) {
    match command {
        StatsCommand::Word {
            user_id,
            user_name,
            kind,
            points,
        } => sink.record_word(user_id, &user_name, kind, points).await,
        StatsCommand::GameEnd {
            user_id,
            user_name,
            score,
            won,
        } => sink.record_game_end(user_id, &user_name, score, won).await,
        StatsCommand::Create(snapshot) => sink.persist_create(&snapshot).await,
        StatsCommand::Update(snapshot) => sink.persist_update(&snapshot).await,
        StatsCommand::End(snapshot) => sink.persist_end(&snapshot).await,
        StatsCommand::Flush(done) => {
            let _ = done.send(());
        }
    }
}
