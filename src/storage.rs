use crate::game::{RoomId, UserId};
use crate::message::SessionSnapshot;
use crate::stats::{PlayerStats, StatsSink, WordKind};
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

const LEADERBOARD_KEY: &str = "leaderboard";

fn player_key(user_id: UserId) -> String {
    format!("player_stats:{}", user_id)
}

fn game_key(room_id: RoomId) -> String {
    format!("game:{}", room_id)
}

fn history_key(room_id: RoomId) -> String {
    format!("game_history:{}", room_id)
}

/// Stats sink backed by Redis.
///
/// Player stats live as JSON under `player_stats:{id}` with a `leaderboard`
/// sorted set on total points; live games under `game:{room}`, finished
/// ones appended to `game_history:{room}`.
#[derive(Clone)]
pub struct RedisStatsSink {
    manager: Arc<Mutex<ConnectionManager>>,
}

impl RedisStatsSink {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).map_err(|e| crate::Error::Storage(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))?;
        info!("connected to redis at {}", redis_url);
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    async fn load_player(
        conn: &mut ConnectionManager,
        user_id: UserId,
    ) -> anyhow::Result<Option<PlayerStats>> {
        let data: Option<String> = conn.get(player_key(user_id)).await?;
        match data {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("malformed player stats")?,
            )),
            None => Ok(None),
        }
    }

    async fn update_player<F>(&self, user_id: UserId, user_name: &str, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut PlayerStats) + Send,
    {
        let mut conn = self.manager.lock().await;
        let mut stats = Self::load_player(&mut conn, user_id)
            .await?
            .unwrap_or_else(|| PlayerStats::new(user_id, user_name));
        apply(&mut stats);

        let data = serde_json::to_string(&stats)?;
        conn.set::<_, _, ()>(player_key(user_id), data).await?;
        conn.zadd::<_, _, _, ()>(LEADERBOARD_KEY, user_id, stats.total_points)
            .await?;
        Ok(())
    }

    async fn save_game(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let data = serde_json::to_string(snapshot)?;
        let mut conn = self.manager.lock().await;
        conn.set::<_, _, ()>(game_key(snapshot.room_id), data).await?;
        Ok(())
    }

    async fn archive_game(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let data = serde_json::to_string(snapshot)?;
        let mut conn = self.manager.lock().await;
        conn.rpush::<_, _, ()>(history_key(snapshot.room_id), data)
            .await?;
        conn.del::<_, ()>(game_key(snapshot.room_id)).await?;
        Ok(())
    }

    async fn top_players(&self, limit: usize) -> anyhow::Result<Vec<PlayerStats>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.lock().await;
        let ids: Vec<UserId> = conn
            .zrevrange(LEADERBOARD_KEY, 0, limit as isize - 1)
            .await?;

        let mut players = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(stats) = Self::load_player(&mut conn, id).await? {
                players.push(stats);
            }
        }
        Ok(players)
    }

    async fn recent_games(&self, room_id: RoomId, limit: usize) -> anyhow::Result<Vec<SessionSnapshot>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.lock().await;
        let history: Vec<String> = conn
            .lrange(history_key(room_id), -(limit as isize), -1)
            .await?;

        let mut games = Vec::with_capacity(history.len());
        for json in history.iter().rev() {
            games.push(serde_json::from_str(json).context("malformed game history")?);
        }
        Ok(games)
    }
}

#[async_trait]
impl StatsSink for RedisStatsSink {
    async fn record_word(&self, user_id: UserId, user_name: &str, kind: WordKind, points: u32) {
        let result = self
            .update_player(user_id, user_name, |stats| {
                stats.apply_word(user_name, kind, points)
            })
            .await;
        if let Err(e) = result {
            error!("failed to record word for {}: {:#}", user_id, e);
        }
    }

    async fn record_game_end(&self, user_id: UserId, user_name: &str, score: u32, won: bool) {
        let result = self
            .update_player(user_id, user_name, |stats| {
                stats.apply_game_end(user_name, score, won)
            })
            .await;
        if let Err(e) = result {
            error!("failed to record game end for {}: {:#}", user_id, e);
        }
    }

    async fn persist_create(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = self.save_game(snapshot).await {
            error!("failed to save game for room {}: {:#}", snapshot.room_id, e);
        }
    }

    async fn persist_update(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = self.save_game(snapshot).await {
            error!("failed to update game for room {}: {:#}", snapshot.room_id, e);
        }
    }

    async fn persist_end(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = self.archive_game(snapshot).await {
            error!("failed to archive game for room {}: {:#}", snapshot.room_id, e);
        }
    }

    async fn query_top(&self, limit: usize) -> Vec<PlayerStats> {
        match self.top_players(limit).await {
            Ok(players) => players,
            Err(e) => {
                error!("failed to load leaderboard: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn query_history(&self, room_id: RoomId, limit: usize) -> Vec<SessionSnapshot> {
        match self.recent_games(room_id, limit).await {
            Ok(games) => games,
            Err(e) => {
                error!("failed to load game history for room {}: {:#}", room_id, e);
                Vec::new()
            }
        }
    }

    async fn query_player(&self, user_id: UserId) -> Option<PlayerStats> {
        let mut conn = self.manager.lock().await;
        match Self::load_player(&mut conn, user_id).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("failed to load stats for {}: {:#}", user_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(player_key(42), "player_stats:42");
        assert_eq!(game_key(-100), "game:-100");
        assert_eq!(history_key(7), "game_history:7");
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = RedisStatsSink::connect("not a redis url").await;
        assert!(matches!(result, Err(crate::Error::Storage(_))));
    }
}
