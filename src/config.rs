use anyhow::{Result, bail};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::game::UserId;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub redis: RedisConfig,
    pub log: LogConfig,
    pub dictionary: DictionaryConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Per-session limits and scoring. Times are in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GameConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub join_time: u64,
    pub turn_time: u64,
    pub max_rounds: u32,
    pub win_score: u32,
    pub points_per_word: u32,
    pub bonus_points: u32,
}

#[derive(Debug, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DictionaryConfig {
    pub file_path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    /// Users allowed to end a game; empty means everyone
    #[serde(default)]
    pub user_ids: Vec<UserId>,
}

fn default_true() -> bool {
    true
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            min_players: 2,
            max_players: 20,
            join_time: 60,
            turn_time: 30,
            max_rounds: 50,
            win_score: 100,
            points_per_word: 10,
            bonus_points: 5,
        }
    }
}

impl GameConfig {
    pub fn join_time(&self) -> Duration {
        Duration::from_secs(self.join_time)
    }

    pub fn turn_time(&self) -> Duration {
        Duration::from_secs(self.turn_time)
    }

    /// Reject limits under which no game could ever be played
    pub fn validate(&self) -> Result<()> {
        if self.min_players == 0 {
            bail!("game.min_players must be at least 1");
        }
        if self.max_players < self.min_players {
            bail!(
                "game.max_players ({}) is below game.min_players ({})",
                self.max_players,
                self.min_players
            );
        }
        if self.join_time == 0 || self.turn_time == 0 {
            bail!("game.join_time and game.turn_time must be non-zero");
        }
        if self.max_rounds == 0 || self.win_score == 0 {
            bail!("game.max_rounds and game.win_score must be non-zero");
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config"))
            .add_source(config::Environment::with_prefix("ANTAKSHARI").separator("__"))
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.game.validate()?;
        Ok(config)
    }

    /// Initialize the process-wide configuration
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| anyhow::anyhow!("configuration already initialized"))?;
        Ok(())
    }

    /// Process-wide configuration; `Config::init` must have succeeded first
    pub fn get() -> &'static Config {
        CONFIG
            .get()
            .expect("configuration not initialized, call Config::init() first")
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    pub fn log_filter(&self) -> String {
        format!("antakshari={}", self.log.level)
    }
}

impl AdminConfig {
    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.user_ids.is_empty() || self.user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_game_config_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_player_limits() {
        let config = GameConfig {
            min_players: 5,
            max_players: 3,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_turn_time() {
        let config = GameConfig {
            turn_time: 0,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_admin_list_allows_everyone() {
        let open = AdminConfig::default();
        assert!(open.is_admin(42));

        let restricted = AdminConfig { user_ids: vec![7] };
        assert!(restricted.is_admin(7));
        assert!(!restricted.is_admin(42));
    }
}
