pub mod config;
pub mod dictionary;
pub mod engine;
pub mod game;
pub mod message;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod stats;
pub mod storage;
pub mod validator;

pub use config::{Config, GameConfig};
pub use dictionary::Dictionary;
pub use engine::GameEngine;
pub use game::{GameError, Player, RoomId, Session, SessionStatus, UserId};
pub use message::{Outcome, RoomEvent, SessionSnapshot};
pub use stats::{MemoryStatsSink, PlayerStats, StatsSink};
pub use storage::RedisStatsSink;
pub use validator::WordValidator;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("game error: {0}")]
    Game(#[from] GameError),
    #[error("dictionary error: {0}")]
    Dictionary(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
