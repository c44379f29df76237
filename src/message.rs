use crate::game::{Player, RoomId, SessionStatus};
use crate::validator::InvalidReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only projection of a session for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub room_id: RoomId,
    pub game_id: Uuid,
    pub status: SessionStatus,
    pub players: Vec<Player>,
    pub current_player: Option<Player>,
    pub current_turn: usize,
    pub round: u32,
    pub last_word: Option<String>,
    pub next_letter: Option<char>,
    pub used_words: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EliminationReason {
    InvalidWord { reason: InvalidReason },
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    pub player: Player,
    pub reason: EliminationReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    ScoreThreshold,
    MaxRounds,
    LastStanding,
}

/// Structured result of an engine operation or timer.
/// Rendering it for people is the outer layer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Started {
        snapshot: SessionSnapshot,
    },
    Joined {
        player: Player,
        snapshot: SessionSnapshot,
    },
    Left {
        player: Player,
        next_player: Option<Player>,
        snapshot: SessionSnapshot,
    },
    GameStarted {
        snapshot: SessionSnapshot,
    },
    Correct {
        player: Player,
        word: String,
        points: u32,
        streak: u32,
        next_letter: Option<char>,
        next_player: Player,
        round: u32,
    },
    Eliminated {
        elimination: Elimination,
        next_player: Player,
        remaining: usize,
    },
    Won {
        winner: Player,
        reason: WinReason,
        scores: Vec<Player>,
        eliminated: Option<Elimination>,
    },
    NoWinner {
        elimination: Elimination,
    },
    CancelledInsufficientPlayers {
        remaining: Vec<Player>,
    },
    Ended {
        snapshot: SessionSnapshot,
    },
    /// Input from someone other than the current player; nothing happened
    NotYourTurn,
}

impl Outcome {
    /// Whether the session no longer exists after this outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Outcome::Won { .. }
                | Outcome::NoWinner { .. }
                | Outcome::CancelledInsufficientPlayers { .. }
                | Outcome::Ended { .. }
        )
    }
}

/// An outcome tagged with the room it happened in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room_id: RoomId,
    pub outcome: Outcome,
}
