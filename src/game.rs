use crate::config::GameConfig;
use crate::message::{SessionSnapshot, WinReason};
use crate::validator::{ValidWord, last_letter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Chat room identifier
pub type RoomId = i64;

/// Chat user identifier
pub type UserId = i64;

/// A player inside one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: UserId,
    pub name: String,
    pub score: u32,
    pub streak: u32,
}

impl Player {
    pub fn new(id: UserId, name: &str) -> Self {
        Player {
            id,
            name: name.to_string(),
            score: 0,
            streak: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Joining,
    Active,
    Terminal,
}

/// Rejected commands. These are usage errors, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameError {
    #[error("a game is already active in this room")]
    AlreadyActive,
    #[error("no active game in this room")]
    NoSession,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("player has already joined")]
    AlreadyJoined,
    #[error("the game is full")]
    Full,
    #[error("player is not in this game")]
    NotInGame,
}

/// Result of scoring an accepted word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub player: Player,
    pub points: u32,
    pub streak: u32,
}

/// What is left of the roster after a player is knocked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Continue { eliminated: Player, next: Player },
    LastStanding { eliminated: Player, winner: Player },
    Empty { eliminated: Player },
}

/// A player who left voluntarily
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Player,
    pub held_turn: bool,
}

/// Per-room game state.
///
/// The roster keeps join order, which is also the turn order. While the
/// session is `Active` the roster is non-empty and `current` indexes into it.
#[derive(Debug, Clone)]
pub struct Session {
    room_id: RoomId,
    game_id: Uuid,
    status: SessionStatus,
    players: Vec<Player>,
    current: usize,
    last_word: Option<String>,
    next_letter: Option<char>,
    used_words: HashSet<String>,
    round: u32,
    limits: GameConfig,
    creator: UserId,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in the join window with its creator as first player
    pub fn new(room_id: RoomId, creator_id: UserId, creator_name: &str, limits: GameConfig) -> Self {
        Session {
            room_id,
            game_id: Uuid::new_v4(),
            status: SessionStatus::Joining,
            players: vec![Player::new(creator_id, creator_name)],
            current: 0,
            last_word: None,
            next_letter: None,
            used_words: HashSet::new(),
            round: 0,
            limits,
            creator: creator_id,
            created_at: Utc::now(),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status == SessionStatus::Terminal
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, user_id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == user_id)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The player holding the turn; only defined while the game runs
    pub fn current_player(&self) -> Option<&Player> {
        match self.status {
            SessionStatus::Active => self.players.get(self.current),
            _ => None,
        }
    }

    pub fn is_current(&self, user_id: UserId) -> bool {
        self.current_player().is_some_and(|p| p.id == user_id)
    }

    pub fn next_letter(&self) -> Option<char> {
        self.next_letter
    }

    pub fn last_word(&self) -> Option<&str> {
        self.last_word.as_deref()
    }

    pub fn used_words(&self) -> &HashSet<String> {
        &self.used_words
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn limits(&self) -> &GameConfig {
        &self.limits
    }

    pub fn creator(&self) -> UserId {
        self.creator
    }

    pub fn below_minimum(&self) -> bool {
        self.players.len() < self.limits.min_players
    }

    /// Add a player during the join window
    pub fn add_player(&mut self, user_id: UserId, name: &str) -> Result<&Player, GameError> {
        if self.status != SessionStatus::Joining {
            return Err(GameError::AlreadyStarted);
        }
        if self.player(user_id).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        if self.players.len() >= self.limits.max_players {
            return Err(GameError::Full);
        }

        self.players.push(Player::new(user_id, name));
        Ok(&self.players[self.players.len() - 1])
    }

    /// Remove a player who left of their own accord
    pub fn remove_player(&mut self, user_id: UserId) -> Result<Departure, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == user_id)
            .ok_or(GameError::NotInGame)?;

        let held_turn = self.status == SessionStatus::Active && index == self.current;
        let player = self.players.remove(index);

        if self.status == SessionStatus::Active {
            if index <= self.current {
                self.current = self.current.saturating_sub(1);
            }
            if self.current >= self.players.len() {
                self.current = 0;
            }
        }

        Ok(Departure { player, held_turn })
    }

    /// Close the join window. Returns false when too few players joined.
    pub fn begin(&mut self) -> bool {
        if self.status != SessionStatus::Joining || self.below_minimum() || self.players.is_empty() {
            return false;
        }
        self.status = SessionStatus::Active;
        self.round = 1;
        self.current = 0;
        true
    }

    /// Score a validated word for the current player and chain from it
    pub fn accept_word(&mut self, word: &ValidWord) -> Option<Accepted> {
        if self.status != SessionStatus::Active {
            return None;
        }

        let base = self.limits.points_per_word;
        let bonus = self.limits.bonus_points;
        let player = self.players.get_mut(self.current)?;

        player.streak += 1;
        let mut points = base;
        if word.rare {
            points += bonus;
        }
        if player.streak > 1 {
            points += player.streak - 1;
        }
        player.score += points;

        let accepted = Accepted {
            player: player.clone(),
            points,
            streak: player.streak,
        };

        self.used_words.insert(word.word.clone());
        if let Some(alias) = &word.alias {
            self.used_words.insert(alias.clone());
        }
        self.last_word = Some(word.word.clone());
        self.next_letter = last_letter(&word.word);

        Some(accepted)
    }

    /// Highest scorer; ties go to the earliest player in turn order
    pub fn leader(&self) -> Option<&Player> {
        self.players.iter().fold(None, |best: Option<&Player>, p| match best {
            Some(b) if b.score >= p.score => Some(b),
            _ => Some(p),
        })
    }

    /// Winner and reason once the score threshold or round limit is hit
    pub fn winner(&self) -> Option<(Player, WinReason)> {
        let leader = self.leader()?;
        if leader.score >= self.limits.win_score {
            Some((leader.clone(), WinReason::ScoreThreshold))
        } else if self.round >= self.limits.max_rounds {
            Some((leader.clone(), WinReason::MaxRounds))
        } else {
            None
        }
    }

    /// Pass the turn to the next player in roster order
    pub fn advance_turn(&mut self) {
        if self.players.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.players.len();
        self.round += 1;
    }

    /// Knock out the player holding the turn
    pub fn eliminate_current(&mut self) -> Option<Removal> {
        if self.status != SessionStatus::Active || self.current >= self.players.len() {
            return None;
        }
        Some(self.eliminate(self.current))
    }

    fn eliminate(&mut self, index: usize) -> Removal {
        let mut eliminated = self.players.remove(index);
        eliminated.streak = 0;

        if self.players.is_empty() {
            self.current = 0;
            return Removal::Empty { eliminated };
        }

        if index < self.current {
            self.current -= 1;
        } else {
            self.current %= self.players.len();
        }

        if self.players.len() == 1 {
            Removal::LastStanding {
                eliminated,
                winner: self.players[0].clone(),
            }
        } else {
            Removal::Continue {
                eliminated,
                next: self.players[self.current].clone(),
            }
        }
    }

    /// Mark the session over; streaks do not survive the game
    pub fn finish(&mut self) {
        self.status = SessionStatus::Terminal;
        for player in &mut self.players {
            player.streak = 0;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room_id: self.room_id,
            game_id: self.game_id,
            status: self.status,
            players: self.players.clone(),
            current_player: self.current_player().cloned(),
            current_turn: self.current,
            round: self.round,
            last_word: self.last_word.clone(),
            next_letter: self.next_letter,
            used_words: self.used_words.len(),
            created_at: self.created_at,
        }
    }
}
