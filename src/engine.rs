use crate::config::GameConfig;
use crate::dictionary::Dictionary;
use crate::game::{GameError, Player, Removal, RoomId, Session, SessionStatus, UserId};
use crate::message::{Elimination, EliminationReason, Outcome, RoomEvent, SessionSnapshot, WinReason};
use crate::registry::{Room, RoomHandle, SessionRegistry};
use crate::scheduler::{TimerKind, TimerStatus, TimerTicket};
use crate::stats::{PlayerStats, StatsCommand, StatsDispatcher, StatsSink, WordKind};
use crate::validator::{ValidWord, Validation, WordValidator};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

struct EngineInner {
    config: GameConfig,
    registry: SessionRegistry,
    validator: WordValidator,
    stats: StatsDispatcher,
    events: broadcast::Sender<RoomEvent>,
}

/// Runs every room's game: commands, timers and stats forwarding.
///
/// Cheap to clone. Each room is mutated only under its own lock, so
/// operations on one room run strictly one after another while different
/// rooms proceed independently. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct GameEngine {
    inner: Arc<EngineInner>,
}

impl GameEngine {
    pub fn new(config: GameConfig, dictionary: Arc<Dictionary>, sink: Arc<dyn StatsSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        GameEngine {
            inner: Arc::new(EngineInner {
                config,
                registry: SessionRegistry::new(),
                validator: WordValidator::new(dictionary),
                stats: StatsDispatcher::spawn(sink),
                events,
            }),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    pub fn validator(&self) -> &WordValidator {
        &self.inner.validator
    }

    /// Every outcome from now on, for all rooms, including timer-driven ones
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.inner.events.subscribe()
    }

    pub fn active_rooms(&self) -> Vec<RoomId> {
        self.inner.registry.room_ids()
    }

    /// Open a join window in `room_id` with the caller as first player
    pub async fn start(
        &self,
        room_id: RoomId,
        user_id: UserId,
        user_name: &str,
    ) -> Result<SessionSnapshot, GameError> {
        let session = Session::new(room_id, user_id, user_name, self.inner.config.clone());
        let (_handle, mut room) = self.inner.registry.create(room_id, session).await?;

        self.arm_join_timer(&mut room);
        let snapshot = room.session.snapshot();
        info!(
            "game {} started in room {} by {}",
            snapshot.game_id, room_id, user_name
        );

        self.inner.stats.send(StatsCommand::Create(snapshot.clone()));
        self.publish(
            room_id,
            &Outcome::Started {
                snapshot: snapshot.clone(),
            },
        );
        Ok(snapshot)
    }

    pub async fn join(
        &self,
        room_id: RoomId,
        user_id: UserId,
        user_name: &str,
    ) -> Result<Outcome, GameError> {
        let (_handle, mut room) = self.lock_live(room_id).await?;
        let player = room.session.add_player(user_id, user_name)?.clone();
        let snapshot = room.session.snapshot();
        debug!("{} joined room {}", user_name, room_id);

        self.inner.stats.send(StatsCommand::Update(snapshot.clone()));
        let outcome = Outcome::Joined { player, snapshot };
        self.publish(room_id, &outcome);
        Ok(outcome)
    }

    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> Result<Outcome, GameError> {
        let (handle, mut room) = self.lock_live(room_id).await?;
        let departure = room.session.remove_player(user_id)?;
        debug!("{} left room {}", departure.player.name, room_id);

        let outcome = if room.session.below_minimum() {
            info!("room {} dropped below the minimum player count", room_id);
            let remaining = room.session.players().to_vec();
            self.finalize(&handle, &mut room);
            Outcome::CancelledInsufficientPlayers { remaining }
        } else {
            if departure.held_turn {
                self.arm_turn_timer(&mut room);
            }
            let snapshot = room.session.snapshot();
            self.inner.stats.send(StatsCommand::Update(snapshot.clone()));
            Outcome::Left {
                player: departure.player,
                next_player: room.session.current_player().cloned(),
                snapshot,
            }
        };

        self.publish(room_id, &outcome);
        Ok(outcome)
    }

    /// Play a word. Input from anyone but the player holding the turn is
    /// ignored with `NotYourTurn`.
    pub async fn submit_word(
        &self,
        room_id: RoomId,
        user_id: UserId,
        user_name: &str,
        raw_word: &str,
    ) -> Outcome {
        let Some(handle) = self.inner.registry.get(room_id) else {
            return Outcome::NotYourTurn;
        };
        let mut room = handle.lock().await;
        if !room.session.is_current(user_id) {
            debug!("ignoring word from {} in room {}", user_id, room_id);
            return Outcome::NotYourTurn;
        }

        let validation = self.inner.validator.validate(
            raw_word,
            room.session.next_letter(),
            room.session.used_words(),
        );

        let outcome = match validation {
            Validation::Invalid(reason) => {
                debug!("rejected {:?} in room {}: {}", raw_word, room_id, reason);
                self.inner
                    .stats
                    .record_word(user_id, user_name, WordKind::Wrong, 0);
                self.eliminate_current(&handle, &mut room, EliminationReason::InvalidWord { reason })
            }
            Validation::Valid(word) => self.accept_word(&handle, &mut room, user_name, word),
        };

        match outcome {
            Some(outcome) => {
                self.publish(room_id, &outcome);
                outcome
            }
            None => Outcome::NotYourTurn,
        }
    }

    /// Stop the game in `room_id` now, whatever state it is in
    pub async fn end_game(&self, room_id: RoomId) -> Result<Outcome, GameError> {
        let (handle, mut room) = self.lock_live(room_id).await?;
        let snapshot = self.finalize(&handle, &mut room);
        let outcome = Outcome::Ended { snapshot };
        self.publish(room_id, &outcome);
        Ok(outcome)
    }

    pub async fn get_info(&self, room_id: RoomId) -> Option<SessionSnapshot> {
        let handle = self.inner.registry.get(room_id)?;
        let room = handle.lock().await;
        if room.session.is_terminal() {
            return None;
        }
        Some(room.session.snapshot())
    }

    /// Outstanding timers of the live session in `room_id`
    pub async fn armed_timers(&self, room_id: RoomId) -> Option<TimerStatus> {
        let handle = self.inner.registry.get(room_id)?;
        let room = handle.lock().await;
        if room.session.is_terminal() {
            return None;
        }
        Some(room.timers.status())
    }

    pub async fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        self.inner.stats.sink().query_top(limit).await
    }

    pub async fn player_stats(&self, user_id: UserId) -> Option<PlayerStats> {
        self.inner.stats.sink().query_player(user_id).await
    }

    /// Finished games played in `room_id`, newest first
    pub async fn room_history(&self, room_id: RoomId, limit: usize) -> Vec<SessionSnapshot> {
        self.inner.stats.sink().query_history(room_id, limit).await
    }

    /// Wait until every stats call issued so far has reached the sink
    pub async fn flush_stats(&self) {
        self.inner.stats.flush().await;
    }

    fn room(&self, room_id: RoomId) -> Result<RoomHandle, GameError> {
        self.inner.registry.get(room_id).ok_or(GameError::NoSession)
    }

    /// Lock the live session of `room_id`. A session that ended while we
    /// waited may already have a successor, so the lookup is retried once.
    async fn lock_live(
        &self,
        room_id: RoomId,
    ) -> Result<(RoomHandle, OwnedMutexGuard<Room>), GameError> {
        for _ in 0..2 {
            let handle = self.room(room_id)?;
            let room = handle.clone().lock_owned().await;
            if !room.session.is_terminal() {
                return Ok((handle, room));
            }
        }
        Err(GameError::NoSession)
    }

    fn publish(&self, room_id: RoomId, outcome: &Outcome) {
        // no subscribers is fine
        let _ = self.inner.events.send(RoomEvent {
            room_id,
            outcome: outcome.clone(),
        });
    }

    fn accept_word(
        &self,
        handle: &RoomHandle,
        room: &mut Room,
        user_name: &str,
        word: ValidWord,
    ) -> Option<Outcome> {
        let played_round = room.session.round();
        let accepted = room.session.accept_word(&word)?;
        self.inner.stats.record_word(
            accepted.player.id,
            user_name,
            WordKind::Correct,
            accepted.points,
        );

        if let Some((winner, reason)) = room.session.winner() {
            info!(
                "{} won in room {} ({:?}) with {} points",
                winner.name,
                room.session.room_id(),
                reason,
                winner.score
            );
            for player in room.session.players() {
                self.inner.stats.record_game_end(
                    player.id,
                    &player.name,
                    player.score,
                    player.id == winner.id,
                );
            }
            let final_state = self.finalize(handle, room);
            return Some(Outcome::Won {
                winner,
                reason,
                scores: final_state.players,
                eliminated: None,
            });
        }

        room.session.advance_turn();
        self.arm_turn_timer(room);
        let snapshot = room.session.snapshot();
        self.inner.stats.send(StatsCommand::Update(snapshot));

        let next_player = room.session.current_player().cloned()?;
        Some(Outcome::Correct {
            next_letter: room.session.next_letter(),
            player: accepted.player,
            word: word.word,
            points: accepted.points,
            streak: accepted.streak,
            next_player,
            round: played_round,
        })
    }

    /// Knock out the player holding the turn and settle what that leaves
    fn eliminate_current(
        &self,
        handle: &RoomHandle,
        room: &mut Room,
        reason: EliminationReason,
    ) -> Option<Outcome> {
        let removal = room.session.eliminate_current()?;
        let room_id = room.session.room_id();

        let outcome = match removal {
            Removal::Continue { eliminated, next } => {
                info!("{} eliminated in room {} ({:?})", eliminated.name, room_id, reason);
                self.record_loss(&eliminated);
                self.arm_turn_timer(room);
                self.inner
                    .stats
                    .send(StatsCommand::Update(room.session.snapshot()));
                Outcome::Eliminated {
                    elimination: Elimination {
                        player: eliminated,
                        reason,
                    },
                    next_player: next,
                    remaining: room.session.players().len(),
                }
            }
            Removal::LastStanding { eliminated, winner } => {
                info!("{} is the last one standing in room {}", winner.name, room_id);
                self.record_loss(&eliminated);
                self.inner
                    .stats
                    .record_game_end(winner.id, &winner.name, winner.score, true);
                let final_state = self.finalize(handle, room);
                Outcome::Won {
                    winner,
                    reason: WinReason::LastStanding,
                    scores: final_state.players,
                    eliminated: Some(Elimination {
                        player: eliminated,
                        reason,
                    }),
                }
            }
            Removal::Empty { eliminated } => {
                info!("room {} has no players left", room_id);
                self.record_loss(&eliminated);
                self.finalize(handle, room);
                Outcome::NoWinner {
                    elimination: Elimination {
                        player: eliminated,
                        reason,
                    },
                }
            }
        };
        Some(outcome)
    }

    fn record_loss(&self, player: &Player) {
        self.inner
            .stats
            .record_game_end(player.id, &player.name, player.score, false);
    }

    /// Tear the session down: timers first, then the registry entry, so no
    /// timer can fire against a reused room id.
    fn finalize(&self, handle: &RoomHandle, room: &mut Room) -> SessionSnapshot {
        room.timers.cancel_all();
        room.session.finish();
        let room_id = room.session.room_id();
        self.inner.registry.remove(room_id, handle);

        let snapshot = room.session.snapshot();
        debug!("game {} in room {} finalized", snapshot.game_id, room_id);
        self.inner.stats.send(StatsCommand::End(snapshot.clone()));
        snapshot
    }

    fn arm_join_timer(&self, room: &mut Room) {
        let delay = room.session.limits().join_time();
        self.arm(room, TimerKind::Join, delay);
    }

    fn arm_turn_timer(&self, room: &mut Room) {
        let delay = room.session.limits().turn_time();
        self.arm(room, TimerKind::Turn, delay);
    }

    fn arm(&self, room: &mut Room, kind: TimerKind, delay: std::time::Duration) {
        let engine = self.clone();
        let room_id = room.session.room_id();
        let game_id = room.session.game_id();
        room.timers.arm(kind, delay, move |ticket| {
            engine.on_timer(room_id, game_id, ticket)
        });
    }

    fn on_timer(self, room_id: RoomId, game_id: Uuid, ticket: TimerTicket) -> BoxFuture<'static, ()> {
        async move {
            let Some(handle) = self.inner.registry.get(room_id) else {
                debug!("{:?} timer fired for closed room {}", ticket.kind, room_id);
                return;
            };
            let mut room = handle.lock().await;
            if room.session.game_id() != game_id || !room.timers.claim(ticket) {
                debug!("stale {:?} timer in room {}", ticket.kind, room_id);
                return;
            }

            let outcome = match ticket.kind {
                TimerKind::Join => self.close_join_window(&handle, &mut room),
                TimerKind::Turn => self.turn_timed_out(&handle, &mut room),
            };
            if let Some(outcome) = outcome {
                self.publish(room_id, &outcome);
            }
        }
        .boxed()
    }

    fn close_join_window(&self, handle: &RoomHandle, room: &mut Room) -> Option<Outcome> {
        if room.session.status() != SessionStatus::Joining {
            return None;
        }

        if room.session.begin() {
            info!(
                "room {} game begins with {} players",
                room.session.room_id(),
                room.session.players().len()
            );
            self.arm_turn_timer(room);
            let snapshot = room.session.snapshot();
            self.inner.stats.send(StatsCommand::Update(snapshot.clone()));
            Some(Outcome::GameStarted { snapshot })
        } else {
            info!("room {} cancelled, not enough players joined", room.session.room_id());
            let remaining = room.session.players().to_vec();
            self.finalize(handle, room);
            Some(Outcome::CancelledInsufficientPlayers { remaining })
        }
    }

    fn turn_timed_out(&self, handle: &RoomHandle, room: &mut Room) -> Option<Outcome> {
        if room.session.status() != SessionStatus::Active {
            return None;
        }
        self.eliminate_current(handle, room, EliminationReason::Timeout)
    }
}
