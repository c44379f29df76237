use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Join,
    Turn,
}

/// Identifies one arming of a timer. A fired timer must present its ticket
/// to `RoomTimers::claim` before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub kind: TimerKind,
    pub seq: u64,
}

struct ArmedTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Which timers a room currently has outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerStatus {
    pub join_armed: bool,
    pub turn_armed: bool,
    pub times_armed: u64,
}

/// Cancellable timer handles for one room: at most one join timer and one
/// turn timer at a time. Lives next to the session under the room lock.
#[derive(Default)]
pub struct RoomTimers {
    join: Option<ArmedTimer>,
    turn: Option<ArmedTimer>,
    next_seq: u64,
}

impl RoomTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Join => &mut self.join,
            TimerKind::Turn => &mut self.turn,
        }
    }

    /// Arm a timer of `kind`, replacing any outstanding one.
    ///
    /// `on_fire` runs on its own task after `delay`; a panic inside it is
    /// logged and contained. Must be called inside a tokio runtime.
    pub fn arm<F, Fut>(&mut self, kind: TimerKind, delay: Duration, on_fire: F) -> TimerTicket
    where
        F: FnOnce(TimerTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(kind);
        self.next_seq += 1;
        let ticket = TimerTicket {
            kind,
            seq: self.next_seq,
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(panic) = AssertUnwindSafe(on_fire(ticket)).catch_unwind().await {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("{:?} timer callback panicked: {}", ticket.kind, message);
            }
        });

        *self.slot(kind) = Some(ArmedTimer {
            seq: ticket.seq,
            handle,
        });
        ticket
    }

    /// Cancel the outstanding timer of `kind`; a no-op when none is armed
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(timer) => {
                timer.handle.abort();
                debug!("cancelled {:?} timer #{}", kind, timer.seq);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Join);
        self.cancel(TimerKind::Turn);
    }

    /// Called by a fired timer. Succeeds only for the timer currently armed
    /// for its kind, and disarms it without aborting the calling task.
    pub fn claim(&mut self, ticket: TimerTicket) -> bool {
        let slot = self.slot(ticket.kind);
        if slot.as_ref().is_some_and(|timer| timer.seq == ticket.seq) {
            // dropping a JoinHandle detaches, the firing task keeps running
            slot.take();
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Join => self.join.is_some(),
            TimerKind::Turn => self.turn.is_some(),
        }
    }

    pub fn status(&self) -> TimerStatus {
        TimerStatus {
            join_armed: self.join.is_some(),
            turn_armed: self.turn.is_some(),
            times_armed: self.next_seq,
        }
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
