//! Periodic poll trigger, armed exactly while some app is loading.
//!
//! The scheduler owns a single deadline instead of a `tokio::time::Interval`
//! so it can be built and re-evaluated outside a runtime. [`PollScheduler::tick`]
//! is cancel-safe: dropping the future leaves the deadline untouched, which
//! makes it usable as a `tokio::select!` branch.

use std::future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Lower bound on the tick period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What [`PollScheduler::reevaluate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerTransition {
    Started,
    Stopped,
    Unchanged,
}

#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    next_tick: Option<Instant>,
}

impl PollScheduler {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_POLL_INTERVAL),
            next_tick: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Arm or disarm to match whether any app is loading.
    ///
    /// Arming schedules the first tick one period from now. Already-armed
    /// schedulers keep their phase.
    pub fn reevaluate(&mut self, has_loading: bool) -> SchedulerTransition {
        match (self.next_tick.is_some(), has_loading) {
            (false, true) => {
                self.next_tick = Some(Instant::now() + self.period);
                SchedulerTransition::Started
            }
            (true, false) => {
                self.next_tick = None;
                SchedulerTransition::Stopped
            }
            _ => SchedulerTransition::Unchanged,
        }
    }

    /// Resolve at the next deadline. Never resolves while disarmed.
    ///
    /// Deadlines missed while nobody was awaiting are not replayed; the next
    /// one is scheduled a full period after the tick fires.
    pub async fn tick(&mut self) {
        let Some(deadline) = self.next_tick else {
            return future::pending::<()>().await;
        };
        sleep_until(deadline).await;

        let now = Instant::now();
        let mut next = deadline + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next_tick = Some(next);
    }
}
