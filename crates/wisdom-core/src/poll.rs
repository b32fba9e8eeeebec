use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Idle,
    Polling,
}

/// Owner of the single recurring stats timer.
///
/// `Idle` holds no timer, `Polling` holds exactly one. The timer is created in
/// [`PollLoop::ensure_running`] and dropped in [`PollLoop::stop`], so the two
/// always pair up.
#[derive(Debug)]
pub struct PollLoop {
    period: Duration,
    timer: Option<Interval>,
    tick_in_flight: bool,
    started: u64,
}

impl PollLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            timer: None,
            tick_in_flight: false,
            started: 0,
        }
    }

    pub fn state(&self) -> PollState {
        if self.timer.is_some() {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of live timers: 0 or 1.
    pub fn active_timers(&self) -> usize {
        usize::from(self.timer.is_some())
    }

    /// How many times a timer has been created over the loop's lifetime
    pub fn timers_created(&self) -> u64 {
        self.started
    }

    /// Idle → Polling. Returns `false` when already polling.
    ///
    /// The first tick fires one full period after the start, not immediately.
    /// Must be called from within a tokio runtime.
    pub fn ensure_running(&mut self) -> bool {
        if self.timer.is_some() {
            return false;
        }
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        self.started += 1;
        true
    }

    /// Polling → Idle. Returns `false` when already idle.
    pub fn stop(&mut self) -> bool {
        self.tick_in_flight = false;
        self.timer.take().is_some()
    }

    /// Resolves on the next tick; pending forever while idle.
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Claim the tick's fetch slot. `false` while the previous tick's fetch is
    /// still outstanding, or when the loop has been stopped.
    pub fn begin_tick_fetch(&mut self) -> bool {
        if self.timer.is_none() || self.tick_in_flight {
            return false;
        }
        self.tick_in_flight = true;
        true
    }

    pub fn end_tick_fetch(&mut self) {
        self.tick_in_flight = false;
    }
}
