use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// The source of "now" for continuous mode.
///
/// Each call returns the next instant at which data should be revealed, or
/// `None` once the clock has run out.
#[async_trait]
pub trait Clock: Send {
    async fn tick(&mut self) -> Option<DateTime<Utc>>;
}

/// Steps through a fixed timeline as fast as the bots acknowledge.
pub struct SimulatedClock {
    times: VecDeque<DateTime<Utc>>,
}

impl SimulatedClock {
    pub fn new(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            times: times.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.times.pop_front()
    }
}

/// Replays a timeline paced by the wall clock: one step per `period`.
pub struct WallClock {
    times: VecDeque<DateTime<Utc>>,
    interval: Interval,
}

impl WallClock {
    /// Must be created inside a Tokio runtime.
    pub fn new(times: impl IntoIterator<Item = DateTime<Utc>>, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            times: times.into_iter().collect(),
            interval,
        }
    }
}

#[async_trait]
impl Clock for WallClock {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        let next = self.times.pop_front()?;
        self.interval.tick().await;
        Some(next)
    }
}
