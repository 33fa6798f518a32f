use crate::error::StrategyError;
use chrono::{DateTime, Utc};
use core_types::{BrokerSnapshot, Observation, OrderIntent};
use rust_decimal::Decimal;
use tokio::sync::watch;

/// Read-only view of the broker, refreshed after every broker mutation.
pub type BrokerView = watch::Receiver<BrokerSnapshot>;

/// The most recent observation revealed for the bot's instrument.
pub type ObservationStream = watch::Receiver<Option<Observation>>;

/// Collaborators a strategy may be given at construction.
///
/// Which ones are present is decided by the bot configuration
/// (`include_broker`, `include_stream`), never by the strategy itself.
#[derive(Debug, Clone, Default)]
pub struct StrategyDeps {
    pub broker: Option<BrokerView>,
    pub stream: Option<ObservationStream>,
}

/// How long strategy-held state lives under a given scheduler mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLifetime {
    /// One instance for the whole run: backtests and continuous mode.
    PerRun,
    /// A fresh instance for every poll: live periodic mode.
    PerInvocation,
}

/// The data a strategy is allowed to see at `now`.
///
/// Construction fails if any observation is later than `now`, so a window
/// that reaches a strategy is free of look-ahead by construction.
#[derive(Debug, Clone, Copy)]
pub struct DataWindow<'a> {
    instrument: &'a str,
    observations: &'a [Observation],
    now: DateTime<Utc>,
}

impl<'a> DataWindow<'a> {
    pub fn new(
        instrument: &'a str,
        observations: &'a [Observation],
        now: DateTime<Utc>,
    ) -> Result<Self, StrategyError> {
        if let Some(latest) = observations.iter().map(|o| o.timestamp()).max() {
            if latest > now {
                return Err(StrategyError::LookAhead { latest, now });
            }
        }
        Ok(Self {
            instrument,
            observations,
            now,
        })
    }

    pub fn instrument(&self) -> &'a str {
        self.instrument
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn observations(&self) -> &'a [Observation] {
        self.observations
    }

    pub fn latest(&self) -> Option<&'a Observation> {
        self.observations.last()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations strictly after `since`; everything when `since` is `None`.
    pub fn newer_than(&self, since: Option<DateTime<Utc>>) -> &'a [Observation] {
        match since {
            None => self.observations,
            Some(ts) => {
                let start = self.observations.partition_point(|o| o.timestamp() <= ts);
                &self.observations[start..]
            }
        }
    }

    pub fn closes(&self) -> impl Iterator<Item = Decimal> + 'a {
        self.observations.iter().map(|o| o.close_mid())
    }
}

/// What a strategy wants done after seeing one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub orders: Vec<OrderIntent>,
    /// Ends the bot after these orders are submitted.
    pub terminate: bool,
}

impl Decision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn orders(orders: Vec<OrderIntent>) -> Self {
        Self {
            orders,
            terminate: false,
        }
    }

    pub fn terminate() -> Self {
        Self {
            orders: Vec::new(),
            terminate: true,
        }
    }
}

/// Handed to a strategy's shutdown routine.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    pub instrument: String,
    pub at: Option<DateTime<Utc>>,
    /// The latest broker snapshot when the strategy was given broker access.
    pub snapshot: Option<BrokerSnapshot>,
}

/// Clean-up a strategy requests before its bot is torn down. Actions are
/// applied immediately, not on the next observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownAction {
    CancelPendingOrders,
    CloseOpenTrades,
}
