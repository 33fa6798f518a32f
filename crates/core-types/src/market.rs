use crate::enums::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLC sample for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// A bar that traded at a single price.
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self::new(timestamp, price, price, price, price)
    }
}

/// A live best-bid/best-ask snapshot from a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// A price observation handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Observation {
    Bar(Bar),
    Quote(Quote),
}

impl Observation {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Observation::Bar(bar) => bar.timestamp,
            Observation::Quote(quote) => quote.timestamp,
        }
    }

    /// The last mid price of the observation, used for marking positions.
    pub fn close_mid(&self) -> Decimal {
        match self {
            Observation::Bar(bar) => bar.close,
            Observation::Quote(quote) => quote.mid(),
        }
    }

    /// The lowest and highest prices at which a buy (`Long`) or a sell
    /// (`Short`) could have transacted during this observation.
    ///
    /// Bars expose their full low/high range to both sides. A quote only
    /// allows buying at the ask and selling at the bid.
    pub fn range_for(&self, side: Direction) -> (Decimal, Decimal) {
        match self {
            Observation::Bar(bar) => (bar.low, bar.high),
            Observation::Quote(quote) => match side {
                Direction::Long => (quote.ask, quote.ask),
                Direction::Short => (quote.bid, quote.bid),
            },
        }
    }
}

impl From<Bar> for Observation {
    fn from(bar: Bar) -> Self {
        Observation::Bar(bar)
    }
}

impl From<Quote> for Observation {
    fn from(quote: Quote) -> Self {
        Observation::Quote(quote)
    }
}
