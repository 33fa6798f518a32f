use crate::window;
use chrono::{DateTime, Utc};
use core_types::Observation;
use std::collections::{BTreeMap, BTreeSet};

/// In-memory, time-ordered observation series keyed by instrument.
///
/// This is the market data the scheduler reveals to brokers and bots. Series
/// are sorted on insertion and keep one observation per timestamp.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    series: BTreeMap<String, Vec<Observation>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: impl Into<String>, mut observations: Vec<Observation>) {
        observations.sort_by_key(|o| o.timestamp());
        observations.dedup_by_key(|o| o.timestamp());
        self.series.insert(instrument.into(), observations);
    }

    pub fn with_series(mut self, instrument: impl Into<String>, observations: Vec<Observation>) -> Self {
        self.insert(instrument, observations);
        self
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.series.contains_key(instrument)
    }

    pub fn series(&self, instrument: &str) -> &[Observation] {
        self.series.get(instrument).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The sorted union of timestamps across `instruments`.
    pub fn timeline<'a>(&self, instruments: impl IntoIterator<Item = &'a str>) -> Vec<DateTime<Utc>> {
        let stamps: BTreeSet<DateTime<Utc>> = instruments
            .into_iter()
            .flat_map(|i| self.series(i).iter().map(Observation::timestamp))
            .collect();
        stamps.into_iter().collect()
    }

    pub fn at(&self, instrument: &str, ts: DateTime<Utc>) -> Option<&Observation> {
        let series = self.series(instrument);
        series
            .binary_search_by_key(&ts, Observation::timestamp)
            .ok()
            .map(|i| &series[i])
    }

    /// Observations revealed by moving the clock from `after` to `until`.
    pub fn between(&self, instrument: &str, after: Option<DateTime<Utc>>, until: DateTime<Utc>) -> &[Observation] {
        window::between(self.series(instrument), after, until)
    }

    pub fn visible(&self, instrument: &str, now: DateTime<Utc>, max_len: Option<usize>) -> &[Observation] {
        window::visible(self.series(instrument), now, max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::Bar;
    use rust_decimal::Decimal;

    #[test]
    fn insert_sorts_and_timeline_unions_instruments() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bar = |h: i64| Observation::from(Bar::flat(t0 + Duration::hours(h), Decimal::from(10 + h)));
        let store = SeriesStore::new()
            .with_series("A", vec![bar(2), bar(0), bar(2)])
            .with_series("B", vec![bar(1), bar(2)]);

        assert_eq!(store.series("A").len(), 2);
        assert_eq!(store.series("A")[0].timestamp(), t0);
        assert_eq!(store.timeline(["A", "B"]).len(), 3);
        assert!(store.at("B", t0).is_none());
        assert!(store.at("B", t0 + Duration::hours(1)).is_some());
        assert!(store.series("C").is_empty());
    }
}
