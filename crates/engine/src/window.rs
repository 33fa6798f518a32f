use chrono::{DateTime, Utc};
use core_types::Observation;

/// The part of a time-ordered series a bot may see at `now`: everything up to
/// and including `now`, trimmed to the last `max_len` observations when a
/// window length is configured.
pub fn visible(series: &[Observation], now: DateTime<Utc>, max_len: Option<usize>) -> &[Observation] {
    let end = series.partition_point(|o| o.timestamp() <= now);
    let start = match max_len {
        Some(len) => end.saturating_sub(len),
        None => 0,
    };
    &series[start..end]
}

/// Observations strictly after `after` and up to `until`.
pub fn between(series: &[Observation], after: Option<DateTime<Utc>>, until: DateTime<Utc>) -> &[Observation] {
    let start = match after {
        Some(ts) => series.partition_point(|o| o.timestamp() <= ts),
        None => 0,
    };
    let end = series.partition_point(|o| o.timestamp() <= until).max(start);
    &series[start..end]
}
