use crate::error::CoordinatorError;
use chrono::{DateTime, Utc};
use core_types::Observation;
use engine::SeriesStore;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Raw observation series keyed by instrument, as read from disk.
pub type RawSeries = BTreeMap<String, Vec<Observation>>;

/// Reads a JSON object mapping each instrument to its observations.
///
/// ```json
/// { "EURUSD": [ { "type": "bar", "timestamp": "2024-01-01T00:00:00Z",
///                 "open": "1.1", "high": "1.2", "low": "1.0", "close": "1.15" } ] }
/// ```
pub fn load_series(path: &Path) -> Result<RawSeries, CoordinatorError> {
    let file = File::open(path)?;
    let series: RawSeries = serde_json::from_reader(BufReader::new(file))?;
    tracing::info!(path = %path.display(), instruments = series.len(), "Loaded observation series");
    Ok(series)
}

/// Builds the store for a run over `instruments`.
///
/// Every series is reduced to the timestamps that all of them share, so no
/// instrument ever advances while another stands still. Dropped observations
/// are reported as a warning; an instrument without data, or a set of series
/// with no timestamp in common, is an error.
pub fn align_series(mut raw: RawSeries, instruments: &[String]) -> Result<SeriesStore, CoordinatorError> {
    let mut selected: BTreeMap<&str, Vec<Observation>> = BTreeMap::new();
    for instrument in instruments {
        let mut series = raw
            .remove(instrument)
            .ok_or_else(|| CoordinatorError::Data(format!("no observations for instrument {instrument}")))?;
        series.sort_by_key(Observation::timestamp);
        let before = series.len();
        series.dedup_by_key(|o| o.timestamp());
        if series.len() < before {
            tracing::warn!(instrument = %instrument, dropped = before - series.len(), "Duplicate timestamps dropped");
        }
        selected.insert(instrument.as_str(), series);
    }

    let mut common: Option<BTreeSet<DateTime<Utc>>> = None;
    for series in selected.values() {
        let stamps: BTreeSet<DateTime<Utc>> = series.iter().map(Observation::timestamp).collect();
        common = Some(match common {
            Some(acc) => acc.intersection(&stamps).copied().collect(),
            None => stamps,
        });
    }
    let common = common.unwrap_or_default();
    if common.is_empty() {
        return Err(CoordinatorError::Data(
            "observation series share no common timestamps".to_string(),
        ));
    }

    let mut store = SeriesStore::new();
    for (instrument, series) in selected {
        let before = series.len();
        let aligned: Vec<Observation> = series
            .into_iter()
            .filter(|o| common.contains(&o.timestamp()))
            .collect();
        if aligned.len() < before {
            tracing::warn!(
                instrument,
                dropped = before - aligned.len(),
                kept = aligned.len(),
                "Series reduced to common timestamps"
            );
        }
        store.insert(instrument, aligned);
    }
    Ok(store)
}
