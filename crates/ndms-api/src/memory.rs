// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use ndms_app::{
    DisasterType, FilterQuery, NdmsError, Record, RecordIdentity, Transport, value_text,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Nested objects a flat filter key may refer into, e.g. flood `latitude`.
const NESTED_FILTER_PARENTS: [&str; 2] = ["location", "epicenter"];

/// In-process stand-in for the backend. Filters match exactly: numerically
/// when both sides parse as numbers, otherwise case-insensitively.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<DisasterType, Vec<Record>>>,
    latency: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated round-trip time applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn seed(&self, kind: DisasterType, records: Vec<Record>) {
        self.lock().insert(kind, records);
    }

    pub fn len(&self, kind: DisasterType) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, kind: DisasterType) -> bool {
        self.len(kind) == 0
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DisasterType, Vec<Record>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pause(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }
}

impl Transport for MemoryBackend {
    fn fetch_all(&self, kind: DisasterType) -> Result<Vec<Record>, NdmsError> {
        self.pause();
        Ok(self.lock().get(&kind).cloned().unwrap_or_default())
    }

    fn fetch_filtered(
        &self,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> Result<Vec<Record>, NdmsError> {
        self.pause();
        let records = self.lock();
        let matched = records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        query
                            .iter()
                            .all(|(key, expected)| filter_matches(record, key, expected))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matched)
    }

    fn update(
        &self,
        kind: DisasterType,
        identity: &RecordIdentity,
        payload: &Record,
    ) -> Result<Record, NdmsError> {
        self.pause();
        let mut records = self.lock();
        let slot = records
            .get_mut(&kind)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| record.identity().as_ref() == Some(identity))
            })
            .ok_or_else(|| NdmsError::CommitFailed {
                message: format!("server error (404): no {kind} with id {identity}"),
            })?;
        *slot = payload.clone();
        Ok(payload.clone())
    }
}

fn filter_matches(record: &Record, key: &str, expected: &str) -> bool {
    let actual = record.get_path(key).or_else(|| {
        NESTED_FILTER_PARENTS
            .iter()
            .find_map(|parent| record.get_path(&format!("{parent}.{key}")))
    });
    actual.is_some_and(|value| value_matches(value, expected.trim()))
}

fn value_matches(value: &Value, expected: &str) -> bool {
    let text = value_text(value);
    if let (Ok(left), Ok(right)) = (text.parse::<f64>(), expected.parse::<f64>()) {
        return (left - right).abs() < f64::EPSILON;
    }
    text.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use ndms_app::{DisasterType, NdmsError, Record, RecordIdentity, Transport};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).expect("object literal")
    }

    fn floods() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.seed(
            DisasterType::Flood,
            vec![
                record(json!({
                    "flood_id": 1,
                    "severity_level": "High",
                    "water_level_m": 3.0,
                    "location": {"latitude": 10.5, "longitude": 20.0},
                })),
                record(json!({
                    "flood_id": 2,
                    "severity_level": "low",
                    "water_level_m": 0.5,
                    "location": {"latitude": -4.0, "longitude": 20.0},
                })),
            ],
        );
        backend
    }

    #[test]
    fn filters_match_numbers_and_text() {
        let backend = floods();
        let high = backend
            .fetch_filtered(
                DisasterType::Flood,
                &vec![("severity_level".to_owned(), "high".to_owned())],
            )
            .expect("filter");
        assert_eq!(high.len(), 1);

        let level = backend
            .fetch_filtered(
                DisasterType::Flood,
                &vec![("water_level_m".to_owned(), "3".to_owned())],
            )
            .expect("filter");
        assert_eq!(level[0].identity(), Some(RecordIdentity::new("1")));
    }

    #[test]
    fn flat_coordinate_filters_reach_into_location() {
        let backend = floods();
        let south = backend
            .fetch_filtered(
                DisasterType::Flood,
                &vec![("latitude".to_owned(), "-4".to_owned())],
            )
            .expect("filter");
        assert_eq!(south.len(), 1);
        assert_eq!(south[0].identity(), Some(RecordIdentity::new("2")));

        let both = backend
            .fetch_filtered(
                DisasterType::Flood,
                &vec![("longitude".to_owned(), "20".to_owned())],
            )
            .expect("filter");
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn empty_query_returns_everything_and_unseeded_types_are_empty() {
        let backend = floods();
        assert_eq!(
            backend
                .fetch_filtered(DisasterType::Flood, &Vec::new())
                .expect("filter")
                .len(),
            2
        );
        assert!(
            backend
                .fetch_all(DisasterType::Firestorm)
                .expect("list")
                .is_empty()
        );
    }

    #[test]
    fn update_replaces_the_stored_record() {
        let backend = floods();
        let replacement = record(json!({"flood_id": 2, "severity_level": "critical"}));
        backend
            .update(DisasterType::Flood, &RecordIdentity::new("2"), &replacement)
            .expect("update");
        let listed = backend.fetch_all(DisasterType::Flood).expect("list");
        assert_eq!(listed[1], replacement);
    }

    #[test]
    fn update_of_unknown_identity_fails() {
        let backend = floods();
        let error = backend
            .update(
                DisasterType::Flood,
                &RecordIdentity::new("99"),
                &record(json!({"flood_id": 99})),
            )
            .expect_err("no such record");
        assert!(matches!(error, NdmsError::CommitFailed { .. }));
    }
}
