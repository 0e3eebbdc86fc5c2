// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use ndms_app::{DisasterType, FilterQuery, NdmsError, Record, RecordIdentity, Transport};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

const DAMAGE_LEVELS: [&str; 5] = ["none", "minor", "moderate", "severe", "catastrophic"];
const SOIL_TYPES: [&str; 6] = ["clay", "sand", "silt", "loam", "gravel", "rock"];
const INFRA_STATES: [&str; 4] = ["intact", "cracked", "partially collapsed", "destroyed"];
const SEVERITY_LEVELS: [&str; 4] = ["low", "moderate", "high", "critical"];
const FLOOD_TYPES: [&str; 5] = ["flash", "river", "coastal", "urban", "groundwater"];
const FIRE_INTENSITIES: [&str; 4] = ["low", "moderate", "high", "extreme"];

const FIRE_WORDS: [&str; 20] = [
    "crown",
    "fire",
    "spreading",
    "ridge",
    "canyon",
    "embers",
    "evacuation",
    "ordered",
    "containment",
    "line",
    "breached",
    "dry",
    "brush",
    "gusts",
    "pyrocumulus",
    "plume",
    "spotting",
    "downslope",
    "timber",
    "smoke",
];

/// First instant of 2024, the window every generated timestamp falls in.
const REFERENCE_EPOCH_SECONDS: i64 = 1_704_067_200;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of backend-shaped records. The same seed always yields
/// the same records.
#[derive(Debug, Clone)]
pub struct DisasterFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl DisasterFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub fn record(&mut self, kind: DisasterType, id: u64) -> Record {
        match kind {
            DisasterType::Earthquake => self.earthquake(id),
            DisasterType::Flood => self.flood(id),
            DisasterType::Firestorm => self.firestorm(id),
        }
    }

    /// `count` records with identities `1..=count`.
    pub fn records(&mut self, kind: DisasterType, count: u64) -> Vec<Record> {
        (1..=count).map(|id| self.record(kind, id)).collect()
    }

    pub fn earthquake(&mut self, id: u64) -> Record {
        let richter = self.tenths(20, 89);
        let value = json!({
            "earthquake_id": id,
            "timestamp": self.epoch_millis(),
            "richter_magnitude": richter,
            "moment_magnitude": self.tenths(20, 92),
            "energy_release": self.int_range(1_000, 9_000_000) * 1_000,
            "intensity": self.int_range(1, 12),
            "epicenter": self.coordinates(),
            "depth_km": self.int_range(1, 700),
            "damage_level": self.pick(&DAMAGE_LEVELS),
            "soil_type": self.pick(&SOIL_TYPES),
            "infra_damage": {
                "roads": self.pick(&INFRA_STATES),
                "bridges": self.pick(&INFRA_STATES),
                "buildings": self.pick(&INFRA_STATES),
            },
        });
        into_record(value)
    }

    pub fn flood(&mut self, id: u64) -> Record {
        let value = json!({
            "flood_id": id,
            "timestamp": self.epoch_millis(),
            "soil_moisture_percent": self.int_range(5, 100),
            "water_level_m": self.tenths(1, 150),
            "rainfall_mm": self.int_range(0, 600),
            "severity_level": self.pick(&SEVERITY_LEVELS),
            "current_velocity": self.tenths(0, 60),
            "flood_type": self.pick(&FLOOD_TYPES),
            "location": self.coordinates(),
        });
        into_record(value)
    }

    pub fn firestorm(&mut self, id: u64) -> Record {
        let value = json!({
            "firestorm_id": id,
            "detected_at": self.rfc3339(),
            "wind_speed_kph": self.int_range(5, 140),
            "wind_direction_deg": self.int_range(0, 359),
            "temperature_celsius": self.int_range(25, 55),
            "spread_rate_kph": self.tenths(1, 250),
            "altitude": self.int_range(0, 3_000),
            "size_in_square_km": self.tenths(1, 5_000),
            "intensity": self.pick(&FIRE_INTENSITIES),
            "description": self.sentence(4, 9),
            "location": self.coordinates(),
        });
        into_record(value)
    }

    fn pick(&mut self, items: &[&'static str]) -> &'static str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn tenths(&mut self, min: i64, max: i64) -> f64 {
        self.int_range(min, max) as f64 / 10.0
    }

    fn coordinates(&mut self) -> Value {
        json!({
            "latitude": self.int_range(-8_999, 8_999) as f64 / 100.0,
            "longitude": self.int_range(-17_999, 17_999) as f64 / 100.0,
        })
    }

    fn instant(&mut self) -> OffsetDateTime {
        let offset = self.int_range(0, 365 * 24 * 60 * 60 - 1);
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(REFERENCE_EPOCH_SECONDS + offset)
    }

    fn epoch_millis(&mut self) -> i64 {
        (self.instant().unix_timestamp_nanos() / 1_000_000) as i64
    }

    fn rfc3339(&mut self) -> String {
        let instant = self.instant();
        instant
            .format(&Rfc3339)
            .unwrap_or_else(|_| instant.unix_timestamp().to_string())
    }

    fn sentence(&mut self, min_words: i64, max_words: i64) -> String {
        let count = self.int_range(min_words, max_words);
        let words: Vec<&str> = (0..count).map(|_| self.pick(&FIRE_WORDS)).collect();
        let mut sentence = words.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }
}

fn into_record(value: Value) -> Record {
    Record::from_value(value).unwrap_or_default()
}

/// One request observed by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    FetchAll(DisasterType),
    FetchFiltered(DisasterType, FilterQuery),
    Update(DisasterType, RecordIdentity, Record),
}

/// Replays queued responses in order and records every request. An empty
/// fetch queue answers with no records; an empty update queue echoes the
/// payload back.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    calls: Mutex<Vec<TransportCall>>,
    fetches: Mutex<VecDeque<Result<Vec<Record>, NdmsError>>>,
    updates: Mutex<VecDeque<Result<Record, NdmsError>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fetch(&self, result: Result<Vec<Record>, NdmsError>) -> &Self {
        lock(&self.fetches).push_back(result);
        self
    }

    pub fn push_update(&self, result: Result<Record, NdmsError>) -> &Self {
        lock(&self.updates).push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    fn next_fetch(&self, call: TransportCall) -> Result<Vec<Record>, NdmsError> {
        lock(&self.calls).push(call);
        lock(&self.fetches).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl Transport for ScriptedTransport {
    fn fetch_all(&self, kind: DisasterType) -> Result<Vec<Record>, NdmsError> {
        self.next_fetch(TransportCall::FetchAll(kind))
    }

    fn fetch_filtered(
        &self,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> Result<Vec<Record>, NdmsError> {
        self.next_fetch(TransportCall::FetchFiltered(kind, query.clone()))
    }

    fn update(
        &self,
        kind: DisasterType,
        identity: &RecordIdentity,
        payload: &Record,
    ) -> Result<Record, NdmsError> {
        lock(&self.calls).push(TransportCall::Update(
            kind,
            identity.clone(),
            payload.clone(),
        ));
        lock(&self.updates)
            .pop_front()
            .unwrap_or_else(|| Ok(payload.clone()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

/// Epoch milliseconds for `2023-11-14 22:13:20 UTC`.
pub const fn fixture_timestamp_millis() -> i64 {
    1_700_000_000_000
}

#[cfg(test)]
mod tests {
    use super::{DisasterFaker, ScriptedTransport, TransportCall};
    use ndms_app::{DisasterType, NdmsError, RecordIdentity, Transport, schema_for};

    #[test]
    fn same_seed_same_records() {
        let mut left = DisasterFaker::new(42);
        let mut right = DisasterFaker::new(42);
        assert_eq!(
            left.records(DisasterType::Flood, 5),
            right.records(DisasterType::Flood, 5)
        );
    }

    #[test]
    fn zero_seed_is_normalized() {
        assert_eq!(DisasterFaker::new(0).seed(), 1);
    }

    #[test]
    fn records_carry_identity_for_their_type() {
        let mut faker = DisasterFaker::new(7);
        for kind in DisasterType::ALL {
            let records = faker.records(kind, 3);
            let schema = schema_for(kind);
            for (index, record) in records.iter().enumerate() {
                let expected = RecordIdentity::new((index + 1).to_string());
                assert_eq!(record.identity(), Some(expected));
                assert!(record.fields().contains_key(schema.identity_key));
            }
        }
    }

    #[test]
    fn records_populate_every_display_field() {
        let mut faker = DisasterFaker::new(3);
        for kind in DisasterType::ALL {
            let record = faker.record(kind, 1);
            for field in schema_for(kind).fields {
                assert!(
                    record.get_path(field.key).is_some(),
                    "{kind} record is missing {}",
                    field.key
                );
            }
        }
    }

    #[test]
    fn firestorm_detection_is_rfc3339() {
        let mut faker = DisasterFaker::new(11);
        let record = faker.firestorm(1);
        let detected = record
            .get_path("detected_at")
            .and_then(|value| value.as_str())
            .expect("detected_at is a string");
        assert!(detected.starts_with("2024-"), "{detected}");
    }

    #[test]
    fn scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push_fetch(Err(NdmsError::FetchFailed("boom".to_owned())))
            .push_fetch(Ok(DisasterFaker::new(1).records(DisasterType::Earthquake, 2)));

        assert!(transport.fetch_all(DisasterType::Earthquake).is_err());
        let second = transport
            .fetch_filtered(DisasterType::Earthquake, &vec![("soil_type".to_owned(), "clay".to_owned())])
            .expect("second fetch succeeds");
        assert_eq!(second.len(), 2);
        assert_eq!(
            transport.fetch_all(DisasterType::Flood),
            Ok(Vec::new()),
            "empty queue answers with no records"
        );
        assert_eq!(transport.calls().len(), 3);
        assert!(matches!(
            &transport.calls()[1],
            TransportCall::FetchFiltered(DisasterType::Earthquake, query) if query.len() == 1
        ));
    }

    #[test]
    fn scripted_update_echoes_payload_by_default() {
        let transport = ScriptedTransport::new();
        let payload = DisasterFaker::new(5).flood(9);
        let identity = RecordIdentity::new("9");
        let updated = transport
            .update(DisasterType::Flood, &identity, &payload)
            .expect("echo");
        assert_eq!(updated, payload);
    }
}
