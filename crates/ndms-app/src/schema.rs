// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Static per-type schema table. Every type-dependent decision (columns,
//! filters, editability, endpoints) reads from here instead of matching on
//! [`DisasterType`] at each call site.

use crate::{DisasterType, FieldKind};

/// Field keys that may carry a record's identity, in lookup order.
pub const IDENTITY_KEYS: [&str; 4] = ["id", "earthquake_id", "flood_id", "firestorm_id"];

/// Prefix shared by every backend route.
pub const API_PREFIX: &str = "/api/v1/ndms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted path into the record, e.g. `epicenter.latitude`.
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub editable: bool,
    pub unit: Option<&'static str>,
}

impl FieldSpec {
    const fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            editable: false,
            unit: None,
        }
    }

    const fn number(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Number)
    }

    const fn text(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Text)
    }

    const fn choice(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Enum)
    }

    const fn timestamp(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Timestamp)
    }

    const fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub kind: DisasterType,
    pub fields: &'static [FieldSpec],
    pub filterable: &'static [&'static str],
    /// Path fragment under [`API_PREFIX`], e.g. `floods`.
    pub endpoint: &'static str,
    /// Identity key the backend is expected to use for this type.
    pub identity_key: &'static str,
}

const EARTHQUAKE_FIELDS: [FieldSpec; 13] = [
    FieldSpec::timestamp("timestamp", "Timestamp"),
    FieldSpec::number("richter_magnitude", "Richter").editable(),
    FieldSpec::number("moment_magnitude", "Moment").editable(),
    FieldSpec::number("energy_release", "Energy")
        .editable()
        .with_unit("J"),
    FieldSpec::number("intensity", "Intensity").editable(),
    FieldSpec::number("epicenter.latitude", "Lat"),
    FieldSpec::number("epicenter.longitude", "Lng"),
    FieldSpec::number("depth_km", "Depth (km)").editable(),
    FieldSpec::choice("damage_level", "Damage").editable(),
    FieldSpec::choice("soil_type", "Soil").editable(),
    FieldSpec::text("infra_damage.roads", "Roads"),
    FieldSpec::text("infra_damage.bridges", "Bridges"),
    FieldSpec::text("infra_damage.buildings", "Buildings"),
];

const FLOOD_FIELDS: [FieldSpec; 9] = [
    FieldSpec::timestamp("timestamp", "Timestamp"),
    FieldSpec::number("soil_moisture_percent", "Soil Moisture (%)").editable(),
    FieldSpec::number("water_level_m", "Water Level (m)").editable(),
    FieldSpec::number("rainfall_mm", "Rainfall (mm)").editable(),
    FieldSpec::choice("severity_level", "Severity").editable(),
    FieldSpec::number("current_velocity", "Velocity").editable(),
    FieldSpec::choice("flood_type", "Flood Type").editable(),
    FieldSpec::number("location.latitude", "Lat"),
    FieldSpec::number("location.longitude", "Lng"),
];

const FIRESTORM_FIELDS: [FieldSpec; 11] = [
    FieldSpec::timestamp("detected_at", "Detected At"),
    FieldSpec::number("wind_speed_kph", "Wind Speed (kph)").editable(),
    FieldSpec::number("wind_direction_deg", "Wind Dir (°)").editable(),
    FieldSpec::number("temperature_celsius", "Temperature (°C)").editable(),
    FieldSpec::number("spread_rate_kph", "Spread Rate (kph)").editable(),
    FieldSpec::number("altitude", "Altitude"),
    FieldSpec::number("size_in_square_km", "Size (km²)").editable(),
    FieldSpec::choice("intensity", "Intensity").editable(),
    FieldSpec::text("description", "Description").editable(),
    FieldSpec::number("location.latitude", "Lat"),
    FieldSpec::number("location.longitude", "Lng"),
];

const EARTHQUAKE_FILTERS: [&str; 7] = [
    "richter_magnitude",
    "moment_magnitude",
    "energy_release",
    "intensity",
    "depth_km",
    "damage_level",
    "soil_type",
];

const FLOOD_FILTERS: [&str; 8] = [
    "soil_moisture_percent",
    "water_level_m",
    "severity_level",
    "rainfall_mm",
    "current_velocity",
    "flood_type",
    "latitude",
    "longitude",
];

const FIRESTORM_FILTERS: [&str; 7] = [
    "wind_speed_kph",
    "intensity",
    "description",
    "temperature_celsius",
    "spread_rate_kph",
    "altitude",
    "size_in_square_km",
];

static EARTHQUAKE_SCHEMA: Schema = Schema {
    kind: DisasterType::Earthquake,
    fields: &EARTHQUAKE_FIELDS,
    filterable: &EARTHQUAKE_FILTERS,
    endpoint: "earthquakes",
    identity_key: "earthquake_id",
};

static FLOOD_SCHEMA: Schema = Schema {
    kind: DisasterType::Flood,
    fields: &FLOOD_FIELDS,
    filterable: &FLOOD_FILTERS,
    endpoint: "floods",
    identity_key: "flood_id",
};

static FIRESTORM_SCHEMA: Schema = Schema {
    kind: DisasterType::Firestorm,
    fields: &FIRESTORM_FIELDS,
    filterable: &FIRESTORM_FILTERS,
    endpoint: "firestorms",
    identity_key: "firestorm_id",
};

pub fn schema_for(kind: DisasterType) -> &'static Schema {
    match kind {
        DisasterType::Earthquake => &EARTHQUAKE_SCHEMA,
        DisasterType::Flood => &FLOOD_SCHEMA,
        DisasterType::Firestorm => &FIRESTORM_SCHEMA,
    }
}

impl Schema {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn is_filterable(&self, key: &str) -> bool {
        self.filterable.contains(&key)
    }

    pub fn is_editable(&self, key: &str) -> bool {
        self.field(key).is_some_and(|field| field.editable)
    }

    pub fn editable_columns(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.editable)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.fields.iter().map(|field| field.label).collect()
    }

    pub fn list_path(&self) -> String {
        format!("{API_PREFIX}/{}/all", self.endpoint)
    }

    pub fn filter_path(&self) -> String {
        format!("{API_PREFIX}/{}/filter", self.endpoint)
    }

    pub fn alter_path(&self, identity: &str) -> String {
        format!("{API_PREFIX}/{}/alter/{identity}", self.endpoint)
    }
}

/// `soil_moisture_percent` -> `Soil Moisture Percent`.
pub fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
