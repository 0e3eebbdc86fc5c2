// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisasterType {
    Earthquake,
    Flood,
    Firestorm,
}

impl DisasterType {
    pub const ALL: [Self; 3] = [Self::Earthquake, Self::Flood, Self::Firestorm];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Flood => "flood",
            Self::Firestorm => "firestorm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "earthquake" | "earthquakes" => Some(Self::Earthquake),
            "flood" | "floods" => Some(Self::Flood),
            "firestorm" | "firestorms" => Some(Self::Firestorm),
            _ => None,
        }
    }

    /// Pluralised, capitalised name used as the table title.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Earthquake => "Earthquakes",
            Self::Flood => "Floods",
            Self::Firestorm => "Firestorms",
        }
    }

    pub fn rotate(self, delta: isize) -> Self {
        let current = Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or(0) as isize;
        let len = Self::ALL.len() as isize;
        Self::ALL[(current + delta).rem_euclid(len) as usize]
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Number,
    Text,
    Enum,
    Timestamp,
}
