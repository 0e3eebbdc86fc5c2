// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{IDENTITY_KEYS, NdmsError};

/// Backend-derived identity of a record. Never authored client-side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity(String);

impl RecordIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observation as returned by the backend: a JSON object, nested at most
/// one level for coordinates and infrastructure damage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Resolves a dotted path. Absent segments and explicit nulls both yield
    /// `None`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    /// Writes a dotted path, replacing any non-object intermediate.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };
        let mut current = &mut self.0;
        for segment in segments {
            let entry = current
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert(last.to_owned(), value);
    }

    /// First usable value among [`IDENTITY_KEYS`], in that order. Nulls,
    /// empty strings, and non-scalar values are skipped.
    pub fn identity(&self) -> Option<RecordIdentity> {
        IDENTITY_KEYS.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::Number(number)) => Some(RecordIdentity(number.to_string())),
            Some(Value::String(text)) if !text.trim().is_empty() => {
                Some(RecordIdentity(text.trim().to_owned()))
            }
            _ => None,
        })
    }
}

/// Decodes a listing body. Anything but an array of objects is malformed.
pub fn records_from_value(value: Value) -> Result<Vec<Record>, NdmsError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(NdmsError::MalformedResponse(format!(
                "expected an array of records, got {}",
                json_kind(&other)
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let kind = json_kind(&item);
            Record::from_value(item).ok_or_else(|| {
                NdmsError::MalformedResponse(format!(
                    "record {index} is {kind}, expected an object"
                ))
            })
        })
        .collect()
}

/// Raw text of a scalar value as an input field would hold it.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
