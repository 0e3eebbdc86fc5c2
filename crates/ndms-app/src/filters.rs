// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::{DisasterType, NdmsError, schema_for};

/// Ordered `(key, value)` pairs ready to be URL-encoded.
pub type FilterQuery = Vec<(String, String)>;

/// One filter map per disaster type. Values are never absent: an empty
/// string means "no constraint".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStore {
    values: BTreeMap<DisasterType, BTreeMap<&'static str, String>>,
}

impl Default for FilterStore {
    fn default() -> Self {
        let values = DisasterType::ALL
            .into_iter()
            .map(|kind| {
                let fields = schema_for(kind)
                    .filterable
                    .iter()
                    .map(|key| (*key, String::new()))
                    .collect();
                (kind, fields)
            })
            .collect();
        Self { values }
    }
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: DisasterType) -> &BTreeMap<&'static str, String> {
        &self.values[&kind]
    }

    pub fn value(&self, kind: DisasterType, field: &str) -> Option<&str> {
        self.values[&kind].get(field).map(String::as_str)
    }

    pub fn set(
        &mut self,
        kind: DisasterType,
        field: &str,
        value: impl Into<String>,
    ) -> Result<(), NdmsError> {
        let slot = self
            .values
            .get_mut(&kind)
            .and_then(|fields| fields.get_mut(field))
            .ok_or_else(|| NdmsError::InvalidField {
                kind,
                field: field.to_owned(),
            })?;
        *slot = value.into();
        Ok(())
    }

    pub fn clear(&mut self, kind: DisasterType) {
        if let Some(fields) = self.values.get_mut(&kind) {
            fields.values_mut().for_each(String::clear);
        }
    }

    /// Non-empty entries in declared filterable order.
    pub fn to_query(&self, kind: DisasterType) -> FilterQuery {
        let fields = &self.values[&kind];
        schema_for(kind)
            .filterable
            .iter()
            .filter_map(|key| {
                let value = fields.get(key)?;
                if value.is_empty() {
                    None
                } else {
                    Some(((*key).to_owned(), value.clone()))
                }
            })
            .collect()
    }

    pub fn has_constraints(&self, kind: DisasterType) -> bool {
        self.values[&kind].values().any(|value| !value.is_empty())
    }
}
