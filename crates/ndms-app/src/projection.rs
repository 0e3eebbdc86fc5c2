// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::{EditSession, FieldKind, FieldSpec, Record, RecordIdentity, Schema, value_text};

pub const MISSING_CELL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub display: String,
    pub editable: bool,
    /// Present only on the editable cells of the row under edit.
    pub live_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub identity: Option<RecordIdentity>,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn is_editing(&self) -> bool {
        self.cells.iter().any(|cell| cell.live_value.is_some())
    }
}

/// One row per record, one cell per schema field, in schema order.
pub fn project(schema: &Schema, records: &[Record], session: &EditSession) -> Vec<Row> {
    let editing = session
        .active()
        .filter(|active| active.kind == schema.kind);

    records
        .iter()
        .map(|record| {
            let identity = record.identity();
            let active = editing.filter(|active| identity.as_ref() == Some(&active.identity));
            let cells = schema
                .fields
                .iter()
                .map(|field| {
                    let display = display_value(field, record.get_path(field.key));
                    match active {
                        Some(active) if field.editable => Cell {
                            display,
                            editable: true,
                            live_value: Some(active.live_value(field.key)),
                        },
                        _ => Cell {
                            display,
                            editable: false,
                            live_value: None,
                        },
                    }
                })
                .collect();
            Row { identity, cells }
        })
        .collect()
}

pub fn display_value(field: &FieldSpec, value: Option<&Value>) -> String {
    let Some(value) = value else {
        return MISSING_CELL.to_owned();
    };
    let text = match field.kind {
        FieldKind::Timestamp => format_timestamp(value),
        FieldKind::Number | FieldKind::Text | FieldKind::Enum => value_text(value),
    };
    match field.unit {
        Some(unit) => format!("{text} {unit}"),
        None => text,
    }
}

/// Epoch milliseconds or RFC 3339 rendered as `YYYY-MM-DD HH:MM:SS UTC`.
/// Anything else comes back as its raw text.
pub fn format_timestamp(value: &Value) -> String {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis as i64))
            .and_then(from_epoch_millis),
        Value::String(text) => {
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(millis) => from_epoch_millis(millis),
                Err(_) => OffsetDateTime::parse(text, &Rfc3339).ok(),
            }
        }
        _ => None,
    };

    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    parsed
        .and_then(|instant| instant.to_offset(UtcOffset::UTC).format(format).ok())
        .unwrap_or_else(|| value_text(value))
}

fn from_epoch_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
