// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::{
    DisasterType, FieldKind, NdmsError, Record, RecordIdentity, Transport, schema_for, value_text,
};

/// The single row currently mid-edit. `pending` holds only the fields the
/// operator has touched; everything else comes from `original`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEdit {
    pub kind: DisasterType,
    pub identity: RecordIdentity,
    pub original: Record,
    pub pending: BTreeMap<&'static str, String>,
    serial: u64,
    committing: bool,
}

impl ActiveEdit {
    pub fn live_value(&self, field: &str) -> String {
        match self.pending.get(field) {
            Some(value) => value.clone(),
            None => self
                .original
                .get_path(field)
                .map(value_text)
                .unwrap_or_default(),
        }
    }

    pub const fn is_committing(&self) -> bool {
        self.committing
    }

    /// Distinguishes reopened sessions on the same row.
    pub const fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitTicket {
    pub kind: DisasterType,
    pub identity: RecordIdentity,
    /// Serial of the session that issued the commit.
    pub serial: u64,
    pub payload: Record,
}

/// Exclusive slot for at most one in-progress row edit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditSession {
    active: Option<ActiveEdit>,
    last_serial: u64,
}

impl EditSession {
    pub fn active(&self) -> Option<&ActiveEdit> {
        self.active.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_editing(&self, kind: DisasterType, identity: &RecordIdentity) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.kind == kind && &active.identity == identity)
    }

    /// Opens a session on `record`. Re-opening the row already under edit is
    /// a no-op; any other row is rejected while a session exists.
    pub fn begin(&mut self, kind: DisasterType, record: &Record) -> Result<&ActiveEdit, NdmsError> {
        let identity = record.identity().ok_or(NdmsError::MissingIdentity)?;
        if let Some(active) = &self.active
            && (active.kind != kind || active.identity != identity)
        {
            return Err(NdmsError::EditSessionBusy {
                identity: active.identity.clone(),
            });
        }

        if self.active.is_none() {
            self.last_serial += 1;
            tracing::debug!(%kind, %identity, serial = self.last_serial, "edit session opened");
        }
        let serial = self.last_serial;
        let active = self.active.get_or_insert_with(|| ActiveEdit {
            kind,
            identity,
            original: record.clone(),
            pending: BTreeMap::new(),
            serial,
            committing: false,
        });
        Ok(active)
    }

    pub fn set_field(&mut self, field: &str, value: impl Into<String>) -> Result<(), NdmsError> {
        let active = self.active.as_mut().ok_or(NdmsError::NoEditSession)?;
        let declared = schema_for(active.kind)
            .field(field)
            .ok_or_else(|| NdmsError::InvalidField {
                kind: active.kind,
                field: field.to_owned(),
            })?;
        if !declared.editable {
            return Err(NdmsError::NotEditable {
                kind: active.kind,
                field: field.to_owned(),
            });
        }
        active.pending.insert(declared.key, value.into());
        Ok(())
    }

    /// Merges pending values over the original record and marks the session
    /// as committing. The session stays open until [`Self::finish_commit`].
    pub fn prepare_commit(&mut self) -> Result<CommitTicket, NdmsError> {
        let active = self.active.as_mut().ok_or(NdmsError::NoEditSession)?;
        if active.committing {
            return Err(NdmsError::CommitInFlight);
        }

        let schema = schema_for(active.kind);
        let mut payload = active.original.clone();
        for (key, text) in &active.pending {
            let kind = schema.field(key).map_or(FieldKind::Text, |declared| declared.kind);
            payload.set_path(key, coerce_pending(key, kind, text)?);
        }

        active.committing = true;
        Ok(CommitTicket {
            kind: active.kind,
            identity: active.identity.clone(),
            serial: active.serial,
            payload,
        })
    }

    /// Applies an update result. Success closes the session; failure keeps
    /// it open with pending values intact. Results for a row that is no
    /// longer under edit, or for an earlier session on the same row, leave
    /// the slot alone.
    pub fn finish_commit(
        &mut self,
        ticket: &CommitTicket,
        result: Result<Record, NdmsError>,
    ) -> Result<Record, NdmsError> {
        let result = result.map_err(into_commit_failure);
        if !self.issued(ticket) {
            tracing::debug!(
                kind = %ticket.kind,
                identity = %ticket.identity,
                serial = ticket.serial,
                "ignoring commit result for a closed session"
            );
            return result;
        }

        match result {
            Ok(record) => {
                tracing::info!(kind = %ticket.kind, identity = %ticket.identity, "record updated");
                self.active = None;
                Ok(record)
            }
            Err(error) => {
                tracing::warn!(kind = %ticket.kind, identity = %ticket.identity, %error, "update rejected");
                if let Some(active) = self.active.as_mut() {
                    active.committing = false;
                }
                Err(error)
            }
        }
    }

    fn issued(&self, ticket: &CommitTicket) -> bool {
        self.active.as_ref().is_some_and(|active| {
            active.serial == ticket.serial
                && active.kind == ticket.kind
                && active.identity == ticket.identity
        })
    }

    pub fn commit<T: Transport>(&mut self, transport: &T) -> Result<Record, NdmsError> {
        let ticket = self.prepare_commit()?;
        let result = transport.update(ticket.kind, &ticket.identity, &ticket.payload);
        self.finish_commit(&ticket, result)
    }

    pub fn cancel(&mut self) -> Option<ActiveEdit> {
        let cancelled = self.active.take();
        if let Some(active) = &cancelled {
            tracing::debug!(kind = %active.kind, identity = %active.identity, "edit session cancelled");
        }
        cancelled
    }
}

fn coerce_pending(key: &str, kind: FieldKind, text: &str) -> Result<Value, NdmsError> {
    match kind {
        FieldKind::Number => parse_number(text.trim()).ok_or_else(|| NdmsError::InvalidValue {
            field: key.to_owned(),
            value: text.to_owned(),
        }),
        FieldKind::Text | FieldKind::Enum | FieldKind::Timestamp => {
            Ok(Value::String(text.to_owned()))
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    let float = text.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

fn into_commit_failure(error: NdmsError) -> NdmsError {
    match error {
        NdmsError::CommitFailed { .. } => error,
        NdmsError::FetchFailed(message) | NdmsError::MalformedResponse(message) => {
            NdmsError::CommitFailed { message }
        }
        other => NdmsError::CommitFailed {
            message: other.to_string(),
        },
    }
}
