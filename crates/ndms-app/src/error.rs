// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

use crate::{DisasterType, RecordIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdmsError {
    #[error("{field:?} is not a declared field for {kind} -- pick one of the listed fields")]
    InvalidField { kind: DisasterType, field: String },
    #[error("{field:?} is read-only for {kind}")]
    NotEditable { kind: DisasterType, field: String },
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("update rejected: {message}")]
    CommitFailed { message: String },
    #[error("record {identity} is already being edited -- save or cancel it first")]
    EditSessionBusy { identity: RecordIdentity },
    #[error("no row is being edited")]
    NoEditSession,
    #[error("an update is already in flight for this row")]
    CommitInFlight,
    #[error("record has no id, earthquake_id, flood_id, or firestorm_id -- it cannot be edited")]
    MissingIdentity,
    #[error("{field} expects a number, got {value:?}")]
    InvalidValue { field: String, value: String },
    #[error("no displayed row at position {index}")]
    NoSuchRow { index: usize },
}

impl NdmsError {
    /// Failures the controller absorbs into its error state rather than
    /// surfacing to the caller.
    pub const fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::MalformedResponse(_))
    }
}
