// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DisasterType, FilterQuery, NdmsError, Record, RecordIdentity};

/// Monotonic request counter; a completion is only applied when it carries
/// the live value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Wire access to the backend. Implementations block the calling thread.
pub trait Transport {
    fn fetch_all(&self, kind: DisasterType) -> Result<Vec<Record>, NdmsError>;
    fn fetch_filtered(
        &self,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> Result<Vec<Record>, NdmsError>;
    fn update(
        &self,
        kind: DisasterType,
        identity: &RecordIdentity,
        payload: &Record,
    ) -> Result<Record, NdmsError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch_all(&self, kind: DisasterType) -> Result<Vec<Record>, NdmsError> {
        (**self).fetch_all(kind)
    }

    fn fetch_filtered(
        &self,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> Result<Vec<Record>, NdmsError> {
        (**self).fetch_filtered(kind, query)
    }

    fn update(
        &self,
        kind: DisasterType,
        identity: &RecordIdentity,
        payload: &Record,
    ) -> Result<Record, NdmsError> {
        (**self).update(kind, identity, payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    All,
    Filtered(FilterQuery),
}

/// A request the controller wants issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: Generation,
    pub kind: DisasterType,
    pub mode: FetchMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub generation: Generation,
    pub kind: DisasterType,
    pub result: Result<Vec<Record>, NdmsError>,
}

/// Issues listing requests and tags each result with the generation and type
/// it was issued for. Staleness is the caller's concern.
#[derive(Debug, Clone)]
pub struct Fetcher<T> {
    transport: T,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch_all(&self, generation: Generation, kind: DisasterType) -> FetchOutcome {
        tracing::debug!(%generation, %kind, "fetch all");
        FetchOutcome {
            generation,
            kind,
            result: self.transport.fetch_all(kind),
        }
    }

    pub fn fetch_filtered(
        &self,
        generation: Generation,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> FetchOutcome {
        tracing::debug!(%generation, %kind, filters = query.len(), "fetch filtered");
        FetchOutcome {
            generation,
            kind,
            result: self.transport.fetch_filtered(kind, query),
        }
    }

    pub fn fetch(&self, ticket: &FetchTicket) -> FetchOutcome {
        match &ticket.mode {
            FetchMode::All => self.fetch_all(ticket.generation, ticket.kind),
            FetchMode::Filtered(query) => {
                self.fetch_filtered(ticket.generation, ticket.kind, query)
            }
        }
    }
}
