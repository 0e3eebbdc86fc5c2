// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::{
    CommitTicket, DisasterType, EditSession, FetchMode, FetchOutcome, FetchTicket, FilterStore,
    Generation, NdmsError, Record, Row, project, schema_for,
};

/// The single source of truth for what the table shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle(DisasterType),
    Loading {
        kind: DisasterType,
        generation: Generation,
    },
    Loaded {
        kind: DisasterType,
        generation: Generation,
        records: Vec<Record>,
    },
    Error {
        kind: DisasterType,
        generation: Generation,
        cause: NdmsError,
    },
}

impl ViewState {
    pub const fn kind(&self) -> DisasterType {
        match self {
            Self::Idle(kind)
            | Self::Loading { kind, .. }
            | Self::Loaded { kind, .. }
            | Self::Error { kind, .. } => *kind,
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            Self::Loaded { records, .. } => records,
            _ => &[],
        }
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDisposition {
    Applied,
    Stale,
}

/// Orchestrates type selection, filtering, and the edit slot. Requests
/// leave as tickets; their completions come back through
/// [`Controller::on_fetch_completed`] and [`Controller::on_commit_completed`].
#[derive(Debug, Clone, PartialEq)]
pub struct Controller {
    view: ViewState,
    generation: Generation,
    filters: FilterStore,
    filtered: BTreeSet<DisasterType>,
    edit: EditSession,
    status_line: Option<String>,
}

impl Controller {
    pub fn new(start: DisasterType) -> Self {
        Self {
            view: ViewState::Idle(start),
            generation: Generation::default(),
            filters: FilterStore::new(),
            filtered: BTreeSet::new(),
            edit: EditSession::default(),
            status_line: None,
        }
    }

    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    pub const fn active_type(&self) -> DisasterType {
        self.view.kind()
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub const fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub const fn edit_session(&self) -> &EditSession {
        &self.edit
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    pub fn displayed_records(&self) -> &[Record] {
        self.view.records()
    }

    pub fn rows(&self) -> Vec<Row> {
        project(
            schema_for(self.active_type()),
            self.displayed_records(),
            &self.edit,
        )
    }

    /// Kicks off the first listing for the starting type.
    pub fn start(&mut self) -> FetchTicket {
        let kind = self.active_type();
        self.select_type(kind)
    }

    /// Abandons any open edit and reloads. Types that have never had filters
    /// applied use the unfiltered listing.
    pub fn select_type(&mut self, kind: DisasterType) -> FetchTicket {
        self.edit.cancel();
        let mode = if self.filtered.contains(&kind) {
            FetchMode::Filtered(self.filters.to_query(kind))
        } else {
            FetchMode::All
        };
        tracing::info!(%kind, "type selected");
        self.issue(kind, mode)
    }

    pub fn apply_filters(&mut self) -> FetchTicket {
        let kind = self.active_type();
        self.filtered.insert(kind);
        let query = self.filters.to_query(kind);
        tracing::info!(%kind, filters = query.len(), "filters applied");
        self.issue(kind, FetchMode::Filtered(query))
    }

    pub fn set_filter(&mut self, field: &str, value: impl Into<String>) -> Result<(), NdmsError> {
        let kind = self.active_type();
        self.filters.set(kind, field, value)
    }

    pub fn clear_filters(&mut self) {
        let kind = self.active_type();
        self.filters.clear(kind);
    }

    pub fn on_fetch_completed(&mut self, outcome: FetchOutcome) -> FetchDisposition {
        let FetchOutcome {
            generation,
            kind,
            result,
        } = outcome;
        if generation != self.generation || kind != self.active_type() {
            tracing::debug!(
                %generation,
                %kind,
                current = %self.generation,
                active = %self.active_type(),
                "discarding stale fetch result"
            );
            return FetchDisposition::Stale;
        }

        self.view = match result {
            Ok(records) => {
                tracing::debug!(%generation, %kind, count = records.len(), "fetch applied");
                ViewState::Loaded {
                    kind,
                    generation,
                    records,
                }
            }
            Err(cause) => {
                tracing::warn!(%generation, %kind, error = %cause, "fetch failed");
                self.set_status(cause.to_string());
                ViewState::Error {
                    kind,
                    generation,
                    cause,
                }
            }
        };
        FetchDisposition::Applied
    }

    pub fn begin_edit(&mut self, record: &Record) -> Result<(), NdmsError> {
        let kind = self.active_type();
        self.edit.begin(kind, record)?;
        Ok(())
    }

    /// Opens the edit slot on the displayed row at `index`.
    pub fn begin_edit_at(&mut self, index: usize) -> Result<(), NdmsError> {
        let kind = self.active_type();
        let record = self
            .view
            .records()
            .get(index)
            .ok_or(NdmsError::NoSuchRow { index })?;
        self.edit.begin(kind, record)?;
        Ok(())
    }

    pub fn set_edit_field(&mut self, field: &str, value: impl Into<String>) -> Result<(), NdmsError> {
        self.edit.set_field(field, value)
    }

    pub fn cancel_edit(&mut self) -> bool {
        self.edit.cancel().is_some()
    }

    pub fn commit_edit(&mut self) -> Result<CommitTicket, NdmsError> {
        let ticket = self.edit.prepare_commit()?;
        tracing::info!(kind = %ticket.kind, identity = %ticket.identity, "commit issued");
        Ok(ticket)
    }

    /// Success refreshes the active listing when the commit belongs to it.
    /// Failure keeps the session and reports the backend's message.
    pub fn on_commit_completed(
        &mut self,
        ticket: &CommitTicket,
        result: Result<Record, NdmsError>,
    ) -> Result<Option<FetchTicket>, NdmsError> {
        match self.edit.finish_commit(ticket, result) {
            Ok(_) => {
                self.set_status(format!("saved {} {}", ticket.kind, ticket.identity));
                if ticket.kind == self.active_type() {
                    Ok(Some(self.apply_filters()))
                } else {
                    Ok(None)
                }
            }
            Err(error) => {
                self.set_status(error.to_string());
                Err(error)
            }
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_line = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status_line = None;
    }

    fn issue(&mut self, kind: DisasterType, mode: FetchMode) -> FetchTicket {
        self.generation = self.generation.next();
        self.view = ViewState::Loading {
            kind,
            generation: self.generation,
        };
        FetchTicket {
            generation: self.generation,
            kind,
            mode,
        }
    }
}
