// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use ndms_api::MemoryBackend;
use ndms_app::{
    CommitTicket, DisasterType, FetchOutcome, FetchTicket, Fetcher, NdmsError, Record, Transport,
};
use ndms_testkit::DisasterFaker;
use ndms_tui::{AppRuntime, InternalEvent};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

const DEMO_SEED: u64 = 2024;
const DEMO_RECORDS_PER_TYPE: u64 = 24;
const DEMO_LATENCY: Duration = Duration::from_millis(250);

/// Runs every backend call on its own worker thread and reports back over
/// the UI channel.
pub struct WorkerRuntime<T> {
    transport: Arc<T>,
}

impl<T> WorkerRuntime<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }
}

impl WorkerRuntime<MemoryBackend> {
    /// In-memory backend seeded with deterministic records, slowed down so
    /// loading states stay visible.
    pub fn demo() -> Self {
        let backend = MemoryBackend::new().with_latency(DEMO_LATENCY);
        let mut faker = DisasterFaker::new(DEMO_SEED);
        for kind in DisasterType::ALL {
            backend.seed(kind, faker.records(kind, DEMO_RECORDS_PER_TYPE));
        }
        Self::new(backend)
    }
}

impl<T> AppRuntime for WorkerRuntime<T>
where
    T: Transport + Send + Sync + 'static,
{
    fn fetch_records(&mut self, ticket: &FetchTicket) -> FetchOutcome {
        Fetcher::new(self.transport.as_ref()).fetch(ticket)
    }

    fn commit_record(&mut self, ticket: &CommitTicket) -> Result<Record, NdmsError> {
        self.transport
            .update(ticket.kind, &ticket.identity, &ticket.payload)
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name(format!("ndms-fetch-{}", ticket.generation))
            .spawn(move || {
                let outcome = Fetcher::new(transport.as_ref()).fetch(&ticket);
                let _ = tx.send(InternalEvent::FetchCompleted(outcome));
            })
            .context("spawn fetch worker")?;
        Ok(())
    }

    fn spawn_commit(&mut self, ticket: CommitTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name(format!("ndms-commit-{}", ticket.identity))
            .spawn(move || {
                let result = transport.update(ticket.kind, &ticket.identity, &ticket.payload);
                let _ = tx.send(InternalEvent::CommitCompleted { ticket, result });
            })
            .context("spawn commit worker")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::WorkerRuntime;
    use anyhow::Result;
    use ndms_api::MemoryBackend;
    use ndms_app::{Controller, DisasterType, FetchDisposition};
    use ndms_testkit::DisasterFaker;
    use ndms_tui::{AppRuntime, InternalEvent};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn seeded(kind: DisasterType, count: u64) -> WorkerRuntime<MemoryBackend> {
        let backend = MemoryBackend::new();
        backend.seed(kind, DisasterFaker::new(5).records(kind, count));
        WorkerRuntime::new(backend)
    }

    #[test]
    fn fetch_worker_reports_back_over_channel() -> Result<()> {
        let mut runtime = seeded(DisasterType::Flood, 4);
        let mut controller = Controller::new(DisasterType::Flood);
        let (tx, rx) = mpsc::channel();

        runtime.spawn_fetch(controller.start(), tx)?;
        let outcome = match rx.recv_timeout(WAIT)? {
            InternalEvent::FetchCompleted(outcome) => outcome,
            other => panic!("expected a fetch completion, got {other:?}"),
        };
        assert_eq!(
            controller.on_fetch_completed(outcome),
            FetchDisposition::Applied
        );
        assert_eq!(controller.displayed_records().len(), 4);
        Ok(())
    }

    #[test]
    fn commit_worker_round_trips_through_backend() -> Result<()> {
        let mut runtime = seeded(DisasterType::Earthquake, 2);
        let mut controller = Controller::new(DisasterType::Earthquake);
        let (tx, rx) = mpsc::channel();

        runtime.spawn_fetch(controller.start(), tx.clone())?;
        if let InternalEvent::FetchCompleted(outcome) = rx.recv_timeout(WAIT)? {
            controller.on_fetch_completed(outcome);
        }
        controller.begin_edit_at(1)?;
        controller.set_edit_field("soil_type", "bedrock")?;
        runtime.spawn_commit(controller.commit_edit()?, tx)?;

        let InternalEvent::CommitCompleted { ticket, result } = rx.recv_timeout(WAIT)? else {
            panic!("expected a commit completion");
        };
        let refresh = controller
            .on_commit_completed(&ticket, result)?
            .expect("active type refreshes after save");
        let outcome = runtime.fetch_records(&refresh);
        controller.on_fetch_completed(outcome);
        assert_eq!(
            controller.displayed_records()[1]
                .get_path("soil_type")
                .and_then(|value| value.as_str()),
            Some("bedrock")
        );
        Ok(())
    }

    #[test]
    fn demo_runtime_seeds_every_type() {
        let mut runtime = WorkerRuntime::demo();
        for kind in DisasterType::ALL {
            let mut controller = Controller::new(kind);
            let outcome = runtime.fetch_records(&controller.start());
            controller.on_fetch_completed(outcome);
            assert_eq!(controller.displayed_records().len(), 24);
        }
    }
}
