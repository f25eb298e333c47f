use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FetchSettings;
use crate::domain::{Accession, OutputArtifact, OutputStatus};
use crate::error::SraError;
use crate::srr::SraToolkit;
use crate::store::Store;
use crate::worker::{TaskReport, TaskStatus, Worker};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub skipped: Vec<Accession>,
    pub tasks: Vec<TaskReport>,
}

impl BatchReport {
    pub fn dispatched(&self) -> Vec<&Accession> {
        self.tasks.iter().map(|task| &task.accession).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|task| !task.is_completed())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedItem {
    pub accession: Accession,
    #[serde(flatten)]
    pub artifact: OutputArtifact,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_dir: String,
    pub gzip: bool,
    pub rounds: u32,
    pub items: Vec<CompletedItem>,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub complete: Vec<Accession>,
    pub pending: Vec<Accession>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Receives progress from the driver and, concurrently, from workers.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: SraToolkit> {
    store: Store,
    toolkit: T,
    settings: FetchSettings,
}

impl<T: SraToolkit> App<T> {
    pub fn new(store: Store, toolkit: T, settings: FetchSettings) -> Self {
        Self {
            store,
            toolkit,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    /// Probes every accession without running any tool.
    pub fn plan(&self, ids: &BTreeSet<Accession>) -> Result<PlanResult, SraError> {
        let mut complete = Vec::new();
        let mut pending = Vec::new();
        for id in ids {
            match self.store.probe(id)? {
                OutputStatus::Complete(_) | OutputStatus::Repaired(_) => complete.push(id.clone()),
                OutputStatus::Missing => pending.push(id.clone()),
            }
        }
        Ok(PlanResult { complete, pending })
    }

    /// One dispatch round: sweep stale files, skip finished accessions and
    /// run the rest on a pool of `workers` threads.
    pub fn dispatch(
        &self,
        ids: &BTreeSet<Accession>,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, SraError> {
        self.store.ensure_root()?;
        self.store.sweep_stale()?;

        let PlanResult {
            complete: skipped,
            pending,
        } = self.plan(ids)?;
        if pending.is_empty() {
            return Ok(BatchReport {
                skipped,
                tasks: Vec::new(),
            });
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Dispatch; {} pending, {} already converted, {} workers",
                pending.len(),
                skipped.len(),
                self.settings.workers
            ),
            elapsed: None,
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers)
            .thread_name(|index| format!("kira-sra-worker-{index}"))
            .build()
            .map_err(|err| SraError::WorkerPool(err.to_string()))?;
        let worker = Worker::new(
            &self.toolkit,
            &self.store,
            self.settings.max_size,
            &self.settings.defline_seq,
        );

        let tasks = pool.install(|| {
            pending
                .par_iter()
                .map(|id| {
                    let start = Instant::now();
                    sink.event(ProgressEvent {
                        message: format!("phase=Fetch; {id}"),
                        elapsed: None,
                    });
                    let report = worker.fetch_and_convert(id);
                    let outcome = match &report.status {
                        TaskStatus::Completed { .. } => "done".to_string(),
                        TaskStatus::Failed { reason } => format!("failed: {reason}"),
                    };
                    sink.event(ProgressEvent {
                        message: format!("phase=Convert; {id} {outcome}"),
                        elapsed: Some(start.elapsed()),
                    });
                    report
                })
                .collect::<Vec<_>>()
        });

        let report = BatchReport { skipped, tasks };
        for failure in report.failures() {
            if let TaskStatus::Failed { reason } = &failure.status {
                warn!(accession = %failure.accession, %reason, "task failed");
            }
        }
        Ok(report)
    }

    /// Dispatches until every accession probes complete or the retry
    /// budget runs out.
    pub fn run(
        &self,
        ids: &BTreeSet<Accession>,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SraError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let mut rounds = 0u32;

        loop {
            let (items, pending) = self.verify(ids)?;
            if pending.is_empty() {
                info!(rounds, count = items.len(), "all outputs present");
                sink.event(ProgressEvent {
                    message: format!("phase=Done; {} accessions", items.len()),
                    elapsed: Some(start.elapsed()),
                });
                let report = RunReport {
                    output_dir: self.store.root().to_string(),
                    gzip: self.store.gzip(),
                    rounds,
                    items,
                    started_at,
                    finished_at: chrono::Utc::now().to_rfc3339(),
                };
                self.write_report(&report)?;
                return Ok(report);
            }

            if !self.settings.retry.allows(rounds) {
                return Err(SraError::RetryBudgetExhausted {
                    rounds,
                    pending: pending.iter().map(|id| id.to_string()).collect(),
                });
            }

            let delay = self.settings.retry.delay_before(rounds);
            if !delay.is_zero() {
                info!(pending = pending.len(), ?delay, "waiting before retry");
                std::thread::sleep(delay);
            }

            rounds += 1;
            sink.event(ProgressEvent {
                message: format!("phase=Round; round {rounds}, {} incomplete", pending.len()),
                elapsed: Some(start.elapsed()),
            });
            let batch = self.dispatch(ids, sink)?;
            debug!(
                round = rounds,
                dispatched = batch.tasks.len(),
                failed = batch.failures().count(),
                "round finished"
            );
        }
    }

    fn verify(
        &self,
        ids: &BTreeSet<Accession>,
    ) -> Result<(Vec<CompletedItem>, Vec<Accession>), SraError> {
        let mut items = Vec::new();
        let mut pending = Vec::new();
        for id in ids {
            match self.store.probe(id)? {
                OutputStatus::Complete(artifact) => items.push(CompletedItem {
                    accession: id.clone(),
                    artifact,
                }),
                OutputStatus::Repaired(_) | OutputStatus::Missing => pending.push(id.clone()),
            }
        }
        Ok((items, pending))
    }

    fn write_report(&self, report: &RunReport) -> Result<(), SraError> {
        let content = serde_json::to_vec_pretty(report)
            .map_err(|err| SraError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&self.store.report_path(), &content)
    }
}
