//! Drives pending partitions through the processor and advances the watermark.
//!
//! A run moves through [`RunState`]s:
//!
//! ```text
//! Idle -> Discovering -> ComputingPending -> Draining -> Committing -> Idle
//!                                        \-> Idle (nothing pending)
//! ```
//!
//! Partitions are drained strictly one at a time in ascending order. The
//! first partition failure stops the drain; only the partitions that
//! succeeded before it are committed, so the watermark always describes a
//! contiguous prefix of the pending set.
//!
//! [`Orchestrator::run`] never fails: every outcome, including aborted runs,
//! is described by the returned [`RunReport`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use ulid::Ulid;

use crate::error::{IngestError, Result};
use crate::log_partition;
use crate::logging::LogConfig;
use crate::partition::{PartitionCatalog, PartitionId};
use crate::processor::{PartitionProcessor, ProcessedOutcome};
use crate::watermark::{Watermark, WatermarkStore};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Discovering,
    ComputingPending,
    Draining,
    Committing,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::ComputingPending => "computing_pending",
            Self::Draining => "draining",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// When processed partitions are written to the watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One commit after draining. A crash mid-drain means the partitions
    /// already written are processed again on the next run, overwriting
    /// the same output keys.
    #[default]
    EndOfRun,
    /// One commit after every successful partition.
    PerPartition,
}

/// Per-run inputs.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only partitions at or before this id are processed.
    pub cutoff: Option<PartitionId>,
    /// Commit time recorded in the watermark and handed to transforms.
    /// Defaults to the time the run starts.
    pub at: Option<DateTime<Utc>>,
}

impl RunOptions {
    pub fn with_cutoff(mut self, cutoff: PartitionId) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// Serializable summary of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: String,
    pub message: String,
}

impl From<&IngestError> for RunError {
    fn from(error: &IngestError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A partition that stopped the drain, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFailure {
    pub partition: PartitionId,
    pub error: RunError,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every pending partition was processed and committed.
    Completed,
    /// The watermark already covered every discovered partition.
    NothingPending,
    /// Draining stopped at a failing partition; earlier successes were committed.
    Halted {
        partition: PartitionId,
        error: RunError,
    },
    /// A shutdown was requested; the successes before it were committed.
    Cancelled,
    /// The run failed outside any single partition. `halted` names the
    /// partition that stopped the drain when the failure was the commit
    /// that followed it.
    Aborted {
        stage: RunState,
        error: RunError,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        halted: Option<PartitionFailure>,
    },
}

/// Structured result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Ulid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Partitions processed this run, in processing order.
    pub processed: Vec<ProcessedOutcome>,
    /// Discovered partitions skipped because the watermark already held them.
    pub already_processed: Vec<PartitionId>,
    /// Pending partitions left for a later run.
    pub not_attempted: Vec<PartitionId>,
    /// Partitions whose watermark records were persisted this run.
    pub committed: Vec<PartitionId>,
    pub status: RunStatus,
}

impl RunReport {
    fn new(run_id: Ulid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            processed: Vec::new(),
            already_processed: Vec::new(),
            not_attempted: Vec::new(),
            committed: Vec::new(),
            status: RunStatus::NothingPending,
        }
    }

    fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.finished_at = Utc::now();
        self
    }

    /// True when the run completed or had nothing to do.
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::NothingPending)
    }

    /// The error that stopped the run, if any.
    pub fn error(&self) -> Option<&RunError> {
        match &self.status {
            RunStatus::Halted { error, .. } | RunStatus::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Runs the incremental ingestion loop.
///
/// Assumes it is the only orchestrator writing to its watermark.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    catalog: PartitionCatalog,
    watermark_store: WatermarkStore,
    processor: PartitionProcessor,
    commit_mode: CommitMode,
    log_config: LogConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: PartitionCatalog,
        watermark_store: WatermarkStore,
        processor: PartitionProcessor,
    ) -> Self {
        Self {
            catalog,
            watermark_store,
            processor,
            commit_mode: CommitMode::default(),
            log_config: LogConfig::default(),
        }
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// Runs once with no shutdown signal.
    pub async fn run(&self, options: RunOptions) -> RunReport {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_with_shutdown(options, shutdown_rx).await
    }

    /// Runs once, stopping between partitions when `shutdown` turns `true`.
    ///
    /// The partition in flight when the signal arrives is always finished
    /// (or fails) before the run stops, and the successes so far are
    /// committed.
    #[instrument(skip_all, fields(run.id = tracing::field::Empty))]
    pub async fn run_with_shutdown(
        &self,
        options: RunOptions,
        shutdown: watch::Receiver<bool>,
    ) -> RunReport {
        let run_id = Ulid::new();
        tracing::Span::current().record("run.id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let at = options.at.unwrap_or(started_at);
        let mut report = RunReport::new(run_id, started_at);

        self.enter(RunState::Discovering);
        let catalog = match self.catalog.discover().await {
            Ok(catalog) => catalog,
            Err(e) => return self.abort(report, RunState::Discovering, &e, None),
        };

        self.enter(RunState::ComputingPending);
        let watermark = match self.watermark_store.load().await {
            Ok(watermark) => watermark,
            Err(e) => return self.abort(report, RunState::ComputingPending, &e, None),
        };
        let pending = watermark.pending(&catalog, options.cutoff.as_ref());
        report.already_processed = catalog
            .iter()
            .filter(|id| watermark.contains(id))
            .cloned()
            .collect();

        info!(
            discovered = catalog.len(),
            already_processed = report.already_processed.len(),
            pending = pending.len(),
            cutoff = ?options.cutoff.as_ref().map(PartitionId::as_str),
            "Computed pending partitions"
        );

        if pending.is_empty() {
            self.enter(RunState::Idle);
            return report.finish(RunStatus::NothingPending);
        }

        self.enter(RunState::Draining);
        let mut watermark = watermark;
        let mut succeeded = Vec::new();
        let mut halted = None;
        let mut cancelled = false;
        let mut remaining = pending.into_iter();

        while let Some(id) = remaining.next() {
            if *shutdown.borrow() {
                warn!(partition.id = %id, "Shutdown requested, leaving remaining partitions pending");
                cancelled = true;
                report.not_attempted.push(id);
                break;
            }

            match self.process_partition(&id, at).await {
                Ok(outcome) => {
                    report.processed.push(outcome);
                    if self.commit_mode == CommitMode::PerPartition {
                        self.enter(RunState::Committing);
                        match self.commit(&watermark, std::slice::from_ref(&id), at).await {
                            Ok(next) => {
                                watermark = next;
                                report.committed.push(id);
                            }
                            Err(e) => {
                                report.not_attempted.extend(remaining);
                                return self.abort(report, RunState::Committing, &e, None);
                            }
                        }
                        self.enter(RunState::Draining);
                    } else {
                        succeeded.push(id);
                    }
                }
                Err(e) => {
                    error!(partition.id = %id, error = %e, "Partition failed, halting drain");
                    halted = Some(PartitionFailure {
                        partition: id,
                        error: RunError::from(&e),
                    });
                    break;
                }
            }
        }
        report.not_attempted.extend(remaining);

        if !succeeded.is_empty() {
            self.enter(RunState::Committing);
            match self.commit(&watermark, &succeeded, at).await {
                Ok(_) => report.committed.extend(succeeded),
                Err(e) => return self.abort(report, RunState::Committing, &e, halted),
            }
        }

        self.enter(RunState::Idle);
        let status = match halted {
            Some(PartitionFailure { partition, error }) => RunStatus::Halted { partition, error },
            None if cancelled => RunStatus::Cancelled,
            None => RunStatus::Completed,
        };
        let report = report.finish(status);
        info!(
            processed = report.processed.len(),
            committed = report.committed.len(),
            not_attempted = report.not_attempted.len(),
            success = report.is_success(),
            "Run finished"
        );
        report
    }

    async fn process_partition(
        &self,
        id: &PartitionId,
        at: DateTime<Utc>,
    ) -> Result<ProcessedOutcome> {
        let manifest = self.catalog.manifest(id).await?;
        log_partition!(
            self.log_config,
            partition.id = %id,
            files = manifest.len(),
            "Processing partition"
        );
        self.processor.process(&manifest, at).await
    }

    async fn commit(
        &self,
        watermark: &Watermark,
        ids: &[PartitionId],
        at: DateTime<Utc>,
    ) -> Result<Watermark> {
        self.watermark_store.commit(watermark, ids, at).await
    }

    fn enter(&self, state: RunState) {
        if state == RunState::Idle || state == RunState::Discovering {
            info!(run.state = %state, "Run state changed");
        } else {
            log_partition!(self.log_config, run.state = %state, "Run state changed");
        }
    }

    fn abort(
        &self,
        report: RunReport,
        stage: RunState,
        e: &IngestError,
        halted: Option<PartitionFailure>,
    ) -> RunReport {
        error!(
            run.stage = %stage,
            error = %e,
            kind = e.kind(),
            halted.partition = ?halted.as_ref().map(|h| h.partition.as_str()),
            "Run aborted"
        );
        self.enter(RunState::Idle);
        report.finish(RunStatus::Aborted {
            stage,
            error: RunError::from(e),
            halted,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::partition::PartitionNaming;
    use crate::storage::{ObjectStoreGateway, StorageGateway};
    use crate::test_utils::{read_text, seeded_store, FaultyGateway};
    use crate::watermark::DEFAULT_WATERMARK_KEY;

    fn id(s: &str) -> PartitionId {
        PartitionId::new(s).unwrap()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, day, 6, 0, 0).unwrap()
    }

    fn options(day: u32) -> RunOptions {
        RunOptions::default().with_at(at(day))
    }

    fn orchestrator(
        source: Arc<dyn StorageGateway>,
        destination: Arc<dyn StorageGateway>,
    ) -> Orchestrator {
        Orchestrator::new(
            PartitionCatalog::new(source.clone(), PartitionNaming::default())
                .with_reserved_key(DEFAULT_WATERMARK_KEY),
            WatermarkStore::new(source.clone(), DEFAULT_WATERMARK_KEY),
            PartitionProcessor::new(source, destination),
        )
    }

    async fn committed_ids(store: Arc<dyn StorageGateway>) -> Vec<PartitionId> {
        WatermarkStore::new(store, DEFAULT_WATERMARK_KEY)
            .load()
            .await
            .unwrap()
            .records()
            .iter()
            .map(|record| record.partition_id.clone())
            .collect()
    }

    const WATERMARK_WITH_18: &str = "partition_id,processed_at\n2023-03-18,2023-03-19T06:00:00Z\n";

    #[tokio::test]
    async fn test_processes_only_pending_partitions() {
        let source = seeded_store(&[
            ("football-2023-03-18/data.csv", "Data1,Data2\n0,0\n"),
            ("football-2023-03-19/data1.csv", "Data1,Data2\n1,2\n"),
            ("football-2023-03-19/data2.csv", "Data1,Data2\n3,4\n"),
            (DEFAULT_WATERMARK_KEY, WATERMARK_WITH_18),
        ])
        .await;
        let destination = Arc::new(ObjectStoreGateway::in_memory());

        let report = orchestrator(source.clone(), destination.clone())
            .run(options(20))
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.is_success());
        assert_eq!(report.already_processed, vec![id("2023-03-18")]);
        assert_eq!(report.committed, vec![id("2023-03-19")]);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].rows_written, 2);

        let output = read_text(destination.as_ref(), "data/processed-data-2023-03-19.csv")
            .await
            .unwrap();
        assert_eq!(output, "Data1,Data2,is_processed\n1,2,true\n3,4,true\n");
        assert!(destination
            .get("data/processed-data-2023-03-18.csv")
            .await
            .unwrap_err()
            .is_not_found());

        assert_eq!(
            committed_ids(source.clone()).await,
            vec![id("2023-03-18"), id("2023-03-19")]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let seeded = seeded_store(&[("football-2023-03-19/data1.csv", "col1\nx\n")]).await;
        let source = Arc::new(FaultyGateway::new(seeded));
        let destination = Arc::new(ObjectStoreGateway::in_memory());
        let orchestrator = orchestrator(source.clone(), destination);

        let first = orchestrator.run(options(20)).await;
        assert_eq!(first.status, RunStatus::Completed);
        let writes_after_first = source.writes();
        assert_eq!(writes_after_first, vec![DEFAULT_WATERMARK_KEY]);

        let second = orchestrator.run(options(21)).await;
        assert_eq!(second.status, RunStatus::NothingPending);
        assert!(second.processed.is_empty());
        assert!(second.committed.is_empty());
        assert_eq!(second.already_processed, vec![id("2023-03-19")]);
        assert_eq!(source.writes(), writes_after_first);
    }

    #[tokio::test]
    async fn test_fail_fast_commits_only_prefix() {
        let source = seeded_store(&[
            ("football-2023-03-17/data.csv", "col1\nx\n"),
            ("football-2023-03-18/data1.csv", "col1\nx\n"),
            ("football-2023-03-18/data2.csv", "col2\ny\n"),
            ("football-2023-03-19/data.csv", "col1\nz\n"),
        ])
        .await;
        let destination = Arc::new(ObjectStoreGateway::in_memory());

        let report = orchestrator(source.clone(), destination.clone())
            .run(options(20))
            .await;

        match &report.status {
            RunStatus::Halted { partition, error } => {
                assert_eq!(partition, &id("2023-03-18"));
                assert_eq!(error.kind, "combine_error");
            }
            other => panic!("expected halted run, got {other:?}"),
        }
        assert!(!report.is_success());
        assert_eq!(report.committed, vec![id("2023-03-17")]);
        assert_eq!(report.not_attempted, vec![id("2023-03-19")]);
        assert_eq!(committed_ids(source.clone()).await, vec![id("2023-03-17")]);
        assert!(destination
            .get("data/processed-data-2023-03-19.csv")
            .await
            .is_err());

        // The next run resumes at the failed partition.
        let retry = orchestrator(source.clone(), destination)
            .run(options(21))
            .await;
        assert!(matches!(retry.status, RunStatus::Halted { .. }));
        assert!(retry.committed.is_empty());
        assert_eq!(retry.already_processed, vec![id("2023-03-17")]);
    }

    #[tokio::test]
    async fn test_empty_partition_is_recorded() {
        let source = seeded_store(&[("football-2023-03-19/readme.txt", "no data here")]).await;
        let destination = Arc::new(FaultyGateway::new(Arc::new(ObjectStoreGateway::in_memory())));

        let report = orchestrator(source.clone(), destination.clone())
            .run(options(20))
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.processed.len(), 1);
        assert!(report.processed[0].was_skipped);
        assert_eq!(report.processed[0].rows_written, 0);
        assert!(destination.writes().is_empty());
        assert_eq!(committed_ids(source.clone()).await, vec![id("2023-03-19")]);
    }

    #[tokio::test]
    async fn test_cutoff_limits_pending_set() {
        let source = seeded_store(&[
            ("football-2023-03-18/data.csv", "col1\nx\n"),
            ("football-2023-03-19/data.csv", "col1\ny\n"),
            ("football-2023-03-20/data.csv", "col1\nz\n"),
        ])
        .await;

        let report = orchestrator(source.clone(), Arc::new(ObjectStoreGateway::in_memory()))
            .run(options(20).with_cutoff(id("2023-03-19")))
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.committed, vec![id("2023-03-18"), id("2023-03-19")]);
        assert!(report.not_attempted.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_draining_cancels() {
        let source = seeded_store(&[
            ("football-2023-03-18/data.csv", "col1\nx\n"),
            ("football-2023-03-19/data.csv", "col1\ny\n"),
        ])
        .await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let report = orchestrator(source.clone(), Arc::new(ObjectStoreGateway::in_memory()))
            .run_with_shutdown(options(20), shutdown_rx)
            .await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(report.processed.is_empty());
        assert_eq!(
            report.not_attempted,
            vec![id("2023-03-18"), id("2023-03-19")]
        );
        assert!(source.get(DEFAULT_WATERMARK_KEY).await.is_err());
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts() {
        let seeded = seeded_store(&[("football-2023-03-19/data.csv", "col1\nx\n")]).await;
        let source = Arc::new(FaultyGateway::new(seeded).fail_list(""));

        let report = orchestrator(source.clone(), Arc::new(ObjectStoreGateway::in_memory()))
            .run(options(20))
            .await;

        match &report.status {
            RunStatus::Aborted { stage, error, .. } => {
                assert_eq!(*stage, RunState::Discovering);
                assert_eq!(error.kind, "discovery_error");
            }
            other => panic!("expected aborted run, got {other:?}"),
        }
        assert!(source.writes().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_watermark_aborts() {
        let source = Arc::new(FaultyGateway::new(
            seeded_store(&[
                ("football-2023-03-19/data.csv", "col1\nx\n"),
                (DEFAULT_WATERMARK_KEY, "something,else,entirely\n1,2,3\n"),
            ])
            .await,
        ));
        let destination = Arc::new(FaultyGateway::new(Arc::new(ObjectStoreGateway::in_memory())));

        let report = orchestrator(source.clone(), destination.clone())
            .run(options(20))
            .await;

        assert_eq!(
            report.error().map(|e| e.kind.as_str()),
            Some("watermark_corrupt_error")
        );
        assert!(matches!(
            report.status,
            RunStatus::Aborted {
                stage: RunState::ComputingPending,
                ..
            }
        ));
        assert!(source.writes().is_empty());
        assert!(destination.writes().is_empty());
    }

    #[tokio::test]
    async fn test_per_partition_commit() {
        let source = Arc::new(FaultyGateway::new(
            seeded_store(&[
                ("football-2023-03-17/data.csv", "col1\nx\n"),
                ("football-2023-03-18/data.csv", "col1\ny\n"),
                ("football-2023-03-19/data.csv", "col1\nz\n"),
            ])
            .await,
        ));
        let destination = Arc::new(
            FaultyGateway::new(Arc::new(ObjectStoreGateway::in_memory()))
                .fail_put("data/processed-data-2023-03-19.csv"),
        );

        let report = orchestrator(source.clone(), destination)
            .with_commit_mode(CommitMode::PerPartition)
            .run(options(20))
            .await;

        assert!(matches!(report.status, RunStatus::Halted { .. }));
        assert_eq!(report.committed, vec![id("2023-03-17"), id("2023-03-18")]);
        assert_eq!(
            source.writes(),
            vec![DEFAULT_WATERMARK_KEY, DEFAULT_WATERMARK_KEY]
        );
        assert_eq!(
            committed_ids(source.clone()).await,
            vec![id("2023-03-17"), id("2023-03-18")]
        );
    }

    #[tokio::test]
    async fn test_commit_failure_aborts() {
        let source = Arc::new(
            FaultyGateway::new(seeded_store(&[("football-2023-03-19/data.csv", "col1\nx\n")]).await)
                .fail_put(DEFAULT_WATERMARK_KEY),
        );

        let report = orchestrator(source, Arc::new(ObjectStoreGateway::in_memory()))
            .run(options(20))
            .await;

        assert!(matches!(
            report.status,
            RunStatus::Aborted {
                stage: RunState::Committing,
                ..
            }
        ));
        assert_eq!(report.processed.len(), 1);
        assert!(report.committed.is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_after_halt_keeps_halted_partition() {
        let source = Arc::new(
            FaultyGateway::new(
                seeded_store(&[
                    ("football-2023-03-17/data.csv", "col1\nx\n"),
                    ("football-2023-03-18/data1.csv", "col1\nx\n"),
                    ("football-2023-03-18/data2.csv", "col2\ny\n"),
                    ("football-2023-03-19/data.csv", "col1\nz\n"),
                ])
                .await,
            )
            .fail_put(DEFAULT_WATERMARK_KEY),
        );

        let report = orchestrator(source, Arc::new(ObjectStoreGateway::in_memory()))
            .run(options(20))
            .await;

        match &report.status {
            RunStatus::Aborted {
                stage,
                error,
                halted: Some(halted),
            } => {
                assert_eq!(*stage, RunState::Committing);
                assert_eq!(error.kind, "storage_error");
                assert_eq!(halted.partition, id("2023-03-18"));
                assert_eq!(halted.error.kind, "combine_error");
            }
            other => panic!("expected aborted run naming the halted partition, got {other:?}"),
        }
        assert_eq!(report.processed.len(), 1);
        assert!(report.committed.is_empty());
        assert_eq!(report.not_attempted, vec![id("2023-03-19")]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["halted"]["partition"], "2023-03-18");
    }

    /// Raises the shutdown signal as soon as a partition object is read.
    #[derive(Debug)]
    struct ShutdownOnRead {
        inner: Arc<dyn StorageGateway>,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait::async_trait]
    impl StorageGateway for ShutdownOnRead {
        async fn list(&self, prefix: &str) -> crate::storage::StorageResult<Vec<String>> {
            self.inner.list(prefix).await
        }

        async fn get(&self, key: &str) -> crate::storage::StorageResult<bytes::Bytes> {
            if key.starts_with("football-") {
                let _ = self.shutdown.send(true);
            }
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, data: bytes::Bytes) -> crate::storage::StorageResult<()> {
            self.inner.put(key, data).await
        }

        fn description(&self) -> String {
            self.inner.description()
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_drain_finishes_in_flight_partition() {
        let seeded = seeded_store(&[
            ("football-2023-03-17/data.csv", "col1\nx\n"),
            ("football-2023-03-18/data.csv", "col1\ny\n"),
            ("football-2023-03-19/data.csv", "col1\nz\n"),
        ])
        .await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let source: Arc<dyn StorageGateway> = Arc::new(ShutdownOnRead {
            inner: seeded.clone(),
            shutdown: shutdown_tx,
        });
        let destination = Arc::new(ObjectStoreGateway::in_memory());

        let report = orchestrator(source, destination.clone())
            .run_with_shutdown(options(20), shutdown_rx)
            .await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(!report.is_success());
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].partition_id, id("2023-03-17"));
        assert_eq!(report.committed, vec![id("2023-03-17")]);
        assert_eq!(
            report.not_attempted,
            vec![id("2023-03-18"), id("2023-03-19")]
        );
        assert!(destination
            .get("data/processed-data-2023-03-17.csv")
            .await
            .is_ok());
        assert_eq!(committed_ids(seeded).await, vec![id("2023-03-17")]);
    }

    #[test]
    fn test_report_serializes_status() {
        let report = RunReport::new(Ulid::new(), at(20)).finish(RunStatus::Halted {
            partition: id("2023-03-18"),
            error: RunError {
                kind: "write_error".to_string(),
                message: "boom".to_string(),
            },
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["status"], "halted");
        assert_eq!(json["status"]["partition"], "2023-03-18");
        assert_eq!(json["status"]["error"]["kind"], "write_error");
    }
}
