//! Background observation writer.
//!
//! Producers push resolved [`Observation`]s into a bounded queue. A single
//! tokio task owns one database connection and gathers records in arrival
//! order; every `records_before_commit` received records the batch is
//! written and committed in one short transaction. Each insert runs inside a
//! savepoint so a duplicate only discards that record and not the rest of
//! the batch.
//!
//! Shutdown is cooperative: after a shutdown request no new records are
//! accepted, everything already queued is written, the open batch is
//! committed and the task returns a [`WriterReport`].

use std::time::{Duration, Instant};

use sqlx::Transaction;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use xenia_common::{Observation, XeniaError, XeniaResult};

use crate::config::{DatabaseConfig, WriterConfig};
use crate::observations::insert_observation;
use crate::pool::{connect_with, query_failed, Db, DbPool};

/// How often (in received records) the queue depth is logged.
const QUEUE_DEPTH_LOG_INTERVAL: u64 = 10;

/// Lifecycle of the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Starting,
    Connecting,
    Connected,
    Draining,
    Stopping,
    Stopped,
    Failed,
}

impl WriterState {
    /// True once the task has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WriterState::Stopped | WriterState::Failed)
    }
}

impl std::fmt::Display for WriterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriterState::Starting => "starting",
            WriterState::Connecting => "connecting",
            WriterState::Connected => "connected",
            WriterState::Draining => "draining",
            WriterState::Stopping => "stopping",
            WriterState::Stopped => "stopped",
            WriterState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters returned when the writer task ends.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterReport {
    /// Records taken off the queue.
    pub received: u64,
    /// Records persisted by a successful commit.
    pub committed: u64,
    /// Records skipped because the same sensor and time was already stored.
    pub duplicates: u64,
    /// Records lost to any other error.
    pub failed: u64,
    /// Successful commits.
    pub commits: u64,
    pub state: WriterState,
    pub elapsed: Duration,
}

impl WriterReport {
    fn new() -> Self {
        Self {
            received: 0,
            committed: 0,
            duplicates: 0,
            failed: 0,
            commits: 0,
            state: WriterState::Starting,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
enum WriterMessage {
    Record(Observation),
    Shutdown,
}

/// Cloneable producer side of the writer queue.
#[derive(Debug, Clone)]
pub struct ObservationSender {
    tx: mpsc::Sender<WriterMessage>,
}

impl ObservationSender {
    /// Queue an observation, waiting while the queue is full.
    ///
    /// Fails with [`XeniaError::WriterClosed`] once shutdown was requested or
    /// the writer could not start.
    pub async fn push(&self, obs: Observation) -> XeniaResult<()> {
        self.tx
            .send(WriterMessage::Record(obs))
            .await
            .map_err(|_| XeniaError::WriterClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner of the background writer task.
#[derive(Debug)]
pub struct WriterHandle {
    sender: ObservationSender,
    state: watch::Receiver<WriterState>,
    task: JoinHandle<WriterReport>,
}

impl WriterHandle {
    /// Validate the configuration and start the writer task.
    ///
    /// Connecting happens inside the task; a connection failure moves the
    /// writer to [`WriterState::Failed`] and closes the queue.
    pub fn spawn(database: DatabaseConfig, config: WriterConfig) -> XeniaResult<Self> {
        database.validate()?;
        database.ensure_compiled()?;
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (state_tx, state_rx) = watch::channel(WriterState::Starting);

        info!(
            database = %database.database_name(),
            records_before_commit = config.records_before_commit,
            queue_capacity = config.queue_capacity,
            "Starting observation writer"
        );
        let task = tokio::spawn(run_writer(database, config, rx, state_tx));

        Ok(Self {
            sender: ObservationSender { tx },
            state: state_rx,
            task,
        })
    }

    pub async fn push(&self, obs: Observation) -> XeniaResult<()> {
        self.sender.push(obs).await
    }

    /// A producer handle usable from other tasks.
    pub fn sender(&self) -> ObservationSender {
        self.sender.clone()
    }

    pub fn state(&self) -> WriterState {
        *self.state.borrow()
    }

    /// Wait until the writer is draining or has ended.
    pub async fn ready(&mut self) -> WriterState {
        let settled = self
            .state
            .wait_for(|s| {
                !matches!(
                    s,
                    WriterState::Starting | WriterState::Connecting | WriterState::Connected
                )
            })
            .await
            .map(|state| *state);
        match settled {
            Ok(state) => state,
            // Task ended and dropped its sender; the last value still stands.
            Err(_) => *self.state.borrow(),
        }
    }

    /// Request shutdown and wait for every queued record to be handled.
    pub async fn shutdown(self) -> XeniaResult<WriterReport> {
        // A closed queue means the task is already on its way out.
        if self.sender.tx.send(WriterMessage::Shutdown).await.is_err() {
            debug!("Writer queue already closed");
        }
        drop(self.sender);

        self.task
            .await
            .map_err(|e| XeniaError::Internal(format!("Writer task failed: {}", e)))
    }
}

/// Records received since the last commit, and the run counters.
///
/// The batch is only written when it is committed, so no transaction (and
/// on SQLite no write lock) is held while the writer waits for records.
struct BatchWriter {
    pool: DbPool,
    records_before_commit: u64,
    batch: Vec<Observation>,
    report: WriterReport,
}

impl BatchWriter {
    fn new(pool: DbPool, records_before_commit: usize) -> Self {
        Self {
            pool,
            records_before_commit: records_before_commit as u64,
            batch: Vec::with_capacity(records_before_commit),
            report: WriterReport::new(),
        }
    }

    async fn write(&mut self, obs: Observation) {
        self.report.received += 1;
        self.batch.push(obs);

        if self.report.received % self.records_before_commit == 0 {
            self.commit().await;
        }
    }

    /// Write the pending records in one transaction, in arrival order.
    async fn commit(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                self.report.failed += batch.len() as u64;
                error!(records = batch.len(), error = %e, "Cannot open transaction, batch lost");
                return;
            }
        };

        let mut written = 0u64;
        for obs in &batch {
            match insert_in_savepoint(&mut tx, obs).await {
                Ok(row_id) => {
                    written += 1;
                    debug!(row_id, key = %obs.key(), "Queued observation written");
                }
                Err(e) if e.is_duplicate() => {
                    self.report.duplicates += 1;
                    error!(key = %obs.key(), "Duplicate observation rolled back, skipping");
                }
                Err(e) => {
                    self.report.failed += 1;
                    error!(key = %obs.key(), error = %e, "Failed to write observation");
                }
            }
        }

        match tx.commit().await {
            Ok(()) => {
                self.report.commits += 1;
                self.report.committed += written;
                debug!(records = written, total = self.report.committed, "Committed batch");
            }
            Err(e) => {
                self.report.failed += written;
                error!(records = written, error = %e, "Commit failed, batch lost");
            }
        }
    }
}

async fn insert_in_savepoint(tx: &mut Transaction<'static, Db>, obs: &Observation) -> XeniaResult<i64> {
    let mut savepoint = sqlx::Connection::begin(&mut **tx)
        .await
        .map_err(query_failed("multi_obs"))?;

    match insert_observation(&mut savepoint, obs).await {
        Ok(row_id) => {
            savepoint.commit().await.map_err(query_failed("multi_obs"))?;
            Ok(row_id)
        }
        Err(e) => {
            if let Err(rollback_err) = savepoint.rollback().await {
                warn!(error = %rollback_err, "Savepoint rollback failed");
            }
            Err(e)
        }
    }
}

async fn run_writer(
    database: DatabaseConfig,
    config: WriterConfig,
    mut rx: mpsc::Receiver<WriterMessage>,
    state: watch::Sender<WriterState>,
) -> WriterReport {
    let started = Instant::now();
    state.send_replace(WriterState::Connecting);

    let pool = match connect_with(&database, 1).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Writer cannot connect to database");
            rx.close();
            state.send_replace(WriterState::Failed);
            let mut report = WriterReport::new();
            report.state = WriterState::Failed;
            report.elapsed = started.elapsed();
            return report;
        }
    };

    state.send_replace(WriterState::Connected);
    info!("Writer connected");
    state.send_replace(WriterState::Draining);

    let mut writer = BatchWriter::new(pool.clone(), config.records_before_commit);
    let mut stopping = false;

    // recv() yields buffered messages after close() and ends once the queue
    // is empty and closed, or when every sender has been dropped.
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Record(obs) => {
                writer.write(obs).await;
                if writer.report.received % QUEUE_DEPTH_LOG_INTERVAL == 0 {
                    debug!(
                        queue_depth = rx.len(),
                        received = writer.report.received,
                        "Writer queue depth"
                    );
                }
            }
            WriterMessage::Shutdown => {
                if !stopping {
                    stopping = true;
                    info!(queue_depth = rx.len(), "Shutdown requested, draining remaining records");
                    state.send_replace(WriterState::Stopping);
                    rx.close();
                }
            }
        }
    }

    state.send_replace(WriterState::Stopping);
    writer.commit().await;
    pool.close().await;

    let mut report = writer.report;
    report.state = WriterState::Stopped;
    report.elapsed = started.elapsed();
    state.send_replace(WriterState::Stopped);

    info!(
        received = report.received,
        committed = report.committed,
        duplicates = report.duplicates,
        failed = report.failed,
        commits = report.commits,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Writer stopped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(WriterState::Stopped.is_terminal());
        assert!(WriterState::Failed.is_terminal());
        assert!(!WriterState::Draining.is_terminal());
        assert_eq!(WriterState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_connected_precedes_draining() {
        assert!(!WriterState::Connected.is_terminal());
        assert_eq!(WriterState::Connected.to_string(), "connected");
    }

    #[tokio::test]
    async fn test_invalid_writer_config_rejected() {
        let database = DatabaseConfig::sqlite("/tmp/xenia-writer.db").unwrap();
        let config = WriterConfig {
            records_before_commit: 0,
            queue_capacity: 8,
        };
        let err = tokio_test::assert_err!(WriterHandle::spawn(database, config));
        assert!(matches!(err, XeniaError::InvalidConfig(_)));
    }
}
