mod availability;
mod conflict;
mod error;
mod ledger;
mod queries;
mod scheduler;
#[cfg(test)]
mod tests;

pub use availability::{AvailabilityCalculator, day_schedule, free_slots};
pub use error::{Missing, SchedulerError};
pub use ledger::{AppointmentLedger, AvailabilityLedger, Ledgers, PatientRegistry};
pub use scheduler::Scheduler;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, mpsc, oneshot};
use tracing::info;

use crate::model::Event;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// All events of one mutation; they land in the same flush.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (events, _) in batch {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Storage handle shared by the scheduler and the availability calculator.
///
/// All ledgers live behind one lock. Writers keep the write guard across
/// their checks, the WAL append and the in-memory apply, which makes every
/// mutation a serializable unit.
pub struct Store {
    ledgers: RwLock<Ledgers>,
    wal_tx: mpsc::Sender<WalCommand>,
    lock_timeout: Option<Duration>,
}

impl Store {
    /// Replay the WAL at `wal_path` (if any) and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut ledgers = Ledgers::default();
        for event in &events {
            ledgers.apply(event);
        }
        info!(
            events = events.len(),
            patients = ledgers.patients.len(),
            appointments = ledgers.appointments.len(),
            blocks = ledgers.exceptions.len(),
            "replayed WAL {}",
            wal_path.display()
        );

        Ok(Self {
            ledgers: RwLock::new(ledgers),
            wal_tx,
            lock_timeout: None,
        })
    }

    /// Fail operations with `Timeout` when the lock is not acquired in time.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub(crate) async fn read(&self) -> Result<RwLockReadGuard<'_, Ledgers>, SchedulerError> {
        match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, self.ledgers.read())
                .await
                .map_err(|_| SchedulerError::Timeout(limit)),
            None => Ok(self.ledgers.read().await),
        }
    }

    pub(crate) async fn write(&self) -> Result<RwLockWriteGuard<'_, Ledgers>, SchedulerError> {
        match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, self.ledgers.write())
                .await
                .map_err(|_| SchedulerError::Timeout(limit)),
            None => Ok(self.ledgers.write().await),
        }
    }

    /// Write events to the WAL via the background group-commit writer.
    async fn wal_append(&self, events: Vec<Event>) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { events, response: tx })
            .await
            .map_err(|_| SchedulerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| SchedulerError::WalError(e.to_string()))
    }

    /// WAL-append then apply. The caller holds the write guard, so nothing
    /// else sees the ledgers between the two.
    pub(crate) async fn persist_and_apply(
        &self,
        ledgers: &mut Ledgers,
        events: Vec<Event>,
    ) -> Result<(), SchedulerError> {
        self.wal_append(events.clone()).await?;
        for event in &events {
            ledgers.apply(event);
        }
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), SchedulerError> {
        // Hold the read guard until the swap is done so no mutation can land
        // in the old file after the snapshot was taken.
        let guard = self.read().await?;
        let events = guard.snapshot_events();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| SchedulerError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| SchedulerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| SchedulerError::WalError(e.to_string()));
        drop(guard);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
