use std::io;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use super::{BookingStore, InMemoryStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
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

/// Background task that owns the WAL and batches appends for group commit:
/// take the first Append, drain whatever else is already queued, then pay
/// for a single fsync and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!("WAL flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        // Non-append commands queued behind the batch run after it is durable.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't bleed into the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let compacted = events.len() as u64;
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file(compacted));
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// In-memory index made durable by a write-ahead log. Every change is
/// appended (and fsynced) before it becomes visible to readers.
pub struct DurableStore {
    index: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl DurableStore {
    /// Replay the log at `path` and start its writer task. Must be called
    /// from inside a tokio runtime.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let replay = Wal::replay(&path)?;
        if replay.discarded_tail {
            warn!(
                "{}: discarded torn or corrupt tail after {} events, truncating to {} bytes",
                path.display(),
                replay.events.len(),
                replay.valid_len
            );
            Wal::truncate(&path, replay.valid_len)?;
        }
        let index = InMemoryStore::new();
        for event in &replay.events {
            index.apply_event(event);
        }
        info!(
            "{}: replayed {} events, {} bookings",
            path.display(),
            replay.events.len(),
            index.booking_count()
        );

        let wal = Wal::open(&path, replay.events.len() as u64)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        Ok(Self { index, wal_tx })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the index.
    async fn persist_and_apply(&self, event: Event) -> Result<(), StoreError> {
        self.wal_append(&event).await?;
        self.index.apply_event(&event);
        Ok(())
    }

    pub fn booking_count(&self) -> usize {
        self.index.booking_count()
    }

    /// Rewrite the log with only the events needed to rebuild current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let events = self.index.snapshot_events();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} events");
        Ok(())
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

    /// Compact once the log holds more than `threshold` records. Returns
    /// whether a compaction ran.
    pub async fn compact_if_needed(&self, threshold: u64) -> Result<bool, StoreError> {
        if self.wal_appends_since_compact().await <= threshold {
            return Ok(false);
        }
        self.compact().await?;
        Ok(true)
    }
}

#[async_trait]
impl BookingStore for DurableStore {
    async fn list_bookings(&self, resource_id: &str, date: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        Ok(self.index.bookings_for(&DayKey::new(resource_id, date)))
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.index.booking(&id))
    }

    async fn save_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.index.check_day_capacity(booking)?;
        self.persist_and_apply(Event::BookingSaved {
            booking: booking.clone(),
        })
        .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.persist_and_apply(Event::AuditAppended { entry: entry.clone() })
            .await
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.index.audit_tail(limit))
    }
}
