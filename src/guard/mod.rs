mod error;
mod mutations;
mod overlap;
mod queries;

pub use error::GuardError;
pub use overlap::{merge_intervals, subtract_intervals};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedParkingState = Arc<RwLock<ParkingState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task owning the WAL, batching appends for group commit:
/// block for the first append, drain whatever else is already queued, one
/// fsync for the whole batch, then acknowledge every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch (these callers were told it failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
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

/// The reservation guard: all parking and reservation state for one tenant.
///
/// Conflict checks and inserts for a parking always run under that parking's
/// write lock, so two concurrent bookings for overlapping intervals can never
/// both pass the check.
pub struct Guard {
    pub state: DashMap<Ulid, SharedParkingState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → parking id. Also the dedup set that
    /// turns a retried insert into `AlreadyExists` instead of a double.
    pub(super) reservation_index: DashMap<Ulid, Ulid>,
}

/// Apply a booked-reservation event to a parking. No locking — the caller
/// holds the lock.
fn apply_booking(ps: &mut ParkingState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    if let Event::ReservationBooked {
        id,
        parking_id,
        principal_id,
        interval,
    } = event
    {
        ps.insert_reservation(Reservation {
            id: *id,
            principal_id: principal_id.clone(),
            interval: *interval,
        });
        index.insert(*id, *parking_id);
    }
}

impl Guard {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let guard = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            reservation_index: DashMap::new(),
        };

        // Replay — sole owner of every Arc here, so try_write always succeeds
        // instantly. Never block_on inside an async context (lazy tenant
        // creation runs this on a runtime thread).
        for event in &events {
            match event {
                Event::ParkingRegistered { id, owner_id, name } => {
                    let ps = ParkingState::new(*id, owner_id.clone(), name.clone());
                    guard.state.insert(*id, Arc::new(RwLock::new(ps)));
                }
                Event::ParkingRemoved { id } => {
                    if let Some((_, ps)) = guard.state.remove(id) {
                        let g = ps.try_read().expect("replay: uncontended read");
                        for r in &g.reservations {
                            guard.reservation_index.remove(&r.id);
                        }
                    }
                }
                Event::ReservationBooked { parking_id, .. } => {
                    if let Some(entry) = guard.state.get(parking_id) {
                        let ps = entry.value().clone();
                        let mut g = ps.try_write().expect("replay: uncontended write");
                        apply_booking(&mut g, event, &guard.reservation_index);
                    }
                }
            }
        }

        Ok(guard)
    }

    /// Write an event through the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), GuardError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| GuardError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| GuardError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| GuardError::StoreUnavailable(e.to_string()))
    }

    pub fn get_parking(&self, id: &Ulid) -> Option<SharedParkingState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn parking_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append + in-memory apply + notify, in that order, all while the
    /// caller holds the parking's write lock. A WAL failure leaves memory
    /// untouched.
    pub(super) async fn persist_and_apply(
        &self,
        parking_id: Ulid,
        ps: &mut ParkingState,
        event: &Event,
    ) -> Result<(), GuardError> {
        self.wal_append(event).await?;
        apply_booking(ps, event, &self.reservation_index);
        self.notify.send(parking_id, event);
        Ok(())
    }
}
