use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{find_conflict, require_principal, validate_interval};
use super::{Guard, GuardError, WalCommand};

impl Guard {
    pub async fn register_parking(
        &self,
        id: Ulid,
        principal: Option<&str>,
        name: Option<String>,
    ) -> Result<(), GuardError> {
        let owner = require_principal(principal)?;
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(GuardError::LimitExceeded("parking name too long"));
        }
        if self.state.len() >= MAX_PARKINGS_PER_TENANT {
            return Err(GuardError::LimitExceeded("too many parkings"));
        }
        if self.state.contains_key(&id) {
            return Err(GuardError::AlreadyExists(id));
        }

        let event = Event::ParkingRegistered {
            id,
            owner_id: owner.to_string(),
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        let ps = ParkingState::new(id, owner.to_string(), name);
        self.state.insert(id, Arc::new(RwLock::new(ps)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Remove a parking and every reservation on it, in one step. Owner only.
    /// Returns how many reservations went with it.
    pub async fn remove_parking(
        &self,
        id: Ulid,
        principal: Option<&str>,
    ) -> Result<usize, GuardError> {
        let caller = require_principal(principal)?;
        let ps = self.get_parking(&id).ok_or(GuardError::NotFound(id))?;

        // Write lock for the whole removal: bookings queued on this parking
        // resume only after the map entry is gone and re-check for it.
        let guard = ps.write().await;
        if guard.owner_id != caller {
            return Err(GuardError::Forbidden(id));
        }

        let event = Event::ParkingRemoved { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        let removed = guard.reservations.len();
        for r in &guard.reservations {
            self.reservation_index.remove(&r.id);
        }
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(removed)
    }

    /// Book a reservation: conflict check and insert under one write lock,
    /// so no other booking for this parking can interleave between them.
    pub async fn book(
        &self,
        id: Ulid,
        parking_id: Ulid,
        principal: Option<&str>,
        interval: Interval,
    ) -> Result<(), GuardError> {
        validate_interval(&interval)?;
        let principal = require_principal(principal)?;
        let ps = self
            .get_parking(&parking_id)
            .ok_or(GuardError::NotFound(parking_id))?;
        let mut guard = ps.write().await;

        // The parking may have been removed while we waited on the lock.
        if !self.state.contains_key(&parking_id) {
            return Err(GuardError::NotFound(parking_id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_PARKING {
            return Err(GuardError::LimitExceeded("too many reservations on parking"));
        }
        if self.reservation_index.contains_key(&id) {
            return Err(GuardError::AlreadyExists(id));
        }

        find_conflict(&guard, &interval)?;

        let event = Event::ReservationBooked {
            id,
            parking_id,
            principal_id: principal.to_string(),
            interval,
        };
        self.persist_and_apply(parking_id, &mut guard, &event).await
    }

    /// Rewrite the WAL with only the events needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), GuardError> {
        let mut events = Vec::new();

        for entry in self.state.iter() {
            let ps = entry.value().clone();
            let guard = match ps.try_read() {
                Ok(g) => g,
                // Contended parking: skip this cycle, its events are still in
                // the old log.
                Err(_) => return Err(GuardError::StoreUnavailable("compaction contended".into())),
            };
            events.push(Event::ParkingRegistered {
                id: guard.id,
                owner_id: guard.owner_id.clone(),
                name: guard.name.clone(),
            });
            for r in &guard.reservations {
                events.push(Event::ReservationBooked {
                    id: r.id,
                    parking_id: guard.id,
                    principal_id: r.principal_id.clone(),
                    interval: r.interval,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| GuardError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| GuardError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| GuardError::StoreUnavailable(e.to_string()))
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
