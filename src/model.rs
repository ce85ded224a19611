use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
///
/// Boundary policy: an interval ending exactly when another starts does not
/// overlap it, so back-to-back reservations are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: Ms,
    pub end: Ms,
}

impl Interval {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Interval start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap predicate. Every conflict decision in the crate goes
    /// through here.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A committed reservation on a parking space. Immutable once booked; removed
/// only when the owning parking is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub principal_id: String,
    pub interval: Interval,
}

/// All state for one parking space. Guarded by an `RwLock` in the guard map;
/// nothing here locks.
#[derive(Debug, Clone)]
pub struct ParkingState {
    pub id: Ulid,
    pub owner_id: String,
    pub name: Option<String>,
    /// Committed reservations, sorted by `interval.start`.
    pub reservations: Vec<Reservation>,
}

impl ParkingState {
    pub fn new(id: Ulid, owner_id: String, name: Option<String>) -> Self {
        Self {
            id,
            owner_id,
            name,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by interval start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.interval.start, |r| r.interval.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Reservations whose interval overlaps the query window. Binary search
    /// skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Interval) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.interval.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.interval.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ParkingRegistered {
        id: Ulid,
        owner_id: String,
        name: Option<String>,
    },
    ParkingRemoved {
        id: Ulid,
    },
    ReservationBooked {
        id: Ulid,
        parking_id: Ulid,
        principal_id: String,
        interval: Interval,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingInfo {
    pub id: Ulid,
    pub owner_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub parking_id: Ulid,
    pub principal_id: String,
    pub start: Ms,
    pub end: Ms,
}
