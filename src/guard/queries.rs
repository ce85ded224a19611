use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{find_conflict, merge_intervals, subtract_intervals, validate_interval};
use super::{Guard, GuardError, SharedParkingState};

impl Guard {
    /// Read-only availability probe: true iff no committed reservation
    /// overlaps the interval. An unknown parking is an error, never
    /// "available" — callers must not mistake a failed check for a yes.
    pub async fn is_available(
        &self,
        parking_id: Ulid,
        interval: Interval,
    ) -> Result<bool, GuardError> {
        validate_interval(&interval)?;
        let ps = self
            .get_parking(&parking_id)
            .ok_or(GuardError::NotFound(parking_id))?;
        let guard = ps.read().await;
        Ok(find_conflict(&guard, &interval).is_ok())
    }

    /// The free gaps in `window`: the window minus the merged committed
    /// reservations, optionally dropping gaps shorter than `min_duration`.
    pub async fn free_intervals(
        &self,
        parking_id: Ulid,
        window: Interval,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Interval>, GuardError> {
        validate_interval(&window)?;
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(GuardError::LimitExceeded("query window too wide"));
        }
        let ps = self
            .get_parking(&parking_id)
            .ok_or(GuardError::NotFound(parking_id))?;
        let guard = ps.read().await;

        let booked: Vec<Interval> = guard
            .overlapping(&window)
            .map(|r| {
                Interval::new(
                    r.interval.start.max(window.start),
                    r.interval.end.min(window.end),
                )
            })
            .collect();
        // `overlapping` yields in start order, so merge directly.
        let merged = merge_intervals(&booked);

        let mut free = subtract_intervals(&window, &merged);
        if let Some(min) = min_duration_ms {
            free.retain(|i| i.duration_ms() >= min);
        }
        Ok(free)
    }

    /// Reservations on one parking, start-ascending.
    pub async fn reservations_for_parking(
        &self,
        parking_id: Ulid,
    ) -> Result<Vec<ReservationInfo>, GuardError> {
        let ps = self
            .get_parking(&parking_id)
            .ok_or(GuardError::NotFound(parking_id))?;
        let guard = ps.read().await;
        Ok(guard
            .reservations
            .iter()
            .map(|r| ReservationInfo {
                id: r.id,
                parking_id,
                principal_id: r.principal_id.clone(),
                start: r.interval.start,
                end: r.interval.end,
            })
            .collect())
    }

    /// All reservations booked by one principal, across parkings,
    /// start-ascending (ties broken by id for a stable order).
    pub async fn reservations_for_principal(
        &self,
        principal_id: &str,
    ) -> Vec<ReservationInfo> {
        let parkings: Vec<SharedParkingState> =
            self.state.iter().map(|e| e.value().clone()).collect();

        let mut out = Vec::new();
        for ps in parkings {
            let guard = ps.read().await;
            for r in &guard.reservations {
                if r.principal_id == principal_id {
                    out.push(ReservationInfo {
                        id: r.id,
                        parking_id: guard.id,
                        principal_id: r.principal_id.clone(),
                        start: r.interval.start,
                        end: r.interval.end,
                    });
                }
            }
        }
        out.sort_by_key(|r| (r.start, r.id));
        out
    }

    pub async fn list_parkings(&self) -> Vec<ParkingInfo> {
        let parkings: Vec<SharedParkingState> =
            self.state.iter().map(|e| e.value().clone()).collect();

        let mut out = Vec::new();
        for ps in parkings {
            let guard = ps.read().await;
            out.push(ParkingInfo {
                id: guard.id,
                owner_id: guard.owner_id.clone(),
                name: guard.name.clone(),
            });
        }
        out.sort_by_key(|p| p.id);
        out
    }
}
