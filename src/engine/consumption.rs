use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

/// Seats and parties occupying a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub seats: u32,
    pub parties: u32,
}

/// Seat-holding reservations keyed by occupied window, sorted by window start.
pub struct OccupancyIndex<'a> {
    entries: Vec<(Span, &'a Reservation)>,
}

impl<'a> OccupancyIndex<'a> {
    pub fn new(reservations: &'a [Reservation], turnover: u32, buffer_before: u32) -> Self {
        let mut entries: Vec<(Span, &'a Reservation)> = reservations
            .iter()
            .filter(|r| r.status.holds_seat())
            .map(|r| (r.occupied(turnover, buffer_before), r))
            .collect();
        entries.sort_by_key(|(span, r)| (span.start, r.id));
        Self { entries }
    }

    /// Reservations whose occupied window overlaps `query`.
    /// Uses binary search to skip windows starting at or after `query.end`.
    pub fn overlapping<'s>(&'s self, query: &'s Span) -> impl Iterator<Item = &'a Reservation> + 's {
        let right_bound = self.entries.partition_point(|(span, _)| span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |(span, _)| span.end > query.start)
            .map(|(_, r)| *r)
    }
}

/// Which reservations count toward a scope. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationFilter<'a> {
    pub room: Option<Ulid>,
    pub table: Option<Ulid>,
    /// Reservations tagged with another location never match. Untagged ones match
    /// only when placed in one of `rooms`.
    pub location: Option<&'a str>,
    /// Pooled rooms. Reservations placed in any other room never match; unplaced ones do.
    pub rooms: Option<&'a [Ulid]>,
    /// Rooms taken out of a pooled scope (closed for the slot).
    pub excluded_rooms: Option<&'a BTreeSet<Ulid>>,
}

impl ReservationFilter<'_> {
    pub fn matches(&self, r: &Reservation) -> bool {
        if let Some(room) = self.room
            && r.room_id != Some(room)
        {
            return false;
        }
        if let Some(table) = self.table
            && r.table_id != Some(table)
        {
            return false;
        }
        if let (Some(rooms), Some(room)) = (self.rooms, r.room_id)
            && !rooms.contains(&room)
        {
            return false;
        }
        if let Some(location) = self.location {
            let matched = match r.location_id.as_deref() {
                Some(tag) => tag == location,
                None => r
                    .room_id
                    .is_some_and(|room| self.rooms.is_some_and(|rooms| rooms.contains(&room))),
            };
            if !matched {
                return false;
            }
        }
        if let (Some(excluded), Some(room)) = (self.excluded_rooms, r.room_id)
            && excluded.contains(&room)
        {
            return false;
        }
        true
    }
}

/// Sum party sizes of matching reservations occupying `window`.
pub fn consumption(index: &OccupancyIndex<'_>, filter: &ReservationFilter<'_>, window: &Span) -> Usage {
    index
        .overlapping(window)
        .filter(|r| filter.matches(r))
        .fold(Usage::default(), |usage, r| Usage {
            seats: usage.seats.saturating_add(r.party),
            parties: usage.parties + 1,
        })
}
