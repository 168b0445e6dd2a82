use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;
use crate::store::{AvailabilityStore, ClosureRow, ReservationRow, RoomRow, TableRow};

use super::closures::Recurrence;
use super::EngineError;

/// Everything one request reads, fetched once at call start.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Active rooms, by display order then id.
    pub rooms: Vec<Room>,
    /// Active tables, by display order then id.
    pub tables: Vec<Table>,
    pub reservations: Vec<Reservation>,
    /// Active closures, by start then id.
    pub closures: Vec<Closure>,
}

impl Snapshot {
    pub fn room(&self, id: Ulid) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn table(&self, id: Ulid) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }
}

/// Fetches rows for one request and turns them into domain values. No business logic.
pub struct DataLoader<'a> {
    store: &'a dyn AvailabilityStore,
}

impl<'a> DataLoader<'a> {
    pub fn new(store: &'a dyn AvailabilityStore) -> Self {
        Self { store }
    }

    /// Load rows for `[from, to]`. Reservations are read one day wider on each side so
    /// occupancy spilling across midnight is seen.
    pub async fn load(&self, from: NaiveDate, to: NaiveDate) -> Result<Snapshot, EngineError> {
        let wide_from = from.checked_sub_days(Days::new(1)).unwrap_or(from);
        let wide_to = to.checked_add_days(Days::new(1)).unwrap_or(to);

        let mut rooms = self
            .store
            .rooms()
            .await?
            .iter()
            .map(room_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        rooms.retain(|r| r.active);
        rooms.sort_by(|a, b| (a.display_order, a.id).cmp(&(b.display_order, b.id)));

        let mut tables = self
            .store
            .tables()
            .await?
            .iter()
            .map(table_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tables.retain(|t| t.active && rooms.iter().any(|r| r.id == t.room_id));
        tables.sort_by(|a, b| (a.display_order, a.id).cmp(&(b.display_order, b.id)));

        let table_rooms: HashMap<Ulid, Ulid> = tables.iter().map(|t| (t.id, t.room_id)).collect();
        let mut reservations = Vec::new();
        for row in self.store.reservations(wide_from, wide_to).await? {
            let mut r = reservation_from_row(&row)?;
            if !r.status.holds_seat() {
                continue;
            }
            if r.room_id.is_none() {
                r.room_id = r.table_id.and_then(|t| table_rooms.get(&t).copied());
            }
            reservations.push(r);
        }
        reservations.sort_by_key(|r| (r.start(), r.id));

        let mut closures = Vec::new();
        for row in self.store.closures(from, to).await? {
            let c = closure_from_row(&row)?;
            if !c.active {
                continue;
            }
            if let Repeat::Unparsable { rule, error } = &c.repeat {
                warn!("closure {}: ignoring unparsable recurrence {rule:?}: {error}", c.id);
                metrics::counter!(crate::observability::CLOSURE_RULE_ERRORS_TOTAL).increment(1);
            }
            closures.push(c);
        }
        closures.sort_by_key(|c| (c.start, c.id));

        debug!(
            "loaded snapshot {from}..{to}: {} rooms, {} tables, {} reservations, {} closures",
            rooms.len(),
            tables.len(),
            reservations.len(),
            closures.len()
        );

        Ok(Snapshot {
            rooms,
            tables,
            reservations,
            closures,
        })
    }
}

// ── Row conversion ──────────────────────────────────────────────

fn parse_id(kind: &'static str, row_id: &str, raw: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(raw.trim())
        .map_err(|e| EngineError::malformed(kind, row_id, format!("bad id {raw:?}: {e}")))
}

fn parse_opt_id(kind: &'static str, row_id: &str, raw: Option<&str>) -> Result<Option<Ulid>, EngineError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_id(kind, row_id, s).map(Some),
    }
}

fn non_negative(kind: &'static str, row_id: &str, field: &str, v: i64) -> Result<u32, EngineError> {
    u32::try_from(v).map_err(|_| EngineError::malformed(kind, row_id, format!("{field} out of range: {v}")))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

pub(crate) fn room_from_row(row: &RoomRow) -> Result<Room, EngineError> {
    Ok(Room {
        id: parse_id("room", &row.id, &row.id)?,
        name: row.name.clone(),
        capacity: non_negative("room", &row.id, "capacity", row.capacity)?,
        active: row.active,
        mergeable: row.mergeable,
        location_id: row.location_id.clone().filter(|l| !l.is_empty()),
        display_order: row.display_order as i32,
    })
}

pub(crate) fn table_from_row(row: &TableRow) -> Result<Table, EngineError> {
    let status = TableStatus::parse(&row.status)
        .ok_or_else(|| EngineError::malformed("table", &row.id, format!("unknown status {:?}", row.status)))?;
    let seats_max = non_negative("table", &row.id, "seats_max", row.seats_max)?;
    let seats_min = non_negative("table", &row.id, "seats_min", row.seats_min)?;
    if seats_min > seats_max {
        return Err(EngineError::malformed("table", &row.id, "seats_min above seats_max"));
    }
    Ok(Table {
        id: parse_id("table", &row.id, &row.id)?,
        room_id: parse_id("table", &row.id, &row.room_id)?,
        name: row.name.clone(),
        seats_min,
        seats_standard: non_negative("table", &row.id, "seats_standard", row.seats_standard)?,
        seats_max,
        active: row.active,
        status,
        join_group: row.join_group.clone().filter(|g| !g.trim().is_empty()),
        display_order: row.display_order as i32,
    })
}

pub(crate) fn reservation_from_row(row: &ReservationRow) -> Result<Reservation, EngineError> {
    let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::malformed("reservation", &row.id, format!("bad date {:?}: {e}", row.date)))?;
    let time = parse_time(&row.time)
        .ok_or_else(|| EngineError::malformed("reservation", &row.id, format!("bad time {:?}", row.time)))?;
    let status = ReservationStatus::parse(&row.status)
        .ok_or_else(|| EngineError::malformed("reservation", &row.id, format!("unknown status {:?}", row.status)))?;
    Ok(Reservation {
        id: parse_id("reservation", &row.id, &row.id)?,
        date,
        time,
        party: non_negative("reservation", &row.id, "party", row.party)?,
        status,
        room_id: parse_opt_id("reservation", &row.id, row.room_id.as_deref())?,
        table_id: parse_opt_id("reservation", &row.id, row.table_id.as_deref())?,
        location_id: row.location_id.clone().filter(|l| !l.is_empty()),
    })
}

pub(crate) fn closure_from_row(row: &ClosureRow) -> Result<Closure, EngineError> {
    let scope = match row.scope.trim().to_ascii_lowercase().as_str() {
        "all" | "" => ClosureScope::All,
        "room" => {
            let room = parse_opt_id("closure", &row.id, row.room_id.as_deref())?
                .ok_or_else(|| EngineError::malformed("closure", &row.id, "room scope without room_id"))?;
            ClosureScope::Room(room)
        }
        "table" => {
            let table = parse_opt_id("closure", &row.id, row.table_id.as_deref())?
                .ok_or_else(|| EngineError::malformed("closure", &row.id, "table scope without table_id"))?;
            ClosureScope::Table(table)
        }
        other => {
            return Err(EngineError::malformed("closure", &row.id, format!("unknown scope {other:?}")));
        }
    };
    let start = parse_datetime(&row.start)
        .ok_or_else(|| EngineError::malformed("closure", &row.id, format!("bad start {:?}", row.start)))?;
    let end = parse_datetime(&row.end)
        .ok_or_else(|| EngineError::malformed("closure", &row.id, format!("bad end {:?}", row.end)))?;

    let repeat = match row.recurrence.as_deref().map(str::trim) {
        None | Some("") => Repeat::Never,
        Some(rule) => match Recurrence::parse(rule) {
            Ok(r) => Repeat::Rule(r),
            Err(error) => Repeat::Unparsable {
                rule: rule.to_string(),
                error,
            },
        },
    };

    let capacity_override = row
        .capacity_override
        .map(|v| non_negative("closure", &row.id, "capacity_override", v))
        .transpose()?;

    Ok(Closure {
        id: parse_id("closure", &row.id, &row.id)?,
        scope,
        start,
        end,
        repeat,
        capacity_override,
        active: row.active,
        label: row.label.clone().filter(|l| !l.trim().is_empty()),
    })
}
