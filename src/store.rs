use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::ReservationStatus;

// ── Raw rows, as a SQL driver hands them over ────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub mergeable: bool,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub room_id: String,
    pub name: String,
    #[serde(default)]
    pub seats_min: i64,
    #[serde(default)]
    pub seats_standard: i64,
    pub seats_max: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub join_group: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRow {
    pub id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` or `HH:MM:SS`
    pub time: String,
    pub party: i64,
    pub status: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRow {
    pub id: String,
    /// `all`, `room` or `table`
    pub scope: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    /// `YYYY-MM-DD HH:MM`
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub capacity_override: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Read contract of the relational store. No writes originate here.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn rooms(&self) -> Result<Vec<RoomRow>, EngineError>;

    async fn tables(&self) -> Result<Vec<TableRow>, EngineError>;

    /// Seat-holding reservations dated within `[from, to]`.
    async fn reservations(&self, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<ReservationRow>, EngineError>;

    /// Closures overlapping `[from 00:00, to + 1 day 00:00)`, plus every recurring closure.
    async fn closures(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ClosureRow>, EngineError>;
}

/// The four collections in one document, used to seed an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub rooms: Vec<RoomRow>,
    #[serde(default)]
    pub tables: Vec<TableRow>,
    #[serde(default)]
    pub reservations: Vec<ReservationRow>,
    #[serde(default)]
    pub closures: Vec<ClosureRow>,
}

/// Concurrent in-memory rows keyed by id. Query results come back ordered by id.
pub struct InMemoryStore {
    rooms: DashMap<String, RoomRow>,
    tables: DashMap<String, TableRow>,
    reservations: DashMap<String, ReservationRow>,
    closures: DashMap<String, ClosureRow>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            tables: DashMap::new(),
            reservations: DashMap::new(),
            closures: DashMap::new(),
        }
    }

    pub fn from_snapshot(snapshot: SnapshotFile) -> Self {
        let store = Self::new();
        snapshot.rooms.into_iter().for_each(|r| store.insert_room(r));
        snapshot.tables.into_iter().for_each(|t| store.insert_table(t));
        snapshot
            .reservations
            .into_iter()
            .for_each(|r| store.insert_reservation(r));
        snapshot.closures.into_iter().for_each(|c| store.insert_closure(c));
        store
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let snapshot: SnapshotFile = serde_json::from_str(json)
            .map_err(|e| EngineError::DataAccess(format!("snapshot: {e}")))?;
        Ok(Self::from_snapshot(snapshot))
    }

    // ── Row upserts ──────────────────────────────────────────

    pub fn insert_room(&self, row: RoomRow) {
        self.rooms.insert(row.id.clone(), row);
    }

    pub fn insert_table(&self, row: TableRow) {
        self.tables.insert(row.id.clone(), row);
    }

    pub fn insert_reservation(&self, row: ReservationRow) {
        self.reservations.insert(row.id.clone(), row);
    }

    pub fn insert_closure(&self, row: ClosureRow) {
        self.closures.insert(row.id.clone(), row);
    }

    pub fn remove_reservation(&self, id: &str) -> Option<ReservationRow> {
        self.reservations.remove(id).map(|(_, row)| row)
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}

fn sorted_by_id<T: Clone>(map: &DashMap<String, T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut rows: Vec<(String, T)> = map
        .iter()
        .filter(|e| keep(e.value()))
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows.into_iter().map(|(_, row)| row).collect()
}

#[async_trait]
impl AvailabilityStore for InMemoryStore {
    async fn rooms(&self) -> Result<Vec<RoomRow>, EngineError> {
        Ok(sorted_by_id(&self.rooms, |_| true))
    }

    async fn tables(&self) -> Result<Vec<TableRow>, EngineError> {
        Ok(sorted_by_id(&self.tables, |_| true))
    }

    async fn reservations(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReservationRow>, EngineError> {
        // ISO dates compare correctly as text, the same way the SQL filter does.
        let from = from.to_string();
        let to = to.to_string();
        Ok(sorted_by_id(&self.reservations, |r| {
            r.date.as_str() >= from.as_str()
                && r.date.as_str() <= to.as_str()
                && ReservationStatus::parse(&r.status).is_some_and(|s| s.holds_seat())
        }))
    }

    async fn closures(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ClosureRow>, EngineError> {
        let range_start = from.to_string();
        let range_end = to
            .checked_add_days(Days::new(1))
            .ok_or(EngineError::LimitExceeded("date out of range"))?
            .to_string();
        Ok(sorted_by_id(&self.closures, |c| {
            c.recurrence.as_deref().is_some_and(|r| !r.trim().is_empty())
                || (c.start.as_str() < range_end.as_str() && c.end.as_str() > range_start.as_str())
        }))
    }
}
