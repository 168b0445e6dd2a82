use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::Recurrence;

/// Minutes since the Unix epoch in restaurant-local wall time. The only instant type.
pub type Minute = i64;

/// First minute of `date`.
pub fn day_start(date: NaiveDate) -> Minute {
    minute_at(date.and_time(NaiveTime::MIN))
}

pub fn minute_at(dt: NaiveDateTime) -> Minute {
    dt.and_utc().timestamp().div_euclid(60)
}

/// Render a minute-of-day offset as `HH:MM`.
pub fn format_minute_of_day(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `[start, start + minutes)`; a zero length still occupies one minute.
    pub fn starting_at(start: Minute, minutes: u32) -> Self {
        Self::new(start, start + i64::from(minutes.max(1)))
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minute) -> bool {
        self.start <= t && t < self.end
    }
}

/// A dining room. Capacity is in seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub active: bool,
    /// Whether this room's tables may be joined with tables of other merge-eligible rooms.
    pub mergeable: bool,
    pub location_id: Option<String>,
    pub display_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Maintenance,
    Retired,
}

impl TableStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" | "" => Some(Self::Available),
            "maintenance" => Some(Self::Maintenance),
            "retired" | "out_of_service" => Some(Self::Retired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: Ulid,
    pub room_id: Ulid,
    pub name: String,
    pub seats_min: u32,
    pub seats_standard: u32,
    pub seats_max: u32,
    pub active: bool,
    pub status: TableStatus,
    /// Tables sharing a label may be pushed together; a lookup key, not a parent link.
    pub join_group: Option<String>,
    pub display_order: i32,
}

impl Table {
    pub fn is_seatable(&self) -> bool {
        self.active && self.status == TableStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Visited,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    pub const SEAT_HOLDING: [ReservationStatus; 3] = [Self::Pending, Self::Confirmed, Self::Visited];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "visited" => Some(Self::Visited),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "no_show" | "noshow" => Some(Self::NoShow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Visited => "visited",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    pub fn holds_seat(&self) -> bool {
        Self::SEAT_HOLDING.contains(self)
    }
}

/// Read projection of a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party: u32,
    pub status: ReservationStatus,
    pub room_id: Option<Ulid>,
    pub table_id: Option<Ulid>,
    pub location_id: Option<String>,
}

impl Reservation {
    pub fn start(&self) -> Minute {
        minute_at(self.date.and_time(self.time))
    }

    /// `[time - buffer_before, time + turnover)`.
    pub fn occupied(&self, turnover: u32, buffer_before: u32) -> Span {
        let start = self.start();
        Span::new(
            start - i64::from(buffer_before),
            start + i64::from(turnover.max(1)),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClosureScope {
    All,
    Room(Ulid),
    Table(Ulid),
}

/// How a closure repeats. Rules that failed to parse are kept so they can be reported, never applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repeat {
    Never,
    Rule(Recurrence),
    Unparsable { rule: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub id: Ulid,
    pub scope: ClosureScope,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub repeat: Repeat,
    /// Caps seating instead of blocking when positive.
    pub capacity_override: Option<u32>,
    pub active: bool,
    pub label: Option<String>,
}

impl Closure {
    pub fn blocks(&self) -> bool {
        !matches!(self.capacity_override, Some(n) if n > 0)
    }
}

/// Granularity a slot is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Restaurant,
    Room(Ulid),
    Table { table_id: Ulid, room_id: Ulid },
}

impl Scope {
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Scope::Restaurant => None,
            Scope::Room(id) => Some(*id),
            Scope::Table { room_id, .. } => Some(*room_id),
        }
    }
}

/// Ordered by severity: `Available < Limited < Full < Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Limited,
    Full,
    Blocked,
}

impl SlotStatus {
    pub fn is_bookable(&self) -> bool {
        matches!(self, SlotStatus::Available | SlotStatus::Limited)
    }
}

/// One opening window of a weekday, in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub weekday: Weekday,
    pub start: u32,
    pub end: u32,
}

/// A configured meal service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealDefinition {
    pub key: String,
    pub label: String,
    /// Empty means every day.
    pub weekdays: Vec<Weekday>,
    pub start: u32,
    pub end: u32,
}

impl MealDefinition {
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&weekday)
    }

    pub fn covers(&self, minute_of_day: u32) -> bool {
        self.start <= minute_of_day && minute_of_day < self.end
    }
}
