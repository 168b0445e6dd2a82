use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::config::AvailabilityConfig;
use crate::limits::*;
use crate::model::*;
use crate::observability::*;
use crate::schedule::parse_hhmm;

use super::capacity::{resolve_ceiling, CapacityTarget};
use super::closures::{ClosureCheck, ClosureEvaluator};
use super::consumption::{consumption, OccupancyIndex, ReservationFilter};
use super::loader::{DataLoader, Snapshot};
use super::payload::{build_response, build_slot, DayAvailability, SlotPayload, SlotsResponse};
use super::status::determine_status;
use super::tables::{suggest_tables, TableSuggestion};
use super::{Availability, EngineError, SlotCriteria};

/// Meal key reported by day queries when no meals are configured.
pub const ALL_DAY_MEAL: &str = "all";

struct Request<'a> {
    date: NaiveDate,
    party: u32,
    meal: Option<&'a MealDefinition>,
    room: Option<Ulid>,
    table: Option<Ulid>,
    location: Option<&'a str>,
    assign_tables: bool,
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<NaiveDate, EngineError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::validation(field, "required"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| EngineError::validation(field, format!("expected YYYY-MM-DD, got {raw:?}")))
}

fn parse_party(raw: Option<i64>) -> Result<u32, EngineError> {
    let party = raw.ok_or_else(|| EngineError::validation("party", "required"))?;
    if party <= 0 {
        return Err(EngineError::validation("party", "must be a positive integer"));
    }
    u32::try_from(party)
        .ok()
        .filter(|p| *p <= MAX_PARTY_SIZE)
        .ok_or(EngineError::LimitExceeded("party too large"))
}

fn parse_filter_id(field: &'static str, raw: Option<&str>) -> Result<Option<Ulid>, EngineError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.len() > MAX_FILTER_ID_LEN {
        return Err(EngineError::validation(field, "identifier too long"));
    }
    Ulid::from_string(raw)
        .map(Some)
        .map_err(|_| EngineError::validation(field, format!("not a valid identifier: {raw:?}")))
}

fn record<T>(operation: &'static str, result: &Result<T, EngineError>, started: Instant) {
    metrics::counter!(QUERIES_TOTAL, "operation" => operation, "status" => status_label(result))
        .increment(1);
    metrics::histogram!(QUERY_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

fn degraded(reason: &'static str, detail: &str) {
    warn!("answering with no availability: {detail}");
    metrics::counter!(DEGRADED_TOTAL, "reason" => reason).increment(1);
}

// ── Scope resolution ────────────────────────────────────────────

/// What the request's filters resolved to. `None` means the filter matched nothing seatable.
enum Target<'a> {
    Pool(Vec<&'a Room>),
    Room(Ulid, Option<&'a Room>),
    Table(Ulid, Option<&'a Table>),
}

fn resolve_target<'a>(
    snapshot: &'a Snapshot,
    room: Option<Ulid>,
    table: Option<Ulid>,
    location: Option<&str>,
) -> Target<'a> {
    // Untagged rooms serve every location.
    let located = |r: &Room| {
        location.is_none_or(|loc| r.location_id.as_deref().is_none_or(|l| l == loc))
    };

    if let Some(table_id) = table {
        let found = snapshot.table(table_id).filter(|t| {
            t.is_seatable()
                && room.is_none_or(|r| r == t.room_id)
                && snapshot.room(t.room_id).is_some_and(|r| located(r))
        });
        return Target::Table(table_id, found);
    }
    if let Some(room_id) = room {
        return Target::Room(room_id, snapshot.room(room_id).filter(|r| located(r)));
    }
    Target::Pool(snapshot.rooms.iter().filter(|r| located(r)).collect())
}

// ── Per-slot evaluation ─────────────────────────────────────────

/// Evaluates slots of one scope against one snapshot.
struct SlotEvaluator<'a> {
    config: &'a AvailabilityConfig,
    snapshot: &'a Snapshot,
    index: OccupancyIndex<'a>,
    closures: ClosureEvaluator<'a>,
    target: Target<'a>,
    pool_ids: Vec<Ulid>,
    location: Option<&'a str>,
}

impl<'a> SlotEvaluator<'a> {
    fn new(
        config: &'a AvailabilityConfig,
        snapshot: &'a Snapshot,
        target: Target<'a>,
        location: Option<&'a str>,
    ) -> Self {
        let pool_ids = match &target {
            Target::Pool(rooms) => rooms.iter().map(|r| r.id).collect(),
            _ => Vec::new(),
        };
        Self {
            config,
            snapshot,
            index: OccupancyIndex::new(&snapshot.reservations, config.turnover, config.buffer_before),
            closures: ClosureEvaluator::new(&snapshot.closures, &snapshot.rooms, &snapshot.tables),
            target,
            pool_ids,
            location,
        }
    }

    fn scope(&self) -> Scope {
        match &self.target {
            Target::Pool(_) => Scope::Restaurant,
            Target::Room(id, _) => Scope::Room(*id),
            Target::Table(id, table) => Scope::Table {
                table_id: *id,
                room_id: table.map_or(Ulid::nil(), |t| t.room_id),
            },
        }
    }

    fn capacity_target(&self) -> CapacityTarget<'_> {
        match &self.target {
            Target::Pool(rooms) => CapacityTarget::Pool(rooms),
            Target::Room(_, Some(room)) => CapacityTarget::Room(room),
            Target::Table(_, Some(table)) => CapacityTarget::Table(table),
            Target::Room(_, None) | Target::Table(_, None) => CapacityTarget::Nothing,
        }
    }

    /// Room and table scopes count every booking placed there, whatever its location tag.
    fn reservation_filter<'s>(&'s self, check: &'s ClosureCheck) -> ReservationFilter<'s> {
        match &self.target {
            Target::Pool(_) => ReservationFilter {
                location: self.location,
                rooms: Some(self.pool_ids.as_slice()),
                excluded_rooms: Some(&check.closed_rooms),
                ..Default::default()
            },
            Target::Room(id, _) => ReservationFilter {
                room: Some(*id),
                ..Default::default()
            },
            Target::Table(id, _) => ReservationFilter {
                table: Some(*id),
                ..Default::default()
            },
        }
    }

    /// `[slot start, slot start + turnover)` on `date`.
    fn window(&self, date: NaiveDate, minute_of_day: u32) -> Span {
        Span::starting_at(day_start(date) + i64::from(minute_of_day), self.config.turnover)
    }

    fn check(&self, date: NaiveDate, window: &Span) -> ClosureCheck {
        self.closures.evaluate(self.scope(), &self.pool_ids, date, window)
    }

    fn evaluate(&self, date: NaiveDate, minute_of_day: u32, party: u32, assign_tables: bool) -> SlotPayload {
        metrics::counter!(SLOTS_EVALUATED_TOTAL).increment(1);
        let low = self.config.low_availability;
        let window = self.window(date, minute_of_day);
        let check = self.check(date, &window);
        if check.is_blocked() {
            return build_slot(minute_of_day, determine_status(&check.reasons, 0, 0, party, low), None);
        }

        let usage = consumption(&self.index, &self.reservation_filter(&check), &window);
        let ceiling = resolve_ceiling(self.capacity_target(), &check, usage, self.config);
        let determination = determine_status(&[], ceiling, usage.seats, party, low);

        let tables = (assign_tables && determination.status.is_bookable())
            .then(|| self.suggest(party, &check, &window));
        build_slot(minute_of_day, determination, tables)
    }

    /// Seatable tables in scope that are neither closed nor held during `window`.
    /// Table occupancy is physical, so the location filter does not apply here.
    fn suggest(&self, party: u32, check: &ClosureCheck, window: &Span) -> TableSuggestion {
        let held: BTreeSet<Ulid> = self
            .index
            .overlapping(window)
            .filter_map(|r| r.table_id)
            .collect();
        let candidates: Vec<&Table> = self
            .snapshot
            .tables
            .iter()
            .filter(|t| {
                t.is_seatable()
                    && !held.contains(&t.id)
                    && !check.closed_tables.contains(&t.id)
                    && !check.closed_rooms.contains(&t.room_id)
                    && match &self.target {
                        Target::Pool(rooms) => rooms.iter().any(|r| r.id == t.room_id),
                        Target::Room(id, _) => t.room_id == *id,
                        Target::Table(id, _) => t.id == *id,
                    }
            })
            .collect();
        suggest_tables(party, &candidates, &self.snapshot.rooms)
    }
}

// ── Public operations ───────────────────────────────────────────

impl Availability {
    fn validate<'c>(&'c self, criteria: &'c SlotCriteria) -> Result<Request<'c>, EngineError> {
        let date = parse_date("date", criteria.date.as_deref())?;
        let party = parse_party(criteria.party)?;
        let meal = match criteria.meal.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(key) => Some(
                self.config
                    .meal(key)
                    .ok_or_else(|| EngineError::validation("meal", format!("unknown meal {key:?}")))?,
            ),
            None => None,
        };
        Ok(Request {
            date,
            party,
            meal,
            room: parse_filter_id("room", criteria.room.as_deref())?,
            table: parse_filter_id("table", criteria.table.as_deref())?,
            location: criteria
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty()),
            assign_tables: criteria.assign_tables,
        })
    }

    /// Slot start minutes for `date`: each service window stepped by the slot interval
    /// from its start, kept only inside the meal's range when a meal is given.
    pub(crate) fn candidate_minutes(&self, date: NaiveDate, meal: Option<&MealDefinition>) -> Vec<u32> {
        let weekday = date.weekday();
        if meal.is_some_and(|m| !m.runs_on(weekday)) {
            return Vec::new();
        }
        let step = self.config.slot_interval.max(1);
        let mut minutes = Vec::new();
        for w in self.schedule.windows(weekday) {
            let mut m = w.start;
            while m < w.end && minutes.len() < MAX_SLOTS_PER_DAY {
                if meal.is_none_or(|meal| meal.covers(m)) {
                    minutes.push(m);
                }
                let Some(next) = m.checked_add(step) else {
                    break;
                };
                m = next;
            }
        }
        minutes.sort_unstable();
        minutes.dedup();
        minutes
    }

    async fn load(&self, from: NaiveDate, to: NaiveDate) -> Result<Snapshot, EngineError> {
        let snapshot = DataLoader::new(self.store.as_ref()).load(from, to).await?;
        if snapshot.rooms.is_empty() {
            degraded("no_active_rooms", "no active room configured");
        }
        Ok(snapshot)
    }

    /// Status of every candidate slot on one date for one party.
    pub async fn find_slots(&self, criteria: &SlotCriteria) -> Result<SlotsResponse, EngineError> {
        let started = Instant::now();
        let result = self.find_slots_inner(criteria).await;
        record(OP_FIND_SLOTS, &result, started);
        result
    }

    async fn find_slots_inner(&self, criteria: &SlotCriteria) -> Result<SlotsResponse, EngineError> {
        let req = self.validate(criteria)?;
        if self.schedule.is_empty() {
            degraded("empty_schedule", "service hours define no window");
            return Ok(build_response(Vec::new()));
        }

        let snapshot = self.load(req.date, req.date).await?;
        let minutes = self.candidate_minutes(req.date, req.meal);
        let target = resolve_target(&snapshot, req.room, req.table, req.location);
        let evaluator = SlotEvaluator::new(&self.config, &snapshot, target, req.location);

        let slots: Vec<SlotPayload> = minutes
            .into_iter()
            .map(|m| evaluator.evaluate(req.date, m, req.party, req.assign_tables))
            .collect();
        debug!(
            "find_slots {} party={} meal={:?}: {} slots",
            req.date,
            req.party,
            req.meal.map(|m| m.key.as_str()),
            slots.len()
        );
        Ok(build_response(slots))
    }

    /// Per date and meal, whether any slot can seat a party of one.
    pub async fn find_available_days_for_all_meals(
        &self,
        from: &str,
        to: &str,
    ) -> Result<DayAvailability, EngineError> {
        self.find_available_days(from, to, 1).await
    }

    /// Per date and meal, whether any slot can seat `party`.
    pub async fn find_available_days(
        &self,
        from: &str,
        to: &str,
        party: i64,
    ) -> Result<DayAvailability, EngineError> {
        let started = Instant::now();
        let result = self.find_available_days_inner(from, to, party).await;
        record(OP_FIND_DAYS, &result, started);
        result
    }

    async fn find_available_days_inner(
        &self,
        from: &str,
        to: &str,
        party: i64,
    ) -> Result<DayAvailability, EngineError> {
        let from = parse_date("from", Some(from))?;
        let to = parse_date("to", Some(to))?;
        let party = parse_party(Some(party))?;
        if to < from {
            return Err(EngineError::validation("to", "must not be before `from`"));
        }
        let days = (to - from).num_days() + 1;
        if days > i64::from(self.config.max_query_days) {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }

        let meals: Vec<(&str, Option<&MealDefinition>)> = if self.config.meals.is_empty() {
            vec![(ALL_DAY_MEAL, None)]
        } else {
            self.config.meals.iter().map(|m| (m.key.as_str(), Some(m))).collect()
        };

        let mut result = DayAvailability::new();
        if self.schedule.is_empty() {
            degraded("empty_schedule", "service hours define no window");
            for date in from.iter_days().take(days as usize) {
                let none = meals.iter().map(|(key, _)| (key.to_string(), false)).collect();
                result.insert(date.to_string(), none);
            }
            return Ok(result);
        }

        let snapshot = self.load(from, to).await?;
        let evaluator = SlotEvaluator::new(
            &self.config,
            &snapshot,
            resolve_target(&snapshot, None, None, None),
            None,
        );

        for date in from.iter_days().take(days as usize) {
            let per_meal: BTreeMap<String, bool> = meals
                .iter()
                .map(|(key, meal)| {
                    let open = self
                        .candidate_minutes(date, *meal)
                        .into_iter()
                        .any(|m| evaluator.evaluate(date, m, party, false).status.is_bookable());
                    (key.to_string(), open)
                })
                .collect();
            result.insert(date.to_string(), per_meal);
        }
        Ok(result)
    }

    /// Table proposal for one `HH:MM` start time, under the same filters as `find_slots`.
    pub async fn suggest_tables(
        &self,
        criteria: &SlotCriteria,
        time: &str,
    ) -> Result<TableSuggestion, EngineError> {
        let started = Instant::now();
        let result = self.suggest_tables_inner(criteria, time).await;
        record(OP_SUGGEST_TABLES, &result, started);
        result
    }

    async fn suggest_tables_inner(
        &self,
        criteria: &SlotCriteria,
        time: &str,
    ) -> Result<TableSuggestion, EngineError> {
        let req = self.validate(criteria)?;
        let minute = parse_hhmm(time)
            .filter(|m| *m < MINUTES_PER_DAY)
            .ok_or_else(|| EngineError::validation("time", format!("expected HH:MM, got {time:?}")))?;

        let snapshot = self.load(req.date, req.date).await?;
        let target = resolve_target(&snapshot, req.room, req.table, req.location);
        let evaluator = SlotEvaluator::new(&self.config, &snapshot, target, req.location);
        let window = evaluator.window(req.date, minute);
        let check = evaluator.check(req.date, &window);
        if check.is_blocked() {
            return Ok(TableSuggestion::NoTableAvailable);
        }
        Ok(evaluator.suggest(req.party, &check, &window))
    }
}
