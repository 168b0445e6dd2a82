use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Weekday};
use ulid::Ulid;

use crate::model::*;

// ── Recurrence rules ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Subset of RFC 5545 RRULE: `FREQ`, `INTERVAL`, `BYDAY` (daily/weekly only), `UNTIL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
    /// Bit `n` set = weekday `n` days from Monday. 0 = unrestricted.
    pub by_day: u8,
    pub until: Option<NaiveDate>,
}

fn weekday_bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

fn parse_byday(token: &str) -> Option<Weekday> {
    let day = match token.trim().to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

impl Recurrence {
    pub fn parse(rule: &str) -> Result<Self, String> {
        let rule = rule.trim();
        let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);

        let mut frequency = None;
        let mut interval = 1u32;
        let mut by_day = 0u8;
        let mut until = None;

        for part in rule.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("expected KEY=VALUE, got {part:?}"))?;
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(match value.trim().to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        other => return Err(format!("unsupported FREQ {other:?}")),
                    });
                }
                "INTERVAL" => {
                    interval = value
                        .trim()
                        .parse()
                        .map_err(|_| format!("bad INTERVAL {value:?}"))?;
                    if interval == 0 {
                        return Err("INTERVAL must be positive".into());
                    }
                }
                "BYDAY" => {
                    for token in value.split(',') {
                        let day = parse_byday(token).ok_or_else(|| format!("bad BYDAY {token:?}"))?;
                        by_day |= weekday_bit(day);
                    }
                }
                "UNTIL" => {
                    let v = value.trim();
                    let date_part = v.get(..8).ok_or_else(|| format!("bad UNTIL {v:?}"))?;
                    until = Some(
                        NaiveDate::parse_from_str(date_part, "%Y%m%d")
                            .map_err(|_| format!("bad UNTIL {v:?}"))?,
                    );
                }
                other => return Err(format!("unsupported rule part {other:?}")),
            }
        }

        let frequency = frequency.ok_or("missing FREQ")?;
        if by_day != 0 && matches!(frequency, Frequency::Monthly | Frequency::Yearly) {
            return Err("BYDAY is only supported with DAILY or WEEKLY".into());
        }
        Ok(Self {
            frequency,
            interval,
            by_day,
            until,
        })
    }

    /// Does an occurrence anchored at `anchor` fall on `date`?
    pub fn occurs_on(&self, anchor: NaiveDate, date: NaiveDate) -> bool {
        if date < anchor || self.until.is_some_and(|u| date > u) {
            return false;
        }
        let interval = i64::from(self.interval);
        match self.frequency {
            Frequency::Daily => {
                (date - anchor).num_days() % interval == 0
                    && (self.by_day == 0 || self.by_day & weekday_bit(date.weekday()) != 0)
            }
            Frequency::Weekly => {
                let days = if self.by_day == 0 {
                    weekday_bit(anchor.weekday())
                } else {
                    self.by_day
                };
                if days & weekday_bit(date.weekday()) == 0 {
                    return false;
                }
                let weeks = (week_start(date) - week_start(anchor)).num_days() / 7;
                weeks % interval == 0
            }
            Frequency::Monthly => {
                let months = (i64::from(date.year()) * 12 + i64::from(date.month0()))
                    - (i64::from(anchor.year()) * 12 + i64::from(anchor.month0()));
                date.day() == anchor.day() && months % interval == 0
            }
            Frequency::Yearly => {
                date.month() == anchor.month()
                    && date.day() == anchor.day()
                    && i64::from(date.year() - anchor.year()) % interval == 0
            }
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// Spans a closure covers around `date`: the one-off window, or the rule's daily
/// window for `date` and for the day before (a late window can run past midnight).
pub fn effective_windows(closure: &Closure, date: NaiveDate) -> [Option<Span>; 2] {
    match &closure.repeat {
        Repeat::Never => {
            let (start, end) = (minute_at(closure.start), minute_at(closure.end));
            [(start < end).then(|| Span::new(start, end)), None]
        }
        Repeat::Unparsable { .. } => [None, None],
        Repeat::Rule(rule) => {
            let anchor = closure.start.date();
            let occurrence = |day: NaiveDate| -> Option<Span> {
                if !rule.occurs_on(anchor, day) {
                    return None;
                }
                let start = day.and_time(closure.start.time());
                let mut end: NaiveDateTime = day.and_time(closure.end.time());
                if end <= start {
                    end = end.checked_add_days(Days::new(1))?;
                }
                Some(Span::new(minute_at(start), minute_at(end)))
            };
            let previous = date.pred_opt().and_then(&occurrence);
            [previous, occurrence(date)]
        }
    }
}

// ── Evaluation ──────────────────────────────────────────────────

/// Closures matching one slot window at one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureCheck {
    /// Why the evaluated scope is blocked; empty when it is open.
    pub reasons: Vec<String>,
    /// Smallest capacity override applying to the evaluated scope.
    pub capacity_cap: Option<u32>,
    /// Capacity overrides on individual rooms, for pooled ceilings.
    pub room_caps: BTreeMap<Ulid, u32>,
    pub closed_rooms: BTreeSet<Ulid>,
    pub closed_tables: BTreeSet<Ulid>,
}

impl ClosureCheck {
    pub fn is_blocked(&self) -> bool {
        !self.reasons.is_empty()
    }
}

pub struct ClosureEvaluator<'a> {
    closures: &'a [Closure],
    rooms: &'a [Room],
    tables: &'a [Table],
}

fn lower_cap(slot: &mut Option<u32>, cap: u32) {
    *slot = Some(slot.map_or(cap, |c| c.min(cap)));
}

fn describe(prefix: String, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{prefix}: {label}"),
        None => prefix,
    }
}

impl<'a> ClosureEvaluator<'a> {
    pub fn new(closures: &'a [Closure], rooms: &'a [Room], tables: &'a [Table]) -> Self {
        Self {
            closures,
            rooms,
            tables,
        }
    }

    fn room_name(&self, id: Ulid) -> String {
        self.rooms
            .iter()
            .find(|r| r.id == id)
            .map_or_else(|| id.to_string(), |r| r.name.clone())
    }

    fn table_name(&self, id: Ulid) -> String {
        self.tables
            .iter()
            .find(|t| t.id == id)
            .map_or_else(|| id.to_string(), |t| t.name.clone())
    }

    /// Evaluate every closure against `window` on `date` at `scope`.
    ///
    /// Restaurant-wide closures apply everywhere; room closures apply to the room and
    /// its tables; table closures to that table. At restaurant scope a closed room only
    /// leaves the pool, unless every room in `pool` is closed.
    pub fn evaluate(&self, scope: Scope, pool: &[Ulid], date: NaiveDate, window: &Span) -> ClosureCheck {
        let mut check = ClosureCheck::default();
        let mut room_reasons: Vec<(Ulid, String)> = Vec::new();

        for closure in self.closures.iter().filter(|c| c.active) {
            let hits = effective_windows(closure, date)
                .iter()
                .flatten()
                .any(|span| span.overlaps(window));
            if !hits {
                continue;
            }
            let label = closure.label.as_deref();

            match closure.scope {
                ClosureScope::All => {
                    if closure.blocks() {
                        check.reasons.push(describe("restaurant closed".into(), label));
                    } else if let Some(cap) = closure.capacity_override {
                        lower_cap(&mut check.capacity_cap, cap);
                    }
                }
                ClosureScope::Room(room) => {
                    let in_scope = scope.room_id() == Some(room);
                    if closure.blocks() {
                        check.closed_rooms.insert(room);
                        let reason = describe(format!("room {} closed", self.room_name(room)), label);
                        if in_scope {
                            check.reasons.push(reason);
                        } else {
                            room_reasons.push((room, reason));
                        }
                    } else if let Some(cap) = closure.capacity_override {
                        if in_scope {
                            lower_cap(&mut check.capacity_cap, cap);
                        } else {
                            let entry = check.room_caps.entry(room).or_insert(cap);
                            *entry = (*entry).min(cap);
                        }
                    }
                }
                ClosureScope::Table(table) => {
                    let in_scope = matches!(scope, Scope::Table { table_id, .. } if table_id == table);
                    if closure.blocks() {
                        check.closed_tables.insert(table);
                        if in_scope {
                            check
                                .reasons
                                .push(describe(format!("table {} closed", self.table_name(table)), label));
                        }
                    } else if let (true, Some(cap)) = (in_scope, closure.capacity_override) {
                        lower_cap(&mut check.capacity_cap, cap);
                    }
                }
            }
        }

        if scope == Scope::Restaurant
            && !pool.is_empty()
            && pool.iter().all(|r| check.closed_rooms.contains(r))
        {
            check.reasons.extend(
                room_reasons
                    .into_iter()
                    .filter(|(room, _)| pool.contains(room))
                    .map(|(_, reason)| reason),
            );
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(d: &str, h: u32, m: u32) -> NaiveDateTime {
        date(d).and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn slot(d: &str, h: u32, m: u32, minutes: u32) -> Span {
        Span::starting_at(minute_at(at(d, h, m)), minutes)
    }

    fn closure(scope: ClosureScope, start: NaiveDateTime, end: NaiveDateTime) -> Closure {
        Closure {
            id: Ulid::new(),
            scope,
            start,
            end,
            repeat: Repeat::Never,
            capacity_override: None,
            active: true,
            label: None,
        }
    }

    fn room(name: &str) -> Room {
        Room {
            id: Ulid::new(),
            name: name.into(),
            capacity: 10,
            active: true,
            mergeable: false,
            location_id: None,
            display_order: 0,
        }
    }

    // ── Recurrence ──────────────────────────────────────────

    #[test]
    fn parse_rules() {
        let r = Recurrence::parse("RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,FR;UNTIL=20241231T000000Z").unwrap();
        assert_eq!(r.frequency, Frequency::Weekly);
        assert_eq!(r.interval, 2);
        assert_eq!(r.by_day, weekday_bit(Weekday::Mon) | weekday_bit(Weekday::Fri));
        assert_eq!(r.until, Some(date("2024-12-31")));

        assert!(Recurrence::parse("INTERVAL=2").is_err());
        assert!(Recurrence::parse("FREQ=HOURLY").is_err());
        assert!(Recurrence::parse("FREQ=DAILY;COUNT=3").is_err());
        assert!(Recurrence::parse("FREQ=DAILY;INTERVAL=0").is_err());
        assert!(Recurrence::parse("FREQ=MONTHLY;BYDAY=MO").is_err());
        assert!(Recurrence::parse("FREQ=WEEKLY;BYDAY=XX").is_err());
    }

    #[test]
    fn daily_with_interval() {
        let r = Recurrence::parse("FREQ=DAILY;INTERVAL=3").unwrap();
        let anchor = date("2024-05-01");
        assert!(r.occurs_on(anchor, date("2024-05-01")));
        assert!(!r.occurs_on(anchor, date("2024-05-02")));
        assert!(r.occurs_on(anchor, date("2024-05-04")));
        assert!(!r.occurs_on(anchor, date("2024-04-28"))); // before anchor
    }

    #[test]
    fn weekly_defaults_to_anchor_weekday() {
        let r = Recurrence::parse("FREQ=WEEKLY").unwrap();
        let anchor = date("2024-05-06"); // Monday
        assert!(r.occurs_on(anchor, date("2024-05-13")));
        assert!(!r.occurs_on(anchor, date("2024-05-14")));
    }

    #[test]
    fn biweekly_by_day() {
        let r = Recurrence::parse("FREQ=WEEKLY;INTERVAL=2;BYDAY=SA,SU").unwrap();
        let anchor = date("2024-05-04"); // Saturday
        assert!(r.occurs_on(anchor, date("2024-05-05"))); // same week, Sunday
        assert!(!r.occurs_on(anchor, date("2024-05-11")));
        assert!(r.occurs_on(anchor, date("2024-05-18")));
    }

    #[test]
    fn monthly_and_yearly() {
        let monthly = Recurrence::parse("FREQ=MONTHLY").unwrap();
        let anchor = date("2024-01-31");
        assert!(monthly.occurs_on(anchor, date("2024-03-31")));
        assert!(!monthly.occurs_on(anchor, date("2024-02-29")));

        let yearly = Recurrence::parse("FREQ=YEARLY;UNTIL=20251231").unwrap();
        let anchor = date("2023-12-24");
        assert!(yearly.occurs_on(anchor, date("2024-12-24")));
        assert!(!yearly.occurs_on(anchor, date("2026-12-24"))); // past UNTIL
    }

    #[test]
    fn recurring_window_reuses_time_of_day_and_wraps_midnight() {
        let mut c = closure(ClosureScope::All, at("2024-05-01", 22, 0), at("2024-05-01", 2, 0));
        c.repeat = Repeat::Rule(Recurrence::parse("FREQ=DAILY").unwrap());
        let [prev, today] = effective_windows(&c, date("2024-05-04"));
        assert_eq!(prev, Some(Span::new(minute_at(at("2024-05-03", 22, 0)), minute_at(at("2024-05-04", 2, 0)))));
        assert_eq!(today, Some(Span::new(minute_at(at("2024-05-04", 22, 0)), minute_at(at("2024-05-05", 2, 0)))));
    }

    // ── Evaluation ──────────────────────────────────────────

    #[test]
    fn restaurant_closure_blocks_every_scope() {
        let mut c = closure(ClosureScope::All, at("2024-05-04", 18, 0), at("2024-05-04", 22, 0));
        c.label = Some("private event".into());
        let rooms = [room("Main")];
        let closures = [c];
        let ev = ClosureEvaluator::new(&closures, &rooms, &[]);

        let check = ev.evaluate(Scope::Restaurant, &[rooms[0].id], date("2024-05-04"), &slot("2024-05-04", 19, 0, 120));
        assert_eq!(check.reasons, vec!["restaurant closed: private event".to_string()]);

        let check = ev.evaluate(Scope::Room(rooms[0].id), &[], date("2024-05-04"), &slot("2024-05-04", 19, 0, 120));
        assert!(check.is_blocked());

        // Window ending at 18:00 does not touch the closure.
        let check = ev.evaluate(Scope::Restaurant, &[], date("2024-05-04"), &slot("2024-05-04", 16, 0, 120));
        assert!(!check.is_blocked());
    }

    #[test]
    fn room_closure_scoping() {
        let a = room("Terrace");
        let b = room("Main");
        let closures = [closure(ClosureScope::Room(a.id), at("2024-05-04", 0, 0), at("2024-05-05", 0, 0))];
        let rooms = [a.clone(), b.clone()];
        let ev = ClosureEvaluator::new(&closures, &rooms, &[]);
        let d = date("2024-05-04");
        let w = slot("2024-05-04", 19, 0, 90);

        let check = ev.evaluate(Scope::Room(a.id), &[], d, &w);
        assert_eq!(check.reasons, vec!["room Terrace closed".to_string()]);
        assert!(!ev.evaluate(Scope::Room(b.id), &[], d, &w).is_blocked());

        let table_in_a = Scope::Table { table_id: Ulid::new(), room_id: a.id };
        assert!(ev.evaluate(table_in_a, &[], d, &w).is_blocked());

        // Restaurant scope: the room leaves the pool, the slot stays open.
        let check = ev.evaluate(Scope::Restaurant, &[a.id, b.id], d, &w);
        assert!(!check.is_blocked());
        assert!(check.closed_rooms.contains(&a.id));

        // ...unless it was the only room.
        let check = ev.evaluate(Scope::Restaurant, &[a.id], d, &w);
        assert_eq!(check.reasons, vec!["room Terrace closed".to_string()]);
    }

    #[test]
    fn table_closure_only_blocks_its_table() {
        let a = room("Main");
        let table = Ulid::new();
        let closures = [closure(ClosureScope::Table(table), at("2024-05-04", 12, 0), at("2024-05-04", 23, 0))];
        let rooms = [a.clone()];
        let ev = ClosureEvaluator::new(&closures, &rooms, &[]);
        let d = date("2024-05-04");
        let w = slot("2024-05-04", 19, 0, 90);

        let check = ev.evaluate(Scope::Room(a.id), &[], d, &w);
        assert!(!check.is_blocked());
        assert!(check.closed_tables.contains(&table));
        assert!(ev.evaluate(Scope::Table { table_id: table, room_id: a.id }, &[], d, &w).is_blocked());
        assert!(!ev.evaluate(Scope::Table { table_id: Ulid::new(), room_id: a.id }, &[], d, &w).is_blocked());
    }

    #[test]
    fn capacity_overrides_cap_instead_of_block() {
        let a = room("Main");
        let mut all = closure(ClosureScope::All, at("2024-05-04", 18, 0), at("2024-05-04", 22, 0));
        all.capacity_override = Some(12);
        let mut tighter = closure(ClosureScope::All, at("2024-05-04", 18, 0), at("2024-05-04", 22, 0));
        tighter.capacity_override = Some(8);
        let mut on_room = closure(ClosureScope::Room(a.id), at("2024-05-04", 18, 0), at("2024-05-04", 22, 0));
        on_room.capacity_override = Some(5);
        let closures = [all, tighter, on_room];
        let rooms = [a.clone()];
        let ev = ClosureEvaluator::new(&closures, &rooms, &[]);
        let w = slot("2024-05-04", 19, 0, 60);

        let check = ev.evaluate(Scope::Restaurant, &[a.id], date("2024-05-04"), &w);
        assert!(!check.is_blocked());
        assert_eq!(check.capacity_cap, Some(8));
        assert_eq!(check.room_caps.get(&a.id), Some(&5));

        let check = ev.evaluate(Scope::Room(a.id), &[], date("2024-05-04"), &w);
        assert_eq!(check.capacity_cap, Some(5));
    }

    #[test]
    fn unparsable_and_inactive_closures_never_apply() {
        let mut broken = closure(ClosureScope::All, at("2024-05-01", 0, 0), at("2024-05-01", 23, 59));
        broken.repeat = Repeat::Unparsable {
            rule: "FREQ=SOMETIMES".into(),
            error: "unsupported FREQ".into(),
        };
        let mut inactive = closure(ClosureScope::All, at("2024-05-04", 0, 0), at("2024-05-05", 0, 0));
        inactive.active = false;
        let closures = [broken, inactive];
        let ev = ClosureEvaluator::new(&closures, &[], &[]);
        let check = ev.evaluate(Scope::Restaurant, &[], date("2024-05-04"), &slot("2024-05-04", 12, 0, 60));
        assert_eq!(check, ClosureCheck::default());
    }

    #[test]
    fn every_matching_closure_reported_in_order() {
        let a = room("Main");
        let mut first = closure(ClosureScope::All, at("2024-05-04", 18, 0), at("2024-05-04", 22, 0));
        first.label = Some("private event".into());
        let second = closure(ClosureScope::Room(a.id), at("2024-05-04", 19, 0), at("2024-05-04", 20, 0));
        let closures = [first, second];
        let rooms = [a.clone()];
        let ev = ClosureEvaluator::new(&closures, &rooms, &[]);
        let check = ev.evaluate(Scope::Room(a.id), &[], date("2024-05-04"), &slot("2024-05-04", 19, 0, 60));
        assert_eq!(
            check.reasons,
            vec!["restaurant closed: private event".to_string(), "room Main closed".to_string()]
        );
    }
}
