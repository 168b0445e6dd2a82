use chrono::Weekday;
use tracing::debug;

use crate::limits::MINUTES_PER_DAY;
use crate::model::ServiceWindow;

/// Opening windows per weekday, each list sorted by start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: [Vec<ServiceWindow>; 7],
}

impl WeeklySchedule {
    pub fn windows(&self, weekday: Weekday) -> &[ServiceWindow] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    fn push(&mut self, window: ServiceWindow) {
        let day = &mut self.days[window.weekday.num_days_from_monday() as usize];
        let pos = day.partition_point(|w| w.start <= window.start);
        day.insert(pos, window);
    }
}

/// Parse `weekday=HH:MM-HH:MM[|HH:MM-HH:MM...]` lines.
///
/// Operator-authored text: a bad line or range is skipped, leaving that day
/// without the window rather than failing the whole schedule.
pub fn parse_schedule(definition: &str) -> WeeklySchedule {
    let mut schedule = WeeklySchedule::default();

    for line in definition.lines().flat_map(|l| l.split(';')) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((day, ranges)) = line.split_once('=') else {
            debug!("schedule: skipping line without '=': {line:?}");
            continue;
        };
        let Some(weekday) = parse_weekday(day) else {
            debug!("schedule: unknown weekday {day:?}");
            continue;
        };
        for range in ranges.split('|') {
            match parse_range(range) {
                Some((start, end)) => schedule.push(ServiceWindow { weekday, start, end }),
                None => debug!("schedule: skipping range {range:?} on {weekday}"),
            }
        }
    }

    schedule
}

/// `mon`, `Monday`, `TUE`, ... Whitespace-tolerant.
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    let s = s.trim().to_ascii_lowercase();
    let day = match s.as_str() {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// `HH:MM` to minutes from midnight. `24:00` is accepted as end of day.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    if m >= 60 {
        return None;
    }
    let minute = h * 60 + m;
    (minute <= MINUTES_PER_DAY).then_some(minute)
}

/// `HH:MM-HH:MM` with `end > start`.
pub fn parse_range(s: &str) -> Option<(u32, u32)> {
    let (start, end) = s.split_once('-')?;
    let start = parse_hhmm(start)?;
    let end = parse_hhmm(end)?;
    (end > start && start < MINUTES_PER_DAY).then_some((start, end))
}
