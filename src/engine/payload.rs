use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{format_minute_of_day, SlotStatus};

use super::status::{CapacitySnapshot, Determination};
use super::tables::TableSuggestion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPayload {
    /// `HH:MM`
    pub time: String,
    pub status: SlotStatus,
    pub reasons: Vec<String>,
    pub capacity: CapacitySnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TableSuggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotsMeta {
    pub has_availability: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotsResponse {
    pub slots: Vec<SlotPayload>,
    pub meta: SlotsMeta,
}

/// `date → meal key → has availability`, ordered by date then meal key.
pub type DayAvailability = BTreeMap<String, BTreeMap<String, bool>>;

pub fn build_slot(minute_of_day: u32, determination: Determination, tables: Option<TableSuggestion>) -> SlotPayload {
    SlotPayload {
        time: format_minute_of_day(minute_of_day),
        status: determination.status,
        reasons: determination.reasons,
        capacity: determination.capacity,
        tables,
    }
}

pub fn build_response(slots: Vec<SlotPayload>) -> SlotsResponse {
    let has_availability = slots.iter().any(|s| s.status.is_bookable());
    SlotsResponse {
        slots,
        meta: SlotsMeta { has_availability },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn determination(status: SlotStatus) -> Determination {
        Determination {
            status,
            reasons: Vec::new(),
            capacity: CapacitySnapshot::default(),
        }
    }

    #[test]
    fn has_availability_only_for_bookable_slots() {
        let blocked = build_response(vec![
            build_slot(1140, determination(SlotStatus::Blocked), None),
            build_slot(1170, determination(SlotStatus::Full), None),
        ]);
        assert!(!blocked.meta.has_availability);

        let limited = build_response(vec![build_slot(1140, determination(SlotStatus::Limited), None)]);
        assert!(limited.meta.has_availability);
        assert!(!build_response(Vec::new()).meta.has_availability);
    }

    #[test]
    fn wire_shape() {
        let resp = build_response(vec![build_slot(
            19 * 60,
            Determination {
                status: SlotStatus::Full,
                reasons: vec!["no seats remaining".into()],
                capacity: CapacitySnapshot {
                    ceiling: 4,
                    consumed: 4,
                    remaining: 0,
                },
            },
            None,
        )]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "slots": [{
                    "time": "19:00",
                    "status": "full",
                    "reasons": ["no seats remaining"],
                    "capacity": {"ceiling": 4, "consumed": 4, "remaining": 0}
                }],
                "meta": {"has_availability": false}
            })
        );
    }
}
