use serde::Serialize;

use crate::config::LowAvailability;
use crate::model::SlotStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub ceiling: u32,
    pub consumed: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Determination {
    pub status: SlotStatus,
    pub reasons: Vec<String>,
    pub capacity: CapacitySnapshot,
}

/// Decide a slot's status from its closure reasons and capacity numbers.
///
/// Any closure reason blocks and zeroes the snapshot. Otherwise `remaining` of zero,
/// or too few seats for `party`, is `full`; remaining below the low-availability level
/// is `limited`.
pub fn determine_status(
    closure_reasons: &[String],
    ceiling: u32,
    consumed: u32,
    party: u32,
    low: LowAvailability,
) -> Determination {
    if !closure_reasons.is_empty() {
        return Determination {
            status: SlotStatus::Blocked,
            reasons: closure_reasons.to_vec(),
            capacity: CapacitySnapshot::default(),
        };
    }

    let remaining = ceiling.saturating_sub(consumed);
    let capacity = CapacitySnapshot {
        ceiling,
        consumed,
        remaining,
    };

    let (status, reasons) = if ceiling == 0 {
        (SlotStatus::Full, vec!["no seating capacity".to_string()])
    } else if remaining == 0 {
        (SlotStatus::Full, vec!["no seats remaining".to_string()])
    } else if remaining < party {
        (
            SlotStatus::Full,
            vec![format!("only {remaining} seats remaining for a party of {party}")],
        )
    } else if low.is_low(remaining, ceiling) {
        (
            SlotStatus::Limited,
            vec![format!("only {remaining} of {ceiling} seats remaining")],
        )
    } else {
        (SlotStatus::Available, Vec::new())
    };

    Determination {
        status,
        reasons,
        capacity,
    }
}
