use crate::config::{AvailabilityConfig, MergeStrategy};
use crate::model::{Room, Table};

use super::closures::ClosureCheck;
use super::consumption::Usage;

/// What a ceiling is computed for.
#[derive(Debug, Clone, Copy)]
pub enum CapacityTarget<'a> {
    /// Every active room in scope, pooled by the merge strategy.
    Pool(&'a [&'a Room]),
    Room(&'a Room),
    Table(&'a Table),
    /// Filter matched nothing seatable.
    Nothing,
}

/// A room's own capacity, or the configured default for rooms left at 0.
pub fn room_capacity(room: &Room, default_capacity: u32) -> u32 {
    if room.capacity == 0 {
        default_capacity
    } else {
        room.capacity
    }
}

/// Seating ceiling for one scope and window.
///
/// Closure capacity overrides only ever lower the ceiling. Under [`MergeStrategy::Smart`]
/// a pooled window that already holds `max_parallel_parties` parties collapses to what
/// is consumed. A table seats one party at a time.
pub fn resolve_ceiling(
    target: CapacityTarget<'_>,
    check: &ClosureCheck,
    usage: Usage,
    config: &AvailabilityConfig,
) -> u32 {
    let mut ceiling = match target {
        CapacityTarget::Nothing => return 0,
        CapacityTarget::Table(table) => {
            let seats = table.seats_max;
            if usage.parties > 0 {
                return seats.min(usage.seats);
            }
            seats
        }
        CapacityTarget::Room(room) => room_capacity(room, config.default_room_capacity),
        CapacityTarget::Pool(rooms) => {
            let pooled = rooms
                .iter()
                .filter(|r| !check.closed_rooms.contains(&r.id))
                .map(|r| {
                    let own = room_capacity(r, config.default_room_capacity);
                    check.room_caps.get(&r.id).map_or(own, |cap| own.min(*cap))
                })
                .fold(0u32, u32::saturating_add);
            if config.merge_strategy == MergeStrategy::Smart
                && config.max_parallel_parties > 0
                && usage.parties >= config.max_parallel_parties
            {
                pooled.min(usage.seats)
            } else {
                pooled
            }
        }
    };

    if let Some(cap) = check.capacity_cap {
        ceiling = ceiling.min(cap);
    }

    ceiling
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;
    use crate::model::TableStatus;

    fn room(capacity: u32) -> Room {
        Room {
            id: Ulid::new(),
            name: "R".into(),
            capacity,
            active: true,
            mergeable: true,
            location_id: None,
            display_order: 0,
        }
    }

    fn table(seats_max: u32) -> Table {
        Table {
            id: Ulid::new(),
            room_id: Ulid::new(),
            name: "T".into(),
            seats_min: 1,
            seats_standard: seats_max,
            seats_max,
            active: true,
            status: TableStatus::Available,
            join_group: None,
            display_order: 0,
        }
    }

    fn sum_config() -> AvailabilityConfig {
        AvailabilityConfig {
            merge_strategy: MergeStrategy::Sum,
            ..Default::default()
        }
    }

    #[test]
    fn room_uses_default_when_unset() {
        let cfg = AvailabilityConfig {
            default_room_capacity: 30,
            ..Default::default()
        };
        let r = room(0);
        assert_eq!(resolve_ceiling(CapacityTarget::Room(&r), &ClosureCheck::default(), Usage::default(), &cfg), 30);
        let r = room(12);
        assert_eq!(resolve_ceiling(CapacityTarget::Room(&r), &ClosureCheck::default(), Usage::default(), &cfg), 12);
    }

    #[test]
    fn pool_sums_open_rooms_and_applies_caps() {
        let a = room(10);
        let b = room(20);
        let c = room(6);
        let rooms = [&a, &b, &c];
        let mut check = ClosureCheck::default();
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, Usage::default(), &sum_config()), 36);

        check.closed_rooms.insert(c.id);
        check.room_caps.insert(b.id, 8);
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, Usage::default(), &sum_config()), 18);

        check.capacity_cap = Some(12);
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, Usage::default(), &sum_config()), 12);
    }

    #[test]
    fn override_larger_than_capacity_does_not_raise_it() {
        let r = room(10);
        let check = ClosureCheck {
            capacity_cap: Some(50),
            ..Default::default()
        };
        assert_eq!(resolve_ceiling(CapacityTarget::Room(&r), &check, Usage::default(), &sum_config()), 10);
    }

    #[test]
    fn smart_caps_parallel_parties() {
        let a = room(40);
        let rooms = [&a];
        let smart = AvailabilityConfig {
            merge_strategy: MergeStrategy::Smart,
            max_parallel_parties: 3,
            ..Default::default()
        };
        let two = Usage { seats: 6, parties: 2 };
        let three = Usage { seats: 9, parties: 3 };
        let check = ClosureCheck::default();
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, two, &smart), 40);
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, three, &smart), 9);
        // Sum ignores the parallel ceiling.
        let sum = AvailabilityConfig {
            max_parallel_parties: 3,
            ..sum_config()
        };
        assert_eq!(resolve_ceiling(CapacityTarget::Pool(&rooms), &check, three, &sum), 40);
        // A single room is not pooled.
        assert_eq!(resolve_ceiling(CapacityTarget::Room(&a), &check, three, &smart), 40);
    }

    #[test]
    fn table_holds_one_party() {
        let t = table(4);
        let check = ClosureCheck::default();
        let cfg = sum_config();
        assert_eq!(resolve_ceiling(CapacityTarget::Table(&t), &check, Usage::default(), &cfg), 4);
        assert_eq!(resolve_ceiling(CapacityTarget::Table(&t), &check, Usage { seats: 2, parties: 1 }, &cfg), 2);
    }

    #[test]
    fn nothing_has_no_capacity() {
        assert_eq!(
            resolve_ceiling(CapacityTarget::Nothing, &ClosureCheck::default(), Usage::default(), &sum_config()),
            0
        );
    }
}
