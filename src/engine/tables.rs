use std::collections::BTreeMap;

use serde::Serialize;
use ulid::Ulid;

use crate::limits::MAX_JOIN_TABLES;
use crate::model::{Room, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedTable {
    pub id: Ulid,
    pub name: String,
    pub room_id: Ulid,
    pub seats_max: u32,
}

impl From<&Table> for SuggestedTable {
    fn from(t: &Table) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
            room_id: t.room_id,
            seats_max: t.seats_max,
        }
    }
}

/// Where the party could sit. `NoTableAvailable` says nothing about the slot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableSuggestion {
    Single { table: SuggestedTable },
    Joined { join_group: String, tables: Vec<SuggestedTable> },
    NoTableAvailable,
}

/// Propose a table for `party` from `candidates` (already filtered to seatable, free tables).
///
/// The smallest single table that fits wins. Otherwise tables sharing a join group are
/// combined: fewest tables first, then least excess seats. Tables of different rooms
/// only combine when every room involved is merge-eligible. Ties go to display order,
/// then id.
pub fn suggest_tables(party: u32, candidates: &[&Table], rooms: &[Room]) -> TableSuggestion {
    let mut ordered: Vec<&Table> = candidates.to_vec();
    ordered.sort_by_key(|t| (t.display_order, t.id));

    if let Some(best) = ordered
        .iter()
        .filter(|t| t.seats_max >= party)
        .min_by_key(|t| t.seats_max)
    {
        return TableSuggestion::Single {
            table: SuggestedTable::from(*best),
        };
    }

    let mut groups: BTreeMap<&str, Vec<&Table>> = BTreeMap::new();
    for t in &ordered {
        if let Some(group) = t.join_group.as_deref() {
            groups.entry(group).or_default().push(*t);
        }
    }

    for size in 2..=MAX_JOIN_TABLES {
        let mut best: Option<(u32, &str, Vec<&Table>)> = None;
        for (group, members) in &groups {
            if members.len() < size {
                continue;
            }
            for_each_combination(members.len(), size, |idx| {
                let combo: Vec<&Table> = idx.iter().map(|&i| members[i]).collect();
                let seats: u32 = combo.iter().map(|t| t.seats_max).sum();
                if seats < party || !combinable(&combo, rooms) {
                    return;
                }
                let excess = seats - party;
                // Strictly better only, so the first combination in table order wins ties.
                if best.as_ref().is_none_or(|(e, _, _)| excess < *e) {
                    best = Some((excess, *group, combo));
                }
            });
        }
        if let Some((_, group, tables)) = best {
            return TableSuggestion::Joined {
                join_group: group.to_string(),
                tables: tables.into_iter().map(SuggestedTable::from).collect(),
            };
        }
    }

    TableSuggestion::NoTableAvailable
}

fn combinable(tables: &[&Table], rooms: &[Room]) -> bool {
    let Some(first) = tables.first() else {
        return false;
    };
    if tables.iter().all(|t| t.room_id == first.room_id) {
        return true;
    }
    tables.iter().all(|t| {
        rooms
            .iter()
            .find(|r| r.id == t.room_id)
            .is_some_and(|r| r.mergeable)
    })
}

/// Visit every `k`-subset of `0..n` in lexicographic order.
fn for_each_combination(n: usize, k: usize, mut visit: impl FnMut(&[usize])) {
    if k == 0 || k > n {
        return;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        visit(&idx);
        let Some(pos) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return;
        };
        idx[pos] += 1;
        for j in pos + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}
