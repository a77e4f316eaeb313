//! Checks and builds the weekly time structure of each year group.

use crate::data::{SchoolSnapshot, SlotId, TimeOfWeek, TimetableSlot, YearGroupId};
use crate::error::{StructureItem, TimetableError};
use chrono::{Duration, NaiveTime};
use itertools::Itertools;
use log::{debug, trace};

impl StructureItem {
    fn time(&self) -> &TimeOfWeek {
        match self {
            StructureItem::Slot { time, .. } | StructureItem::Break { time, .. } => time,
        }
    }
}

/// Rejects any year group whose slots and breaks overlap one another.
///
/// An overlapping structure makes the clash constraints contradictory rather than
/// merely infeasible, so this must run before a model is built.
pub fn validate_structure(snapshot: &SchoolSnapshot) -> Result<(), TimetableError> {
    for year_group in snapshot.year_groups.iter().map(|y| &y.id).sorted() {
        let slots = snapshot
            .timetable_slots
            .iter()
            .filter(|s| s.relevant_year_groups.contains(year_group))
            .map(|s| StructureItem::Slot {
                id: s.id,
                time: s.time,
            });
        let breaks = snapshot
            .breaks
            .iter()
            .filter(|b| b.relevant_year_groups.contains(year_group))
            .map(|b| StructureItem::Break {
                id: b.id.clone(),
                time: b.time,
            });
        let items: Vec<StructureItem> = slots
            .chain(breaks)
            .sorted_by_key(|item| *item.time())
            .collect();
        trace!(
            "Checking {} slots and breaks of year group {year_group} for overlaps",
            items.len()
        );

        if let Some((first, second)) = first_overlap(&items) {
            return Err(TimetableError::StructureConflict {
                year_group: year_group.clone(),
                first: first.clone(),
                second: second.clone(),
            });
        }
    }
    debug!(
        "Structure of {} year groups is overlap free",
        snapshot.year_groups.len()
    );
    Ok(())
}

/// Sweeps items sorted by time, tracking the one reaching latest into the day.
fn first_overlap(items: &[StructureItem]) -> Option<(&StructureItem, &StructureItem)> {
    let mut latest: Option<&StructureItem> = None;
    for item in items {
        if let Some(previous) = latest {
            if previous.time().clashes_with(item.time()) {
                return Some((previous, item));
            }
            if previous.time().day_of_week == item.time().day_of_week
                && previous.time().ends_at >= item.time().ends_at
            {
                continue;
            }
        }
        latest = Some(item);
    }
    None
}

/// Builds a regular week: `periods_per_day` back-to-back periods on days `1..=days`,
/// numbered from 1 in day then period order, all relevant to `year_groups`.
pub fn uniform_week(
    year_groups: &[YearGroupId],
    days: u8,
    periods_per_day: u32,
    first_period_starts_at: NaiveTime,
    period_minutes: i64,
) -> Vec<TimetableSlot> {
    let period = Duration::minutes(period_minutes);
    (1..=days)
        .cartesian_product(0..periods_per_day)
        .map(|(day, index)| {
            let starts_at = first_period_starts_at + period * index as i32;
            TimetableSlot {
                id: (day as SlotId - 1) * periods_per_day + index + 1,
                time: TimeOfWeek {
                    day_of_week: day,
                    starts_at,
                    ends_at: starts_at + period,
                },
                relevant_year_groups: year_groups.iter().cloned().collect(),
            }
        })
        .collect()
}
