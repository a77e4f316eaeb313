//! Turns solved variable values into an [`Assignment`] and re-checks it.
//!
//! The re-check works from the snapshot rather than the model, so a modelling
//! mistake or an engine that overstates its result cannot leak a clashing
//! timetable to the caller.

use crate::builder::TimetableModel;
use crate::candidates::{double_period_pairs, teacher_breaks};
use crate::config::SolveConfig;
use crate::data::{
    Assignment, DoublePeriod, Lesson, LessonAssignment, Resource, SchoolSnapshot, SlotId,
    TimetableSlot, UnmetSoftConstraint,
};
use crate::error::{ConstraintViolation, TimetableError};
use itertools::Itertools;
use log::{debug, error, info};
use std::collections::{BTreeMap, HashMap, HashSet};

const ASSIGNED_THRESHOLD: f64 = 0.5;

/// Reads the decision variables, then verifies every hard constraint.
pub fn extract_assignment(
    model: &TimetableModel<'_>,
    values: &[f64],
    snapshot: &SchoolSnapshot,
    config: &SolveConfig,
) -> Result<Assignment, TimetableError> {
    let slots: HashMap<SlotId, &TimetableSlot> =
        snapshot.timetable_slots.iter().map(|s| (s.id, s)).collect();

    let lessons = model
        .candidates
        .lessons
        .iter()
        .enumerate()
        .map(|(index, candidates)| {
            let taught = model
                .decision_variables
                .range((index, SlotId::MIN)..=(index, SlotId::MAX))
                .filter(|(_, var)| {
                    values.get(var.index()).copied().unwrap_or(0.0) > ASSIGNED_THRESHOLD
                })
                .map(|((_, slot_id), _)| *slot_id);
            lesson_assignment(candidates.lesson, taught, &slots, snapshot)
        })
        .collect();

    let mut assignment = Assignment {
        lessons,
        spread_penalty: 0,
        unmet_soft_constraints: Vec::new(),
    };

    let violations = verify_assignment(&assignment, snapshot, config);
    if !violations.is_empty() {
        for violation in &violations {
            error!("Extracted timetable breaks a hard constraint: {violation}");
        }
        return Err(TimetableError::SolverContractViolation(violations));
    }

    let (spread_penalty, unmet) = soft_constraint_report(&assignment, &slots);
    assignment.spread_penalty = spread_penalty;
    assignment.unmet_soft_constraints = unmet;
    info!(
        "Extracted and verified {} lessons (spread penalty {spread_penalty})",
        assignment.lessons.len()
    );
    Ok(assignment)
}

fn lesson_assignment(
    lesson: &Lesson,
    taught: impl Iterator<Item = SlotId>,
    slots: &HashMap<SlotId, &TimetableSlot>,
    snapshot: &SchoolSnapshot,
) -> LessonAssignment {
    let taught_slots: Vec<&TimetableSlot> = taught
        .filter_map(|id| slots.get(&id).copied())
        .sorted_by_key(|s| (s.time, s.id))
        .collect();
    let breaks = teacher_breaks(snapshot, lesson.teacher_id);
    let double_periods = double_period_pairs(&taught_slots, &breaks)
        .into_iter()
        .map(|(first_slot_id, second_slot_id)| DoublePeriod {
            first_slot_id,
            second_slot_id,
        })
        .collect();

    LessonAssignment {
        lesson_id: lesson.id.clone(),
        slot_ids: taught_slots.iter().map(|s| s.id).collect(),
        user_defined_slot_ids: lesson.user_defined_slot_ids.iter().copied().collect(),
        double_periods,
    }
}

fn violation(constraint_type: &str, description: String) -> ConstraintViolation {
    ConstraintViolation {
        constraint_type: constraint_type.to_string(),
        description,
    }
}

/// Every hard constraint `assignment` breaks against `snapshot`.
pub fn verify_assignment(
    assignment: &Assignment,
    snapshot: &SchoolSnapshot,
    config: &SolveConfig,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    let slots: HashMap<SlotId, &TimetableSlot> =
        snapshot.timetable_slots.iter().map(|s| (s.id, s)).collect();
    let pupil_year_groups: HashMap<_, _> = snapshot
        .pupils
        .iter()
        .map(|p| (p.id, p.year_group.as_str()))
        .collect();
    let by_id: HashMap<&str, &LessonAssignment> = assignment
        .lessons
        .iter()
        .map(|l| (l.lesson_id.as_str(), l))
        .collect();

    let mut occupations: BTreeMap<Resource, Vec<(&str, &TimetableSlot)>> = BTreeMap::new();

    for lesson in &snapshot.lessons {
        let Some(assigned) = by_id.get(lesson.id.as_str()) else {
            violations.push(violation(
                "Slot Count",
                format!("lesson {} is missing from the timetable", lesson.id),
            ));
            continue;
        };

        let distinct: HashSet<SlotId> = assigned.slot_ids.iter().copied().collect();
        if distinct.len() != assigned.slot_ids.len()
            || distinct.len() != lesson.total_required_slots as usize
        {
            violations.push(violation(
                "Slot Count",
                format!(
                    "lesson {} is taught at {} distinct of {} listed slots but requires {}",
                    lesson.id,
                    distinct.len(),
                    assigned.slot_ids.len(),
                    lesson.total_required_slots
                ),
            ));
        }

        for fixed in lesson.user_defined_slot_ids.iter() {
            if !distinct.contains(fixed) {
                violations.push(violation(
                    "Fixed Slot",
                    format!("lesson {} dropped its fixed slot {fixed}", lesson.id),
                ));
            }
        }

        let year_groups: HashSet<&str> = lesson
            .pupil_ids
            .iter()
            .filter_map(|p| pupil_year_groups.get(p).copied())
            .collect();
        let breaks = teacher_breaks(snapshot, lesson.teacher_id);
        let mut taught = Vec::new();
        for slot_id in distinct.iter().sorted() {
            let Some(slot) = slots.get(slot_id).copied() else {
                violations.push(violation(
                    "Unknown Slot",
                    format!("lesson {} is placed at unknown slot {slot_id}", lesson.id),
                ));
                continue;
            };
            if !slot
                .relevant_year_groups
                .iter()
                .any(|yg| year_groups.contains(yg.as_str()))
            {
                violations.push(violation(
                    "Year Group",
                    format!(
                        "lesson {} is placed at slot {slot_id}, outside its year groups' week",
                        lesson.id
                    ),
                ));
            }
            if !lesson.user_defined_slot_ids.contains(slot_id) {
                if let Some(b) = breaks.iter().find(|b| b.time.clashes_with(&slot.time)) {
                    violations.push(violation(
                        "Teacher Break",
                        format!(
                            "lesson {} is placed at slot {slot_id} during break {}",
                            lesson.id, b.id
                        ),
                    ));
                }
            }
            for resource in lesson.resources() {
                occupations
                    .entry(resource)
                    .or_default()
                    .push((lesson.id.as_str(), slot));
            }
            taught.push(slot);
        }

        taught.sort_by_key(|s| (s.time, s.id));
        let doubles = double_period_pairs(&taught, &breaks);
        if doubles.len() != lesson.total_required_double_periods as usize {
            violations.push(violation(
                "Double Periods",
                format!(
                    "lesson {} has {} double periods but requires exactly {}",
                    lesson.id,
                    doubles.len(),
                    lesson.total_required_double_periods
                ),
            ));
        }

        for (day, slots_on_day) in &taught.iter().chunk_by(|s| s.time.day_of_week) {
            let count = slots_on_day.count();
            let doubles_on_day = doubles
                .iter()
                .filter(|(first, _)| slots[first].time.day_of_week == day)
                .count();
            // overlapping year group grids can pair one slot with several others
            let blocks = count.saturating_sub(doubles_on_day);
            if !config.allow_split_lessons_within_each_day && blocks > 1 {
                violations.push(violation(
                    "No Split Lessons",
                    format!("lesson {} is split on day {day}", lesson.id),
                ));
            }
            if !config.allow_triple_periods_and_above && doubles_on_day > 1 {
                violations.push(violation(
                    "No Triple Periods",
                    format!(
                        "lesson {} has {doubles_on_day} double periods on day {day}",
                        lesson.id
                    ),
                ));
            }
        }
    }

    for extra in assignment
        .lessons
        .iter()
        .filter(|l| !snapshot.lessons.iter().any(|s| s.id == l.lesson_id))
    {
        violations.push(violation(
            "Unknown Lesson",
            format!("timetable contains unknown lesson {}", extra.lesson_id),
        ));
    }

    for (resource, occupied) in &occupations {
        for ((lesson_a, slot_a), (lesson_b, slot_b)) in occupied.iter().tuple_combinations() {
            if slot_a.time.clashes_with(&slot_b.time) {
                violations.push(violation(
                    "Clash",
                    format!(
                        "{resource} is in lesson {lesson_a} at slot {} \
                         and lesson {lesson_b} at slot {}",
                        slot_a.id, slot_b.id
                    ),
                ));
            }
        }
    }

    debug!(
        "Verified timetable against {} lessons: {} violations",
        snapshot.lessons.len(),
        violations.len()
    );
    violations
}

/// Lessons taught in more than one separate block on a day.
fn soft_constraint_report(
    assignment: &Assignment,
    slots: &HashMap<SlotId, &TimetableSlot>,
) -> (u32, Vec<UnmetSoftConstraint>) {
    let mut penalty = 0;
    let mut unmet = Vec::new();
    for lesson in &assignment.lessons {
        let per_day = lesson
            .slot_ids
            .iter()
            .filter_map(|id| slots.get(id))
            .map(|s| s.time.day_of_week)
            .counts();
        for (day, count) in per_day.into_iter().sorted() {
            let doubles = lesson
                .double_periods
                .iter()
                .filter(|d| {
                    slots
                        .get(&d.first_slot_id)
                        .is_some_and(|s| s.time.day_of_week == day)
                })
                .count();
            let blocks = count.saturating_sub(doubles);
            if blocks > 1 {
                penalty += (blocks - 1) as u32;
                unmet.push(UnmetSoftConstraint {
                    constraint_type: "Spread Across The Week".to_string(),
                    description: format!(
                        "Lesson {} is taught in {blocks} separate blocks on day {day}.",
                        lesson.lesson_id
                    ),
                });
            }
        }
    }
    (penalty, unmet)
}
