//! Input validation for a school snapshot.
//!
//! Runs before anything else touches the data and reports every defect it
//! finds, not just the first. Checks:
//! - duplicate ids per entity kind
//! - well-formed times (day 1-7, start before end)
//! - references to unknown year groups, pupils, teachers, classrooms and slots
//! - lesson requirements (at least one slot, doubles fit within the slot count,
//!   no more fixed slots than required)
//! - fixed slots relevant to the lesson's year groups and outside its teacher's breaks

use crate::data::{SchoolSnapshot, TimeOfWeek};
use crate::error::{InputProblem, InputProblemKind, TimetableError};
use itertools::Itertools;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

pub fn validate_snapshot(snapshot: &SchoolSnapshot) -> Result<(), TimetableError> {
    let mut problems = Vec::new();

    check_unique("year group", snapshot.year_groups.iter().map(|y| &y.id), &mut problems);
    check_unique("pupil", snapshot.pupils.iter().map(|p| p.id), &mut problems);
    check_unique("teacher", snapshot.teachers.iter().map(|t| t.id), &mut problems);
    check_unique("classroom", snapshot.classrooms.iter().map(|c| c.id), &mut problems);
    check_unique("slot", snapshot.timetable_slots.iter().map(|s| s.id), &mut problems);
    check_unique("break", snapshot.breaks.iter().map(|b| &b.id), &mut problems);
    check_unique("lesson", snapshot.lessons.iter().map(|l| &l.id), &mut problems);

    let year_groups: HashSet<&str> = snapshot.year_groups.iter().map(|y| y.id.as_str()).collect();
    let pupils: HashMap<_, _> = snapshot
        .pupils
        .iter()
        .map(|p| (p.id, p.year_group.as_str()))
        .collect();
    let teachers: HashSet<_> = snapshot.teachers.iter().map(|t| t.id).collect();
    let classrooms: HashSet<_> = snapshot.classrooms.iter().map(|c| c.id).collect();
    let slots: HashMap<_, _> = snapshot.timetable_slots.iter().map(|s| (s.id, s)).collect();

    for pupil in &snapshot.pupils {
        if !year_groups.contains(pupil.year_group.as_str()) {
            problems.push(unknown(
                format!("pupil {}", pupil.id),
                format!("year group {}", pupil.year_group),
            ));
        }
    }

    for slot in &snapshot.timetable_slots {
        let owner = format!("slot {}", slot.id);
        check_time(&owner, &slot.time, &mut problems);
        for yg in slot.relevant_year_groups.iter() {
            if !year_groups.contains(yg.as_str()) {
                problems.push(unknown(&owner, format!("year group {yg}")));
            }
        }
    }

    for break_ in &snapshot.breaks {
        let owner = format!("break {}", break_.id);
        check_time(&owner, &break_.time, &mut problems);
        for yg in break_.relevant_year_groups.iter() {
            if !year_groups.contains(yg.as_str()) {
                problems.push(unknown(&owner, format!("year group {yg}")));
            }
        }
        for teacher in break_.relevant_teachers.iter() {
            if !teachers.contains(teacher) {
                problems.push(unknown(&owner, format!("teacher {teacher}")));
            }
        }
    }

    for lesson in &snapshot.lessons {
        let owner = format!("lesson {}", lesson.id);
        if !teachers.contains(&lesson.teacher_id) {
            problems.push(unknown(&owner, format!("teacher {}", lesson.teacher_id)));
        }
        if !classrooms.contains(&lesson.classroom_id) {
            problems.push(unknown(&owner, format!("classroom {}", lesson.classroom_id)));
        }
        if lesson.pupil_ids.is_empty() {
            problems.push(InputProblem::new(
                InputProblemKind::EmptyLesson,
                format!("{owner} has no pupils"),
            ));
        }
        let mut lesson_year_groups = HashSet::new();
        for pupil in lesson.pupil_ids.iter() {
            match pupils.get(pupil) {
                Some(yg) => {
                    lesson_year_groups.insert(*yg);
                }
                None => problems.push(unknown(&owner, format!("pupil {pupil}"))),
            }
        }

        if lesson.total_required_slots == 0 {
            problems.push(InputProblem::new(
                InputProblemKind::InvalidRequirement,
                format!("{owner} requires no slots"),
            ));
        }
        if 2 * u64::from(lesson.total_required_double_periods)
            > u64::from(lesson.total_required_slots)
        {
            problems.push(InputProblem::new(
                InputProblemKind::InvalidRequirement,
                format!(
                    "{owner} requires {} double periods but only {} slots",
                    lesson.total_required_double_periods, lesson.total_required_slots
                ),
            ));
        }
        if lesson.user_defined_slot_ids.len() > lesson.total_required_slots as usize {
            problems.push(InputProblem::new(
                InputProblemKind::InvalidRequirement,
                format!(
                    "{owner} has {} fixed slots but only requires {}",
                    lesson.user_defined_slot_ids.len(),
                    lesson.total_required_slots
                ),
            ));
        }

        for slot_id in lesson.user_defined_slot_ids.iter() {
            let Some(slot) = slots.get(slot_id) else {
                problems.push(unknown(&owner, format!("slot {slot_id}")));
                continue;
            };
            // Skip relevance when the pupils themselves are broken; that is already reported.
            if !lesson_year_groups.is_empty()
                && !slot
                    .relevant_year_groups
                    .iter()
                    .any(|yg| lesson_year_groups.contains(yg.as_str()))
            {
                problems.push(InputProblem::new(
                    InputProblemKind::IrrelevantFixedSlot,
                    format!(
                        "{owner} is fixed at slot {slot_id}, which no year group of its pupils uses"
                    ),
                ));
            }
            if let Some(break_) = snapshot.breaks.iter().find(|b| {
                b.relevant_teachers.contains(&lesson.teacher_id) && b.time.clashes_with(&slot.time)
            }) {
                problems.push(InputProblem::new(
                    InputProblemKind::FixedSlotDuringBreak,
                    format!(
                        "{owner} is fixed at slot {slot_id} during break {} of teacher {}",
                        break_.id, lesson.teacher_id
                    ),
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        debug!("Snapshot rejected with {} input problems", problems.len());
        Err(TimetableError::InvalidInput(problems))
    }
}

fn check_unique<T, I>(entity: &str, ids: I, problems: &mut Vec<InputProblem>)
where
    T: Eq + Hash + Display,
    I: Iterator<Item = T>,
{
    for (id, count) in ids.counts() {
        if count > 1 {
            problems.push(InputProblem::new(
                InputProblemKind::DuplicateId,
                format!("{entity} id {id} appears {count} times"),
            ));
        }
    }
}

fn check_time(owner: &str, time: &TimeOfWeek, problems: &mut Vec<InputProblem>) {
    if !(1..=7).contains(&time.day_of_week) {
        problems.push(InputProblem::new(
            InputProblemKind::InvalidTime,
            format!("{owner} has day of week {}", time.day_of_week),
        ));
    }
    if time.starts_at >= time.ends_at {
        problems.push(InputProblem::new(
            InputProblemKind::InvalidTime,
            format!("{owner} does not end after it starts"),
        ));
    }
}

fn unknown(owner: impl Display, target: impl Display) -> InputProblem {
    InputProblem::new(
        InputProblemKind::UnknownReference,
        format!("{owner} references unknown {target}"),
    )
}
