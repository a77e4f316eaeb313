//! Works out where each lesson could go before any model is built.

use crate::data::{Break, Lesson, SchoolSnapshot, SlotId, TeacherId, TimetableSlot};
use crate::error::TimetableError;
use itertools::Itertools;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// The slots a single lesson may occupy, and the pairs of them that would form a double period.
#[derive(Debug, Clone)]
pub struct LessonCandidates<'a> {
    pub lesson: &'a Lesson,
    /// Ordered by day then start time.
    pub slots: Vec<&'a TimetableSlot>,
    pub double_period_pairs: Vec<(SlotId, SlotId)>,
}

impl LessonCandidates<'_> {
    pub fn days(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().map(|s| s.time.day_of_week).dedup()
    }

    pub fn is_fixed(&self, slot_id: SlotId) -> bool {
        self.lesson.user_defined_slot_ids.contains(&slot_id)
    }
}

/// Candidate slots for every lesson, in snapshot order.
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    pub lessons: Vec<LessonCandidates<'a>>,
    pub slots: HashMap<SlotId, &'a TimetableSlot>,
}

/// Computes each lesson's candidate slots and rejects fixed slots that already clash.
///
/// Expects a snapshot that has passed input and structure validation.
pub fn generate_candidates(snapshot: &SchoolSnapshot) -> Result<Candidates<'_>, TimetableError> {
    check_fixed_slots(snapshot)?;

    let pupil_year_groups: HashMap<_, _> = snapshot
        .pupils
        .iter()
        .map(|p| (p.id, p.year_group.as_str()))
        .collect();

    let lessons = snapshot
        .lessons
        .iter()
        .map(|lesson| {
            let year_groups: HashSet<&str> = lesson
                .pupil_ids
                .iter()
                .filter_map(|p| pupil_year_groups.get(p).copied())
                .collect();
            let teacher_breaks = teacher_breaks(snapshot, lesson.teacher_id);

            let slots: Vec<&TimetableSlot> = snapshot
                .timetable_slots
                .iter()
                .filter(|s| {
                    s.relevant_year_groups
                        .iter()
                        .any(|yg| year_groups.contains(yg.as_str()))
                })
                .filter(|s| {
                    lesson.user_defined_slot_ids.contains(&s.id)
                        || !teacher_breaks.iter().any(|b| b.time.clashes_with(&s.time))
                })
                .sorted_by_key(|s| (s.time, s.id))
                .collect();
            let double_period_pairs = double_period_pairs(&slots, &teacher_breaks);
            trace!(
                "Lesson {} has {} candidate slots and {} possible double periods",
                lesson.id,
                slots.len(),
                double_period_pairs.len()
            );

            LessonCandidates {
                lesson,
                slots,
                double_period_pairs,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Generated candidates for {} lessons ({} lesson-slot pairs)",
        lessons.len(),
        lessons.iter().map(|l| l.slots.len()).sum::<usize>()
    );

    Ok(Candidates {
        lessons,
        slots: snapshot.timetable_slots.iter().map(|s| (s.id, s)).collect(),
    })
}

pub fn teacher_breaks(snapshot: &SchoolSnapshot, teacher_id: TeacherId) -> Vec<&Break> {
    snapshot
        .breaks
        .iter()
        .filter(|b| b.relevant_teachers.contains(&teacher_id))
        .collect()
}

/// Ordered pairs of slots that are on the same day, back to back, and not
/// interrupted by a break of the teacher anywhere across their span.
pub fn double_period_pairs(
    slots: &[&TimetableSlot],
    teacher_breaks: &[&Break],
) -> Vec<(SlotId, SlotId)> {
    slots
        .iter()
        .cartesian_product(slots.iter())
        .filter(|(first, second)| first.time.is_followed_by(&second.time))
        .filter(|(first, second)| {
            !teacher_breaks.iter().any(|b| {
                b.time.day_of_week == first.time.day_of_week
                    && b.time.starts_at < second.time.ends_at
                    && b.time.ends_at > first.time.starts_at
            })
        })
        .map(|(first, second)| (first.id, second.id))
        .collect()
}

/// Two lessons sharing a teacher, classroom or pupil must not be fixed at clashing slots.
fn check_fixed_slots(snapshot: &SchoolSnapshot) -> Result<(), TimetableError> {
    let slots: HashMap<_, _> = snapshot.timetable_slots.iter().map(|s| (s.id, s)).collect();
    let fixed = snapshot
        .lessons
        .iter()
        .filter(|l| !l.user_defined_slot_ids.is_empty());

    for (lesson, other) in fixed.tuple_combinations() {
        let Some(resource) = lesson.shared_resource(other) else {
            continue;
        };
        for (slot_id, other_slot_id) in lesson
            .user_defined_slot_ids
            .iter()
            .cartesian_product(other.user_defined_slot_ids.iter())
        {
            let (Some(slot), Some(other_slot)) = (slots.get(slot_id), slots.get(other_slot_id))
            else {
                continue;
            };
            if slot.id == other_slot.id || slot.time.clashes_with(&other_slot.time) {
                return Err(TimetableError::FixedSlotConflict {
                    lesson_id: lesson.id.clone(),
                    other_lesson_id: other.id.clone(),
                    resource,
                    slot_id: *slot_id,
                    other_slot_id: *other_slot_id,
                });
            }
        }
    }
    Ok(())
}
