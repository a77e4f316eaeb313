mod common;

use common::{at, config, expect_optimal, lesson, school, year_group_break};
use school_timetabler::data::{Break, Pupil, Resource, SolveResult, TimetableSlot, YearGroup};
use school_timetabler::structure::uniform_week;
use school_timetabler::error::{InputProblemKind, StructureItem};
use school_timetabler::extract::verify_assignment;
use school_timetabler::{TimetableError, generate_timetable};
use std::collections::HashMap;

fn adjacent_pairs(slot_ids: &[u32], slots: &[TimetableSlot]) -> usize {
    let by_id: HashMap<_, _> = slots.iter().map(|s| (s.id, s)).collect();
    slot_ids
        .iter()
        .flat_map(|a| slot_ids.iter().map(move |b| (a, b)))
        .filter(|&(a, b)| by_id[a].time.is_followed_by(&by_id[b].time))
        .count()
}

#[test]
fn fixed_slots_and_one_double_in_a_five_day_week() {
    let mut snapshot = school(5, 7);
    snapshot
        .lessons
        .push(lesson("maths-y1-a", 1, 10, &[1, 2, 3], 5, 1, &[6, 24]));

    let assignment = expect_optimal(generate_timetable(&snapshot, &config()).unwrap());
    let maths = assignment.lesson("maths-y1-a").unwrap();

    assert_eq!(maths.slot_ids.len(), 5);
    assert!(maths.slot_ids.contains(&6));
    assert!(maths.slot_ids.contains(&24));
    assert_eq!(adjacent_pairs(&maths.slot_ids, &snapshot.timetable_slots), 1);
    assert_eq!(maths.double_periods.len(), 1);
    assert_eq!(maths.user_defined_slot_ids, vec![6, 24]);
    assert!(verify_assignment(&assignment, &snapshot, &config()).is_empty());
}

#[test]
fn shared_teacher_fixed_at_the_same_slot() {
    let mut snapshot = school(5, 7);
    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1], 2, 0, &[6]));
    snapshot.lessons.push(lesson("maths-y1-b", 1, 11, &[2], 2, 0, &[6]));

    match generate_timetable(&snapshot, &config()) {
        Err(TimetableError::FixedSlotConflict {
            lesson_id,
            other_lesson_id,
            resource,
            ..
        }) => {
            assert_eq!(lesson_id, "maths-y1-a");
            assert_eq!(other_lesson_id, "maths-y1-b");
            assert_eq!(resource, Resource::Teacher(1));
        }
        other => panic!("expected a fixed slot conflict, got {other:?}"),
    }
}

#[test]
fn too_many_doubles_for_the_slot_count() {
    let mut snapshot = school(5, 7);
    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1], 3, 2, &[]));

    match generate_timetable(&snapshot, &config()) {
        Err(TimetableError::InvalidInput(problems)) => {
            assert_eq!(problems.len(), 1);
            assert_eq!(problems[0].kind, InputProblemKind::InvalidRequirement);
        }
        other => panic!("expected invalid input, got {other:?}"),
    }
}

#[test]
fn one_teacher_cannot_cover_more_slots_than_the_week_has() {
    let mut snapshot = school(5, 5);
    for pupil in 1..=5 {
        snapshot.lessons.push(lesson(
            &format!("tutoring-{pupil}"),
            1,
            10,
            &[pupil],
            6,
            0,
            &[],
        ));
    }

    assert_eq!(
        generate_timetable(&snapshot, &config()).unwrap(),
        SolveResult::Infeasible
    );
}

#[test]
fn overlapping_slots_are_rejected_before_solving() {
    let mut snapshot = school(1, 3);
    let mut overlapping = snapshot.timetable_slots[0].clone();
    overlapping.id = 99;
    overlapping.time.starts_at = at(9, 30);
    overlapping.time.ends_at = at(10, 30);
    snapshot.timetable_slots.push(overlapping);
    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1], 1, 0, &[]));

    match generate_timetable(&snapshot, &config()) {
        Err(TimetableError::StructureConflict {
            year_group,
            first,
            second,
        }) => {
            assert_eq!(year_group, "y1");
            assert!(matches!(first, StructureItem::Slot { id: 1, .. }));
            assert!(matches!(second, StructureItem::Slot { id: 99, .. }));
        }
        other => panic!("expected a structure conflict, got {other:?}"),
    }
}

#[test]
fn busy_week_respects_every_hard_constraint() {
    let mut snapshot = school(5, 6);
    // lunch replaces the 12:00 period
    snapshot.timetable_slots.retain(|s| s.time.starts_at != at(12, 0));
    for day in 1..=5 {
        snapshot
            .breaks
            .push(year_group_break(&format!("lunch-{day}"), day, at(12, 0), at(13, 0)));
    }
    snapshot.breaks.push(Break {
        id: "meeting".to_string(),
        relevant_year_groups: Default::default(),
        relevant_teachers: [2].into_iter().collect(),
        ..year_group_break("meeting", 2, at(9, 0), at(11, 0))
    });

    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1, 2, 3], 5, 1, &[6]));
    snapshot.lessons.push(lesson("english-y1-a", 2, 11, &[1, 2], 4, 2, &[]));
    snapshot.lessons.push(lesson("science-y1-a", 1, 11, &[4, 5], 4, 1, &[]));
    snapshot.lessons.push(lesson("art-y1-a", 2, 10, &[3, 4, 5], 3, 0, &[1]));

    let assignment = expect_optimal(generate_timetable(&snapshot, &config()).unwrap());

    assert!(verify_assignment(&assignment, &snapshot, &config()).is_empty());
    for lesson in &snapshot.lessons {
        let assigned = assignment.lesson(&lesson.id).unwrap();
        assert_eq!(assigned.slot_ids.len() as u32, lesson.total_required_slots);
        assert_eq!(
            assigned.double_periods.len() as u32,
            lesson.total_required_double_periods
        );
        assert!(lesson
            .user_defined_slot_ids
            .iter()
            .all(|id| assigned.slot_ids.contains(id)));
    }

    let english = assignment.lesson("english-y1-a").unwrap();
    // day 2 at 09:00 and 10:00
    let meeting_slots = [7, 8];
    assert!(english.slot_ids.iter().all(|id| !meeting_slots.contains(id)));
}

#[test]
fn lessons_without_any_slots_are_infeasible() {
    let mut snapshot = school(1, 3);
    snapshot.timetable_slots.clear();
    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1], 1, 0, &[]));

    assert_eq!(
        generate_timetable(&snapshot, &config()).unwrap(),
        SolveResult::Infeasible
    );
}

#[test]
fn shared_teacher_across_year_groups_half_an_hour_apart() {
    let mut snapshot = school(1, 4);
    snapshot.year_groups.push(YearGroup {
        id: "y2".to_string(),
    });
    snapshot.pupils.push(Pupil {
        id: 6,
        year_group: "y2".to_string(),
    });
    // y2 periods start at 09:30, 10:30, 11:30 and 12:30
    let mut y2_slots = uniform_week(&["y2".to_string()], 1, 4, at(9, 30), 60);
    for slot in &mut y2_slots {
        slot.id += 100;
    }
    snapshot.timetable_slots.extend(y2_slots);
    snapshot.lessons.push(lesson("maths-y1-a", 1, 10, &[1], 2, 1, &[]));
    snapshot.lessons.push(lesson("art-y2-a", 1, 11, &[6], 2, 1, &[]));

    // the only way to fit both doubles is 09:00-11:00 then 11:30-13:30
    let assignment = expect_optimal(generate_timetable(&snapshot, &config()).unwrap());
    let slots_of = |id: &str| {
        let mut slot_ids = assignment.lesson(id).unwrap().slot_ids.clone();
        slot_ids.sort();
        slot_ids
    };
    assert_eq!(slots_of("maths-y1-a"), vec![1, 2]);
    assert_eq!(slots_of("art-y2-a"), vec![103, 104]);
    assert!(verify_assignment(&assignment, &snapshot, &config()).is_empty());
}
