#![allow(dead_code)]

use chrono::NaiveTime;
use school_timetabler::data::{
    Break, Classroom, Lesson, Pupil, SchoolSnapshot, SlotId, Teacher, TimeOfWeek, YearGroup,
};
use school_timetabler::structure::uniform_week;
use school_timetabler::{SolveConfig, SolveResult};
use std::time::Duration;

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn config() -> SolveConfig {
    SolveConfig::default().with_time_limit(Duration::from_secs(30))
}

/// Year group "y1" with pupils 1-5, teachers 1-2, classrooms 10-11 and hour-long
/// periods from 09:00.
pub fn school(days: u8, periods_per_day: u32) -> SchoolSnapshot {
    let y1 = "y1".to_string();
    SchoolSnapshot {
        year_groups: vec![YearGroup { id: y1.clone() }],
        pupils: (1..=5)
            .map(|id| Pupil {
                id,
                year_group: y1.clone(),
            })
            .collect(),
        teachers: vec![Teacher { id: 1 }, Teacher { id: 2 }],
        classrooms: vec![Classroom { id: 10 }, Classroom { id: 11 }],
        timetable_slots: uniform_week(&[y1], days, periods_per_day, at(9, 0), 60),
        breaks: Vec::new(),
        lessons: Vec::new(),
    }
}

pub fn lesson(
    id: &str,
    teacher_id: u32,
    classroom_id: u32,
    pupil_ids: &[u32],
    total_required_slots: u32,
    total_required_double_periods: u32,
    user_defined_slot_ids: &[SlotId],
) -> Lesson {
    Lesson {
        id: id.to_string(),
        subject_name: id.split('-').next().unwrap_or(id).to_uppercase(),
        teacher_id,
        classroom_id,
        pupil_ids: pupil_ids.iter().copied().collect(),
        total_required_slots,
        total_required_double_periods,
        user_defined_slot_ids: user_defined_slot_ids.iter().copied().collect(),
    }
}

pub fn year_group_break(
    id: &str,
    day_of_week: u8,
    starts_at: NaiveTime,
    ends_at: NaiveTime,
) -> Break {
    Break {
        id: id.to_string(),
        time: TimeOfWeek {
            day_of_week,
            starts_at,
            ends_at,
        },
        relevant_year_groups: ["y1".to_string()].into_iter().collect(),
        relevant_teachers: Default::default(),
    }
}

pub fn expect_optimal(result: SolveResult) -> school_timetabler::Assignment {
    match result {
        SolveResult::Optimal(assignment) => assignment,
        other => panic!("expected an optimal timetable, got {other:?}"),
    }
}
