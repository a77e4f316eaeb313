use crate::data::{
    Classroom, ClassroomId, Lesson, Pupil, PupilId, SchoolSnapshot, SlotId, Teacher, TeacherId,
    YearGroup,
};
use crate::structure::uniform_week;
use chrono::NaiveTime;

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// One year group "1" with pupils 1-5, teachers 1-3, classrooms 10-12 and an hour-long
/// period grid starting at 09:00. No lessons or breaks.
pub fn school(days: u8, periods_per_day: u32) -> SchoolSnapshot {
    let year_group = "1".to_string();
    SchoolSnapshot {
        year_groups: vec![YearGroup {
            id: year_group.clone(),
        }],
        pupils: (1..=5)
            .map(|id| Pupil {
                id,
                year_group: year_group.clone(),
            })
            .collect(),
        teachers: (1..=3).map(|id| Teacher { id }).collect(),
        classrooms: (10..=12).map(|id| Classroom { id }).collect(),
        timetable_slots: uniform_week(&[year_group], days, periods_per_day, at(9, 0), 60),
        breaks: Vec::new(),
        lessons: Vec::new(),
    }
}

pub fn lesson(
    id: &str,
    teacher_id: TeacherId,
    classroom_id: ClassroomId,
    pupil_ids: &[PupilId],
    total_required_slots: u32,
    total_required_double_periods: u32,
    user_defined_slot_ids: &[SlotId],
) -> Lesson {
    Lesson {
        id: id.to_string(),
        subject_name: "MATHS".to_string(),
        teacher_id,
        classroom_id,
        pupil_ids: pupil_ids.iter().copied().collect(),
        total_required_slots,
        total_required_double_periods,
        user_defined_slot_ids: user_defined_slot_ids.iter().copied().collect(),
    }
}
