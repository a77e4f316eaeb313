use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// Type aliases for clarity
pub type SchoolId = u32;
pub type YearGroupId = String;
pub type PupilId = u32;
pub type TeacherId = u32;
pub type ClassroomId = u32;
pub type SlotId = u32;
pub type BreakId = String;
pub type LessonId = String;

/// A year group owns its own weekly structure of slots and breaks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearGroup {
    pub id: YearGroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pupil {
    pub id: PupilId,
    pub year_group: YearGroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: ClassroomId,
}

/// The span of a slot or break within the week. Days run 1 (Monday) to 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOfWeek {
    pub day_of_week: u8,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

impl TimeOfWeek {
    /// Periods clash when they share a day and their open intervals intersect,
    /// so back-to-back periods do not clash.
    pub fn clashes_with(&self, other: &TimeOfWeek) -> bool {
        self.day_of_week == other.day_of_week
            && self.starts_at < other.ends_at
            && other.starts_at < self.ends_at
    }

    /// Whether the instant `at` on `day_of_week` falls within `[starts_at, ends_at)`.
    pub fn contains_instant(&self, day_of_week: u8, at: NaiveTime) -> bool {
        self.day_of_week == day_of_week && self.starts_at <= at && at < self.ends_at
    }

    /// Whether `next` starts exactly when this period ends, on the same day.
    pub fn is_followed_by(&self, next: &TimeOfWeek) -> bool {
        self.day_of_week == next.day_of_week && self.ends_at == next.starts_at
    }
}

impl fmt::Display for TimeOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {} {}-{}",
            self.day_of_week,
            self.starts_at.format("%H:%M"),
            self.ends_at.format("%H:%M")
        )
    }
}

/// A period of the week in which lessons for the relevant year groups may be taught.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    pub id: SlotId,
    #[serde(flatten)]
    pub time: TimeOfWeek,
    pub relevant_year_groups: BTreeSet<YearGroupId>,
}

/// A period of unavailability for the relevant year groups and teachers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Break {
    pub id: BreakId,
    #[serde(flatten)]
    pub time: TimeOfWeek,
    pub relevant_year_groups: BTreeSet<YearGroupId>,
    #[serde(default)]
    pub relevant_teachers: BTreeSet<TeacherId>,
}

/// A recurring weekly lesson to be timetabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub subject_name: String,
    pub teacher_id: TeacherId,
    pub classroom_id: ClassroomId,
    pub pupil_ids: BTreeSet<PupilId>,
    pub total_required_slots: u32,
    #[serde(default)]
    pub total_required_double_periods: u32,
    #[serde(default)]
    pub user_defined_slot_ids: BTreeSet<SlotId>,
}

/// A consistent, read-only picture of one school's timetabling data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSnapshot {
    pub year_groups: Vec<YearGroup>,
    pub pupils: Vec<Pupil>,
    pub teachers: Vec<Teacher>,
    pub classrooms: Vec<Classroom>,
    pub timetable_slots: Vec<TimetableSlot>,
    #[serde(default)]
    pub breaks: Vec<Break>,
    pub lessons: Vec<Lesson>,
}

/// Anything that can host at most one lesson at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum Resource {
    Teacher(TeacherId),
    Pupil(PupilId),
    Classroom(ClassroomId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Teacher(id) => write!(f, "teacher {id}"),
            Resource::Pupil(id) => write!(f, "pupil {id}"),
            Resource::Classroom(id) => write!(f, "classroom {id}"),
        }
    }
}

impl Lesson {
    /// Every resource the lesson occupies while it is taught.
    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        [
            Resource::Teacher(self.teacher_id),
            Resource::Classroom(self.classroom_id),
        ]
        .into_iter()
        .chain(self.pupil_ids.iter().map(|p| Resource::Pupil(*p)))
    }

    /// The first resource shared with `other`, checked teacher, classroom then pupils.
    pub fn shared_resource(&self, other: &Lesson) -> Option<Resource> {
        if self.teacher_id == other.teacher_id {
            return Some(Resource::Teacher(self.teacher_id));
        }
        if self.classroom_id == other.classroom_id {
            return Some(Resource::Classroom(self.classroom_id));
        }
        self.pupil_ids
            .intersection(&other.pupil_ids)
            .next()
            .map(|p| Resource::Pupil(*p))
    }
}

/// Two contiguous slots taught together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoublePeriod {
    pub first_slot_id: SlotId,
    pub second_slot_id: SlotId,
}

/// The slots one lesson occupies in a solved timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAssignment {
    pub lesson_id: LessonId,
    /// Ordered by day, then start time.
    pub slot_ids: Vec<SlotId>,
    pub user_defined_slot_ids: Vec<SlotId>,
    pub double_periods: Vec<DoublePeriod>,
}

impl LessonAssignment {
    pub fn solver_defined_slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slot_ids
            .iter()
            .copied()
            .filter(|id| !self.user_defined_slot_ids.contains(id))
    }
}

/// Describes a soft constraint that was not met in the final timetable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for UnmetSoftConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

/// A complete, verified timetable for one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub lessons: Vec<LessonAssignment>,
    /// Number of extra separate blocks taught on a day a lesson already has one on.
    pub spread_penalty: u32,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
}

impl Assignment {
    pub fn lesson(&self, lesson_id: &str) -> Option<&LessonAssignment> {
        self.lessons.iter().find(|l| l.lesson_id == lesson_id)
    }
}

/// The outcome of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "assignment")]
pub enum SolveResult {
    Optimal(Assignment),
    /// The time limit was reached with a usable but unproven solution.
    Feasible(Assignment),
    Infeasible,
    TimedOutNoSolution,
}

impl SolveResult {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            SolveResult::Optimal(a) | SolveResult::Feasible(a) => Some(a),
            SolveResult::Infeasible | SolveResult::TimedOutNoSolution => None,
        }
    }

    pub fn into_assignment(self) -> Option<Assignment> {
        match self {
            SolveResult::Optimal(a) | SolveResult::Feasible(a) => Some(a),
            SolveResult::Infeasible | SolveResult::TimedOutNoSolution => None,
        }
    }
}
