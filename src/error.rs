use crate::data::{LessonId, Resource, SlotId, TimeOfWeek, YearGroupId};
use crate::repository::RepositoryError;
use serde::Serialize;
use std::fmt;

/// Categories of problems found in the raw snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputProblemKind {
    DuplicateId,
    UnknownReference,
    InvalidTime,
    EmptyLesson,
    InvalidRequirement,
    IrrelevantFixedSlot,
    FixedSlotDuringBreak,
}

/// One defect in the snapshot handed to the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProblem {
    pub kind: InputProblemKind,
    pub message: String,
}

impl InputProblem {
    pub fn new(kind: InputProblemKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for InputProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// A slot or break named in a structure diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum StructureItem {
    Slot { id: SlotId, time: TimeOfWeek },
    Break { id: String, time: TimeOfWeek },
}

impl fmt::Display for StructureItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureItem::Slot { id, time } => write!(f, "slot {id} ({time})"),
            StructureItem::Break { id, time } => write!(f, "break {id} ({time})"),
        }
    }
}

/// A hard constraint that an extracted timetable fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolation {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("invalid input: {}", join(.0))]
    InvalidInput(Vec<InputProblem>),

    #[error("year group {year_group}: {first} overlaps {second}")]
    StructureConflict {
        year_group: YearGroupId,
        first: StructureItem,
        second: StructureItem,
    },

    #[error(
        "lesson {lesson_id} is fixed at slot {slot_id}, clashing with lesson {other_lesson_id} \
         at slot {other_slot_id}; both use {resource}"
    )]
    FixedSlotConflict {
        lesson_id: LessonId,
        other_lesson_id: LessonId,
        resource: Resource,
        slot_id: SlotId,
        other_slot_id: SlotId,
    },

    #[error("solver returned a timetable breaking hard constraints: {}", join(.0))]
    SolverContractViolation(Vec<ConstraintViolation>),

    #[error("solver backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TimetableError {
    /// Internal defects should be escalated rather than shown to users as data problems.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            TimetableError::SolverContractViolation(_) | TimetableError::Backend(_)
        )
    }
}
