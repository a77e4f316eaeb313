//! Read and write interfaces to whatever stores school data.

use crate::data::{Assignment, SchoolId, SchoolSnapshot};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("school {0} not found")]
    SchoolNotFound(SchoolId),

    #[error("school {school_id} moved to revision {current} while solving revision {solved}")]
    Stale {
        school_id: SchoolId,
        solved: Revision,
        current: Revision,
    },

    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// Increases every time a school's snapshot is replaced.
pub type Revision = u64;

/// Source of school snapshots and sink for solved timetables.
///
/// Implementations must be `Send + Sync`, since schools are solved concurrently.
pub trait SchoolRepository: Send + Sync {
    /// A consistent snapshot of everything needed to timetable the school, with its revision.
    fn load_snapshot(
        &self,
        school_id: SchoolId,
    ) -> Result<(SchoolSnapshot, Revision), RepositoryError>;

    /// Replaces the school's timetable as a single step.
    ///
    /// Fails with [`RepositoryError::Stale`] when the snapshot is no longer at `revision`,
    /// so a timetable is never stored against data it was not solved for.
    fn store_assignment(
        &self,
        school_id: SchoolId,
        revision: Revision,
        assignment: Assignment,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone)]
struct SchoolRecord {
    snapshot: SchoolSnapshot,
    revision: Revision,
    assignment: Option<Assignment>,
}

/// Keeps every school in memory behind a lock.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    schools: RwLock<HashMap<SchoolId, SchoolRecord>>,
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores new school data. Any previous timetable no longer matches it and is dropped.
    pub fn put_snapshot(
        &self,
        school_id: SchoolId,
        snapshot: SchoolSnapshot,
    ) -> Result<Revision, RepositoryError> {
        let mut schools = self.schools.write().map_err(poisoned)?;
        let revision = schools.get(&school_id).map_or(1, |record| record.revision + 1);
        schools.insert(
            school_id,
            SchoolRecord {
                snapshot,
                revision,
                assignment: None,
            },
        );
        Ok(revision)
    }

    pub fn assignment(&self, school_id: SchoolId) -> Result<Option<Assignment>, RepositoryError> {
        let schools = self.schools.read().map_err(poisoned)?;
        schools
            .get(&school_id)
            .map(|record| record.assignment.clone())
            .ok_or(RepositoryError::SchoolNotFound(school_id))
    }
}

impl SchoolRepository for InMemoryRepository {
    fn load_snapshot(
        &self,
        school_id: SchoolId,
    ) -> Result<(SchoolSnapshot, Revision), RepositoryError> {
        let schools = self.schools.read().map_err(poisoned)?;
        schools
            .get(&school_id)
            .map(|record| (record.snapshot.clone(), record.revision))
            .ok_or(RepositoryError::SchoolNotFound(school_id))
    }

    fn store_assignment(
        &self,
        school_id: SchoolId,
        revision: Revision,
        assignment: Assignment,
    ) -> Result<(), RepositoryError> {
        let mut schools = self.schools.write().map_err(poisoned)?;
        let record = schools
            .get_mut(&school_id)
            .ok_or(RepositoryError::SchoolNotFound(school_id))?;
        if record.revision != revision {
            return Err(RepositoryError::Stale {
                school_id,
                solved: revision,
                current: record.revision,
            });
        }
        record.assignment = Some(assignment);
        Ok(())
    }
}
