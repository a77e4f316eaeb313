use crate::backend::{HighsBackend, MilpOutcome, SolverBackend};
use crate::builder::build_model;
use crate::candidates::generate_candidates;
use crate::config::SolveConfig;
use crate::data::{SchoolId, SchoolSnapshot, SolveResult};
use crate::error::TimetableError;
use crate::extract::extract_assignment;
use crate::repository::SchoolRepository;
use crate::structure::validate_structure;
use crate::validation::validate_snapshot;
use log::{info, warn};
use std::time::Instant;

/// Produces a clash-free timetable for one school using HiGHS.
pub fn generate_timetable(
    snapshot: &SchoolSnapshot,
    config: &SolveConfig,
) -> Result<SolveResult, TimetableError> {
    generate_timetable_with(snapshot, config, &HighsBackend::from_config(config))
}

/// Produces a clash-free timetable for one school using the given engine.
///
/// Input defects are reported before the engine is invoked. An engine result that
/// fails re-verification is returned as [`TimetableError::SolverContractViolation`].
pub fn generate_timetable_with(
    snapshot: &SchoolSnapshot,
    config: &SolveConfig,
    backend: &dyn SolverBackend,
) -> Result<SolveResult, TimetableError> {
    let start_time = Instant::now();
    info!(
        "Generating timetable for {} lessons over {} slots with {}...",
        snapshot.lessons.len(),
        snapshot.timetable_slots.len(),
        backend.name()
    );

    validate_snapshot(snapshot)?;
    validate_structure(snapshot)?;
    let candidates = generate_candidates(snapshot)?;
    let model = build_model(candidates, config);

    let result = match backend.solve(&model.milp, config.time_limit())? {
        MilpOutcome::Optimal(values) => {
            SolveResult::Optimal(extract_assignment(&model, &values, snapshot, config)?)
        }
        MilpOutcome::Feasible(values) => {
            SolveResult::Feasible(extract_assignment(&model, &values, snapshot, config)?)
        }
        MilpOutcome::Infeasible => {
            warn!("No timetable satisfies every requirement");
            SolveResult::Infeasible
        }
        MilpOutcome::TimedOutNoSolution => {
            warn!(
                "No timetable found within {:.1?}",
                config.time_limit()
            );
            SolveResult::TimedOutNoSolution
        }
    };
    info!("Timetable generation finished in {:.2?}", start_time.elapsed());
    Ok(result)
}

/// Solves from the repository's snapshot and, on success, replaces the stored timetable.
///
/// If the snapshot is replaced while solving, nothing is stored and
/// [`RepositoryError::Stale`](crate::repository::RepositoryError::Stale) is returned.
pub fn generate_for_school(
    repository: &dyn SchoolRepository,
    school_id: SchoolId,
    config: &SolveConfig,
    backend: &dyn SolverBackend,
) -> Result<SolveResult, TimetableError> {
    let (snapshot, revision) = repository.load_snapshot(school_id)?;
    let result = generate_timetable_with(&snapshot, config, backend)?;
    if let Some(assignment) = result.assignment() {
        repository.store_assignment(school_id, revision, assignment.clone())?;
        info!("Stored new timetable for school {school_id} at revision {revision}");
    }
    Ok(result)
}
