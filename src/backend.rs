//! Adapters between [`MilpModel`] and concrete MILP engines.

use crate::config::SolveConfig;
use crate::error::TimetableError;
use crate::model::{MilpModel, Sense, VarKind};
use good_lp::solvers::SolutionStatus;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    variable,
};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// What an engine made of a model. Values are indexed like `MilpModel::variables`.
#[derive(Debug, Clone, PartialEq)]
pub enum MilpOutcome {
    Optimal(Vec<f64>),
    /// Stopped at the time limit holding an incumbent that satisfies the model.
    Feasible(Vec<f64>),
    Infeasible,
    TimedOutNoSolution,
}

/// A MILP engine able to handle binary variables and linear constraints.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must return within roughly `time_limit`.
    fn solve(&self, model: &MilpModel, time_limit: Duration) -> Result<MilpOutcome, TimetableError>;
}

/// The open-source HiGHS engine.
#[derive(Debug, Clone)]
pub struct HighsBackend {
    pub threads: u32,
    pub random_seed: u32,
    pub log_to_console: bool,
}

impl HighsBackend {
    pub fn from_config(config: &SolveConfig) -> Self {
        Self {
            threads: config.threads,
            random_seed: config.random_seed,
            log_to_console: false,
        }
    }
}

impl Default for HighsBackend {
    fn default() -> Self {
        Self::from_config(&SolveConfig::default())
    }
}

impl SolverBackend for HighsBackend {
    fn name(&self) -> &'static str {
        "highs"
    }

    fn solve(
        &self,
        model: &MilpModel,
        time_limit: Duration,
    ) -> Result<MilpOutcome, TimetableError> {
        if let Some(outcome) = solve_trivial(model) {
            return Ok(outcome);
        }
        let (problem, vars, objective) = translate_variables(model);
        let mut highs = problem
            .minimise(objective)
            .using(good_lp::solvers::highs::highs)
            .set_option("threads", self.threads as i32)
            .set_option("random_seed", self.random_seed as i32)
            .set_option("time_limit", time_limit.as_secs_f64())
            .set_option("log_to_console", self.log_to_console);
        add_constraints(&mut highs, model, &vars);

        info!("Starting HiGHS with a time limit of {:.1?}...", time_limit);
        run(highs, model, &vars)
    }
}

/// COIN-OR CBC, available with the `cbc` feature.
#[cfg(feature = "cbc")]
#[derive(Debug, Clone)]
pub struct CbcBackend {
    pub threads: u32,
}

#[cfg(feature = "cbc")]
impl SolverBackend for CbcBackend {
    fn name(&self) -> &'static str {
        "cbc"
    }

    fn solve(
        &self,
        model: &MilpModel,
        time_limit: Duration,
    ) -> Result<MilpOutcome, TimetableError> {
        if let Some(outcome) = solve_trivial(model) {
            return Ok(outcome);
        }
        let (problem, vars, objective) = translate_variables(model);
        let mut cbc = problem
            .minimise(objective)
            .using(good_lp::solvers::coin_cbc::coin_cbc);
        cbc.set_parameter("sec", &time_limit.as_secs_f64().to_string());
        cbc.set_parameter("threads", &self.threads.to_string());
        cbc.set_parameter("log", "0");
        add_constraints(&mut cbc, model, &vars);

        info!("Starting CBC with a time limit of {:.1?}...", time_limit);
        run(cbc, model, &vars)
    }
}

/// Engines reject models without columns, so decide those directly.
fn solve_trivial(model: &MilpModel) -> Option<MilpOutcome> {
    if !model.variables.is_empty() {
        return None;
    }
    Some(if model.violations(&[]).is_empty() {
        MilpOutcome::Optimal(Vec::new())
    } else {
        MilpOutcome::Infeasible
    })
}

fn translate_variables(model: &MilpModel) -> (ProblemVariables, Vec<Variable>, Expression) {
    let mut problem = ProblemVariables::new();
    let vars: Vec<Variable> = model
        .variables
        .iter()
        .map(|def| {
            let mut definition = variable().name(def.name.clone());
            if def.kind == VarKind::Binary {
                definition = definition.binary();
            }
            definition = definition.min(def.lower);
            if def.upper.is_finite() {
                definition = definition.max(def.upper);
            }
            problem.add(definition)
        })
        .collect();
    let objective: Expression = model
        .objective
        .iter()
        .map(|(var, coefficient)| *coefficient * vars[var.index()])
        .sum();
    (problem, vars, objective)
}

fn add_constraints<M: SolverModel>(solver_model: &mut M, model: &MilpModel, vars: &[Variable]) {
    for row in &model.constraints {
        let lhs: Expression = row
            .terms
            .iter()
            .map(|(var, coefficient)| *coefficient * vars[var.index()])
            .sum();
        let rhs = row.rhs;
        solver_model.add_constraint(match row.sense {
            Sense::Le => constraint!(lhs <= rhs),
            Sense::Eq => constraint!(lhs == rhs),
            Sense::Ge => constraint!(lhs >= rhs),
        });
    }
    debug!("Passed {} constraints to the engine", model.constraints.len());
}

fn run<M>(
    solver_model: M,
    model: &MilpModel,
    vars: &[Variable],
) -> Result<MilpOutcome, TimetableError>
where
    M: SolverModel<Error = ResolutionError>,
{
    let started = Instant::now();
    let result = solver_model.solve();
    let elapsed = started.elapsed();

    match result {
        Ok(solution) => {
            // anything the engine leaves unset counts as 0
            let values: Vec<f64> = vars
                .iter()
                .map(|var| solution.value(*var))
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect();
            info!(
                "Engine finished in {:.2?} with status {:?}",
                elapsed,
                solution.status()
            );
            Ok(interpret(model, values, solution.status()))
        }
        Err(e) => {
            let outcome = interpret_error(e)?;
            info!("Engine finished in {:.2?} without a solution: {outcome:?}", elapsed);
            Ok(outcome)
        }
    }
}

/// Only a proven optimum is trusted as is. Values from a solve stopped at a limit are
/// kept as `Feasible` only when they satisfy every row of the model.
fn interpret(model: &MilpModel, values: Vec<f64>, status: SolutionStatus) -> MilpOutcome {
    if matches!(status, SolutionStatus::Optimal) {
        return MilpOutcome::Optimal(values);
    }
    let violations = model.violations(&values);
    if violations.is_empty() {
        MilpOutcome::Feasible(values)
    } else {
        debug!(
            "Values at status {status:?} break {} model rows; treating as no incumbent",
            violations.len()
        );
        MilpOutcome::TimedOutNoSolution
    }
}

/// HiGHS reports a limit reached before any feasible point as `NoSolutionFound`.
fn interpret_error(error: ResolutionError) -> Result<MilpOutcome, TimetableError> {
    match error {
        ResolutionError::Infeasible => Ok(MilpOutcome::Infeasible),
        ResolutionError::Other("NoSolutionFound") => {
            warn!("Engine stopped at a limit without a solution");
            Ok(MilpOutcome::TimedOutNoSolution)
        }
        e => Err(TimetableError::Backend(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choose_one_of_two() -> MilpModel {
        let mut model = MilpModel::new();
        let a = model.add_binary("a");
        let b = model.add_binary("b");
        model.add_constraint("one", vec![(a, 1.0), (b, 1.0)], Sense::Eq, 1.0);
        model.add_objective_term(a, 2.0);
        model.add_objective_term(b, 1.0);
        model
    }

    #[test]
    fn empty_model_is_trivially_optimal() {
        let outcome = HighsBackend::default()
            .solve(&MilpModel::new(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(outcome, MilpOutcome::Optimal(Vec::new()));
    }

    #[test]
    fn timed_out_incumbent_is_kept_only_when_consistent() {
        let model = choose_one_of_two();
        assert_eq!(
            interpret(&model, vec![0.0, 1.0], SolutionStatus::TimeLimit),
            MilpOutcome::Feasible(vec![0.0, 1.0])
        );
        assert_eq!(
            interpret(&model, vec![0.0, 1.0], SolutionStatus::GapLimit),
            MilpOutcome::Feasible(vec![0.0, 1.0])
        );
        assert_eq!(
            interpret(&model, vec![0.0, 0.0], SolutionStatus::TimeLimit),
            MilpOutcome::TimedOutNoSolution
        );
    }

    #[test]
    fn proven_optimum_is_optimal_however_long_it_took() {
        let model = choose_one_of_two();
        assert_eq!(
            interpret(&model, vec![0.0, 1.0], SolutionStatus::Optimal),
            MilpOutcome::Optimal(vec![0.0, 1.0])
        );
    }

    #[test]
    fn engine_errors_map_to_outcomes() {
        assert_eq!(
            interpret_error(ResolutionError::Infeasible).unwrap(),
            MilpOutcome::Infeasible
        );
        assert_eq!(
            interpret_error(ResolutionError::Other("NoSolutionFound")).unwrap(),
            MilpOutcome::TimedOutNoSolution
        );
        assert!(matches!(
            interpret_error(ResolutionError::Unbounded),
            Err(TimetableError::Backend(_))
        ));
    }

    #[test]
    fn highs_solves_small_model() {
        let outcome = HighsBackend::default()
            .solve(&choose_one_of_two(), Duration::from_secs(10))
            .unwrap();
        match outcome {
            MilpOutcome::Optimal(values) => {
                assert!(values[0].abs() < 1e-6);
                assert!((values[1] - 1.0).abs() < 1e-6);
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn highs_reports_infeasible() {
        let mut model = choose_one_of_two();
        let a = model.constraints[0].terms[0].0;
        model.add_constraint("too_many", vec![(a, 1.0)], Sense::Ge, 2.0);
        let outcome = HighsBackend::default()
            .solve(&model, Duration::from_secs(10))
            .unwrap();
        assert_eq!(outcome, MilpOutcome::Infeasible);
    }
}
