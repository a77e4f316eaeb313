pub mod backend;
pub mod builder;
pub mod candidates;
pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod model;
pub mod repository;
pub mod server;
pub mod solver;
pub mod structure;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{FreePeriodPreference, SolveConfig};
pub use data::{Assignment, SchoolSnapshot, SolveResult};
pub use error::TimetableError;
pub use solver::{generate_for_school, generate_timetable, generate_timetable_with};
