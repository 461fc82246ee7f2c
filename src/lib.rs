//! Assign groups of students to schools with Mixed Integer Linear Programming.
//!
//! Students are grouped by home commune and study category. Every group goes
//! to exactly one school offering its category, schools hold at most their
//! seats per category, and total travel cost is minimised. The run is a single
//! pipeline: validate the input, balance demand against capacity, build the
//! program, solve it, then extract and export the allocation.

pub mod balance;
pub mod config;
pub mod error;
pub mod lp_format;
pub mod model;
pub mod reference;
pub mod report;
pub mod solver;
pub mod types;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::config::{BigM, Encoding, RunConfig, TimeLimit};
pub use crate::error::{
    Error, InfeasibleInputError, IoError, Result, SolveFailedError, ValidationError,
};
pub use crate::report::{Allocation, Assignment, Vacancy};
pub use crate::solver::{CbcSolver, MilpSolver, SolveStatus, SolverOutcome};
pub use crate::types::{Category, Commune, Input, Instance, School};

use crate::balance::balance;
use crate::model::{build_program, check_candidates};
use crate::report::{export_csv, extract_allocation};
use crate::solver::require_optimal;

#[derive(Debug, Serialize, Deserialize)]
pub struct Solution {
    pub solution: Allocation,
}

impl Input {
    /// Solve with CBC using the solver settings of this input.
    pub fn solve(&self) -> Result<Solution> {
        let solver = CbcSolver::new(&self.config.solver);
        let allocation = allocate(self, &solver)?;
        Ok(Solution {
            solution: allocation,
        })
    }
}

/// Run every stage up to the verified allocation. Nothing is exported except
/// the optional LP dump, which is written before solving.
pub fn allocate(input: &Input, solver: &impl MilpSolver) -> Result<Allocation> {
    let instance = Instance::try_from_input(input)?;
    check_candidates(&instance)?;
    log::info!(
        "validated {} communes, {} schools, {} categories",
        instance.communes().count(),
        instance.schools().count(),
        instance.categories().count()
    );

    let balanced = balance(instance)?;
    let program = build_program(&balanced, &input.config.model)?;
    log::info!(
        "program '{}' has {} variables and {} constraints",
        program.name(),
        program.variables().len(),
        program.constraints().len()
    );

    if let Some(path) = &input.config.export.lp_file {
        lp_format::write_lp(&program, path)?;
    }

    log::info!("starting optimization");
    let outcome = require_optimal(&program, solver.submit(&program))?;

    let allocation = extract_allocation(&balanced, &program, &outcome);
    allocation.verify(&balanced, &program)?;
    log::info!(
        "{} groups assigned, total travel cost {}",
        allocation.assignments.len(),
        allocation.total_cost
    );
    Ok(allocation)
}

/// Solve and write the CSV export. Returns the allocation and the file written.
pub fn run(input: &Input, solver: &impl MilpSolver) -> Result<(Allocation, PathBuf)> {
    let allocation = allocate(input, solver)?;
    let path = export_csv(&allocation, &input.config.export)?;
    Ok((allocation, path))
}
