use good_lp::solvers::coin_cbc::{CoinCbcProblem, coin_cbc};
use good_lp::solvers::{ResolutionError, SolutionStatus, WithTimeLimit};
use good_lp::{
    Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable, variable, variables,
};
use serde::Serialize;

use crate::config::{SolverSettings, TimeLimit};
use crate::error::SolveFailedError;
use crate::model::{LinearConstraint, Program, Relation, VarId, VarKind};

/// Terminal state reported by a MILP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NotSolved,
}

/// What comes back from one solve.
///
/// `values` is indexed like [`Program::variables`] and is only filled for an
/// optimal solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    pub values: Vec<f64>,
    pub detail: Option<String>,
}

impl SolverOutcome {
    pub fn optimal(values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values,
            detail: None,
        }
    }

    pub fn failed(status: SolveStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            values: Vec::new(),
            detail: Some(detail.into()),
        }
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.index()]
    }
}

/// A MILP engine: takes a minimisation program, returns a status and values.
///
/// Implementations must not retry; the same program gives the same answer.
pub trait MilpSolver {
    fn submit(&self, program: &Program) -> SolverOutcome;
}

/// Anything short of a proven optimum fails the run.
pub fn require_optimal(
    program: &Program,
    outcome: SolverOutcome,
) -> Result<SolverOutcome, SolveFailedError> {
    if outcome.status != SolveStatus::Optimal {
        return Err(SolveFailedError {
            program: program.name().to_owned(),
            status: outcome.status,
            reason: outcome
                .detail
                .unwrap_or_else(|| "solver did not report an optimum".to_owned()),
        });
    }
    if outcome.values.len() != program.variables().len() {
        return Err(SolveFailedError {
            program: program.name().to_owned(),
            status: outcome.status,
            reason: format!(
                "solver returned {} values for {} variables",
                outcome.values.len(),
                program.variables().len()
            ),
        });
    }
    Ok(outcome)
}

/// COIN-OR CBC through `good_lp`.
#[derive(Debug, Clone, Default)]
pub struct CbcSolver {
    time_limit_seconds: Option<f64>,
    verbose: bool,
}

impl CbcSolver {
    pub fn new(settings: &SolverSettings) -> Self {
        Self {
            time_limit_seconds: settings.time_limit_seconds.map(TimeLimit::seconds),
            verbose: settings.verbose,
        }
    }

    /// Create a model with the given objective function
    fn create_model(&self, variables: ProblemVariables, objective: Expression) -> CoinCbcProblem {
        let mut model = variables.minimise(objective).using(coin_cbc);
        if !self.verbose {
            model.set_parameter("loglevel", "0");
        }
        match self.time_limit_seconds {
            Some(seconds) => model.with_time_limit(seconds),
            None => model,
        }
    }
}

impl MilpSolver for CbcSolver {
    fn submit(&self, program: &Program) -> SolverOutcome {
        let mut problem_vars = variables!();
        let vars: Vec<Variable> = program
            .variables()
            .iter()
            .map(|def| match def.kind {
                VarKind::Integer => problem_vars.add(variable().integer().min(0)),
                VarKind::Binary => problem_vars.add(variable().binary()),
            })
            .collect();

        let objective = linear_expression(program.objective(), &vars);
        let model = self.create_model(problem_vars, objective);
        let model = program
            .constraints()
            .iter()
            .fold(model, |m, c| m.with(to_good_lp_constraint(c, &vars)));

        match model.solve() {
            Ok(solution) => match solution.status() {
                SolutionStatus::Optimal => {
                    SolverOutcome::optimal(vars.iter().map(|&v| solution.value(v)).collect())
                }
                SolutionStatus::TimeLimit => {
                    SolverOutcome::failed(SolveStatus::NotSolved, "time limit reached")
                }
                _ => SolverOutcome::failed(SolveStatus::NotSolved, "stopped before optimality"),
            },
            Err(ResolutionError::Infeasible) => {
                SolverOutcome::failed(SolveStatus::Infeasible, "program is infeasible")
            }
            Err(ResolutionError::Unbounded) => {
                SolverOutcome::failed(SolveStatus::Unbounded, "program is unbounded")
            }
            Err(other) => SolverOutcome::failed(SolveStatus::NotSolved, other.to_string()),
        }
    }
}

fn linear_expression(terms: &[(VarId, f64)], vars: &[Variable]) -> Expression {
    terms
        .iter()
        .fold(Expression::from(0.0), |sum, &(var, coeff)| {
            sum + vars[var.index()] * coeff
        })
}

fn to_good_lp_constraint(constraint: &LinearConstraint, vars: &[Variable]) -> Constraint {
    let lhs = linear_expression(&constraint.terms, vars);
    match constraint.relation {
        Relation::Eq => lhs.eq(constraint.rhs),
        Relation::Le => lhs.leq(constraint.rhs),
        Relation::Ge => lhs.geq(constraint.rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::balance;
    use crate::model::build_program;
    use crate::reference::reference_input;
    use crate::types::{Input, Instance};

    fn reference_program() -> Program {
        let input = reference_input();
        let balanced = balance(Instance::try_from_input(&input).unwrap()).unwrap();
        build_program(&balanced, &input.config.model).unwrap()
    }

    #[test]
    fn cbc_finds_the_reference_optimum() {
        let program = reference_program();
        let outcome = CbcSolver::default().submit(&program);

        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.values.len(), program.variables().len());
        assert!((program.objective_value(&outcome.values) - 72.0).abs() < 1e-6);
    }

    #[test]
    fn cbc_reports_infeasible_when_no_single_school_fits_a_group() {
        let input: Input = serde_yaml::from_str(
            r#"
categories: [1]
communes: [Hinwil]
schools: [p, q]
offerings: {p: [1], q: [1]}
capacity: {p: {1: 5}, q: {1: 5}}
demand: {Hinwil: {1: 6}}
cost: {Hinwil: {p: 1, q: 2}}
"#,
        )
        .unwrap();
        // Totals fit (6 of 10 seats) but the group cannot be split
        let balanced = balance(Instance::try_from_input(&input).unwrap()).unwrap();
        let program = build_program(&balanced, &input.config.model).unwrap();

        let outcome = CbcSolver::default().submit(&program);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_empty());
    }

    #[test]
    fn cbc_stopped_by_time_limit_is_not_solved() {
        let program = reference_program();
        let solver = CbcSolver {
            time_limit_seconds: Some(0.0),
            verbose: false,
        };

        let outcome = solver.submit(&program);
        assert_eq!(outcome.status, SolveStatus::NotSolved);
        let err = require_optimal(&program, outcome).unwrap_err();
        assert_eq!(err.status, SolveStatus::NotSolved);
    }

    #[test]
    fn non_optimal_status_fails_with_context() {
        let program = reference_program();
        let outcome = SolverOutcome::failed(SolveStatus::Infeasible, "program is infeasible");

        let err = require_optimal(&program, outcome).unwrap_err();
        assert_eq!(err.status, SolveStatus::Infeasible);
        assert_eq!(err.program, "Schulen_Test");
        assert_eq!(err.reason, "program is infeasible");
    }

    #[test]
    fn truncated_values_are_rejected() {
        let program = reference_program();
        let err = require_optimal(&program, SolverOutcome::optimal(vec![0.0; 3])).unwrap_err();
        assert_eq!(err.status, SolveStatus::Optimal);
    }
}
