use std::path::PathBuf;

use thiserror::Error;

use crate::solver::SolveStatus;
use crate::types::{Category, Commune, School};

/// Every way a run can fail. All of them abort the run; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InfeasibleInput(#[from] InfeasibleInputError),

    #[error(transparent)]
    SolveFailed(#[from] SolveFailedError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Malformed or inconsistent input, detected before anything is solved.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{table} references unknown commune '{commune}'")]
    UnknownCommune { table: &'static str, commune: Commune },

    #[error("{table} references unknown school '{school}'")]
    UnknownSchool { table: &'static str, school: School },

    #[error("{table} references unknown category '{category}'")]
    UnknownCategory {
        table: &'static str,
        category: Category,
    },

    #[error("school '{school}' has negative capacity {seats} for category '{category}'")]
    NegativeCapacity {
        school: School,
        category: Category,
        seats: i64,
    },

    #[error("commune '{commune}' has negative demand {students} for category '{category}'")]
    NegativeDemand {
        commune: Commune,
        category: Category,
        students: i64,
    },

    #[error("{table} value {value} for {entry} does not fit in 32 bits")]
    QuantityTooLarge {
        table: &'static str,
        entry: String,
        value: i64,
    },

    #[error("school '{school}' offers category '{category}' but declares no capacity for it")]
    MissingCapacity { school: School, category: Category },

    #[error("no travel cost from commune '{commune}' to school '{school}'")]
    MissingCost { commune: Commune, school: School },

    #[error("travel cost {cost} from commune '{commune}' to school '{school}' is not a finite non-negative number")]
    InvalidCost {
        commune: Commune,
        school: School,
        cost: f64,
    },

    #[error("{origin} demands {students} students of category '{category}' but no school offers it (constraint {constraint})")]
    NoCandidateSchool {
        origin: String,
        category: Category,
        students: u64,
        constraint: String,
    },

    #[error("big-M {big_m} is smaller than the largest group demand {max_demand}")]
    BigMTooSmall { big_m: f64, max_demand: u32 },
}

/// Aggregate demand for a category exceeds the seats offered for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("category '{category}' has demand {demand} but only {capacity} seats are offered")]
pub struct InfeasibleInputError {
    pub category: Category,
    pub demand: u64,
    pub capacity: u64,
}

/// The solver did not prove an optimum, or its answer does not hold up.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("solve of '{program}' failed with status {status:?}: {reason}")]
pub struct SolveFailedError {
    pub program: String,
    pub status: SolveStatus,
    pub reason: String,
}

/// Failures while writing the model dump or the result export.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot format csv record: {0}")]
    Csv(#[from] csv::Error),

    #[error("character {character:?} in '{text}' cannot be encoded as {encoding}")]
    Unencodable {
        encoding: &'static str,
        character: char,
        text: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
