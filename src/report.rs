use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::balance::{Balanced, Origin};
use crate::config::{Encoding, ExportSettings};
use crate::error::{IoError, SolveFailedError};
use crate::model::Program;
use crate::solver::{SolveStatus, SolverOutcome};
use crate::types::{Category, Commune, School};

/// Students of one commune and category sent to one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub category: Category,
    pub commune: Commune,
    pub school: School,
    pub count: u32,
}

/// Seats of a school left free for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vacancy {
    pub category: Category,
    pub school: School,
    pub seats: u64,
}

/// The solved assignment, sorted by (category, commune, school).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub vacancies: Vec<Vacancy>,
}

/// Convert the solver's values into assignments and vacancies.
///
/// Only flows with a strictly positive value are kept. Values are rounded,
/// since integer variables come back as floats.
pub fn extract_allocation(
    balanced: &Balanced,
    program: &Program,
    outcome: &SolverOutcome,
) -> Allocation {
    let mut assignments = Vec::new();
    let mut vacancies = Vec::new();
    let mut total_cost = 0.0;

    // Flow keys iterate in (category, origin, school) order already
    for (key, var) in program.flows() {
        let value = outcome.value(var).round();
        if value <= 0.0 {
            continue;
        }
        match &key.origin {
            Origin::Commune(commune) => {
                let count = value as u32;
                let cost = balanced.cost(&key.origin, &key.school).unwrap_or(0.0);
                total_cost += cost * f64::from(count);
                assignments.push(Assignment {
                    category: key.category.clone(),
                    commune: commune.clone(),
                    school: key.school.clone(),
                    count,
                });
            }
            Origin::Overflow => vacancies.push(Vacancy {
                category: key.category.clone(),
                school: key.school.clone(),
                seats: value as u64,
            }),
        }
    }

    Allocation {
        total_cost,
        assignments,
        vacancies,
    }
}

impl Allocation {
    /// Check demand, capacity and single-school assignment on the output itself.
    pub fn verify(&self, balanced: &Balanced, program: &Program) -> Result<(), SolveFailedError> {
        let fail = |reason: String| SolveFailedError {
            program: program.name().to_owned(),
            status: SolveStatus::Optimal,
            reason,
        };
        let instance = balanced.instance();

        let mut served: BTreeMap<(&Commune, &Category), Vec<&Assignment>> = BTreeMap::new();
        let mut used: BTreeMap<(&School, &Category), u64> = BTreeMap::new();
        for a in &self.assignments {
            served.entry((&a.commune, &a.category)).or_default().push(a);
            *used.entry((&a.school, &a.category)).or_default() += u64::from(a.count);
        }
        for v in &self.vacancies {
            *used.entry((&v.school, &v.category)).or_default() += v.seats;
        }

        for (commune, category, students) in instance.demands() {
            let Some(rows) = served.remove(&(commune, category)) else {
                return Err(fail(format!(
                    "{students} students of {commune}/{category} are not assigned"
                )));
            };
            if rows.len() != 1 {
                return Err(fail(format!(
                    "{commune}/{category} is split across {} schools",
                    rows.len()
                )));
            }
            if rows[0].count != students {
                return Err(fail(format!(
                    "{commune}/{category} assigns {} of {students} students",
                    rows[0].count
                )));
            }
        }
        if let Some(((commune, category), _)) = served.into_iter().next() {
            return Err(fail(format!(
                "{commune}/{category} is assigned without demand"
            )));
        }

        for ((school, category), seats) in used {
            let capacity = instance.capacity(school, category).unwrap_or(0);
            if seats > u64::from(capacity) {
                return Err(fail(format!(
                    "{school}/{category} holds {seats} students for {capacity} seats"
                )));
            }
        }

        Ok(())
    }
}

/// Write the assignments as `category,commune,school,count` and return the file path.
pub fn export_csv(allocation: &Allocation, settings: &ExportSettings) -> Result<PathBuf, IoError> {
    ensure_directory_exists(&settings.directory)?;
    let path = settings.csv_path();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for assignment in &allocation.assignments {
        writer.serialize(assignment)?;
    }
    if allocation.assignments.is_empty() {
        writer.write_record(["category", "commune", "school", "count"])?;
    }
    let buf = writer.into_inner().map_err(|e| IoError::Write {
        path: path.clone(),
        source: e.into_error(),
    })?;
    let text = String::from_utf8(buf).map_err(|e| IoError::Write {
        path: path.clone(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;

    let bytes = encode(&text, settings.encoding)?;
    fs::write(&path, bytes).map_err(|source| IoError::Write {
        path: path.clone(),
        source,
    })?;

    log::info!(
        "wrote {} assignments to {} ({})",
        allocation.assignments.len(),
        path.display(),
        settings.encoding.name()
    );
    Ok(path)
}

/// Create `directory` if missing. An existing directory is left alone.
pub fn ensure_directory_exists(directory: &Path) -> Result<(), IoError> {
    match fs::create_dir_all(directory) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && directory.is_dir() => Ok(()),
        Err(source) => Err(IoError::CreateDir {
            path: directory.to_path_buf(),
            source,
        }),
    }
}

fn encode(text: &str, encoding: Encoding) -> Result<Vec<u8>, IoError> {
    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Latin1 => text
            .chars()
            .map(|ch| {
                u8::try_from(u32::from(ch)).map_err(|_| IoError::Unencodable {
                    encoding: encoding.name(),
                    character: ch,
                    text: text
                        .lines()
                        .find(|line| line.contains(ch))
                        .unwrap_or(text)
                        .to_owned(),
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::balance;
    use crate::model::{FlowKey, build_program};
    use crate::reference::reference_input;
    use crate::types::Instance;

    /// The reference optimum, as (origin, school, category, students).
    const OPTIMUM: [(&str, &str, &str, u32); 15] = [
        ("Uster", "a", "1", 3),
        ("Rüti", "c", "1", 4),
        ("Zürich", "a", "1", 3),
        ("", "a", "1", 4),
        ("", "c", "1", 6),
        ("Uster", "a", "2", 4),
        ("Rüti", "b", "2", 2),
        ("Zürich", "b", "2", 4),
        ("", "a", "2", 2),
        ("", "b", "2", 4),
        ("Uster", "c", "3", 1),
        ("Rüti", "b", "3", 6),
        ("Zürich", "b", "3", 3),
        ("", "b", "3", 1),
        ("", "c", "3", 9),
    ];

    fn setup() -> (Balanced, Program) {
        let input = reference_input();
        let balanced = balance(Instance::try_from_input(&input).unwrap()).unwrap();
        let program = build_program(&balanced, &input.config.model).unwrap();
        (balanced, program)
    }

    fn outcome_for(program: &Program, flows: &[(&str, &str, &str, u32)]) -> SolverOutcome {
        let mut values = vec![0.0; program.variables().len()];
        for &(origin, school, category, students) in flows {
            let key = FlowKey {
                category: category.into(),
                origin: match origin {
                    "" => Origin::Overflow,
                    name => Origin::Commune(name.into()),
                },
                school: school.into(),
            };
            values[program.flow(&key).unwrap().index()] = f64::from(students);
            if let Some(indicator) = program.indicator(&key) {
                values[indicator.index()] = 1.0;
            }
        }
        SolverOutcome::optimal(values)
    }

    #[test]
    fn extraction_keeps_positive_flows_sorted() {
        let (balanced, program) = setup();
        let outcome = outcome_for(&program, &OPTIMUM);

        let allocation = extract_allocation(&balanced, &program, &outcome);

        assert_eq!(allocation.total_cost, 72.0);
        assert_eq!(allocation.assignments.len(), 9);
        assert_eq!(allocation.vacancies.len(), 6);
        assert_eq!(
            allocation.assignments[0],
            Assignment {
                category: "1".into(),
                commune: "Rüti".into(),
                school: "c".into(),
                count: 4,
            }
        );
        let order: Vec<(&str, &str)> = allocation
            .assignments
            .iter()
            .map(|a| (a.category.as_str(), a.commune.as_str()))
            .collect();
        let mut sorted = allocation.assignments.clone();
        sorted.sort_by(|a, b| (&a.category, &a.commune).cmp(&(&b.category, &b.commune)));
        let expected: Vec<(&str, &str)> = sorted
            .iter()
            .map(|a| (a.category.as_str(), a.commune.as_str()))
            .collect();
        assert_eq!(order, expected);

        assert!(allocation.verify(&balanced, &program).is_ok());
    }

    #[test]
    fn near_integer_values_are_rounded() {
        let (balanced, program) = setup();
        let mut outcome = outcome_for(&program, &OPTIMUM);
        for value in &mut outcome.values {
            if *value > 0.0 {
                *value -= 1e-9;
            } else {
                *value = -1e-9;
            }
        }

        let allocation = extract_allocation(&balanced, &program, &outcome);
        assert_eq!(allocation.assignments.len(), 9);
        assert_eq!(allocation.total_cost, 72.0);
    }

    #[test]
    fn split_group_fails_verification() {
        let (balanced, program) = setup();
        let mut flows = OPTIMUM.to_vec();
        // Rüti/3 sent half to b and half to c
        flows[11] = ("Rüti", "b", "3", 3);
        flows.push(("Rüti", "c", "3", 3));
        let outcome = outcome_for(&program, &flows);

        let allocation = extract_allocation(&balanced, &program, &outcome);
        let err = allocation.verify(&balanced, &program).unwrap_err();
        assert!(err.reason.contains("split across 2 schools"), "{}", err.reason);
    }

    #[test]
    fn over_capacity_fails_verification() {
        let (balanced, program) = setup();
        let mut flows = OPTIMUM.to_vec();
        // Zürich/2 moved to a, which now holds 8 of 6 seats
        flows[7] = ("Zürich", "a", "2", 4);
        let outcome = outcome_for(&program, &flows);

        let allocation = extract_allocation(&balanced, &program, &outcome);
        let err = allocation.verify(&balanced, &program).unwrap_err();
        assert!(err.reason.contains("a/2"), "{}", err.reason);
    }

    fn sample_allocation() -> Allocation {
        Allocation {
            total_cost: 9.0,
            assignments: vec![
                Assignment {
                    category: "1".into(),
                    commune: "Rüti".into(),
                    school: "c".into(),
                    count: 3,
                },
                Assignment {
                    category: "1".into(),
                    commune: "Uster".into(),
                    school: "a".into(),
                    count: 0,
                },
            ],
            vacancies: Vec::new(),
        }
    }

    #[test]
    fn export_creates_directory_and_writes_header() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = ExportSettings {
            directory: tmp.path().join("nested").join("output"),
            ..ExportSettings::default()
        };

        let path = export_csv(&sample_allocation(), &settings).unwrap();

        assert_eq!(path, settings.directory.join("output.csv"));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "category,commune,school,count\n1,Rüti,c,3\n1,Uster,a,0\n"
        );
    }

    #[test]
    fn export_leaves_existing_directory_alone() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("keep.txt"), "keep").unwrap();
        let settings = ExportSettings {
            directory: tmp.path().to_path_buf(),
            file_name: "result.csv".to_owned(),
            ..ExportSettings::default()
        };

        export_csv(&sample_allocation(), &settings).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("keep.txt")).unwrap(), "keep");
        assert!(tmp.path().join("result.csv").is_file());
    }

    #[test]
    fn latin1_export_encodes_umlauts_as_single_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = ExportSettings {
            directory: tmp.path().to_path_buf(),
            encoding: Encoding::Latin1,
            ..ExportSettings::default()
        };

        let path = export_csv(&sample_allocation(), &settings).unwrap();
        let bytes = fs::read(path).unwrap();
        assert!(bytes.windows(4).any(|w| w == b"R\xfcti"));
    }

    #[test]
    fn latin1_rejects_characters_outside_the_charset() {
        let err = encode("1,Łódź,a,3\n", Encoding::Latin1).unwrap_err();
        assert!(matches!(err, IoError::Unencodable { character: 'Ł', .. }));
    }

    #[test]
    fn directory_blocked_by_a_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("output");
        fs::write(&blocker, "not a directory").unwrap();

        let err = ensure_directory_exists(&blocker).unwrap_err();
        assert!(matches!(err, IoError::CreateDir { .. }));
    }
}
