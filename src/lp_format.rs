//! Writes a [`Program`] in CPLEX LP format, for inspection with other tools.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::IoError;
use crate::model::{Program, VarId, VarKind};
use crate::report::ensure_directory_exists;

/// Longest name most LP readers accept.
const MAX_NAME_LEN: usize = 255;

pub fn write_lp(program: &Program, path: &Path) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory_exists(parent)?;
    }
    fs::write(path, to_lp_string(program)).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote program '{}' to {}", program.name(), path.display());
    Ok(())
}

pub fn to_lp_string(program: &Program) -> String {
    let var_names = unique_names(program.variables().iter().map(|v| v.name.as_str()));
    let row_names = unique_names(program.constraints().iter().map(|c| c.name.as_str()));

    let mut out = String::new();
    let _ = writeln!(out, "\\* {} *\\", program.name());
    out.push_str("Minimize\n");
    let _ = writeln!(out, " OBJ: {}", format_terms(program.objective(), &var_names));

    out.push_str("Subject To\n");
    for (constraint, name) in program.constraints().iter().zip(&row_names) {
        let _ = writeln!(
            out,
            " {name}: {} {} {}",
            format_terms(&constraint.terms, &var_names),
            constraint.relation,
            format_number(constraint.rhs)
        );
    }

    let generals: Vec<&str> = kinds(program, &var_names, VarKind::Integer);
    let binaries: Vec<&str> = kinds(program, &var_names, VarKind::Binary);

    // Integer variables keep LP's default bound of [0, +inf)
    if !generals.is_empty() {
        out.push_str("Generals\n");
        for name in generals {
            let _ = writeln!(out, " {name}");
        }
    }
    if !binaries.is_empty() {
        out.push_str("Binaries\n");
        for name in binaries {
            let _ = writeln!(out, " {name}");
        }
    }
    out.push_str("End\n");
    out
}

fn kinds<'a>(program: &Program, var_names: &'a [String], kind: VarKind) -> Vec<&'a str> {
    program
        .variables()
        .iter()
        .zip(var_names)
        .filter(|(v, _)| v.kind == kind)
        .map(|(_, name)| name.as_str())
        .collect()
}

fn format_terms(terms: &[(VarId, f64)], var_names: &[String]) -> String {
    if terms.is_empty() {
        return "0".to_owned();
    }
    let mut out = String::new();
    for (i, &(var, coeff)) in terms.iter().enumerate() {
        let name = &var_names[var.index()];
        let sign = if coeff < 0.0 { "-" } else { "+" };
        if i > 0 || coeff < 0.0 {
            out.push_str(sign);
            out.push(' ');
        }
        let magnitude = coeff.abs();
        if magnitude != 1.0 {
            out.push_str(&format_number(magnitude));
            out.push(' ');
        }
        out.push_str(name);
        out.push(' ');
    }
    out.pop();
    out
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// LP names allow a restricted ASCII set; map everything else to `_` and
/// disambiguate names that collide afterwards.
fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .map(|name| {
            let base = sanitize(name);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}#{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| {
            if c.is_ascii_alphanumeric() || "!\"#$%&()/,.;?@_`'{}|~".contains(c) {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    // Names must not start with a digit or a period
    if out.starts_with(|c: char| c.is_ascii_digit() || c == '.') || out.is_empty() {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::balance;
    use crate::model::build_program;
    use crate::reference::reference_input;
    use crate::types::Instance;

    fn reference_program() -> Program {
        let input = reference_input();
        let balanced = balance(Instance::try_from_input(&input).unwrap()).unwrap();
        build_program(&balanced, &input.config.model).unwrap()
    }

    #[test]
    fn names_are_made_lp_safe_and_unique() {
        assert_eq!(sanitize("x[Rüti, a, 1]"), "x_R_ti,a,1_");
        assert_eq!(sanitize("1abc"), "_1abc");
        let names = unique_names(["a[b]", "a(b)", "a_b_"].into_iter());
        assert_eq!(names, vec!["a_b_", "a(b)", "a_b_#1"]);
    }

    #[test]
    fn program_is_rendered_with_all_sections() {
        let text = to_lp_string(&reference_program());

        assert!(text.starts_with("\\* Schulen_Test *\\\nMinimize\n OBJ: "));
        assert!(text.contains("Subject To\n"));
        assert!(text.contains(" Demand_Uster,1_: x_Uster,a,1_ + x_Uster,c,1_ = 3\n"));
        assert!(text.contains(" Link_lower_Uster,a,1_: x_Uster,a,1_ - 10000 a_Uster,a,1_ >= -9997\n"));
        assert!(text.contains("Generals\n"));
        assert!(text.contains("Binaries\n a_"));
        assert!(text.ends_with("End\n"));
        assert_eq!(text.matches("Capacity_").count(), 6);
    }

    #[test]
    fn writes_file_into_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lp").join("Schulen_Test.lp");

        write_lp(&reference_program(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(" Unique_assignment_Z_rich,3_: "));
    }
}
