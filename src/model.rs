//! Builds the mixed-integer program from a balanced instance.
//!
//! Every group (origin, category) with positive demand gets one integer flow
//! variable per school offering the category. Real communes additionally get a
//! binary indicator per flow, and big-M links force the flow of the chosen
//! school to carry the whole group while all other flows stay at zero:
//!
//! ```text
//! x >= d - M * (1 - a)      (written as  x - M*a >= d - M)
//! x <= M * a                (written as  x - M*a <= 0)
//! ```
//!
//! The builder only produces plain records; nothing here talks to a solver.

use std::collections::BTreeMap;
use std::fmt;

use crate::balance::{Balanced, Origin};
use crate::config::{BigM, ModelSettings};
use crate::error::ValidationError;
use crate::types::{Category, Instance, School};

/// Index of a variable in [`Program::variables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Non-negative integer.
    Integer,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Eq => "=",
            Relation::Le => "<=",
            Relation::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

/// Identifies one flow, and the indicator paired with it.
///
/// Field order makes the derived ordering (category, origin, school).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub category: Category,
    pub origin: Origin,
    pub school: School,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.origin.label(),
            self.school,
            self.category
        )
    }
}

type FlowKeyToVariableMap = BTreeMap<FlowKey, VarId>;

/// A minimisation program over non-negative integer and binary variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    name: String,
    big_m: f64,
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(VarId, f64)>,
    flow_map: FlowKeyToVariableMap,
    indicator_map: FlowKeyToVariableMap,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn big_m(&self) -> f64 {
        self.big_m
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&LinearConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Objective coefficients; the sense is always minimise.
    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    pub fn flows(&self) -> impl Iterator<Item = (&FlowKey, VarId)> {
        self.flow_map.iter().map(|(key, &var)| (key, var))
    }

    pub fn flow(&self, key: &FlowKey) -> Option<VarId> {
        self.flow_map.get(key).copied()
    }

    pub fn indicator(&self, key: &FlowKey) -> Option<VarId> {
        self.indicator_map.get(key).copied()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|&(var, coeff)| coeff * values[var.0])
            .sum()
    }
}

/// One (origin, category) with positive demand and its candidate schools.
struct DemandGroup {
    origin: Origin,
    category: Category,
    students: f64,
    schools: Vec<School>,
}

impl DemandGroup {
    fn key(&self, school: &School) -> FlowKey {
        FlowKey {
            category: self.category.clone(),
            origin: self.origin.clone(),
            school: school.clone(),
        }
    }

    fn label(&self) -> String {
        group_label(&self.origin, &self.category)
    }
}

pub fn build_program(
    balanced: &Balanced,
    settings: &ModelSettings,
) -> Result<Program, ValidationError> {
    let big_m = resolve_big_m(balanced, settings.big_m)?;
    let groups = collect_groups(balanced)?;

    // Create all variables, and LUTs of type (category, origin, school) → Variable
    let (variables, flow_map, indicator_map) = init_variables(&groups);

    let objective = create_objective(balanced, &flow_map);

    let mut constraints = Vec::new();
    constraints.extend(constrain_demand(&groups, &flow_map));
    constraints.extend(constrain_capacity(balanced, &flow_map));
    constraints.extend(constrain_unique_assignment(&groups, &indicator_map));
    constraints.extend(constrain_big_m_links(
        &groups,
        &flow_map,
        &indicator_map,
        big_m,
    ));

    log::debug!(
        "built program '{}': {} variables, {} constraints, M = {big_m}",
        settings.name,
        variables.len(),
        constraints.len()
    );

    Ok(Program {
        name: settings.name.clone(),
        big_m,
        variables,
        constraints,
        objective,
        flow_map,
        indicator_map,
    })
}

fn resolve_big_m(balanced: &Balanced, big_m: BigM) -> Result<f64, ValidationError> {
    let max_demand = balanced.instance().max_demand();
    match big_m {
        BigM::Auto => Ok(f64::from(max_demand.max(1))),
        BigM::Fixed(m) if m < f64::from(max_demand) => {
            Err(ValidationError::BigMTooSmall { big_m: m, max_demand })
        }
        BigM::Fixed(m) => Ok(m),
    }
}

/// Reject positive demand for a category no school offers.
///
/// Runs on the raw instance so the problem is reported as bad input rather
/// than as a capacity shortfall.
pub fn check_candidates(instance: &Instance) -> Result<(), ValidationError> {
    for (commune, category, students) in instance.demands() {
        if instance.schools_offering(category).next().is_none() {
            return Err(no_candidate_school(
                &Origin::Commune(commune.clone()),
                category,
                u64::from(students),
            ));
        }
    }
    Ok(())
}

fn no_candidate_school(origin: &Origin, category: &Category, students: u64) -> ValidationError {
    let label = group_label(origin, category);
    ValidationError::NoCandidateSchool {
        origin: origin.to_string(),
        category: category.clone(),
        students,
        constraint: format!("Demand[{label}]"),
    }
}

fn group_label(origin: &Origin, category: &Category) -> String {
    format!("{}, {category}", origin.label())
}

fn collect_groups(balanced: &Balanced) -> Result<Vec<DemandGroup>, ValidationError> {
    let instance = balanced.instance();
    balanced
        .demands()
        .into_iter()
        .map(|(origin, category, students)| {
            let schools: Vec<School> = instance
                .schools_offering(&category)
                .map(|(school, _)| school.clone())
                .collect();
            if schools.is_empty() {
                return Err(no_candidate_school(&origin, &category, students));
            }
            Ok(DemandGroup {
                origin,
                category,
                students: students as f64,
                schools,
            })
        })
        .collect()
}

fn init_variables(
    groups: &[DemandGroup],
) -> (Vec<VariableDef>, FlowKeyToVariableMap, FlowKeyToVariableMap) {
    let mut variables = Vec::new();
    let mut flow_map = BTreeMap::new();
    let mut indicator_map = BTreeMap::new();

    let mut add = |name: String, kind: VarKind| {
        variables.push(VariableDef { name, kind });
        VarId(variables.len() - 1)
    };

    for group in groups {
        for school in &group.schools {
            let key = group.key(school);
            let flow = add(format!("x[{key}]"), VarKind::Integer);
            flow_map.insert(key.clone(), flow);

            // Only real communes must pick a single school
            if matches!(group.origin, Origin::Commune(_)) {
                let indicator = add(format!("a[{key}]"), VarKind::Binary);
                indicator_map.insert(key, indicator);
            }
        }
    }

    (variables, flow_map, indicator_map)
}

/// Total student travel cost. Overflow flows have zero cost and are left out.
fn create_objective(balanced: &Balanced, flow_map: &FlowKeyToVariableMap) -> Vec<(VarId, f64)> {
    flow_map
        .iter()
        .filter_map(|(key, &flow)| {
            let cost = balanced.cost(&key.origin, &key.school).unwrap_or(0.0);
            (cost != 0.0).then_some((flow, cost))
        })
        .collect()
}

/// Each group's flows add up to its demand exactly.
fn constrain_demand(
    groups: &[DemandGroup],
    flow_map: &FlowKeyToVariableMap,
) -> Vec<LinearConstraint> {
    groups
        .iter()
        .map(|group| LinearConstraint {
            name: format!("Demand[{}]", group.label()),
            terms: group
                .schools
                .iter()
                .map(|school| (flow_map[&group.key(school)], 1.0))
                .collect(),
            relation: Relation::Eq,
            rhs: group.students,
        })
        .collect()
}

/// Flows into a school for a category stay within its seats.
fn constrain_capacity(
    balanced: &Balanced,
    flow_map: &FlowKeyToVariableMap,
) -> Vec<LinearConstraint> {
    let mut terms_by_offering: BTreeMap<(&School, &Category), Vec<(VarId, f64)>> = BTreeMap::new();
    for (key, &flow) in flow_map {
        terms_by_offering
            .entry((&key.school, &key.category))
            .or_default()
            .push((flow, 1.0));
    }

    balanced
        .instance()
        .offerings()
        .filter_map(|(school, category, seats)| {
            let terms = terms_by_offering.remove(&(school, category))?;
            Some(LinearConstraint {
                name: format!("Capacity[{school}, {category}]"),
                terms,
                relation: Relation::Le,
                rhs: f64::from(seats),
            })
        })
        .collect()
}

/// Exactly one indicator per real group is set.
fn constrain_unique_assignment(
    groups: &[DemandGroup],
    indicator_map: &FlowKeyToVariableMap,
) -> Vec<LinearConstraint> {
    groups
        .iter()
        .filter(|group| matches!(group.origin, Origin::Commune(_)))
        .map(|group| LinearConstraint {
            name: format!("Unique_assignment[{}]", group.label()),
            terms: group
                .schools
                .iter()
                .map(|school| (indicator_map[&group.key(school)], 1.0))
                .collect(),
            relation: Relation::Eq,
            rhs: 1.0,
        })
        .collect()
}

/// Tie each real flow to its indicator: all of the group or nothing.
fn constrain_big_m_links(
    groups: &[DemandGroup],
    flow_map: &FlowKeyToVariableMap,
    indicator_map: &FlowKeyToVariableMap,
    big_m: f64,
) -> Vec<LinearConstraint> {
    let mut constraints = Vec::new();
    for group in groups {
        for school in &group.schools {
            let key = group.key(school);
            let Some(&indicator) = indicator_map.get(&key) else {
                continue;
            };
            let flow = flow_map[&key];

            constraints.push(LinearConstraint {
                name: format!("Link_lower[{key}]"),
                terms: vec![(flow, 1.0), (indicator, -big_m)],
                relation: Relation::Ge,
                rhs: group.students - big_m,
            });
            constraints.push(LinearConstraint {
                name: format!("Link_upper[{key}]"),
                terms: vec![(flow, 1.0), (indicator, -big_m)],
                relation: Relation::Le,
                rhs: 0.0,
            });
        }
    }
    constraints
}
