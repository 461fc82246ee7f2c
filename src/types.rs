use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::RunConfig;
use crate::error::ValidationError;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                compare_ids(&self.0, &other.0)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(IdVisitor).map(Self)
            }
        }
    };
}

identifier!(
    /// A study direction. Demand and capacity are both split by category.
    Category
);
identifier!(
    /// Home commune of a group of students.
    Commune
);
identifier!(School);

/// Numeric ids sort numerically so that category `10` comes after `2`.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// Accepts both `a` and `1` in YAML, so categories can be written as plain numbers.
struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

/// Raw input tables as read from YAML. Nothing here is validated yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub categories: Vec<Category>,
    pub communes: Vec<Commune>,
    pub schools: Vec<School>,
    pub offerings: BTreeMap<School, Vec<Category>>,
    pub capacity: BTreeMap<School, BTreeMap<Category, i64>>,
    #[serde(default)]
    pub demand: BTreeMap<Commune, BTreeMap<Category, i64>>,
    #[serde(default)]
    pub cost: BTreeMap<Commune, BTreeMap<School, f64>>,
    #[serde(default)]
    pub config: RunConfig,
}

/// Validated, immutable problem data.
///
/// Capacity is only kept for declared offerings and demand only where it is
/// positive, so iterating either map walks the sparse support directly.
/// Travel cost is indexed by (commune, school) alone: it does not vary by
/// category even though flows are indexed by category.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    categories: BTreeSet<Category>,
    communes: BTreeSet<Commune>,
    schools: BTreeSet<School>,
    capacity: BTreeMap<(School, Category), u32>,
    demand: BTreeMap<(Commune, Category), u32>,
    cost: BTreeMap<(Commune, School), f64>,
}

impl Instance {
    pub fn try_from_input(input: &Input) -> Result<Self, ValidationError> {
        let categories = collect_unique("category", &input.categories)?;
        let communes = collect_unique("commune", &input.communes)?;
        let schools = collect_unique("school", &input.schools)?;

        let capacity = collect_capacity(input, &schools, &categories)?;
        let demand = collect_demand(input, &communes, &categories)?;
        let cost = collect_cost(input, &communes, &schools, &capacity)?;

        Ok(Self {
            categories,
            communes,
            schools,
            capacity,
            demand,
            cost,
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn communes(&self) -> impl Iterator<Item = &Commune> {
        self.communes.iter()
    }

    pub fn schools(&self) -> impl Iterator<Item = &School> {
        self.schools.iter()
    }

    /// Seats of `school` for `category`, `None` when the school does not offer it.
    pub fn capacity(&self, school: &School, category: &Category) -> Option<u32> {
        self.capacity
            .get(&(school.clone(), category.clone()))
            .copied()
    }

    /// Declared offerings with their capacity.
    pub fn offerings(&self) -> impl Iterator<Item = (&School, &Category, u32)> {
        self.capacity
            .iter()
            .map(|((school, category), &seats)| (school, category, seats))
    }

    /// Schools offering `category`, in id order.
    pub fn schools_offering<'a>(
        &'a self,
        category: &'a Category,
    ) -> impl Iterator<Item = (&'a School, u32)> + 'a {
        self.offerings()
            .filter(move |(_, c, _)| *c == category)
            .map(|(school, _, seats)| (school, seats))
    }

    pub fn demand(&self, commune: &Commune, category: &Category) -> u32 {
        self.demand
            .get(&(commune.clone(), category.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Positive demands only.
    pub fn demands(&self) -> impl Iterator<Item = (&Commune, &Category, u32)> {
        self.demand
            .iter()
            .map(|((commune, category), &students)| (commune, category, students))
    }

    pub fn cost(&self, commune: &Commune, school: &School) -> Option<f64> {
        self.cost.get(&(commune.clone(), school.clone())).copied()
    }

    pub fn max_demand(&self) -> u32 {
        self.demand.values().copied().max().unwrap_or(0)
    }
}

fn collect_unique<T: Clone + Ord + fmt::Display>(
    kind: &'static str,
    ids: &[T],
) -> Result<BTreeSet<T>, ValidationError> {
    let mut set = BTreeSet::new();
    for id in ids {
        if !set.insert(id.clone()) {
            return Err(ValidationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(set)
}

fn check_school(
    table: &'static str,
    school: &School,
    schools: &BTreeSet<School>,
) -> Result<(), ValidationError> {
    if schools.contains(school) {
        Ok(())
    } else {
        Err(ValidationError::UnknownSchool {
            table,
            school: school.clone(),
        })
    }
}

fn check_commune(
    table: &'static str,
    commune: &Commune,
    communes: &BTreeSet<Commune>,
) -> Result<(), ValidationError> {
    if communes.contains(commune) {
        Ok(())
    } else {
        Err(ValidationError::UnknownCommune {
            table,
            commune: commune.clone(),
        })
    }
}

fn check_category(
    table: &'static str,
    category: &Category,
    categories: &BTreeSet<Category>,
) -> Result<(), ValidationError> {
    if categories.contains(category) {
        Ok(())
    } else {
        Err(ValidationError::UnknownCategory {
            table,
            category: category.clone(),
        })
    }
}

fn to_quantity(table: &'static str, entry: String, value: i64) -> Result<u32, ValidationError> {
    u32::try_from(value).map_err(|_| ValidationError::QuantityTooLarge {
        table,
        entry,
        value,
    })
}

fn collect_capacity(
    input: &Input,
    schools: &BTreeSet<School>,
    categories: &BTreeSet<Category>,
) -> Result<BTreeMap<(School, Category), u32>, ValidationError> {
    // Reject negative seats anywhere in the table, offered or not
    for (school, seats_by_category) in &input.capacity {
        check_school("capacity", school, schools)?;
        for (category, &seats) in seats_by_category {
            check_category("capacity", category, categories)?;
            if seats < 0 {
                return Err(ValidationError::NegativeCapacity {
                    school: school.clone(),
                    category: category.clone(),
                    seats,
                });
            }
        }
    }

    let mut capacity = BTreeMap::new();
    for (school, offered) in &input.offerings {
        check_school("offerings", school, schools)?;
        for category in offered {
            check_category("offerings", category, categories)?;
            let seats = input
                .capacity
                .get(school)
                .and_then(|by_category| by_category.get(category))
                .copied()
                .ok_or_else(|| ValidationError::MissingCapacity {
                    school: school.clone(),
                    category: category.clone(),
                })?;
            let seats = to_quantity("capacity", format!("{school}/{category}"), seats)?;
            capacity.insert((school.clone(), category.clone()), seats);
        }
    }

    for (school, seats_by_category) in &input.capacity {
        for category in seats_by_category.keys() {
            if !capacity.contains_key(&(school.clone(), category.clone())) {
                log::debug!("ignoring capacity of {school}/{category}: category is not offered");
            }
        }
    }

    Ok(capacity)
}

fn collect_demand(
    input: &Input,
    communes: &BTreeSet<Commune>,
    categories: &BTreeSet<Category>,
) -> Result<BTreeMap<(Commune, Category), u32>, ValidationError> {
    let mut demand = BTreeMap::new();
    for (commune, students_by_category) in &input.demand {
        check_commune("demand", commune, communes)?;
        for (category, &students) in students_by_category {
            check_category("demand", category, categories)?;
            if students < 0 {
                return Err(ValidationError::NegativeDemand {
                    commune: commune.clone(),
                    category: category.clone(),
                    students,
                });
            }
            let students = to_quantity("demand", format!("{commune}/{category}"), students)?;
            if students > 0 {
                demand.insert((commune.clone(), category.clone()), students);
            }
        }
    }
    Ok(demand)
}

fn collect_cost(
    input: &Input,
    communes: &BTreeSet<Commune>,
    schools: &BTreeSet<School>,
    capacity: &BTreeMap<(School, Category), u32>,
) -> Result<BTreeMap<(Commune, School), f64>, ValidationError> {
    let mut cost = BTreeMap::new();
    for (commune, cost_by_school) in &input.cost {
        check_commune("cost", commune, communes)?;
        for (school, &value) in cost_by_school {
            check_school("cost", school, schools)?;
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidCost {
                    commune: commune.clone(),
                    school: school.clone(),
                    cost: value,
                });
            }
            cost.insert((commune.clone(), school.clone()), value);
        }
    }

    // Every school with at least one offering must be reachable from every commune
    let offering_schools: BTreeSet<&School> = capacity.keys().map(|(school, _)| school).collect();
    for commune in communes {
        for &school in &offering_schools {
            if !cost.contains_key(&(commune.clone(), school.clone())) {
                return Err(ValidationError::MissingCost {
                    commune: commune.clone(),
                    school: school.clone(),
                });
            }
        }
    }

    Ok(cost)
}
