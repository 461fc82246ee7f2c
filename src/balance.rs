use std::collections::BTreeMap;
use std::fmt;

use crate::error::InfeasibleInputError;
use crate::types::{Category, Commune, Instance, School};

/// Where a flow of students comes from.
///
/// The overflow commune is synthetic: it soaks up the seats real communes do
/// not need, travels at zero cost and may be split across schools.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    Commune(Commune),
    Overflow,
}

impl Origin {
    /// Short name used in constraint and variable names.
    pub fn label(&self) -> &str {
        match self {
            Origin::Commune(commune) => commune.as_str(),
            Origin::Overflow => "overflow",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Commune(commune) => write!(f, "commune '{commune}'"),
            Origin::Overflow => f.write_str("overflow commune"),
        }
    }
}

/// Per-category bookkeeping after balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTotals {
    pub demand: u64,
    pub overflow: u64,
    pub capacity: u64,
}

impl CategoryTotals {
    pub fn is_balanced(&self) -> bool {
        self.demand + self.overflow == self.capacity
    }
}

/// An instance whose demand, overflow included, matches capacity exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Balanced {
    instance: Instance,
    totals: BTreeMap<Category, CategoryTotals>,
}

/// Add the overflow commune so every demand equality can hold at once.
///
/// Fails when real demand for any category exceeds the seats offered for it;
/// demand is never truncated.
pub fn balance(instance: Instance) -> Result<Balanced, InfeasibleInputError> {
    let mut totals = BTreeMap::new();

    for category in instance.categories() {
        let demand: u64 = instance
            .demands()
            .filter(|(_, c, _)| *c == category)
            .map(|(_, _, students)| u64::from(students))
            .sum();
        let capacity: u64 = instance
            .schools_offering(category)
            .map(|(_, seats)| u64::from(seats))
            .sum();

        if demand > capacity {
            return Err(InfeasibleInputError {
                category: category.clone(),
                demand,
                capacity,
            });
        }

        let overflow = capacity - demand;
        log::debug!(
            "category {category}: demand {demand}, capacity {capacity}, overflow {overflow}"
        );
        totals.insert(
            category.clone(),
            CategoryTotals {
                demand,
                overflow,
                capacity,
            },
        );
    }

    Ok(Balanced { instance, totals })
}

impl Balanced {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn category_totals(&self) -> &BTreeMap<Category, CategoryTotals> {
        &self.totals
    }

    /// Seats the overflow commune takes for `category`.
    pub fn overflow(&self, category: &Category) -> u64 {
        self.totals.get(category).map_or(0, |t| t.overflow)
    }

    /// Every (origin, category) with positive demand, overflow last per category.
    pub fn demands(&self) -> Vec<(Origin, Category, u64)> {
        let mut demands: Vec<_> = self
            .instance
            .demands()
            .map(|(commune, category, students)| {
                (
                    Origin::Commune(commune.clone()),
                    category.clone(),
                    u64::from(students),
                )
            })
            .chain(
                self.totals
                    .iter()
                    .filter(|(_, t)| t.overflow > 0)
                    .map(|(category, t)| (Origin::Overflow, category.clone(), t.overflow)),
            )
            .collect();
        demands.sort_by(|a, b| (&a.1, &a.0).cmp(&(&b.1, &b.0)));
        demands
    }

    /// Per-unit travel cost; the overflow commune travels for free.
    pub fn cost(&self, origin: &Origin, school: &School) -> Option<f64> {
        match origin {
            Origin::Commune(commune) => self.instance.cost(commune, school),
            Origin::Overflow => Some(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::reference_input;
    use crate::types::Commune;

    fn reference() -> Instance {
        Instance::try_from_input(&reference_input()).unwrap()
    }

    #[test]
    fn overflow_absorbs_surplus_per_category() {
        let balanced = balance(reference()).unwrap();

        assert_eq!(balanced.overflow(&"1".into()), 10);
        assert_eq!(balanced.overflow(&"2".into()), 6);
        assert_eq!(balanced.overflow(&"3".into()), 10);
        assert!(balanced.category_totals().values().all(CategoryTotals::is_balanced));

        let total_capacity: u64 = balanced.category_totals().values().map(|t| t.capacity).sum();
        let total_demand: u64 = balanced.category_totals().values().map(|t| t.demand).sum();
        assert_eq!(total_capacity, 56);
        assert_eq!(total_demand, 30);
    }

    #[test]
    fn demand_above_capacity_is_infeasible() {
        let mut input = reference_input();
        input
            .demand
            .get_mut(&Commune::from("Zürich"))
            .unwrap()
            .insert("2".into(), 11);
        let instance = Instance::try_from_input(&input).unwrap();

        let err = balance(instance).unwrap_err();
        assert_eq!(
            err,
            InfeasibleInputError {
                category: "2".into(),
                demand: 17,
                capacity: 16,
            }
        );
    }

    #[test]
    fn exact_fit_needs_no_overflow() {
        let mut input = reference_input();
        input
            .demand
            .get_mut(&Commune::from("Zürich"))
            .unwrap()
            .insert("2".into(), 10);
        let balanced = balance(Instance::try_from_input(&input).unwrap()).unwrap();

        assert_eq!(balanced.overflow(&"2".into()), 0);
        assert!(
            balanced
                .demands()
                .iter()
                .all(|(origin, category, _)| !(*origin == Origin::Overflow
                    && category.as_str() == "2"))
        );
    }

    #[test]
    fn demands_are_ordered_by_category_then_origin() {
        let balanced = balance(reference()).unwrap();
        let demands = balanced.demands();

        assert_eq!(demands.len(), 12);
        assert_eq!(demands[0].0, Origin::Commune("Rüti".into()));
        assert_eq!(demands[3], (Origin::Overflow, "1".into(), 10));
        assert_eq!(balanced.cost(&Origin::Overflow, &"a".into()), Some(0.0));
    }
}
