//! The compiled-in data set: three communes around Zürich, three schools and
//! three study categories. Solved when the binary is started without input.

use std::collections::BTreeMap;

use crate::config::{BigM, RunConfig};
use crate::types::{Category, Commune, Input, School};

const SCHOOLS: [&str; 3] = ["a", "b", "c"];
const CATEGORIES: [&str; 3] = ["1", "2", "3"];

const OFFERINGS: [(&str, &[&str]); 3] = [("a", &["1", "2"]), ("b", &["2", "3"]), ("c", &["1", "3"])];

/// Seats per school, indexed like `CATEGORIES`.
const CAPACITY: [(&str, [i64; 3]); 3] = [("a", [10, 6, 0]), ("b", [0, 10, 10]), ("c", [10, 0, 10])];

/// Students per commune, indexed like `CATEGORIES`.
const DEMAND: [(&str, [i64; 3]); 3] = [
    ("Uster", [3, 4, 1]),
    ("Rüti", [4, 2, 6]),
    ("Zürich", [3, 4, 3]),
];

/// Travel time per commune, indexed like `SCHOOLS`.
const COST: [(&str, [f64; 3]); 3] = [
    ("Uster", [3.0, 5.0, 4.0]),
    ("Rüti", [6.0, 1.0, 3.0]),
    ("Zürich", [2.0, 3.0, 6.0]),
];

pub fn reference_input() -> Input {
    let categories: Vec<Category> = CATEGORIES.iter().map(|&c| c.into()).collect();
    let schools: Vec<School> = SCHOOLS.iter().map(|&s| s.into()).collect();

    let offerings: BTreeMap<School, Vec<Category>> = OFFERINGS
        .iter()
        .map(|&(school, offered)| (school.into(), offered.iter().map(|&c| c.into()).collect()))
        .collect();

    let capacity: BTreeMap<School, _> = CAPACITY
        .iter()
        .map(|&(school, seats)| (school.into(), per_key(&categories, seats)))
        .collect();

    let demand: BTreeMap<Commune, _> = DEMAND
        .iter()
        .map(|&(commune, students)| (commune.into(), per_key(&categories, students)))
        .collect();

    let cost: BTreeMap<Commune, _> = COST
        .iter()
        .map(|&(commune, times)| (commune.into(), per_key(&schools, times)))
        .collect();

    let mut config = RunConfig::default();
    config.model.name = "Schulen_Test".to_owned();
    config.model.big_m = BigM::Fixed(10000.0);

    Input {
        categories,
        communes: DEMAND.iter().map(|&(commune, _)| Commune::from(commune)).collect(),
        schools,
        offerings,
        capacity,
        demand,
        cost,
        config,
    }
}

fn per_key<K: Clone + Ord, V: Copy>(keys: &[K], values: [V; 3]) -> BTreeMap<K, V> {
    keys.iter().cloned().zip(values).collect()
}
