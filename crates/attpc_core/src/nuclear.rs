//! Nuclear data table: `(Z, A) -> Nucleus` lookup (§6's nuclear data CSV,
//! supplemented per SPEC_FULL.md item 2).

use crate::error::{ReconstructionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single nuclide's identifying and mass data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nucleus {
    pub z: i32,
    pub a: i32,
    pub name: String,
    pub mass_mev: f64,
}

impl Nucleus {
    pub fn charge_coulombs(&self, elementary_charge: f64) -> f64 {
        self.z as f64 * elementary_charge
    }
}

/// Read-only `(Z, A) -> Nucleus` lookup, shared by reference across
/// workers once built.
#[derive(Debug, Clone, Default)]
pub struct NuclearDataMap {
    nuclides: HashMap<(i32, i32), Nucleus>,
}

impl NuclearDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The small in-memory fallback table: common light ions used by the
    /// solver's own unit tests and example runs, so a full CSV load is
    /// not required to exercise C8.
    pub fn with_light_ion_defaults() -> Self {
        let mut map = Self::new();
        for (z, a, mass_mev, name) in [
            (1, 1, 938.272, "p"),
            (1, 2, 1875.613, "d"),
            (1, 3, 2808.921, "t"),
            (2, 3, 2808.391, "3He"),
            (2, 4, 3727.379, "4He"),
        ] {
            map.insert(Nucleus {
                z,
                a,
                name: name.to_string(),
                mass_mev,
            });
        }
        map
    }

    fn insert(&mut self, nucleus: Nucleus) {
        self.nuclides.insert((nucleus.z, nucleus.a), nucleus);
    }

    /// Parses the §6 nuclear data CSV schema: `Z,A,name,mass_MeV`
    /// (header row optional, detected by a non-numeric first field).
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut map = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(ReconstructionError::DataShape(format!(
                    "nuclear data line {line_no} has {} fields, expected 4",
                    fields.len()
                )));
            }
            let Ok(z) = fields[0].parse::<i32>() else {
                continue; // header row
            };
            let a: i32 = fields[1].parse().map_err(|_| {
                ReconstructionError::DataShape(format!("nuclear data line {line_no}: bad A"))
            })?;
            let name = fields[2].to_string();
            let mass_mev: f64 = fields[3].parse().map_err(|_| {
                ReconstructionError::DataShape(format!("nuclear data line {line_no}: bad mass"))
            })?;
            map.insert(Nucleus { z, a, name, mass_mev });
        }
        Ok(map)
    }

    pub fn get(&self, z: i32, a: i32) -> Option<&Nucleus> {
        self.nuclides.get(&(z, a))
    }

    pub fn len(&self) -> usize {
        self.nuclides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nuclides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_ion_defaults_include_proton() {
        let map = NuclearDataMap::with_light_ion_defaults();
        let proton = map.get(1, 1).expect("proton should be present");
        assert!((proton.mass_mev - 938.272).abs() < 1e-3);
    }

    #[test]
    fn csv_round_trips_a_single_row() {
        let map = NuclearDataMap::from_csv("Z,A,name,mass_MeV\n2,4,4He,3727.379\n").unwrap();
        let he4 = map.get(2, 4).expect("4He should be present");
        assert!((he4.mass_mev - 3727.379).abs() < 1e-3);
        assert_eq!(he4.name, "4He");
    }

    #[test]
    fn unknown_nuclide_is_none() {
        let map = NuclearDataMap::new();
        assert!(map.get(99, 99).is_none());
    }
}
