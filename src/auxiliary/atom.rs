//! Atoms and element look-ups.

use std::collections::HashMap;
use std::fmt;

use anyhow::{self, ensure, format_err};
use nalgebra::Point3;
use periodic_table;
use serde::{Deserialize, Serialize};

/// The number of Bohr radii in one Ångström.
pub const ANGSTROM_TO_BOHR: f64 = 1.0 / 0.529_177_210_903;

/// An enumerated type for the units of Cartesian coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    /// Variant for coordinates in Bohr radii. This is the unit used internally.
    Bohr,

    /// Variant for coordinates in Ångström.
    Angstrom,
}

impl LengthUnit {
    /// Returns the factor converting a length in this unit to Bohr.
    pub fn to_bohr(&self) -> f64 {
        match self {
            LengthUnit::Bohr => 1.0,
            LengthUnit::Angstrom => ANGSTROM_TO_BOHR,
        }
    }
}

/// A struct storing a look-up of element symbols to give atomic numbers
/// and atomic masses.
pub struct ElementMap<'a> {
    /// A [HashMap] from a symbol string to a tuple of atomic number and atomic
    /// mass.
    pub map: HashMap<&'a str, (u32, f64)>,
}

impl Default for ElementMap<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementMap<'static> {
    /// Creates a new [`ElementMap`] for all elements in the periodic table.
    #[must_use]
    pub fn new() -> ElementMap<'static> {
        let map = periodic_table::periodic_table()
            .into_iter()
            .filter_map(|element| {
                parse_atomic_mass(element.atomic_mass)
                    .map(|mass| (element.symbol, (element.atomic_number, mass)))
            })
            .collect::<HashMap<_, _>>();
        ElementMap { map }
    }
}

/// Parses the atomic mass string in the format of [`periodic_table`], which is either `x.y(z)`
/// with the uncertain digit `z` in parentheses, or `[x]` with the mass number of the most stable
/// isotope.
fn parse_atomic_mass(mass_str: &str) -> Option<f64> {
    let mass = mass_str.replace(&['(', ')', '[', ']'][..], "");
    mass.parse::<f64>().ok()
}

/// A struct representing an atom as a point nuclear charge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The atomic number of the atom, which is also its nuclear charge.
    pub atomic_number: u32,

    /// The atomic symbol of the atom.
    pub atomic_symbol: String,

    /// The weighted-average atomic mass for all naturally occuring isotopes.
    pub atomic_mass: f64,

    /// The position of the atom in Bohr radii.
    pub coordinates: Point3<f64>,
}

impl Atom {
    /// Creates an atom of a given element at a given position.
    ///
    /// # Arguments
    ///
    /// * `atomic_symbol` - The element symbol.
    /// * `coordinates` - The position of the atom in Bohr radii.
    /// * `emap` - A hash map between atomic symbols and atomic numbers and masses.
    pub fn new(
        atomic_symbol: &str,
        coordinates: Point3<f64>,
        emap: &ElementMap,
    ) -> Result<Self, anyhow::Error> {
        let (atomic_number, atomic_mass) = emap
            .map
            .get(atomic_symbol)
            .ok_or_else(|| format_err!("Invalid atomic symbol `{atomic_symbol}` encountered."))?;
        Ok(Atom {
            atomic_number: *atomic_number,
            atomic_symbol: atomic_symbol.to_string(),
            atomic_mass: *atomic_mass,
            coordinates,
        })
    }

    /// Parses an atom line in an `xyz` file to construct an [`Atom`].
    ///
    /// # Arguments
    ///
    /// * `line` - A line in an `xyz` file containing an atomic symbol and three Cartesian
    ///   coordinates.
    /// * `emap` - A hash map between atomic symbols and atomic numbers and masses.
    /// * `unit` - The unit of the coordinates in `line`.
    pub fn from_xyz(line: &str, emap: &ElementMap, unit: LengthUnit) -> Result<Self, anyhow::Error> {
        let split = line.split_whitespace().collect::<Vec<_>>();
        ensure!(
            split.len() == 4,
            "Unable to parse `{line}` as an atom line of an xyz file."
        );
        let coords = split[1..]
            .iter()
            .map(|x| {
                x.parse::<f64>()
                    .map(|v| v * unit.to_bohr())
                    .map_err(|err| format_err!("Unable to parse the coordinate `{x}`: {err}."))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Atom::new(
            split[0],
            Point3::new(coords[0], coords[1], coords[2]),
            emap,
        )
    }

    /// Returns the nuclear charge of the atom.
    pub fn nuclear_charge(&self) -> f64 {
        f64::from(self.atomic_number)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<3} {:+14.8} {:+14.8} {:+14.8}",
            self.atomic_symbol, self.coordinates[0], self.coordinates[1], self.coordinates[2]
        )
    }
}
