//! Molecular geometries and their nuclear-repulsion contributions.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::auxiliary::atom::{Atom, ElementMap, LengthUnit};

#[cfg(test)]
#[path = "molecule_tests.rs"]
mod molecule_tests;

/// A struct containing the atoms and the total charge of a molecule at a fixed nuclear geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    /// The atoms constituting this molecule, in a fixed order that defines the atom indices of
    /// all gradient arrays.
    pub atoms: Vec<Atom>,

    /// The total charge of the molecule.
    #[serde(default)]
    pub charge: i32,
}

impl Molecule {
    /// Constructs a molecule from a list of atoms and a total charge.
    pub fn from_atoms(atoms: &[Atom], charge: i32) -> Self {
        Self {
            atoms: atoms.to_vec(),
            charge,
        }
    }

    /// Parses the contents of an `xyz` file.
    ///
    /// The first line gives the number of atoms and the second line is a free-form comment.
    ///
    /// # Arguments
    ///
    /// * `contents` - The contents of the `xyz` file.
    /// * `charge` - The total charge of the molecule.
    /// * `unit` - The unit of the coordinates.
    pub fn from_xyz_str(
        contents: &str,
        charge: i32,
        unit: LengthUnit,
    ) -> Result<Self, anyhow::Error> {
        let emap = ElementMap::new();
        let mut lines = contents.lines();
        let natoms = lines
            .next()
            .ok_or_else(|| format_err!("Empty xyz contents."))?
            .trim()
            .parse::<usize>()
            .map_err(|err| format_err!("Unable to parse the number of atoms: {err}."))?;
        let atoms = lines
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(|line| Atom::from_xyz(line, &emap, unit))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            atoms.len() == natoms,
            "Expected {natoms} atoms in the xyz contents, but found {}.",
            atoms.len()
        );
        Ok(Self { atoms, charge })
    }

    /// Reads an `xyz` file.
    ///
    /// # Arguments
    ///
    /// * `filename` - The path to the `xyz` file.
    /// * `charge` - The total charge of the molecule.
    /// * `unit` - The unit of the coordinates in the file.
    pub fn from_xyz<P: AsRef<Path>>(
        filename: P,
        charge: i32,
        unit: LengthUnit,
    ) -> Result<Self, anyhow::Error> {
        let contents = fs::read_to_string(filename).map_err(|err| format_err!(err))?;
        Self::from_xyz_str(&contents, charge, unit)
    }

    /// Returns the number of atoms.
    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    /// Returns the number of electrons, *i.e.* the sum of the nuclear charges minus the total
    /// charge.
    pub fn nelectrons(&self) -> Result<usize, anyhow::Error> {
        let nuclear: i64 = self.atoms.iter().map(|atom| i64::from(atom.atomic_number)).sum();
        let nelec = nuclear - i64::from(self.charge);
        usize::try_from(nelec)
            .map_err(|_| format_err!("The molecule has a negative number of electrons ({nelec})."))
    }

    /// Returns the Cartesian coordinates of all atoms as an `natm × 3` array in Bohr radii.
    pub fn coordinates(&self) -> Array2<f64> {
        let mut coords = Array2::<f64>::zeros((self.natoms(), 3));
        coords
            .axis_iter_mut(Axis(0))
            .zip(self.atoms.iter())
            .for_each(|(mut row, atom)| {
                row.iter_mut()
                    .zip(atom.coordinates.coords.iter())
                    .for_each(|(r, x)| *r = *x);
            });
        coords
    }

    /// Returns a copy of this molecule with one Cartesian component of one atom displaced.
    ///
    /// # Arguments
    ///
    /// * `atom` - The index of the atom to be displaced.
    /// * `component` - The Cartesian component (`0`, `1`, or `2`) to be displaced.
    /// * `delta` - The displacement in Bohr radii.
    pub fn displaced(
        &self,
        atom: usize,
        component: usize,
        delta: f64,
    ) -> Result<Molecule, anyhow::Error> {
        ensure!(component < 3, "Invalid Cartesian component {component}.");
        let mut mol = self.clone();
        let target = mol
            .atoms
            .get_mut(atom)
            .ok_or_else(|| format_err!("Atom index {atom} out of range."))?;
        target.coordinates[component] += delta;
        Ok(mol)
    }

    /// Returns the classical nuclear repulsion energy $`\sum_{A<B} Z_A Z_B / R_{AB}`$.
    pub fn energy_nuc(&self) -> f64 {
        self.atoms
            .iter()
            .tuple_combinations()
            .map(|(a, b)| {
                a.nuclear_charge() * b.nuclear_charge()
                    / (a.coordinates - b.coordinates).norm()
            })
            .sum()
    }

    /// Returns the gradient of the nuclear repulsion energy with respect to the nuclear positions
    /// as an `natm × 3` array.
    pub fn grad_nuc(&self) -> Array2<f64> {
        let mut grad = Array2::<f64>::zeros((self.natoms(), 3));
        for (ia, a) in self.atoms.iter().enumerate() {
            for (ib, b) in self.atoms.iter().enumerate() {
                if ia == ib {
                    continue;
                }
                let rab = a.coordinates - b.coordinates;
                let dist = rab.norm();
                let prefactor = -a.nuclear_charge() * b.nuclear_charge() / dist.powi(3);
                for x in 0..3 {
                    grad[(ia, x)] += prefactor * rab[x];
                }
            }
        }
        grad
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Molecule (charge {:+}, coordinates in Bohr):", self.charge)?;
        for atom in self.atoms.iter() {
            writeln!(f, "  {atom}")?;
        }
        Ok(())
    }
}
