//! Integral and basis utilities.
//!
//! Atomic-orbital integrals and their nuclear derivatives are consumed from an external integral
//! engine through the [`IntegralProvider`] trait. This module turns them into Hamiltonians in
//! orthogonal orbital bases, which is the only form in which the rest of the crate sees them.

use std::fmt;
use std::ops::Range;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use ndarray::{Array2, Array3, Array4, Array5, ArrayView2, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;

pub mod compression;
pub mod transform;

pub use compression::{
    compress_electron_exchange_symmetry, tril_indices, unpack_electron_exchange_symmetry,
};
pub use transform::{get_loewdin_trafo, transform_integrals, LOEWDIN_THRESH_NULL};


// ==================
// Struct definitions
// ==================

/// Structure containing the atomic-orbital integrals of a molecule at one nuclear geometry.
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct AoIntegrals {
    /// The overlap matrix $`S_{\mu\nu}`$.
    sao: Array2<f64>,

    /// The core Hamiltonian matrix (kinetic energy plus nuclear attraction).
    hcore: Array2<f64>,

    /// The electron-repulsion integrals $`(\mu\nu|\lambda\sigma)`$ in chemists' notation.
    eri: Array4<f64>,
}

impl AoIntegralsBuilder {
    fn validate(&self) -> Result<(), String> {
        let sao = self.sao.as_ref().ok_or("No AO overlap matrix found.".to_string())?;
        let hcore = self
            .hcore
            .as_ref()
            .ok_or("No AO core Hamiltonian matrix found.".to_string())?;
        let eri = self
            .eri
            .as_ref()
            .ok_or("No AO electron-repulsion integrals found.".to_string())?;
        let nao = sao.nrows();
        if sao.shape() != [nao, nao] || hcore.shape() != [nao, nao] {
            Err(format!(
                "Inconsistent AO overlap ({:?}) and core Hamiltonian ({:?}) shapes.",
                sao.shape(),
                hcore.shape()
            ))
        } else if eri.shape() != [nao, nao, nao, nao] {
            Err(format!(
                "AO electron-repulsion integrals have shape {:?}, but {nao} AOs are present.",
                eri.shape()
            ))
        } else {
            Ok(())
        }
    }
}

impl AoIntegrals {
    /// Returns a builder to construct a new [`AoIntegrals`] structure.
    pub fn builder() -> AoIntegralsBuilder {
        AoIntegralsBuilder::default()
    }

    /// Returns the number of atomic orbitals.
    pub fn nao(&self) -> usize {
        self.sao.nrows()
    }

    /// Returns the overlap matrix.
    pub fn sao(&self) -> ArrayView2<f64> {
        self.sao.view()
    }

    /// Returns the core Hamiltonian matrix.
    pub fn hcore(&self) -> ArrayView2<f64> {
        self.hcore.view()
    }

    /// Returns the electron-repulsion integrals.
    pub fn eri(&self) -> ArrayView4<f64> {
        self.eri.view()
    }
}

/// Structure containing the nuclear derivatives of atomic-orbital integrals at one nuclear
/// geometry.
///
/// The derivative integrals follow the conventions of common Gaussian integral engines: only the
/// bra function is differentiated, and the sign is that of the electronic coordinate, so that the
/// derivative with respect to the centre of the bra function is the negative of the stored value.
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct AoIntegralDerivatives {
    /// The range of atomic orbitals centred on each atom.
    ao_slices: Vec<Range<usize>>,

    /// The overlap derivative integrals $`\langle \nabla \mu | \nu \rangle`$ of shape
    /// `(3, nao, nao)`.
    ipovlp: Array3<f64>,

    /// The full derivatives of the core Hamiltonian matrix with respect to the position of each
    /// atom, of shape `(natm, 3, nao, nao)`.
    hcore_derivs: Array4<f64>,

    /// The electron-repulsion derivative integrals $`(\nabla \mu\, \nu | \lambda \sigma)`$ of
    /// shape `(3, nao, nao, nao, nao)`.
    ip1_eri: Array5<f64>,
}

impl AoIntegralDerivativesBuilder {
    fn validate(&self) -> Result<(), String> {
        let ao_slices = self
            .ao_slices
            .as_ref()
            .ok_or("No AO slices per atom found.".to_string())?;
        let ipovlp = self
            .ipovlp
            .as_ref()
            .ok_or("No overlap derivative integrals found.".to_string())?;
        let hcore_derivs = self
            .hcore_derivs
            .as_ref()
            .ok_or("No core Hamiltonian derivatives found.".to_string())?;
        let ip1_eri = self
            .ip1_eri
            .as_ref()
            .ok_or("No electron-repulsion derivative integrals found.".to_string())?;
        let nao = ipovlp.shape()[1];
        let natm = ao_slices.len();
        if ao_slices.iter().any(|slice| slice.end > nao || slice.start > slice.end) {
            Err(format!("Some AO slices are out of range for {nao} AOs."))
        } else if ipovlp.shape() != [3, nao, nao] {
            Err(format!(
                "Overlap derivative integrals have an invalid shape {:?}.",
                ipovlp.shape()
            ))
        } else if hcore_derivs.shape() != [natm, 3, nao, nao] {
            Err(format!(
                "Core Hamiltonian derivatives have shape {:?}, expected {:?}.",
                hcore_derivs.shape(),
                [natm, 3, nao, nao]
            ))
        } else if ip1_eri.shape() != [3, nao, nao, nao, nao] {
            Err(format!(
                "Electron-repulsion derivative integrals have an invalid shape {:?}.",
                ip1_eri.shape()
            ))
        } else {
            Ok(())
        }
    }
}

impl AoIntegralDerivatives {
    /// Returns a builder to construct a new [`AoIntegralDerivatives`] structure.
    pub fn builder() -> AoIntegralDerivativesBuilder {
        AoIntegralDerivativesBuilder::default()
    }

    pub fn nao(&self) -> usize {
        self.ipovlp.shape()[1]
    }

    pub fn natoms(&self) -> usize {
        self.ao_slices.len()
    }

    pub fn ao_slices(&self) -> &[Range<usize>] {
        &self.ao_slices
    }

    pub fn ipovlp(&self) -> &Array3<f64> {
        &self.ipovlp
    }

    pub fn hcore_derivs(&self) -> &Array4<f64> {
        &self.hcore_derivs
    }

    pub fn ip1_eri(&self) -> &Array5<f64> {
        &self.ip1_eri
    }
}

/// Structure containing a molecular Hamiltonian expressed in an orthogonal orbital basis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrthogonalIntegrals {
    /// The one-electron integrals.
    pub h1: Array2<f64>,

    /// The two-electron integrals in chemists' notation.
    pub h2: Array4<f64>,

    /// The nuclear repulsion energy.
    pub enuc: f64,
}

impl OrthogonalIntegrals {
    /// Computes the Hamiltonian of a molecule in the requested orthogonal basis.
    pub fn from_provider<P: IntegralProvider + ?Sized>(
        provider: &P,
        mol: &Molecule,
        basis_kind: &BasisKind,
    ) -> Result<Self, anyhow::Error> {
        let ao = provider.ao_integrals(mol)?;
        let basis = basis_from_ao_integrals(provider, mol, &ao, basis_kind)?;
        let (h1, h2) = transform_integrals(&ao.hcore(), &ao.eri(), &basis.view())?;
        Ok(Self {
            h1,
            h2,
            enuc: mol.energy_nuc(),
        })
    }

    /// Returns the number of orbitals.
    pub fn norb(&self) -> usize {
        self.h1.nrows()
    }
}

// ================
// Trait definition
// ================

/// Trait for external integral engines supplying atomic-orbital integrals at a given geometry.
pub trait IntegralProvider {
    /// Computes the overlap, core Hamiltonian and electron-repulsion integrals.
    fn ao_integrals(&self, mol: &Molecule) -> Result<AoIntegrals, anyhow::Error>;

    /// Computes the first nuclear derivatives of the atomic-orbital integrals.
    fn ao_integral_derivatives(
        &self,
        mol: &Molecule,
    ) -> Result<AoIntegralDerivatives, anyhow::Error>;

    /// Computes split-localised orbitals (localised occupied and virtual orbitals from a
    /// mean-field reference) as columns in the atomic-orbital basis.
    fn split_localised_basis(
        &self,
        mol: &Molecule,
        ao: &AoIntegrals,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let _ = (mol, ao);
        Err(format_err!(
            "This integral provider cannot construct split-localised orbitals."
        ))
    }
}

// =============
// Basis choices
// =============

/// An enumerated type for the orthogonal orbital bases in which Hamiltonians are expressed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BasisKind {
    /// Split-localised orbitals supplied by the integral provider.
    Split,

    /// Löwdin symmetrically orthogonalised atomic orbitals.
    Oao,

    /// A user-supplied basis given as columns in the atomic-orbital basis.
    Custom(Array2<f64>),
}

impl fmt::Display for BasisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasisKind::Split => write!(f, "split-localised orbitals"),
            BasisKind::Oao => write!(f, "Löwdin-orthogonalised atomic orbitals"),
            BasisKind::Custom(basis) => {
                write!(f, "custom orbitals ({} × {})", basis.nrows(), basis.ncols())
            }
        }
    }
}

fn basis_from_ao_integrals<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    ao: &AoIntegrals,
    basis_kind: &BasisKind,
) -> Result<Array2<f64>, anyhow::Error> {
    let basis = match basis_kind {
        BasisKind::Split => provider.split_localised_basis(mol, ao)?,
        BasisKind::Oao => get_loewdin_trafo(&ao.sao(), LOEWDIN_THRESH_NULL)?,
        BasisKind::Custom(basis) => basis.clone(),
    };
    ensure!(
        basis.nrows() == ao.nao(),
        "The {basis_kind} basis has {} rows, but {} AOs are present.",
        basis.nrows(),
        ao.nao()
    );
    Ok(basis)
}

/// Computes the orbital basis of the requested kind for a molecule.
///
/// # Returns
///
/// The basis orbitals as columns in the atomic-orbital basis.
pub fn get_basis<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    basis_kind: &BasisKind,
) -> Result<Array2<f64>, anyhow::Error> {
    let ao = provider.ao_integrals(mol)?;
    basis_from_ao_integrals(provider, mol, &ao, basis_kind)
}

/// Computes the one- and two-electron integrals of a molecule in a given orbital basis.
///
/// # Arguments
///
/// * `provider` - The integral engine.
/// * `mol` - The molecular geometry.
/// * `basis` - The orbital basis as columns in the atomic-orbital basis.
///
/// # Returns
///
/// A tuple of the one-electron matrix and the two-electron tensor in the orbital basis.
pub fn get_integrals<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    basis: &ArrayView2<f64>,
) -> Result<(Array2<f64>, Array4<f64>), anyhow::Error> {
    let ao = provider.ao_integrals(mol)?;
    ensure!(
        basis.nrows() == ao.nao(),
        "The basis has {} rows, but {} AOs are present.",
        basis.nrows(),
        ao.nao()
    );
    transform_integrals(&ao.hcore(), &ao.eri(), basis)
}
