//! Eigenvector continuation in the subspace spanned by training states.
//!
//! Given the overlaps $`S_{ab}`$ and the transition density matrices of training states, the
//! Hamiltonian of a new geometry is projected onto the training subspace,
//!
//! ```math
//!     H_{ab} = \sum_{pq} \gamma^{(ab)}_{pq} h_{pq}
//!            + \frac{1}{2} \sum_{pqrs} \Gamma^{(ab)}_{pqrs} g_{pqrs},
//! ```
//!
//! and the generalised eigenvalue problem $`\mathbf{H}\mathbf{v} = E\mathbf{S}\mathbf{v}`$ is
//! solved for approximate energies and subspace coefficients. The integrals $`h`$ and $`g`$ must
//! be expressed in the same orthogonal orbital frame as the transition density matrices.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2, Array4, ArrayView2, ArrayView4, Ix2};
use ndarray_einsum_beta::einsum;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::integrals::compression::tril_indices;
use crate::integrals::{
    get_loewdin_trafo, transform_integrals, IntegralProvider, LOEWDIN_THRESH_NULL,
};
use crate::io::format::nice_bool;

pub mod eigensolver;
pub mod rdm;
pub mod training;

pub use eigensolver::{GeneralisedEigenvalueResult, GeneralisedEigenvalueSolvable};
pub use rdm::{RdmCompression, TwoBodyRdm};
pub use training::TrainingSet;

use rdm::TwoBodyContraction;


// ----------
// Parameters
// ----------

fn default_true() -> bool {
    true
}
fn default_nroots() -> usize {
    1
}
fn default_thresh_imag() -> f64 {
    1e-5
}
fn default_thresh_zeroov() -> f64 {
    1e-14
}
fn default_thresh_null_loewdin() -> f64 {
    LOEWDIN_THRESH_NULL
}

/// Structure containing control parameters for solving the subspace eigenvalue problem.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct ContinuationParams {
    /// Boolean indicating if the subspace Hamiltonian is treated as Hermitian. If `false`, a
    /// general generalised eigensolver is used and complex eigenvalues are discarded.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub hermitian: bool,

    /// The number of lowest states to be returned.
    #[builder(default = "1")]
    #[serde(default = "default_nroots")]
    pub nroots: usize,

    /// Eigenvalues with imaginary parts at or above this threshold in magnitude are discarded.
    #[builder(default = "1e-5")]
    #[serde(default = "default_thresh_imag")]
    pub thresh_imag: f64,

    /// Threshold for determining zero eigenvalues of the training overlap matrix.
    #[builder(default = "1e-14")]
    #[serde(default = "default_thresh_zeroov")]
    pub thresh_zeroov: f64,

    /// Eigenvalues of the atomic-orbital overlap matrix at or below this threshold are dropped
    /// when the Löwdin-orthogonalised basis of a new geometry is built.
    #[builder(default = "LOEWDIN_THRESH_NULL")]
    #[serde(default = "default_thresh_null_loewdin")]
    pub thresh_null_loewdin: f64,
}

impl ContinuationParams {
    /// Returns a builder to construct a [`ContinuationParams`] structure.
    pub fn builder() -> ContinuationParamsBuilder {
        ContinuationParamsBuilder::default()
    }
}

impl Default for ContinuationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `ContinuationParams`.")
    }
}

impl fmt::Display for ContinuationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hermitian subspace Hamiltonian: {}", nice_bool(self.hermitian))?;
        writeln!(f, "Number of roots: {}", self.nroots)?;
        writeln!(
            f,
            "Imaginary-part threshold for eigenvalues: {:.3e}",
            self.thresh_imag
        )?;
        writeln!(
            f,
            "Zero-eigenvalue threshold for the overlap matrix: {:.3e}",
            self.thresh_zeroov
        )?;
        writeln!(
            f,
            "Null-eigenvalue threshold for the Löwdin orthogonalisation: {:.3e}",
            self.thresh_null_loewdin
        )?;
        Ok(())
    }
}

// ---------
// Functions
// ---------

/// Projects a Hamiltonian onto the training subspace.
///
/// For the data-packed layouts only the lower triangle of the two-body contribution is
/// available; the lower triangle of the full matrix is then mirrored into the upper triangle.
///
/// # Arguments
///
/// * `h1` - One-electron integrals of shape `(Norb, Norb)`.
/// * `h2` - Two-electron integrals of shape `(Norb, Norb, Norb, Norb)` in chemists' notation.
/// * `one_rdm` - One-body transition density matrices of shape `(Ntrn, Ntrn, Norb, Norb)`.
/// * `two_rdm` - Two-body transition density matrices in any storage layout.
///
/// # Returns
///
/// The `Ntrn × Ntrn` subspace Hamiltonian matrix.
pub fn build_subspace_hamiltonian(
    h1: &ArrayView2<f64>,
    h2: &ArrayView4<f64>,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
) -> Result<Array2<f64>, anyhow::Error> {
    let (ntrain, norb) = two_rdm.dims()?;
    ensure!(
        one_rdm.shape() == [ntrain, ntrain, norb, norb],
        "One-body transition density array of shape {:?} is inconsistent with {ntrain} training states and {norb} orbitals.",
        one_rdm.shape()
    );
    ensure!(
        h1.shape() == [norb, norb],
        "One-electron integrals of shape {:?} are inconsistent with {norb} orbitals.",
        h1.shape()
    );

    let mut hmat = einsum("abpq,pq->ab", &[one_rdm, h1])
        .map_err(|err| format_err!(err))?
        .into_dimensionality::<Ix2>()
        .map_err(|err| format_err!(err))?;

    match two_rdm.contract_two_electron(h2)? {
        TwoBodyContraction::Square(two_body) => {
            hmat += &two_body;
        }
        TwoBodyContraction::LowerTriangle(two_body) => {
            tril_indices(ntrain)
                .into_iter()
                .zip(two_body.iter())
                .for_each(|((a, b), v)| hmat[(a, b)] += *v);
            for a in 0..ntrain {
                for b in (a + 1)..ntrain {
                    hmat[(a, b)] = hmat[(b, a)];
                }
            }
        }
    }
    log::debug!("Subspace Hamiltonian matrix:\n  {hmat:+.8e}");
    Ok(hmat)
}

/// Computes approximate energies and subspace coefficients of the lowest `params.nroots` states
/// by eigenvector continuation.
///
/// # Arguments
///
/// * `h1` - One-electron integrals of shape `(Norb, Norb)`.
/// * `h2` - Two-electron integrals of shape `(Norb, Norb, Norb, Norb)`.
/// * `one_rdm` - One-body transition density matrices of shape `(Ntrn, Ntrn, Norb, Norb)`.
/// * `two_rdm` - Two-body transition density matrices in any storage layout.
/// * `overlap` - The training overlap matrix of shape `(Ntrn, Ntrn)`.
/// * `params` - Control parameters.
///
/// # Returns
///
/// A tuple of the `nroots` lowest electronic energies in ascending order, and an
/// `nroots × Ntrn` array whose rows are the corresponding subspace coefficients.
pub fn approximate_multistate(
    h1: &ArrayView2<f64>,
    h2: &ArrayView4<f64>,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
    overlap: &ArrayView2<f64>,
    params: &ContinuationParams,
) -> Result<(Array1<f64>, Array2<f64>), anyhow::Error> {
    let (ntrain, _) = two_rdm.dims()?;
    ensure!(
        overlap.shape() == [ntrain, ntrain],
        "Training overlap matrix of shape {:?} is inconsistent with {ntrain} training states.",
        overlap.shape()
    );
    ensure!(params.nroots > 0, "At least one root must be requested.");
    let hmat = build_subspace_hamiltonian(h1, h2, one_rdm, two_rdm)?;
    let hmat_view = hmat.view();

    let res = if params.hermitian {
        (&hmat_view, overlap)
            .solve_generalised_eigenvalue_problem_with_canonical_orthogonalisation(
                params.thresh_zeroov,
            )?
    } else {
        (&hmat_view, overlap)
            .solve_generalised_eigenvalue_problem_with_ggev(params.thresh_zeroov, params.thresh_imag)?
    };
    ensure!(
        res.len() >= params.nroots,
        "Only {} real eigenvalue(s) found in the training subspace, but {} requested.",
        res.len(),
        params.nroots
    );
    let energies = res.eigenvalues().slice(ndarray::s![..params.nroots]).to_owned();
    let coefficients = res
        .eigenvectors()
        .slice(ndarray::s![.., ..params.nroots])
        .t()
        .to_owned();
    Ok((energies, coefficients))
}

/// Computes the approximate ground-state energy and subspace coefficients by eigenvector
/// continuation.
///
/// This is [`approximate_multistate`] for a single root; `params.nroots` is ignored.
///
/// # Returns
///
/// A tuple of the lowest real electronic energy and the corresponding real subspace coefficient
/// vector of length `Ntrn`.
pub fn approximate_ground_state(
    h1: &ArrayView2<f64>,
    h2: &ArrayView4<f64>,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
    overlap: &ArrayView2<f64>,
    params: &ContinuationParams,
) -> Result<(f64, Array1<f64>), anyhow::Error> {
    let ground_params = ContinuationParams {
        nroots: 1,
        ..params.clone()
    };
    let (energies, coefficients) =
        approximate_multistate(h1, h2, one_rdm, two_rdm, overlap, &ground_params)?;
    Ok((energies[0], coefficients.row(0).to_owned()))
}

/// Computes the integrals of a molecule in its Löwdin-orthogonalised atomic-orbital basis.
fn oao_integrals<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    thresh_null: f64,
) -> Result<(Array2<f64>, Array4<f64>), anyhow::Error> {
    let ao = provider.ao_integrals(mol)?;
    let basis = get_loewdin_trafo(&ao.sao(), thresh_null)?;
    transform_integrals(&ao.hcore(), &ao.eri(), &basis.view())
}

/// Computes approximate total energies of the lowest `params.nroots` states of a molecule,
/// building its Hamiltonian in the Löwdin-orthogonalised atomic-orbital basis and adding the
/// nuclear repulsion energy.
pub fn approximate_multistate_oao<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
    overlap: &ArrayView2<f64>,
    params: &ContinuationParams,
) -> Result<(Array1<f64>, Array2<f64>), anyhow::Error> {
    let (h1, h2) = oao_integrals(provider, mol, params.thresh_null_loewdin)?;
    let (energies, coefficients) =
        approximate_multistate(&h1.view(), &h2.view(), one_rdm, two_rdm, overlap, params)?;
    Ok((energies + mol.energy_nuc(), coefficients))
}

/// Computes the approximate total ground-state energy of a molecule, building its Hamiltonian
/// in the Löwdin-orthogonalised atomic-orbital basis and adding the nuclear repulsion energy.
pub fn approximate_ground_state_oao<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
    overlap: &ArrayView2<f64>,
    params: &ContinuationParams,
) -> Result<(f64, Array1<f64>), anyhow::Error> {
    let (h1, h2) = oao_integrals(provider, mol, params.thresh_null_loewdin)?;
    let (energy, coefficients) =
        approximate_ground_state(&h1.view(), &h2.view(), one_rdm, two_rdm, overlap, params)?;
    Ok((energy + mol.energy_nuc(), coefficients))
}
