//! Accumulation of transition density matrices between training states.
//!
//! Each call to [`TrdmAccumulator::extend`] converges the ground state at the newest training
//! geometry and appends one row and one column of overlaps and transition density matrices
//! between the new state and every earlier training state to a [`TrainingSet`]. All quantities
//! are expressed in the frame of Löwdin-orthogonalised atomic orbitals, where the orbitals of
//! different geometries are identified index by index.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{s, Array2, Array4, Array6, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::continuation::TrainingSet;
use crate::integrals::{
    get_basis, get_integrals, get_loewdin_trafo, transform_integrals, BasisKind,
    IntegralProvider, LOEWDIN_THRESH_NULL,
};
use crate::io::format::{evcont_output, evcont_warn, log_subtitle, nice_bool, EvcontOutput};

pub mod distribution;
pub mod store;
pub mod wavefunction;

use distribution::{broadcast_two_body_integrals, broadcast_two_body_rdm, Distributor};
use store::ArtifactStore;
use wavefunction::{TransitionRdms, WavefunctionSolver};


/// Smallest overlap magnitude between a rerun state and its rotated reference for which a
/// relative sign is defined.
const PHASE_ALIGNMENT_THRESH: f64 = 1e-8;

// ----------
// Parameters
// ----------

/// An enumerated type for the ways in which earlier training states are brought into the orbital
/// basis of the newest training state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulationStrategy {
    /// Every earlier state is converged again from scratch at its own geometry, but in orbitals
    /// rotated to match the computational basis of the newest state. The sign of each rerun
    /// state is aligned with the persisted state it replaces.
    Rerun,

    /// Every earlier state is rotated by the solver into the computational basis of the newest
    /// state.
    OrbitalRotation,

    /// All states are converged directly in the Löwdin-orthogonalised atomic-orbital basis, so
    /// that no basis alignment is needed.
    OaoBasis,
}

impl fmt::Display for AccumulationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationStrategy::Rerun => write!(f, "rerun in rotated orbitals"),
            AccumulationStrategy::OrbitalRotation => write!(f, "orbital rotation"),
            AccumulationStrategy::OaoBasis => write!(f, "OAO basis"),
        }
    }
}

fn default_strategy() -> AccumulationStrategy {
    AccumulationStrategy::OrbitalRotation
}
fn default_computational_basis() -> BasisKind {
    BasisKind::Split
}
fn default_true() -> bool {
    true
}
fn default_rotation_thresh() -> f64 {
    1e-6
}

/// Structure containing control parameters for the accumulation of transition density
/// matrices.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct AccumulationParams {
    /// The strategy for aligning earlier training states with the newest one.
    #[builder(default = "AccumulationStrategy::OrbitalRotation")]
    #[serde(default = "default_strategy")]
    pub strategy: AccumulationStrategy,

    /// The orbital basis in which ground states are converged. This is ignored by
    /// [`AccumulationStrategy::OaoBasis`].
    #[builder(default = "BasisKind::Split")]
    #[serde(default = "default_computational_basis")]
    pub computational_basis: BasisKind,

    /// Boolean indicating if the computational basis is reordered as preferred by the
    /// wavefunction solver.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub reorder_orbitals: bool,

    /// The accuracy threshold passed to the wavefunction solver for orbital rotations. With
    /// [`AccumulationStrategy::Rerun`], rotations only provide the sign reference of rerun
    /// states.
    #[builder(default = "1e-6")]
    #[serde(default = "default_rotation_thresh")]
    pub rotation_thresh: f64,
}

impl AccumulationParams {
    /// Returns a builder to construct an [`AccumulationParams`] structure.
    pub fn builder() -> AccumulationParamsBuilder {
        AccumulationParamsBuilder::default()
    }
}

impl Default for AccumulationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `AccumulationParams`.")
    }
}

impl fmt::Display for AccumulationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accumulation strategy: {}", self.strategy)?;
        if self.strategy != AccumulationStrategy::OaoBasis {
            writeln!(f, "Computational basis: {}", self.computational_basis)?;
            writeln!(
                f,
                "Solver-preferred orbital ordering: {}",
                nice_bool(self.reorder_orbitals)
            )?;
        }
        if self.strategy != AccumulationStrategy::OaoBasis {
            writeln!(f, "Orbital rotation threshold: {:.3e}", self.rotation_thresh)?;
        }
        Ok(())
    }
}

// -----------
// Accumulator
// -----------

/// Accumulator of transition density matrices over a growing set of training geometries.
///
/// The wavefunction solver persists converged states under the tags `state_{i}` for training
/// state `i`. Intermediate states carry the tags `state_{n}_{i}` (rerun),
/// `reference_state_{n}_{i}` (sign reference of a rerun) and `rotated_{n}_{i}` (orbital
/// rotation) for earlier state `i` aligned with newest state `n`.
pub struct TrdmAccumulator<'a, P, W, D, A> {
    /// The control parameters for the accumulation.
    parameters: &'a AccumulationParams,

    /// The atomic-orbital integral engine.
    provider: &'a P,

    /// The many-electron wavefunction solver.
    solver: &'a mut W,

    /// The strategy for distributing data between cooperating processes.
    distributor: &'a D,

    /// The store of computational basis matrices, keyed by training index.
    store: &'a mut A,
}

impl<'a, P, W, D, A> TrdmAccumulator<'a, P, W, D, A>
where
    P: IntegralProvider,
    W: WavefunctionSolver,
    D: Distributor,
    A: ArtifactStore<Array2<f64>>,
{
    /// Creates an accumulator from its collaborators.
    pub fn new(
        parameters: &'a AccumulationParams,
        provider: &'a P,
        solver: &'a mut W,
        distributor: &'a D,
        store: &'a mut A,
    ) -> Self {
        Self {
            parameters,
            provider,
            solver,
            distributor,
            store,
        }
    }

    /// Extends a training set by the newest training geometry.
    ///
    /// # Arguments
    ///
    /// * `mols` - All training geometries so far, the newest last. This must contain exactly one
    ///   more geometry than was used to build `previous`.
    /// * `previous` - The training set of all but the newest geometry, or `None` if `mols`
    ///   contains a single geometry.
    ///
    /// # Returns
    ///
    /// The enlarged training set whose leading block equals `previous`.
    pub fn extend(
        &mut self,
        mols: &[Molecule],
        previous: Option<&TrainingSet>,
    ) -> Result<TrainingSet, anyhow::Error> {
        let nprev = previous.map_or(0, TrainingSet::ntrain);
        ensure!(
            mols.len() == nprev + 1,
            "{} training geometries given for extending a training set of {nprev} states.",
            mols.len()
        );
        log_subtitle(&format!("Accumulation of training state {nprev}"));
        evcont_output!("");
        self.parameters.log_output_display();
        evcont_output!("");

        let training_set = match self.parameters.strategy {
            AccumulationStrategy::OaoBasis => self.extend_in_oao_basis(mols, previous)?,
            AccumulationStrategy::Rerun | AccumulationStrategy::OrbitalRotation => {
                self.extend_in_computational_basis(mols, previous)?
            }
        };
        log::debug!(
            "Largest deviation from Hermitian training-pair relations: {:.3e}",
            training_set.hermiticity_deviation()
        );
        training_set.log_output_display();
        evcont_output!("");
        Ok(training_set)
    }

    /// Broadcasts a Hamiltonian from the root process and converges its ground state.
    fn converge(
        &mut self,
        h1: Array2<f64>,
        h2: Array4<f64>,
        nelec: usize,
        tag: &str,
    ) -> Result<f64, anyhow::Error> {
        let h1 = self.distributor.broadcast(h1)?;
        let h2 = broadcast_two_body_integrals(self.distributor, h2)?;
        let energy = self.solver.converge(&h1.view(), &h2.view(), nelec, tag)?;
        evcont_output!("Converged `{tag}`: E = {energy:+.10} Eh");
        Ok(energy)
    }

    /// Computes the computational basis of the newest geometry, reordered as preferred by the
    /// solver if requested.
    fn computational_basis(&mut self, mol: &Molecule) -> Result<Array2<f64>, anyhow::Error> {
        let basis = get_basis(self.provider, mol, &self.parameters.computational_basis)?;
        let reorder_here = self.parameters.reorder_orbitals
            && (self.parameters.strategy == AccumulationStrategy::Rerun
                || self.distributor.is_root());
        if !reorder_here {
            return Ok(basis);
        }
        let (h1, h2) = get_integrals(self.provider, mol, &basis.view())?;
        let order = self.solver.orbital_reordering(&h1.view(), &h2.view())?;
        ensure!(
            order.iter().copied().sorted().eq(0..basis.ncols()),
            "The orbital reordering {order:?} is not a permutation of {} orbitals.",
            basis.ncols()
        );
        log::debug!("Orbital reordering: {order:?}");
        Ok(basis.select(Axis(1), &order))
    }

    /// Returns the coefficients of the orbitals `basis` in the Löwdin-orthogonalised atomic
    /// orbitals of `mol`, $`\mathbf{X}^{\mathsf{T}} \mathbf{S} \mathbf{C}`$.
    fn computational_to_oao(
        &self,
        mol: &Molecule,
        basis: &ArrayView2<f64>,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let ao = self.provider.ao_integrals(mol)?;
        let oao = get_loewdin_trafo(&ao.sao(), LOEWDIN_THRESH_NULL)?;
        ensure!(
            basis.nrows() == ao.nao(),
            "Basis with {} rows given for {} AOs.",
            basis.nrows(),
            ao.nao()
        );
        ensure!(
            basis.ncols() == oao.ncols(),
            "A computational basis of {} orbitals does not span the {} Löwdin-orthogonalised atomic orbitals.",
            basis.ncols(),
            oao.ncols()
        );
        Ok(oao.t().dot(&ao.sao()).dot(basis))
    }

    /// Returns the sign that aligns the rerun state `rerun_tag` with the persisted state
    /// `state_{iket}`, carried into the same orbitals by `orbital_rotation`.
    fn rerun_phase(
        &mut self,
        iket: usize,
        rerun_tag: &str,
        orbital_rotation: &ArrayView2<f64>,
    ) -> Result<f64, anyhow::Error> {
        let reference_tag = format!("reference_{rerun_tag}");
        self.solver.rotate(
            &format!("state_{iket}"),
            &reference_tag,
            orbital_rotation,
            self.parameters.rotation_thresh,
        )?;
        let alignment = self
            .solver
            .transition_rdms(&reference_tag, rerun_tag)?
            .overlap;
        log::debug!("Overlap of `{rerun_tag}` with its reference: {alignment:+.8e}");
        ensure!(
            alignment.abs() > PHASE_ALIGNMENT_THRESH,
            "The rerun state `{rerun_tag}` is orthogonal to state {iket} (overlap {alignment:+.3e})."
        );
        if alignment.abs() < 0.9 {
            evcont_warn!(
                "The rerun state `{rerun_tag}` overlaps state {iket} by only {alignment:+.6}."
            );
        }
        Ok(alignment.signum())
    }

    fn extend_in_computational_basis(
        &mut self,
        mols: &[Molecule],
        previous: Option<&TrainingSet>,
    ) -> Result<TrainingSet, anyhow::Error> {
        let ntrain = mols.len();
        let inew = ntrain - 1;
        let mol_bra = &mols[inew];
        let nelec = mol_bra.nelectrons()?;
        let strategy = self.parameters.strategy;

        let basis = self.computational_basis(mol_bra)?;
        let basis = self.distributor.broadcast(basis)?;
        let norb = basis.ncols();
        let (h1, h2) = get_integrals(self.provider, mol_bra, &basis.view())?;
        let bra_tag = format!("state_{inew}");
        self.converge(h1, h2, nelec, &bra_tag)?;
        if self.distributor.is_root() {
            self.store.store(inew, &basis)?;
        }

        let (mut overlap, mut one_rdm, mut two_rdm) =
            TrainingSet::enlarged_arrays(previous, ntrain, norb)?;

        let accumulate_here =
            strategy == AccumulationStrategy::Rerun || self.distributor.is_root();
        if accumulate_here {
            let c2o_bra = self.computational_to_oao(mol_bra, &basis.view())?;
            for (iket, mol_ket) in mols.iter().enumerate() {
                let (ket_tag, phase) = if iket == inew {
                    (bra_tag.clone(), 1.0)
                } else {
                    let basis_ket = self.store.load(iket)?;
                    ensure!(
                        basis_ket.ncols() == norb,
                        "Stored basis {iket} has {} orbitals, but {norb} are required.",
                        basis_ket.ncols()
                    );
                    let c2o_ket = self.computational_to_oao(mol_ket, &basis_ket.view())?;
                    let orbital_rotation = c2o_bra.t().dot(&c2o_ket).reversed_axes();
                    log::debug!(
                        "Orbital rotation of state {iket} into the basis of state {inew}:\n  {orbital_rotation:+.8e}"
                    );
                    match strategy {
                        AccumulationStrategy::Rerun => {
                            let rotated_basis = basis_ket.dot(&orbital_rotation);
                            let (h1, h2) =
                                get_integrals(self.provider, mol_ket, &rotated_basis.view())?;
                            let tag = format!("state_{inew}_{iket}");
                            self.converge(h1, h2, nelec, &tag)?;
                            let phase = self.rerun_phase(iket, &tag, &orbital_rotation.view())?;
                            (tag, phase)
                        }
                        _ => {
                            let tag = format!("rotated_{inew}_{iket}");
                            self.solver.rotate(
                                &format!("state_{iket}"),
                                &tag,
                                &orbital_rotation.view(),
                                self.parameters.rotation_thresh,
                            )?;
                            (tag, 1.0)
                        }
                    }
                };
                let mut trdms = self.solver.transition_rdms(&bra_tag, &ket_tag)?;
                check_transition_rdms(&trdms, norb)?;
                if phase < 0.0 {
                    flip_phase(&mut trdms);
                }
                let trdms_oao = to_oao_frame(trdms, &c2o_bra.view())?;
                write_training_pair(
                    &mut overlap,
                    &mut one_rdm,
                    &mut two_rdm,
                    (inew, iket),
                    &trdms_oao,
                )?;
            }
        }

        if strategy == AccumulationStrategy::OrbitalRotation {
            overlap = self.distributor.broadcast(overlap)?;
            one_rdm = self.distributor.broadcast(one_rdm)?;
            two_rdm = broadcast_two_body_rdm(self.distributor, two_rdm)?;
        }
        TrainingSet::new(overlap, one_rdm, two_rdm)
    }

    fn extend_in_oao_basis(
        &mut self,
        mols: &[Molecule],
        previous: Option<&TrainingSet>,
    ) -> Result<TrainingSet, anyhow::Error> {
        let ntrain = mols.len();
        let inew = ntrain - 1;
        let mol_bra = &mols[inew];
        let nelec = mol_bra.nelectrons()?;

        let ao = self.provider.ao_integrals(mol_bra)?;
        let oao = get_loewdin_trafo(&ao.sao(), LOEWDIN_THRESH_NULL)?;
        let norb = oao.ncols();
        let (h1, h2) = transform_integrals(&ao.hcore(), &ao.eri(), &oao.view())?;
        let bra_tag = format!("state_{inew}");
        self.converge(h1, h2, nelec, &bra_tag)?;

        let (mut overlap, mut one_rdm, mut two_rdm) =
            TrainingSet::enlarged_arrays(previous, ntrain, norb)?;
        for iket in 0..ntrain {
            let trdms = self
                .solver
                .transition_rdms(&bra_tag, &format!("state_{iket}"))?;
            check_transition_rdms(&trdms, norb)?;
            write_training_pair(
                &mut overlap,
                &mut one_rdm,
                &mut two_rdm,
                (inew, iket),
                &trdms,
            )?;
        }
        TrainingSet::new(overlap, one_rdm, two_rdm)
    }
}

// -------------------
// Auxiliary functions
// -------------------

/// Transforms transition density matrices from a computational basis into the frame of
/// Löwdin-orthogonalised atomic orbitals, $`\boldsymbol{\gamma}' = \mathbf{T} \boldsymbol{\gamma}
/// \mathbf{T}^{\mathsf{T}}`$ and analogously for every index of $`\boldsymbol{\Gamma}`$.
fn to_oao_frame(
    trdms: TransitionRdms,
    c2o: &ArrayView2<f64>,
) -> Result<TransitionRdms, anyhow::Error> {
    let (one_rdm, two_rdm) =
        transform_integrals(&trdms.one_rdm.view(), &trdms.two_rdm.view(), &c2o.t())
            .map_err(|err| format_err!("Unable to transform transition density matrices: {err}"))?;
    Ok(TransitionRdms {
        overlap: trdms.overlap,
        one_rdm,
        two_rdm,
    })
}

/// Verifies that transition density matrices returned by a solver refer to `norb` orbitals.
fn check_transition_rdms(trdms: &TransitionRdms, norb: usize) -> Result<(), anyhow::Error> {
    ensure!(
        trdms.one_rdm.shape() == [norb, norb],
        "One-body transition density matrix of shape {:?} for {norb} orbitals.",
        trdms.one_rdm.shape()
    );
    ensure!(
        trdms.two_rdm.shape() == [norb, norb, norb, norb],
        "Two-body transition density matrix of shape {:?} for {norb} orbitals.",
        trdms.two_rdm.shape()
    );
    Ok(())
}

/// Changes the sign of the ket in a set of transition quantities.
fn flip_phase(trdms: &mut TransitionRdms) {
    trdms.overlap = -trdms.overlap;
    trdms.one_rdm.mapv_inplace(|v| -v);
    trdms.two_rdm.mapv_inplace(|v| -v);
}

/// Writes the transition quantities of the pair `(a, b)` and mirrors them into `(b, a)`.
fn write_training_pair(
    overlap: &mut Array2<f64>,
    one_rdm: &mut Array4<f64>,
    two_rdm: &mut Array6<f64>,
    (a, b): (usize, usize),
    trdms: &TransitionRdms,
) -> Result<(), anyhow::Error> {
    let norb = one_rdm.shape()[2];
    ensure!(
        a < overlap.nrows() && b < overlap.nrows(),
        "Training pair ({a}, {b}) lies outside a training set of {} states.",
        overlap.nrows()
    );
    check_transition_rdms(trdms, norb)?;
    overlap[(a, b)] = trdms.overlap;
    one_rdm.slice_mut(s![a, b, .., ..]).assign(&trdms.one_rdm);
    two_rdm
        .slice_mut(s![a, b, .., .., .., ..])
        .assign(&trdms.two_rdm);
    if a != b {
        overlap[(b, a)] = trdms.overlap;
        one_rdm
            .slice_mut(s![b, a, .., ..])
            .assign(&trdms.one_rdm.t());
        two_rdm
            .slice_mut(s![b, a, .., .., .., ..])
            .assign(&trdms.two_rdm.view().permuted_axes([1, 0, 3, 2]));
    }
    Ok(())
}
