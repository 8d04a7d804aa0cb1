//! Interface to external many-electron wavefunction solvers.

use anyhow;
use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use serde::{Deserialize, Serialize};

/// Structure containing the transition quantities between a bra and a ket state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRdms {
    /// The overlap $`\langle \mathrm{bra} | \mathrm{ket} \rangle`$.
    pub overlap: f64,

    /// The one-body transition density matrix
    /// $`\gamma_{pq} = \langle \mathrm{bra} | \sum_\sigma a^\dagger_{p\sigma} a_{q\sigma} | \mathrm{ket} \rangle`$.
    pub one_rdm: Array2<f64>,

    /// The two-body transition density matrix in chemists' layout,
    /// $`\Gamma_{pqrs} = \langle \mathrm{bra} | \sum_{\sigma\tau} a^\dagger_{p\sigma} a^\dagger_{r\tau} a_{s\tau} a_{q\sigma} | \mathrm{ket} \rangle`$.
    pub two_rdm: Array4<f64>,
}

/// Trait for external solvers able to converge ground states of a Hamiltonian given in an
/// orthogonal orbital basis, persist them under string tags, and evaluate transition density
/// matrices between persisted states.
///
/// All states persisted by one solver refer to orbital bases of the same dimension.
pub trait WavefunctionSolver {
    /// Converges the ground state of the Hamiltonian `(h1, h2)` with `nelec` electrons and
    /// persists it under `tag`.
    ///
    /// # Returns
    ///
    /// The converged electronic energy, or an error if the solver did not converge.
    fn converge(
        &mut self,
        h1: &ArrayView2<f64>,
        h2: &ArrayView4<f64>,
        nelec: usize,
        tag: &str,
    ) -> Result<f64, anyhow::Error>;

    /// Computes the overlap and the one- and two-body transition density matrices between two
    /// persisted states.
    fn transition_rdms(
        &mut self,
        bra_tag: &str,
        ket_tag: &str,
    ) -> Result<TransitionRdms, anyhow::Error>;

    /// Expresses the state persisted under `ket_tag` in the rotated orbitals
    /// $`\phi'_p = \sum_q \phi_q R_{qp}`$ and persists the result under `new_tag`.
    ///
    /// # Arguments
    ///
    /// * `ket_tag` - The tag of the state to be rotated.
    /// * `new_tag` - The tag under which the rotated state is persisted.
    /// * `rotation` - The orthogonal orbital rotation matrix $`\mathbf{R}`$.
    /// * `thresh` - The solver-specific accuracy threshold for an approximate rotation.
    fn rotate(
        &mut self,
        ket_tag: &str,
        new_tag: &str,
        rotation: &ArrayView2<f64>,
        thresh: f64,
    ) -> Result<(), anyhow::Error>;

    /// Returns a preferred ordering of the orbitals for the Hamiltonian `(h1, h2)`, as the list
    /// of original orbital indices in their new order.
    fn orbital_reordering(
        &mut self,
        h1: &ArrayView2<f64>,
        _h2: &ArrayView4<f64>,
    ) -> Result<Vec<usize>, anyhow::Error> {
        Ok((0..h1.nrows()).collect())
    }
}
