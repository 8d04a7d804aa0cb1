//! Accumulated transition density matrices between training states.

use std::fmt;

use anyhow::{self, ensure};
use ndarray::{s, Array2, Array4, Array6, ArrayView2, ArrayView4, ArrayView6};
use serde::{Deserialize, Serialize};

use crate::continuation::rdm::{RdmCompression, TwoBodyRdm};

/// Structure containing the overlaps and the one- and two-body transition density matrices
/// between all pairs of training states, expressed in a common orthogonal orbital frame.
///
/// Element `[a, b]` of each array refers to the pair $`\langle \Psi_a | \cdots | \Psi_b \rangle`$.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSet {
    /// The overlap matrix of shape `(Ntrn, Ntrn)`.
    overlap: Array2<f64>,

    /// The one-body transition density matrices of shape `(Ntrn, Ntrn, Norb, Norb)`.
    one_rdm: Array4<f64>,

    /// The two-body transition density matrices of shape `(Ntrn, Ntrn, Norb, Norb, Norb, Norb)`.
    two_rdm: Array6<f64>,
}

impl TrainingSet {
    /// Creates a training set after verifying the consistency of the array shapes.
    pub fn new(
        overlap: Array2<f64>,
        one_rdm: Array4<f64>,
        two_rdm: Array6<f64>,
    ) -> Result<Self, anyhow::Error> {
        let ntrain = overlap.nrows();
        let norb = one_rdm.shape().get(2).copied().unwrap_or(0);
        ensure!(
            overlap.shape() == [ntrain, ntrain],
            "The training overlap matrix of shape {:?} is not square.",
            overlap.shape()
        );
        ensure!(
            one_rdm.shape() == [ntrain, ntrain, norb, norb],
            "The one-body transition density array of shape {:?} is inconsistent with {ntrain} training states.",
            one_rdm.shape()
        );
        ensure!(
            two_rdm.shape() == [ntrain, ntrain, norb, norb, norb, norb],
            "The two-body transition density array of shape {:?} is inconsistent with {ntrain} training states and {norb} orbitals.",
            two_rdm.shape()
        );
        Ok(Self {
            overlap,
            one_rdm,
            two_rdm,
        })
    }

    /// Allocates the arrays for `ntrain` training states and `norb` orbitals, copying the
    /// leading block from a previous training set.
    pub(crate) fn enlarged_arrays(
        previous: Option<&TrainingSet>,
        ntrain: usize,
        norb: usize,
    ) -> Result<(Array2<f64>, Array4<f64>, Array6<f64>), anyhow::Error> {
        let mut overlap = Array2::<f64>::zeros((ntrain, ntrain));
        let mut one_rdm = Array4::<f64>::zeros((ntrain, ntrain, norb, norb));
        let mut two_rdm = Array6::<f64>::zeros((ntrain, ntrain, norb, norb, norb, norb));
        if let Some(prev) = previous {
            let nprev = prev.ntrain();
            ensure!(
                nprev < ntrain,
                "Cannot enlarge a training set of {nprev} states to {ntrain} states."
            );
            ensure!(
                prev.norb() == norb,
                "The previous training set has {} orbitals, but {norb} are required.",
                prev.norb()
            );
            overlap
                .slice_mut(s![..nprev, ..nprev])
                .assign(&prev.overlap);
            one_rdm
                .slice_mut(s![..nprev, ..nprev, .., ..])
                .assign(&prev.one_rdm);
            two_rdm
                .slice_mut(s![..nprev, ..nprev, .., .., .., ..])
                .assign(&prev.two_rdm);
        }
        Ok((overlap, one_rdm, two_rdm))
    }

    /// Returns the number of training states.
    pub fn ntrain(&self) -> usize {
        self.overlap.nrows()
    }

    /// Returns the number of orbitals.
    pub fn norb(&self) -> usize {
        self.one_rdm.shape()[2]
    }

    pub fn overlap(&self) -> ArrayView2<f64> {
        self.overlap.view()
    }

    pub fn one_rdm(&self) -> ArrayView4<f64> {
        self.one_rdm.view()
    }

    pub fn two_rdm(&self) -> ArrayView6<f64> {
        self.two_rdm.view()
    }

    /// Returns the two-body transition density matrices in the requested storage layout.
    pub fn two_body(&self, compression: RdmCompression) -> Result<TwoBodyRdm, anyhow::Error> {
        TwoBodyRdm::compress(&self.two_rdm.view(), compression)
    }

    /// Returns the largest deviation from the Hermitian training-pair relations
    /// $`S_{ab} = S_{ba}`$, $`\gamma^{(ba)} = \gamma^{(ab)\mathsf{T}}`$ and
    /// $`\Gamma^{(ba)}_{pqrs} = \Gamma^{(ab)}_{qpsr}`$.
    pub fn hermiticity_deviation(&self) -> f64 {
        let ds = (&self.overlap - &self.overlap.t())
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let d1 = (&self.one_rdm - &self.one_rdm.view().permuted_axes([1, 0, 3, 2]))
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let d2 = (&self.two_rdm - &self.two_rdm.view().permuted_axes([1, 0, 3, 2, 5, 4]))
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        ds.max(d1).max(d2)
    }
}

impl fmt::Display for TrainingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training states: {}", self.ntrain())?;
        writeln!(f, "Orbitals: {}", self.norb())?;
        writeln!(f, "Training overlap matrix:")?;
        for row in self.overlap.rows() {
            writeln!(
                f,
                "  {}",
                row.iter()
                    .map(|v| format!("{v:+.8}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            )?;
        }
        Ok(())
    }
}
