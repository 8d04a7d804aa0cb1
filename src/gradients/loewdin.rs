//! Derivatives of the Löwdin orthogonalisation with respect to the atomic-orbital overlap.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::{s, Array1, Array2, Array4, ArrayView1, ArrayView2, ArrayView4, Axis};
use ndarray_linalg::{Eigh, UPLO};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::integrals::transform::LOEWDIN_THRESH_NULL;
use crate::integrals::AoIntegralDerivatives;

#[cfg(test)]
#[path = "loewdin_tests.rs"]
mod loewdin_tests;

fn default_degeneracy_decimals() -> i32 {
    5
}
fn default_thresh_null() -> f64 {
    LOEWDIN_THRESH_NULL
}

/// Structure containing control parameters for differentiating the Löwdin transformation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct LoewdinGradientParams {
    /// Overlap eigenvalues that agree after rounding to this many decimal places are treated as
    /// degenerate.
    #[builder(default = "5")]
    #[serde(default = "default_degeneracy_decimals")]
    pub degeneracy_decimals: i32,

    /// Overlap eigenvalues at or below this threshold are dropped from the Löwdin
    /// transformation and from its derivative.
    #[builder(default = "LOEWDIN_THRESH_NULL")]
    #[serde(default = "default_thresh_null")]
    pub thresh_null: f64,
}

impl LoewdinGradientParams {
    /// Returns a builder to construct a [`LoewdinGradientParams`] structure.
    pub fn builder() -> LoewdinGradientParamsBuilder {
        LoewdinGradientParamsBuilder::default()
    }
}

impl Default for LoewdinGradientParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `LoewdinGradientParams`.")
    }
}

impl fmt::Display for LoewdinGradientParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Degeneracy rounding of overlap eigenvalues: {} decimal places",
            self.degeneracy_decimals
        )?;
        writeln!(
            f,
            "Null threshold for overlap eigenvalues: {:.3e}",
            self.thresh_null
        )?;
        Ok(())
    }
}

/// Assembles the nuclear derivatives of the atomic-orbital overlap matrix.
///
/// # Returns
///
/// The array of shape `(nao, nao, natm, 3)` whose element `[p, q, A, x]` is
/// $`\partial S_{pq} / \partial R_{Ax}`$.
pub fn get_overlap_grad(derivs: &AoIntegralDerivatives) -> Array4<f64> {
    let nao = derivs.nao();
    let natm = derivs.natoms();
    let ipovlp = derivs.ipovlp();
    let mut half = Array4::<f64>::zeros((nao, nao, natm, 3));
    for (atom, slice) in derivs.ao_slices().iter().enumerate() {
        for p in slice.clone() {
            for x in 0..3 {
                half.slice_mut(s![p, .., atom, x])
                    .scaled_add(-1.0, &ipovlp.slice(s![x, p, ..]));
            }
        }
    }
    let grad = &half + &half.view().permuted_axes([1, 0, 2, 3]);
    grad
}

/// Groups eigenvalue indices by their values rounded to `decimals` decimal places, in order of
/// first appearance.
fn degenerate_groups(eigvals: &ArrayView1<f64>, decimals: i32) -> IndexMap<i64, Vec<usize>> {
    let scale = 10f64.powi(decimals);
    eigvals
        .iter()
        .enumerate()
        .fold(IndexMap::new(), |mut groups, (i, val)| {
            groups
                .entry((val * scale).round() as i64)
                .or_insert_with(Vec::new)
                .push(i);
            groups
        })
}

/// Symmetric unit perturbation $`\frac{1}{2}(\mathbf{e}_a\mathbf{e}_b^{\mathsf{T}} +
/// \mathbf{e}_b\mathbf{e}_a^{\mathsf{T}})`$ expressed in the basis of the columns of `vecs`.
fn projected_perturbation(vecs: &ArrayView2<f64>, a: usize, b: usize) -> Array2<f64> {
    let m = vecs.ncols();
    Array2::from_shape_fn((m, m), |(i, j)| {
        0.5 * (vecs[(a, i)] * vecs[(b, j)] + vecs[(b, i)] * vecs[(a, j)])
    })
}

/// Computes the derivative of $`\mathbf{S}^{-1/2}`$ along a single symmetric perturbation of
/// the overlap matrix by first-order perturbation theory, resolving degenerate eigenvalues by
/// diagonalising the perturbation within each degenerate eigenspace.
fn loewdin_directional_derivative(
    eigvals: &ArrayView1<f64>,
    eigvecs: &ArrayView2<f64>,
    groups: &IndexMap<i64, Vec<usize>>,
    degenerate: &Array2<bool>,
    (a, b): (usize, usize),
    thresh_null: f64,
) -> Result<Array2<f64>, anyhow::Error> {
    let n = eigvals.len();
    let mut vecs = eigvecs.to_owned();
    for ids in groups.values().filter(|ids| ids.len() > 1) {
        let subspace = eigvecs.select(Axis(1), ids);
        let (_, umat) = projected_perturbation(&subspace.view(), a, b)
            .eigh(UPLO::Lower)
            .map_err(|err| format_err!(err))?;
        let rotated = subspace.dot(&umat);
        for (k, id) in ids.iter().enumerate() {
            vecs.column_mut(*id).assign(&rotated.column(k));
        }
    }

    let vmat = projected_perturbation(&vecs.view(), a, b);
    let zmat = Array2::from_shape_fn((n, n), |(i, j)| {
        if degenerate[(i, j)] {
            0.0
        } else {
            vmat[(i, j)] / (eigvals[j] - eigvals[i])
        }
    });
    let dvecs = vecs.dot(&zmat);
    let dvals = vmat.diag();

    let t = eigvals.mapv(|v| if v > thresh_null { v.sqrt().recip() } else { 0.0 });
    let dt = Array1::from_iter(eigvals.iter().zip(dvals.iter()).map(|(v, dv)| {
        if *v > thresh_null {
            -0.5 * v.powf(-1.5) * dv
        } else {
            0.0
        }
    }));

    let t_row = t.view().insert_axis(Axis(0));
    let dt_row = dt.view().insert_axis(Axis(0));
    let dx = (&dvecs * &t_row).dot(&vecs.t())
        + (&vecs * &dt_row).dot(&vecs.t())
        + (&vecs * &t_row).dot(&dvecs.t());
    Ok(dx)
}

/// Computes the derivatives of the Löwdin transformation $`\mathbf{X} = \mathbf{S}^{-1/2}`$
/// with respect to the elements of the overlap matrix.
///
/// The derivative with respect to $`S_{ab}`$ is taken along the symmetric perturbation
/// $`\frac{1}{2}(\mathbf{e}_a\mathbf{e}_b^{\mathsf{T}} + \mathbf{e}_b\mathbf{e}_a^{\mathsf{T}})`$,
/// so that contracting the result with a symmetric change $`\delta\mathbf{S}`$ over both
/// indices $`a, b`$ gives the first-order change of $`\mathbf{X}`$. Perturbations are evaluated
/// in parallel.
///
/// # Arguments
///
/// * `sao` - The real-symmetric overlap matrix.
/// * `params` - Control parameters for degeneracy detection and null eigenvalues.
///
/// # Returns
///
/// The array of shape `(n, n, n, n)` whose element `[i, j, a, b]` is
/// $`\partial X_{ij} / \partial S_{ab}`$.
pub fn loewdin_trafo_grad(
    sao: &ArrayView2<f64>,
    params: &LoewdinGradientParams,
) -> Result<Array4<f64>, anyhow::Error> {
    ensure!(
        sao.is_square(),
        "The overlap matrix must be square, but has shape {:?}.",
        sao.shape()
    );
    let n = sao.nrows();
    let (eigvals, eigvecs) = sao.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
    let groups = degenerate_groups(&eigvals.view(), params.degeneracy_decimals);
    let mut degenerate = Array2::from_elem((n, n), false);
    for ids in groups.values() {
        for (i, j) in ids.iter().cartesian_product(ids.iter()) {
            degenerate[(*i, *j)] = true;
        }
    }
    log::debug!(
        "Löwdin derivative: {} distinct overlap eigenvalue(s) among {n}.",
        groups.len()
    );

    let perturbations = (0..n).cartesian_product(0..n).collect_vec();
    let derivatives = perturbations
        .par_iter()
        .map(|ab| {
            loewdin_directional_derivative(
                &eigvals.view(),
                &eigvecs.view(),
                &groups,
                &degenerate,
                *ab,
                params.thresh_null,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut grad = Array4::<f64>::zeros((n, n, n, n));
    for ((a, b), dx) in perturbations.into_iter().zip(derivatives.iter()) {
        grad.slice_mut(s![.., .., a, b]).assign(dx);
    }
    Ok(grad)
}

/// Computes the nuclear derivatives of the Löwdin transformation,
/// $`\partial X_{ij}/\partial R_{Ax} = \sum_{ab} (\partial X_{ij}/\partial S_{ab})
/// (\partial S_{ab}/\partial R_{Ax})`$.
///
/// # Arguments
///
/// * `sao` - The overlap matrix.
/// * `overlap_grad` - The overlap derivatives of shape `(nao, nao, natm, 3)` from
///   [`get_overlap_grad`].
/// * `params` - Control parameters for the Löwdin derivative.
///
/// # Returns
///
/// The array of shape `(nao, nao, natm, 3)`.
pub fn get_derivative_ao_mo_trafo(
    sao: &ArrayView2<f64>,
    overlap_grad: &ArrayView4<f64>,
    params: &LoewdinGradientParams,
) -> Result<Array4<f64>, anyhow::Error> {
    let n = sao.nrows();
    let (n0, n1, natm, ncomp) = overlap_grad.dim();
    ensure!(
        n0 == n && n1 == n && ncomp == 3,
        "Overlap derivatives of shape {:?} are inconsistent with an overlap matrix of shape {:?}.",
        overlap_grad.shape(),
        sao.shape()
    );
    let trafo_grad = loewdin_trafo_grad(sao, params)?
        .into_shape((n * n, n * n))
        .map_err(|err| format_err!(err))?;
    let overlap_grad_flat = overlap_grad
        .as_standard_layout()
        .into_owned()
        .into_shape((n * n, natm * 3))
        .map_err(|err| format_err!(err))?;
    trafo_grad
        .dot(&overlap_grad_flat)
        .into_shape((n, n, natm, 3))
        .map_err(|err| format_err!(err))
}
