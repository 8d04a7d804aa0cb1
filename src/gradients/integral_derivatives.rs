//! Nuclear derivatives of one- and two-electron integrals in the atomic-orbital and the
//! Löwdin-orthogonalised bases.

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use ndarray::{s, Array2, Array4, Array6, ArrayView, ArrayView2, ArrayView4, Dimension};
use rayon::prelude::*;

use crate::integrals::transform::{transform_one_body, transform_two_body};
use crate::integrals::{AoIntegralDerivatives, AoIntegrals};

#[cfg(test)]
#[path = "integral_derivatives_tests.rs"]
mod integral_derivatives_tests;

/// Checks that a transformation derivative is consistent with its transformation matrix and
/// returns the number of atoms.
fn trafo_grad_natoms(
    trafo: &ArrayView2<f64>,
    trafo_grad: &ArrayView4<f64>,
    nao: usize,
) -> Result<usize, anyhow::Error> {
    let (n0, n1, natm, ncomp) = trafo_grad.dim();
    ensure!(
        trafo.nrows() == nao,
        "The transformation has {} rows, but {nao} AOs are present.",
        trafo.nrows()
    );
    ensure!(
        n0 == trafo.nrows() && n1 == trafo.ncols() && ncomp == 3,
        "Transformation derivatives of shape {:?} are inconsistent with a transformation of shape {:?}.",
        trafo_grad.shape(),
        trafo.shape()
    );
    Ok(natm)
}

/// Rearranges the core Hamiltonian derivatives into shape `(nao, nao, natm, 3)`.
pub fn get_one_el_grad_ao(derivs: &AoIntegralDerivatives) -> Array4<f64> {
    derivs
        .hcore_derivs()
        .view()
        .permuted_axes([2, 3, 0, 1])
        .as_standard_layout()
        .into_owned()
}

/// Computes the nuclear derivatives of the one-electron integrals in the basis given by the
/// columns of `trafo`,
///
/// ```math
///     \frac{\partial h'}{\partial R} = \frac{\partial \mathbf{X}^{\mathsf{T}}}{\partial R}
///     \mathbf{h} \mathbf{X} + \mathbf{X}^{\mathsf{T}} \mathbf{h}
///     \frac{\partial \mathbf{X}}{\partial R} + \mathbf{X}^{\mathsf{T}}
///     \frac{\partial \mathbf{h}}{\partial R} \mathbf{X}.
/// ```
///
/// # Arguments
///
/// * `ao` - The atomic-orbital integrals.
/// * `derivs` - The atomic-orbital integral derivatives.
/// * `trafo` - The transformation matrix $`\mathbf{X}`$.
/// * `trafo_grad` - The nuclear derivatives of `trafo`, of shape `(nao, norb, natm, 3)`.
///
/// # Returns
///
/// The derivatives of shape `(norb, norb, natm, 3)`.
pub fn get_one_el_grad(
    ao: &AoIntegrals,
    derivs: &AoIntegralDerivatives,
    trafo: &ArrayView2<f64>,
    trafo_grad: &ArrayView4<f64>,
) -> Result<Array4<f64>, anyhow::Error> {
    let natm = trafo_grad_natoms(trafo, trafo_grad, ao.nao())?;
    ensure!(
        natm == derivs.natoms(),
        "Transformation derivatives are given for {natm} atom(s), but integral derivatives for {}.",
        derivs.natoms()
    );
    let norb = trafo.ncols();
    let hcore = ao.hcore();
    let hcore_grad = get_one_el_grad_ao(derivs);

    let components = (0..natm).cartesian_product(0..3).collect_vec();
    let grads = components
        .par_iter()
        .map(|(atom, x)| {
            let dtrafo: ArrayView2<f64> = trafo_grad.slice(s![.., .., *atom, *x]);
            let half = dtrafo.t().dot(&hcore).dot(trafo);
            &half
                + &half.t()
                + transform_one_body(&hcore_grad.slice(s![.., .., *atom, *x]), trafo)
        })
        .collect::<Vec<Array2<f64>>>();

    let mut grad = Array4::<f64>::zeros((norb, norb, natm, 3));
    for ((atom, x), dh) in components.into_iter().zip(grads.iter()) {
        grad.slice_mut(s![.., .., atom, x]).assign(dh);
    }
    Ok(grad)
}

/// Assembles the nuclear derivatives of the atomic-orbital electron-repulsion integrals from
/// the bra-differentiated integrals using the permutational symmetry of real integrals.
///
/// # Returns
///
/// The derivatives of shape `(nao, nao, nao, nao, natm, 3)`.
pub fn get_two_el_grad_ao(derivs: &AoIntegralDerivatives) -> Array6<f64> {
    let nao = derivs.nao();
    let natm = derivs.natoms();
    let ip1 = derivs.ip1_eri();
    let mut half = Array6::<f64>::zeros((nao, nao, nao, nao, natm, 3));
    for (atom, slice) in derivs.ao_slices().iter().enumerate() {
        for x in 0..3 {
            half.slice_mut(s![slice.clone(), .., .., .., atom, x])
                .scaled_add(-1.0, &ip1.slice(s![x, slice.clone(), .., .., ..]));
        }
    }
    let view = half.view();
    let grad = &view
        + &view.permuted_axes([1, 0, 3, 2, 4, 5])
        + &view.permuted_axes([2, 3, 0, 1, 4, 5])
        + &view.permuted_axes([3, 2, 1, 0, 4, 5]);
    grad
}

/// Computes the nuclear derivatives of the two-electron integrals in the basis given by the
/// columns of `trafo`: the atomic-orbital derivatives transformed by $`\mathbf{X}`$, plus the
/// four terms in which one index is transformed by $`\partial\mathbf{X}/\partial R`$.
///
/// # Returns
///
/// The derivatives of shape `(norb, norb, norb, norb, natm, 3)`.
pub fn get_two_el_grad(
    ao: &AoIntegrals,
    derivs: &AoIntegralDerivatives,
    trafo: &ArrayView2<f64>,
    trafo_grad: &ArrayView4<f64>,
) -> Result<Array6<f64>, anyhow::Error> {
    let natm = trafo_grad_natoms(trafo, trafo_grad, ao.nao())?;
    ensure!(
        natm == derivs.natoms(),
        "Transformation derivatives are given for {natm} atom(s), but integral derivatives for {}.",
        derivs.natoms()
    );
    let norb = trafo.ncols();
    let eri = ao.eri();
    let eri_grad = get_two_el_grad_ao(derivs);

    let components = (0..natm).cartesian_product(0..3).collect_vec();
    let grads = components
        .par_iter()
        .map(|(atom, x)| {
            let trafo = &trafo.view();
            let dtrafo = trafo_grad.slice(s![.., .., *atom, *x]);
            let eri_grad_c = eri_grad.slice(s![.., .., .., .., *atom, *x]);
            [
                transform_two_body(&eri, [&dtrafo, trafo, trafo, trafo]),
                transform_two_body(&eri, [trafo, &dtrafo, trafo, trafo]),
                transform_two_body(&eri, [trafo, trafo, &dtrafo, trafo]),
                transform_two_body(&eri, [trafo, trafo, trafo, &dtrafo]),
                transform_two_body(&eri_grad_c, [trafo, trafo, trafo, trafo]),
            ]
            .into_iter()
            .try_fold(Array4::<f64>::zeros((norb, norb, norb, norb)), |acc, term| {
                term.map(|t| acc + t)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut grad = Array6::<f64>::zeros((norb, norb, norb, norb, natm, 3));
    for ((atom, x), dh) in components.into_iter().zip(grads.iter()) {
        grad.slice_mut(s![.., .., .., .., atom, x]).assign(dh);
    }
    Ok(grad)
}

/// Flattens a derivative tensor whose trailing axes are `(natm, 3)` into a matrix with one
/// column per nuclear coordinate.
pub(crate) fn flatten_nuclear_axes<D: Dimension>(
    grad: &ArrayView<f64, D>,
) -> Result<Array2<f64>, anyhow::Error> {
    let ndim = grad.ndim();
    ensure!(
        ndim >= 2 && grad.shape()[ndim - 1] == 3,
        "A derivative tensor with trailing axes `(natm, 3)` is required, got shape {:?}.",
        grad.shape()
    );
    let ncoords = grad.shape()[ndim - 2] * 3;
    let nrows = grad.len() / ncoords.max(1);
    grad.as_standard_layout()
        .into_owned()
        .into_shape((nrows, ncoords))
        .map_err(|err| format_err!(err))
}
