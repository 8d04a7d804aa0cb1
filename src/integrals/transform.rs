//! Orthogonalisation and basis transformation of Hamiltonian integrals.

use anyhow::{self, ensure, format_err};
use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis};
use ndarray_linalg::{Eigh, UPLO};

#[cfg(test)]
#[path = "transform_tests.rs"]
mod transform_tests;

/// Eigenvalues of the atomic-orbital overlap matrix at or below this value are treated as zero in
/// the Löwdin transformation.
pub const LOEWDIN_THRESH_NULL: f64 = 1e-15;

/// Computes the Löwdin symmetric orthogonalisation matrix $`\mathbf{S}^{-1/2}`$.
///
/// # Arguments
///
/// * `sao` - The real-symmetric atomic-orbital overlap matrix.
/// * `thresh_null` - Eigenvalues of `sao` at or below this threshold are dropped, so that the
///   result is the pseudo-inverse square root on the numerical range of `sao`.
///
/// # Returns
///
/// The Löwdin transformation matrix whose columns are the orthogonalised atomic orbitals.
pub fn get_loewdin_trafo(
    sao: &ArrayView2<f64>,
    thresh_null: f64,
) -> Result<Array2<f64>, anyhow::Error> {
    ensure!(
        sao.is_square(),
        "The overlap matrix must be square, but has shape {:?}.",
        sao.shape()
    );
    let (s_eig, umat) = sao.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
    let s_invsqrt = s_eig.mapv(|v| if v > thresh_null { 1.0 / v.sqrt() } else { 0.0 });
    let nzeros = s_invsqrt.iter().filter(|v| **v == 0.0).count();
    if nzeros > 0 {
        log::debug!(
            "Löwdin orthogonalisation: {nzeros} overlap eigenvalue(s) below {thresh_null:.3e} dropped."
        );
    }
    let umat_scaled = &umat * &s_invsqrt.view().insert_axis(Axis(0));
    Ok(umat_scaled.dot(&umat.t()))
}

/// Transforms a one-electron integral matrix into a new orbital basis,
/// $`\mathbf{C}^{\mathsf{T}} \mathbf{h} \mathbf{C}`$.
pub fn transform_one_body(h1: &ArrayView2<f64>, coeff: &ArrayView2<f64>) -> Array2<f64> {
    coeff.t().dot(h1).dot(coeff)
}

/// Contracts the leading index of a four-index tensor with a coefficient matrix and cycles the
/// new index to the end, *i.e.* $`T_{bcdp} = \sum_a A_{abcd} C_{ap}`$.
fn quarter_transform(
    tensor: &ArrayView4<f64>,
    coeff: &ArrayView2<f64>,
) -> Result<Array4<f64>, anyhow::Error> {
    let (n0, n1, n2, n3) = tensor.dim();
    ensure!(
        coeff.nrows() == n0,
        "Coefficient matrix with {} rows cannot transform a tensor index of dimension {n0}.",
        coeff.nrows()
    );
    let flat = tensor
        .as_standard_layout()
        .into_owned()
        .into_shape((n0, n1 * n2 * n3))?;
    let rotated = flat.t().dot(coeff);
    let rotated = rotated
        .as_standard_layout()
        .into_owned()
        .into_shape((n1, n2, n3, coeff.ncols()))?;
    Ok(rotated)
}

/// Transforms a four-index tensor with a separate coefficient matrix for every index,
///
/// ```math
///     T_{pqrs} = \sum_{abcd} A_{abcd} C^{(1)}_{ap} C^{(2)}_{bq} C^{(3)}_{cr} C^{(4)}_{ds},
/// ```
///
/// by four successive quarter transformations.
pub fn transform_two_body(
    h2: &ArrayView4<f64>,
    coeffs: [&ArrayView2<f64>; 4],
) -> Result<Array4<f64>, anyhow::Error> {
    let t1 = quarter_transform(h2, coeffs[0])?;
    let t2 = quarter_transform(&t1.view(), coeffs[1])?;
    let t3 = quarter_transform(&t2.view(), coeffs[2])?;
    quarter_transform(&t3.view(), coeffs[3])
}

/// Transforms one- and two-electron integrals into the orbital basis given by the columns of
/// `coeff`.
///
/// # Returns
///
/// A tuple of the transformed one-electron matrix and the transformed two-electron tensor.
pub fn transform_integrals(
    h1: &ArrayView2<f64>,
    h2: &ArrayView4<f64>,
    coeff: &ArrayView2<f64>,
) -> Result<(Array2<f64>, Array4<f64>), anyhow::Error> {
    ensure!(
        h1.is_square() && h1.nrows() == coeff.nrows(),
        "Inconsistent one-electron integral shape {:?} for a coefficient matrix of shape {:?}.",
        h1.shape(),
        coeff.shape()
    );
    let h1_t = transform_one_body(h1, coeff);
    let h2_t = transform_two_body(h2, [coeff, coeff, coeff, coeff])?;
    Ok((h1_t, h2_t))
}
