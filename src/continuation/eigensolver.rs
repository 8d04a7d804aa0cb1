//! Generalised eigenvalue problems in the training subspace.

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Ix2};
use ndarray_einsum_beta::einsum;
use ndarray_linalg::{EigGeneralized, Eigh, GeneralizedEigenvalue, UPLO};

use crate::io::format::evcont_warn;

#[cfg(test)]
#[path = "eigensolver_tests.rs"]
mod eigensolver_tests;

/// Trait to solve the generalised eigenvalue equation for a pair of real square matrices
/// $`\mathbf{H}`$ and $`\mathbf{S}`$:
/// ```math
///     \mathbf{H} \mathbf{v} = \lambda \mathbf{S} \mathbf{v}.
/// ```
pub trait GeneralisedEigenvalueSolvable {
    /// Solves the generalised eigenvalue problem for a symmetric pair of matrices by canonical
    /// orthogonalisation of $`\mathbf{S}`$. Only the lower triangles of both matrices are read.
    ///
    /// If $`\mathbf{S}`$ is not of full rank with respect to `thresh_zeroov`, the problem is
    /// solved in the range of $`\mathbf{S}`$ and fewer eigenpairs than the matrix dimension are
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `thresh_zeroov` - Threshold for determining zero eigenvalues of $`\mathbf{S}`$.
    ///
    /// # Returns
    ///
    /// The eigenpairs sorted by ascending eigenvalue.
    fn solve_generalised_eigenvalue_problem_with_canonical_orthogonalisation(
        &self,
        thresh_zeroov: f64,
    ) -> Result<GeneralisedEigenvalueResult, anyhow::Error>;

    /// Solves the generalised eigenvalue problem for a general pair of matrices using LAPACK's
    /// `?ggev` generalised eigensolver.
    ///
    /// # Arguments
    ///
    /// * `thresh_zeroov` - Threshold on the denominators of the generalised eigenvalues, below
    ///   which eigenvalues are regarded as indeterminate and discarded.
    /// * `thresh_imag` - Eigenpairs whose eigenvalues have imaginary parts at or above this
    ///   threshold in magnitude are discarded.
    ///
    /// # Returns
    ///
    /// The eigenpairs with real eigenvalues sorted by ascending eigenvalue.
    fn solve_generalised_eigenvalue_problem_with_ggev(
        &self,
        thresh_zeroov: f64,
        thresh_imag: f64,
    ) -> Result<GeneralisedEigenvalueResult, anyhow::Error>;
}

/// Structure containing the eigenvalues and eigenvectors of a generalised eigenvalue problem.
///
/// The eigenvectors are stored as columns, normalised in the metric $`\mathbf{S}`$, with the
/// first non-negligible component of each eigenvector positive.
#[derive(Clone, Debug)]
pub struct GeneralisedEigenvalueResult {
    /// The resulting eigenvalues.
    eigenvalues: Array1<f64>,

    /// The corresponding eigenvectors.
    eigenvectors: Array2<f64>,
}

impl GeneralisedEigenvalueResult {
    /// Returns the eigenvalues.
    pub fn eigenvalues(&'_ self) -> ArrayView1<'_, f64> {
        self.eigenvalues.view()
    }

    /// Returns the eigenvectors.
    pub fn eigenvectors(&'_ self) -> ArrayView2<'_, f64> {
        self.eigenvectors.view()
    }

    /// Returns the number of eigenpairs.
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }
}

const THRESH_REGULARISE: f64 = 1e-12;

impl GeneralisedEigenvalueSolvable for (&ArrayView2<'_, f64>, &ArrayView2<'_, f64>) {
    fn solve_generalised_eigenvalue_problem_with_canonical_orthogonalisation(
        &self,
        thresh_zeroov: f64,
    ) -> Result<GeneralisedEigenvalueResult, anyhow::Error> {
        let (hmat, smat) = (mirror_lower_triangle(self.0)?, mirror_lower_triangle(self.1)?);
        ensure!(
            hmat.shape() == smat.shape(),
            "Inconsistent Hamiltonian ({:?}) and overlap ({:?}) matrix shapes.",
            hmat.shape(),
            smat.shape()
        );

        // S is real-symmetric, so U is orthogonal, i.e. U^T = U^(-1).
        let (s_eig, umat) = smat.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
        let nonzero_s_indices = s_eig
            .iter()
            .positions(|x| x.abs() > thresh_zeroov)
            .collect_vec();
        let nonzero_s_eig = s_eig.select(Axis(0), &nonzero_s_indices);
        ensure!(
            nonzero_s_eig.iter().all(|v| *v > 0.0),
            "The overlap matrix has negative eigenvalues {:+.3e} and cannot be orthogonalised over the reals.",
            nonzero_s_eig.iter().copied().fold(f64::INFINITY, f64::min)
        );
        let nullity = smat.nrows() - nonzero_s_indices.len();
        if nullity > 0 {
            evcont_warn!(
                "Overlap matrix of the training subspace has {nullity} eigenvalue(s) below {thresh_zeroov:.3e}; the corresponding direction(s) are discarded."
            );
        }
        let xmat = umat.select(Axis(1), &nonzero_s_indices)
            * nonzero_s_eig.mapv(|x| 1.0 / x.sqrt()).insert_axis(Axis(0));
        log::debug!("Canonical orthogonalisation X matrix:\n  {xmat:+.8e}");

        let hmat_t = xmat.t().dot(&hmat).dot(&xmat);
        log::debug!("Canonical-orthogonalised subspace Hamiltonian matrix H~:\n  {hmat_t:+.8e}");

        let (eigvals_t, eigvecs_t) = hmat_t.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
        let (eigvals_sorted, eigvecs_t_sorted) =
            sort_eigenvalues_eigenvectors(&eigvals_t.view(), &eigvecs_t.view());
        let eigvecs_sorted = xmat.dot(&eigvecs_t_sorted);

        let eigvecs_normalised = normalise_eigenvectors_real(&eigvecs_sorted.view(), &smat.view())?;
        let eigvecs_regularised =
            regularise_eigenvectors(&eigvecs_normalised.view(), THRESH_REGULARISE);

        Ok(GeneralisedEigenvalueResult {
            eigenvalues: eigvals_sorted,
            eigenvectors: eigvecs_regularised,
        })
    }

    fn solve_generalised_eigenvalue_problem_with_ggev(
        &self,
        thresh_zeroov: f64,
        thresh_imag: f64,
    ) -> Result<GeneralisedEigenvalueResult, anyhow::Error> {
        let (hmat, smat) = (self.0.to_owned(), self.1.to_owned());
        ensure!(
            hmat.is_square() && hmat.shape() == smat.shape(),
            "Inconsistent Hamiltonian ({:?}) and overlap ({:?}) matrix shapes.",
            hmat.shape(),
            smat.shape()
        );

        let (geneigvals, eigvecs) = (hmat, smat.clone())
            .eig_generalized(Some(thresh_zeroov))
            .map_err(|err| format_err!(err))?;

        // Keep finite eigenvalues with negligible imaginary parts
        let mut indices_re = geneigvals
            .iter()
            .enumerate()
            .filter_map(|(i, gv)| match gv {
                GeneralizedEigenvalue::Finite(v, _) if v.im.abs() < thresh_imag => Some((i, v.re)),
                _ => None,
            })
            .collect_vec();
        let ndiscarded = geneigvals.len() - indices_re.len();
        if ndiscarded > 0 {
            log::debug!(
                "{ndiscarded} indeterminate or complex generalised eigenvalue(s) discarded."
            );
        }
        indices_re.sort_by(|(_, a), (_, b)| a.total_cmp(b));

        let (indices, eigvals_sorted): (Vec<usize>, Vec<f64>) = indices_re.into_iter().unzip();
        let eigvecs_sorted = eigvecs.select(Axis(1), &indices).map(|v| v.re);

        let eigvecs_normalised = normalise_eigenvectors_real(&eigvecs_sorted.view(), &smat.view())?;
        let eigvecs_regularised =
            regularise_eigenvectors(&eigvecs_normalised.view(), THRESH_REGULARISE);

        Ok(GeneralisedEigenvalueResult {
            eigenvalues: Array1::from_vec(eigvals_sorted),
            eigenvectors: eigvecs_regularised,
        })
    }
}

// -------------------
// Auxiliary functions
// -------------------

/// Returns a symmetric matrix built from the lower triangle of `mat`.
pub(crate) fn mirror_lower_triangle(mat: &ArrayView2<f64>) -> Result<Array2<f64>, anyhow::Error> {
    ensure!(
        mat.is_square(),
        "Expected a square matrix, but got shape {:?}.",
        mat.shape()
    );
    let mut sym = mat.to_owned();
    for i in 0..sym.nrows() {
        for j in (i + 1)..sym.ncols() {
            sym[(i, j)] = sym[(j, i)];
        }
    }
    Ok(sym)
}

/// Sorts the eigenvalues in ascending order together with the corresponding eigenvectors.
fn sort_eigenvalues_eigenvectors(
    eigvals: &ArrayView1<f64>,
    eigvecs: &ArrayView2<f64>,
) -> (Array1<f64>, Array2<f64>) {
    let mut indices = (0..eigvals.len()).collect_vec();
    indices.sort_by(|i, j| eigvals[*i].total_cmp(&eigvals[*j]));
    let eigvals_sorted = eigvals.select(Axis(0), &indices);
    let eigvecs_sorted = eigvecs.select(Axis(1), &indices);
    (eigvals_sorted, eigvecs_sorted)
}

/// Regularises the eigenvectors such that the first entry of each of them exceeding `thresh` in
/// magnitude is positive.
fn regularise_eigenvectors(eigvecs: &ArrayView2<f64>, thresh: f64) -> Array2<f64> {
    let signs = eigvecs.map_axis(Axis(0), |col| {
        col.iter()
            .find(|v| v.abs() > thresh)
            .map(|v| v.signum())
            .unwrap_or(1.0)
    });
    eigvecs * &signs.insert_axis(Axis(0))
}

/// Normalises the real eigenvectors with respect to the metric `smat`.
fn normalise_eigenvectors_real(
    eigvecs: &ArrayView2<f64>,
    smat: &ArrayView2<f64>,
) -> Result<Array2<f64>, anyhow::Error> {
    let sq_norm = einsum("ji,jk,kl->il", &[eigvecs, smat, eigvecs])
        .map_err(|err| format_err!(err))?
        .into_dimensionality::<Ix2>()
        .map_err(|err| format_err!(err))?;
    ensure!(
        sq_norm.diag().iter().all(|v| *v > 0.0),
        "Some eigenvectors have non-positive squared norms and cannot be normalised over the reals."
    );
    let eigvecs_normalised = eigvecs / &sq_norm.diag().mapv(f64::sqrt).insert_axis(Axis(0));
    Ok(eigvecs_normalised)
}
