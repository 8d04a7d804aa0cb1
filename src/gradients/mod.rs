//! Analytic nuclear gradients of eigenvector-continuation energies.
//!
//! The continued Hamiltonian is built in the Löwdin-orthogonalised atomic-orbital basis
//! $`\mathbf{X} = \mathbf{S}^{-1/2}`$, whose nuclear dependence enters through the atomic-orbital
//! overlap. The training-state quantities are geometry independent, so the gradient of the
//! continued ground-state energy is the Hellmann–Feynman expression
//!
//! ```math
//!     \frac{\partial E}{\partial R} = \sum_{pq} \rho_{pq} \frac{\partial h_{pq}}{\partial R}
//!     + \frac{1}{2} \sum_{pqrs} P_{pqrs} \frac{\partial g_{pqrs}}{\partial R}
//!     + \frac{\partial E_{\mathrm{nuc}}}{\partial R},
//! ```
//!
//! where $`\rho`$ and $`P`$ are the one- and two-body densities of the continued state.

use anyhow::{self, ensure, format_err};
use ndarray::{Array2, ArrayView2, ArrayView4, Ix2};
use ndarray_einsum_beta::einsum;

use crate::auxiliary::molecule::Molecule;
use crate::continuation::{approximate_ground_state, ContinuationParams, TwoBodyRdm};
use crate::integrals::{get_loewdin_trafo, transform_integrals, IntegralProvider};
use crate::io::format::log_subtitle;

pub mod integral_derivatives;
pub mod loewdin;

pub use integral_derivatives::{
    get_one_el_grad, get_one_el_grad_ao, get_two_el_grad, get_two_el_grad_ao,
};
pub use loewdin::{
    get_derivative_ao_mo_trafo, get_overlap_grad, loewdin_trafo_grad, LoewdinGradientParams,
};

use integral_derivatives::flatten_nuclear_axes;


/// Computes the continued ground-state energy of a molecule together with its analytic nuclear
/// gradient.
///
/// # Arguments
///
/// * `provider` - The integral engine supplying atomic-orbital integrals and their derivatives.
/// * `mol` - The molecular geometry.
/// * `one_rdm` - The one-body transition density matrices of the training states, expressed in
///   the Löwdin-orthogonalised atomic-orbital frame, of shape `(Ntrn, Ntrn, n, n)`.
/// * `two_rdm` - The two-body transition density matrices in any storage layout.
/// * `overlap` - The training-state overlap matrix.
/// * `params` - Control parameters for the subspace eigenvalue problem.
/// * `grad_params` - Control parameters for the Löwdin derivative. Its null-eigenvalue threshold
///   must equal that of `params`.
///
/// # Returns
///
/// A tuple of the total energy and the `natm × 3` total energy gradient, both including the
/// nuclear repulsion contributions.
pub fn get_energy_with_grad<P: IntegralProvider + ?Sized>(
    provider: &P,
    mol: &Molecule,
    one_rdm: &ArrayView4<f64>,
    two_rdm: &TwoBodyRdm,
    overlap: &ArrayView2<f64>,
    params: &ContinuationParams,
    grad_params: &LoewdinGradientParams,
) -> Result<(f64, Array2<f64>), anyhow::Error> {
    log_subtitle("Continued energy and nuclear gradient");

    let ao = provider.ao_integrals(mol)?;
    let derivs = provider.ao_integral_derivatives(mol)?;
    ensure!(
        derivs.nao() == ao.nao() && derivs.natoms() == mol.natoms(),
        "Integral derivatives for {} AO(s) and {} atom(s) are inconsistent with {} AO(s) and {} atom(s).",
        derivs.nao(),
        derivs.natoms(),
        ao.nao(),
        mol.natoms()
    );
    ensure!(
        grad_params.thresh_null == params.thresh_null_loewdin,
        "The Löwdin null-eigenvalue threshold for gradients ({:.3e}) differs from that for energies ({:.3e}).",
        grad_params.thresh_null,
        params.thresh_null_loewdin
    );
    let natm = mol.natoms();
    let norb = ao.nao();

    let trafo = get_loewdin_trafo(&ao.sao(), grad_params.thresh_null)?;
    let overlap_grad = get_overlap_grad(&derivs);
    let trafo_grad = get_derivative_ao_mo_trafo(&ao.sao(), &overlap_grad.view(), grad_params)?;
    let (h1, h2) = transform_integrals(&ao.hcore(), &ao.eri(), &trafo.view())?;
    let h1_jac = get_one_el_grad(&ao, &derivs, &trafo.view(), &trafo_grad.view())?;
    let h2_jac = get_two_el_grad(&ao, &derivs, &trafo.view(), &trafo_grad.view())?;

    let (energy, coeffs) =
        approximate_ground_state(&h1.view(), &h2.view(), one_rdm, two_rdm, overlap, params)?;

    let one_density = einsum("a,b,abpq->pq", &[&coeffs, &coeffs, one_rdm])
        .map_err(|err| format_err!(err))?
        .into_dimensionality::<Ix2>()?;
    let two_density = two_rdm.predicted_density(&coeffs.view())?;

    let one_density_flat = one_density
        .as_standard_layout()
        .into_owned()
        .into_shape(norb * norb)?;
    let two_density_flat = two_density
        .as_standard_layout()
        .into_owned()
        .into_shape(norb.pow(4))?;
    let jac_flat = one_density_flat.dot(&flatten_nuclear_axes(&h1_jac.view())?)
        + 0.5 * two_density_flat.dot(&flatten_nuclear_axes(&h2_jac.view())?);
    let jac = jac_flat.into_shape((natm, 3))? + mol.grad_nuc();

    let total_energy = energy + mol.energy_nuc();
    log::debug!("Continued total energy: {total_energy:+.12}");
    log::debug!("Continued total energy gradient:\n{jac:+.8e}");
    Ok((total_energy, jac))
}
