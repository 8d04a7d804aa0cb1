use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array2, Array4};
use ndarray_linalg::close_l2;

use crate::gradients::loewdin::{
    get_derivative_ao_mo_trafo, get_overlap_grad, loewdin_trafo_grad, LoewdinGradientParams,
};
use crate::integrals::{get_loewdin_trafo, IntegralProvider, LOEWDIN_THRESH_NULL};
use crate::testing::{hydrogen_chain, SphericalGaussianModel};

const STEP: f64 = 1e-5;

fn symmetric_unit(n: usize, a: usize, b: usize) -> Array2<f64> {
    let mut vmat = Array2::<f64>::zeros((n, n));
    vmat[(a, b)] += 0.5;
    vmat[(b, a)] += 0.5;
    vmat
}

/// Central finite-difference derivatives of `S^{-1/2}` along every symmetric unit perturbation.
fn finite_difference_loewdin_grad(sao: &Array2<f64>) -> Array4<f64> {
    let n = sao.nrows();
    let mut grad = Array4::<f64>::zeros((n, n, n, n));
    for a in 0..n {
        for b in 0..n {
            let vmat = symmetric_unit(n, a, b);
            let plus = get_loewdin_trafo(&(sao + &(&vmat * STEP)).view(), LOEWDIN_THRESH_NULL)
                .unwrap();
            let minus = get_loewdin_trafo(&(sao - &(&vmat * STEP)).view(), LOEWDIN_THRESH_NULL)
                .unwrap();
            grad.slice_mut(s![.., .., a, b])
                .assign(&((plus - minus) / (2.0 * STEP)));
        }
    }
    grad
}

#[test]
fn test_loewdin_grad_params_defaults() {
    let params = LoewdinGradientParams::default();
    assert_eq!(params.degeneracy_decimals, 5);
    assert_abs_diff_eq!(params.thresh_null, 1e-15);

    let from_yaml: LoewdinGradientParams =
        serde_yaml::from_str("degeneracy_decimals: 8\n").unwrap();
    assert_eq!(from_yaml.degeneracy_decimals, 8);
    assert_abs_diff_eq!(from_yaml.thresh_null, 1e-15);
}

#[test]
fn test_loewdin_grad_nondegenerate_2x2() {
    let sao = array![[1.0, 0.3], [0.3, 0.8]];
    let grad = loewdin_trafo_grad(&sao.view(), &LoewdinGradientParams::default()).unwrap();
    assert_eq!(grad.shape(), &[2, 2, 2, 2]);
    close_l2(&grad, &finite_difference_loewdin_grad(&sao), 1e-7);

    // Symmetric perturbations make the derivative symmetric in the perturbed indices.
    close_l2(&grad.slice(s![.., .., 0, 1]), &grad.slice(s![.., .., 1, 0]), 1e-12);
}

#[test]
fn test_loewdin_grad_identity_overlap() {
    // Fully degenerate: d(S^{-1/2}) = -V/2 at S = I.
    let sao = Array2::<f64>::eye(2);
    let grad = loewdin_trafo_grad(&sao.view(), &LoewdinGradientParams::default()).unwrap();
    for a in 0..2 {
        for b in 0..2 {
            close_l2(
                &grad.slice(s![.., .., a, b]),
                &(symmetric_unit(2, a, b) * -0.5),
                1e-12,
            );
        }
    }
    close_l2(&grad, &finite_difference_loewdin_grad(&sao), 1e-7);
}

#[test]
fn test_loewdin_grad_partially_degenerate_3x3() {
    // Householder reflection for u = (1, 2, 2)
    #[rustfmt::skip]
    let qmat = array![
        [ 7.0, -4.0, -4.0],
        [-4.0,  1.0, -8.0],
        [-4.0, -8.0,  1.0],
    ] / 9.0;
    let sao = qmat.dot(&Array2::from_diag(&array![1.2, 0.8, 0.8])).dot(&qmat.t());
    let grad = loewdin_trafo_grad(&sao.view(), &LoewdinGradientParams::default()).unwrap();
    close_l2(&grad, &finite_difference_loewdin_grad(&sao), 1e-6);
}

#[test]
fn test_loewdin_grad_rejects_non_square() {
    let sao = Array2::<f64>::zeros((2, 3));
    assert!(loewdin_trafo_grad(&sao.view(), &LoewdinGradientParams::default()).is_err());
}

#[test]
fn test_overlap_grad_finite_difference() {
    let provider = SphericalGaussianModel::default();
    let mol = hydrogen_chain(&[[0.0, 0.0, 0.0], [1.4, 0.1, 0.0], [0.3, 1.2, 0.2]]);
    let derivs = provider.ao_integral_derivatives(&mol).unwrap();
    let overlap_grad = get_overlap_grad(&derivs);
    assert_eq!(overlap_grad.shape(), &[6, 6, 3, 3]);

    for atom in 0..3 {
        for x in 0..3 {
            let plus = provider
                .ao_integrals(&mol.displaced(atom, x, STEP).unwrap())
                .unwrap();
            let minus = provider
                .ao_integrals(&mol.displaced(atom, x, -STEP).unwrap())
                .unwrap();
            let fd = (&plus.sao() - &minus.sao()) / (2.0 * STEP);
            close_l2(&overlap_grad.slice(s![.., .., atom, x]), &fd, 1e-7);
        }
    }
}

#[test]
fn test_derivative_ao_mo_trafo_finite_difference() {
    let provider = SphericalGaussianModel::default();
    let mol = hydrogen_chain(&[[0.0, 0.0, 0.0], [1.4, 0.1, 0.0], [0.3, 1.2, 0.2]]);
    let ao = provider.ao_integrals(&mol).unwrap();
    let derivs = provider.ao_integral_derivatives(&mol).unwrap();
    let trafo_grad = get_derivative_ao_mo_trafo(
        &ao.sao(),
        &get_overlap_grad(&derivs).view(),
        &LoewdinGradientParams::default(),
    )
    .unwrap();
    assert_eq!(trafo_grad.shape(), &[6, 6, 3, 3]);

    for atom in 0..3 {
        for x in 0..3 {
            let trafo_at = |delta: f64| {
                let ao_disp = provider
                    .ao_integrals(&mol.displaced(atom, x, delta).unwrap())
                    .unwrap();
                get_loewdin_trafo(&ao_disp.sao(), LOEWDIN_THRESH_NULL).unwrap()
            };
            let fd = (trafo_at(STEP) - trafo_at(-STEP)) / (2.0 * STEP);
            close_l2(&trafo_grad.slice(s![.., .., atom, x]), &fd, 1e-6);
        }
    }

    let wrong = Array4::<f64>::zeros((5, 6, 3, 3));
    assert!(get_derivative_ao_mo_trafo(
        &ao.sao(),
        &wrong.view(),
        &LoewdinGradientParams::default()
    )
    .is_err());
}
