use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Array4};
use ndarray_linalg::close_l2;
use rand::Rng;

use crate::integrals::transform::{
    get_loewdin_trafo, transform_integrals, transform_one_body, transform_two_body,
    LOEWDIN_THRESH_NULL,
};
use crate::testing::{random_eightfold_symmetric, random_symmetric_matrix, rng};

#[test]
fn test_transform_loewdin_orthonormalises() {
    let sao = array![[1.0, 0.4, 0.1], [0.4, 1.0, 0.3], [0.1, 0.3, 1.0]];
    let xmat = get_loewdin_trafo(&sao.view(), LOEWDIN_THRESH_NULL).unwrap();
    close_l2(&xmat, &xmat.t(), 1e-12);
    close_l2(&xmat.t().dot(&sao).dot(&xmat), &Array2::<f64>::eye(3), 1e-12);

    assert!(get_loewdin_trafo(&Array2::<f64>::zeros((2, 3)).view(), LOEWDIN_THRESH_NULL).is_err());
}

#[test]
fn test_transform_loewdin_singular_overlap() {
    // Two identical functions and one distinct one
    let sao = array![[1.0, 1.0, 0.2], [1.0, 1.0, 0.2], [0.2, 0.2, 1.0]];
    let xmat = get_loewdin_trafo(&sao.view(), 1e-10).unwrap();
    let proj = xmat.t().dot(&sao).dot(&xmat);

    // The result is a rank-two orthogonal projector.
    close_l2(&proj.dot(&proj), &proj, 1e-10);
    assert_abs_diff_eq!(proj.diag().sum(), 2.0, epsilon = 1e-10);
}

#[test]
fn test_transform_two_body_explicit() {
    let mut r = rng(61);
    let (n, m) = (3, 2);
    let h2 = random_eightfold_symmetric(n, &mut r);
    let coeffs = (0..4)
        .map(|_| Array2::from_shape_fn((n, m), |_| r.gen_range(-1.0..1.0)))
        .collect::<Vec<_>>();
    let views = coeffs.iter().map(|c| c.view()).collect::<Vec<_>>();
    let transformed =
        transform_two_body(&h2.view(), [&views[0], &views[1], &views[2], &views[3]]).unwrap();
    assert_eq!(transformed.shape(), &[m, m, m, m]);

    let mut reference = Array4::<f64>::zeros((m, m, m, m));
    for ((p, q, rr, s), value) in reference.indexed_iter_mut() {
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    for d in 0..n {
                        *value += h2[(a, b, c, d)]
                            * coeffs[0][(a, p)]
                            * coeffs[1][(b, q)]
                            * coeffs[2][(c, rr)]
                            * coeffs[3][(d, s)];
                    }
                }
            }
        }
    }
    close_l2(&transformed, &reference, 1e-12);

    let wrong = Array2::<f64>::zeros((2, 2));
    assert!(transform_two_body(&h2.view(), [&wrong.view(), &views[1], &views[2], &views[3]]).is_err());
}

#[test]
fn test_transform_integrals_orthogonal_invariants() {
    let mut r = rng(67);
    let h1 = random_symmetric_matrix(3, &mut r);
    let h2 = random_eightfold_symmetric(3, &mut r);

    // Permutations of the basis permute the integrals.
    let perm = array![[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]];
    let (h1_p, h2_p) = transform_integrals(&h1.view(), &h2.view(), &perm.view()).unwrap();
    assert_abs_diff_eq!(h1_p[(0, 1)], h1[(2, 0)], epsilon = 1e-14);
    assert_abs_diff_eq!(h2_p[(0, 1, 2, 0)], h2[(2, 0, 1, 2)], epsilon = 1e-14);
    close_l2(&h1_p, &transform_one_body(&h1.view(), &perm.view()), 1e-14);

    // Traces are invariant under orthogonal transformations.
    let (h1_i, h2_i) =
        transform_integrals(&h1.view(), &h2.view(), &Array2::<f64>::eye(3).view()).unwrap();
    close_l2(&h1_i, &h1, 1e-14);
    close_l2(&h2_i, &h2, 1e-14);
    assert_abs_diff_eq!(h1_p.diag().sum(), h1.diag().sum(), epsilon = 1e-12);

    let wrong = Array2::<f64>::eye(2);
    assert!(transform_integrals(&h1.view(), &h2.view(), &wrong.view()).is_err());
}
