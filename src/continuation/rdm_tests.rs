use approx::assert_abs_diff_eq;
use ndarray::{s, Array1, Array2, Array4, ArrayD, IxDyn};
use ndarray_linalg::close_l2;

use crate::continuation::rdm::{RdmCompression, TwoBodyContraction, TwoBodyRdm};
use crate::integrals::compression::tril_indices;
use crate::testing::{random_eightfold_symmetric, random_training_data, rng};

const COMPRESSIONS: [RdmCompression; 4] = [
    RdmCompression::None,
    RdmCompression::Data,
    RdmCompression::Exchange,
    RdmCompression::DataAndExchange,
];

#[test]
fn test_rdm_layout_shapes() {
    let mut r = rng(7);
    let (_, _, two_rdm) = random_training_data(3, 2, &mut r);
    let expected_shapes: [&[usize]; 4] = [&[3, 3, 2, 2, 2, 2], &[6, 2, 2, 2, 2], &[3, 3, 10], &[6, 10]];
    for (compression, shape) in COMPRESSIONS.iter().zip(expected_shapes) {
        let rdm = TwoBodyRdm::compress(&two_rdm.view(), *compression).unwrap();
        assert_eq!(rdm.shape(), shape);
        assert_eq!(rdm.compression(), *compression);
        assert_eq!(rdm.dims().unwrap(), (3, 2));
    }
}

#[test]
fn test_rdm_try_from_rank_dispatch() {
    let mut r = rng(11);
    let (_, _, two_rdm) = random_training_data(2, 3, &mut r);
    for compression in COMPRESSIONS {
        let rdm = TwoBodyRdm::compress(&two_rdm.view(), compression).unwrap();
        let dyn_arr = match &rdm {
            TwoBodyRdm::Full(arr) => arr.clone().into_dyn(),
            TwoBodyRdm::DataPacked(arr) => arr.clone().into_dyn(),
            TwoBodyRdm::ExchangePacked(arr) => arr.clone().into_dyn(),
            TwoBodyRdm::BothPacked(arr) => arr.clone().into_dyn(),
        };
        let recovered = TwoBodyRdm::try_from(dyn_arr).unwrap();
        assert_eq!(recovered.compression(), compression);
        assert_eq!(recovered.dims().unwrap(), (2, 3));
    }

    // Unsupported ranks
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[2, 2, 2, 2]))).is_err());
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[4]))).is_err());

    // Supported ranks with inconsistent shapes
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[2, 3, 2, 2, 2, 2]))).is_err());
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[4, 2, 2, 2, 2]))).is_err());
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[2, 2, 11]))).is_err());
    assert!(TwoBodyRdm::try_from(ArrayD::<f64>::zeros(IxDyn(&[3, 9]))).is_err());
}

#[test]
fn test_rdm_contract_two_electron_all_layouts() {
    let mut r = rng(3);
    let (ntrain, norb) = (3, 3);
    let (_, _, two_rdm) = random_training_data(ntrain, norb, &mut r);
    let h2 = random_eightfold_symmetric(norb, &mut r);

    let reference = Array2::from_shape_fn((ntrain, ntrain), |(a, b)| {
        0.5 * (&two_rdm.slice(s![a, b, .., .., .., ..]) * &h2).sum()
    });

    for compression in COMPRESSIONS {
        let rdm = TwoBodyRdm::compress(&two_rdm.view(), compression).unwrap();
        match rdm.contract_two_electron(&h2.view()).unwrap() {
            TwoBodyContraction::Square(values) => {
                assert!(matches!(
                    compression,
                    RdmCompression::None | RdmCompression::Exchange
                ));
                close_l2(&values, &reference, 1e-12);
            }
            TwoBodyContraction::LowerTriangle(values) => {
                assert!(matches!(
                    compression,
                    RdmCompression::Data | RdmCompression::DataAndExchange
                ));
                let reference_tril = tril_indices(ntrain)
                    .into_iter()
                    .map(|(a, b)| reference[(a, b)])
                    .collect::<Array1<_>>();
                close_l2(&values, &reference_tril, 1e-12);
            }
        }
    }

    let rdm = TwoBodyRdm::compress(&two_rdm.view(), RdmCompression::None).unwrap();
    let h2_wrong = Array4::<f64>::zeros((2, 2, 2, 2));
    assert!(rdm.contract_two_electron(&h2_wrong.view()).is_err());
}

#[test]
fn test_rdm_predicted_density_all_layouts() {
    let mut r = rng(5);
    let (ntrain, norb) = (3, 2);
    let (_, _, two_rdm) = random_training_data(ntrain, norb, &mut r);
    let coeffs = Array1::from_vec(vec![0.7, -0.4, 0.2]);

    let mut reference = Array4::<f64>::zeros((norb, norb, norb, norb));
    for a in 0..ntrain {
        for b in 0..ntrain {
            reference.scaled_add(
                coeffs[a] * coeffs[b],
                &two_rdm.slice(s![a, b, .., .., .., ..]),
            );
        }
    }

    for compression in COMPRESSIONS {
        let rdm = TwoBodyRdm::compress(&two_rdm.view(), compression).unwrap();
        let density = rdm.predicted_density(&coeffs.view()).unwrap();
        close_l2(&density, &reference, 1e-12);
    }

    let rdm = TwoBodyRdm::compress(&two_rdm.view(), RdmCompression::Data).unwrap();
    assert!(rdm
        .predicted_density(&Array1::<f64>::zeros(2).view())
        .is_err());
}

#[test]
fn test_rdm_data_packing_keeps_lower_triangle() {
    let mut r = rng(13);
    let (_, _, two_rdm) = random_training_data(3, 2, &mut r);
    let rdm = TwoBodyRdm::compress(&two_rdm.view(), RdmCompression::Data).unwrap();
    let TwoBodyRdm::DataPacked(packed) = rdm else {
        panic!("Unexpected layout.");
    };
    for (k, (a, b)) in tril_indices(3).into_iter().enumerate() {
        assert!(a >= b);
        assert_eq!(
            packed.slice(s![k, .., .., .., ..]),
            two_rdm.slice(s![a, b, .., .., .., ..])
        );
    }
    assert_abs_diff_eq!(
        packed.slice(s![1, .., .., .., ..]).sum(),
        two_rdm.slice(s![1, 0, .., .., .., ..]).sum(),
        epsilon = 1e-14
    );
}
