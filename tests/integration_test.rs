use std::env;
use std::fs;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Array4, Array6};

use evcont::continuation::{ContinuationParams, RdmCompression, TrainingSet};
use evcont::drivers::continuation::{ContinuationDriver, ContinuationResult};
use evcont::drivers::EvcontDriver;
use evcont::integrals::OrthogonalIntegrals;
use evcont::interfaces::input::EvcontInput;
use evcont::interfaces::InputHandle;
use evcont::io::{read_evcont_yaml, write_evcont_binary, EvcontFileType};

/// Two closed-shell determinants, each doubly occupying one of two orthonormal orbitals.
fn closed_shell_training_set() -> TrainingSet {
    let overlap = Array2::<f64>::eye(2);
    let mut one_rdm = Array4::<f64>::zeros((2, 2, 2, 2));
    let mut two_rdm = Array6::<f64>::zeros((2, 2, 2, 2, 2, 2));
    for a in 0..2 {
        one_rdm[(a, a, a, a)] = 2.0;
        two_rdm[(a, a, a, a, a, a)] = 2.0;
    }
    TrainingSet::new(overlap, one_rdm, two_rdm).unwrap()
}

fn integrals() -> OrthogonalIntegrals {
    let mut h2 = Array4::<f64>::zeros((2, 2, 2, 2));
    h2[(0, 0, 0, 0)] = 0.6;
    h2[(1, 1, 1, 1)] = 0.4;
    h2[(0, 0, 1, 1)] = 0.3;
    h2[(1, 1, 0, 0)] = 0.3;
    OrthogonalIntegrals {
        h1: array![[-1.1, 0.2], [0.2, -0.5]],
        h2,
        enuc: 0.7,
    }
}

#[test]
fn test_continuation_driver_closed_shell_states() {
    let _ = env_logger::builder().is_test(true).try_init();
    let training_set = closed_shell_training_set();
    let integrals = integrals();
    let params = ContinuationParams::builder().nroots(2).build().unwrap();
    for compression in [
        RdmCompression::None,
        RdmCompression::Data,
        RdmCompression::Exchange,
        RdmCompression::DataAndExchange,
    ] {
        let mut driver = ContinuationDriver::builder()
            .parameters(&params)
            .training_set(&training_set)
            .integrals(&integrals)
            .compression(compression)
            .build()
            .unwrap();
        driver.run().unwrap();
        let result = driver.result().unwrap();

        // 2h₀₀ + g₀₀₀₀ + Eₙ and 2h₁₁ + g₁₁₁₁ + Eₙ.
        assert_abs_diff_eq!(result.energies[0], -0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(result.energies[1], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(result.coefficients[(0, 0)].abs(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.coefficients[(0, 1)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.coefficients[(1, 1)].abs(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_input_handle_from_binary_files() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = env::temp_dir().join("evcont_integration_test");
    fs::create_dir_all(&dir).unwrap();
    let trn_name = dir.join("closed_shell");
    let int_name = dir.join("closed_shell_new");
    let res_name = dir.join("closed_shell_result");
    write_evcont_binary(&trn_name, EvcontFileType::Trn, &closed_shell_training_set()).unwrap();
    write_evcont_binary(&int_name, EvcontFileType::Int, &integrals()).unwrap();

    let input = EvcontInput {
        training_set: trn_name.display().to_string(),
        integrals: int_name.display().to_string(),
        continuation: ContinuationParams::default(),
        compression: RdmCompression::DataAndExchange,
        result_save_name: Some(res_name.display().to_string()),
    };
    input.handle().unwrap();

    let result: ContinuationResult = read_evcont_yaml(res_name.with_extension("yml")).unwrap();
    assert_eq!(result.energies.len(), 1);
    assert_abs_diff_eq!(result.energies[0], -0.9, epsilon = 1e-12);
    fs::remove_dir_all(&dir).unwrap();
}
