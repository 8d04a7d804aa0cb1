//! Driver for eigenvector continuation to a new geometry.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::continuation::{approximate_multistate, ContinuationParams, RdmCompression, TrainingSet};
use crate::drivers::EvcontDriver;
use crate::integrals::OrthogonalIntegrals;
use crate::io::format::{evcont_output, log_subtitle, log_title, EvcontOutput};


// ==================
// Struct definitions
// ==================

// ------
// Result
// ------

/// A structure to contain eigenvector-continuation results.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct ContinuationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: ContinuationParams,

    /// The layout in which the two-body transition density matrices were contracted.
    pub compression: RdmCompression,

    /// The approximate total energies in ascending order, including the nuclear repulsion
    /// energy.
    pub energies: Array1<f64>,

    /// The subspace coefficient vectors as rows, in the same order as [`Self::energies`].
    pub coefficients: Array2<f64>,
}

impl ContinuationResult {
    /// Returns a builder to construct a new [`ContinuationResult`] structure.
    pub fn builder() -> ContinuationResultBuilder {
        ContinuationResultBuilder::default()
    }
}

impl fmt::Display for ContinuationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ntrain = self.coefficients.ncols();
        let width = ntrain.max(1).ilog10() as usize + 2;
        writeln!(f, "{}", "┈".repeat(width + 22 + 12 * ntrain.min(6)))?;
        writeln!(
            f,
            "{:>width$} {:>20}  {}",
            "#",
            "Energy (Eₕ)",
            "Leading coefficients"
        )?;
        writeln!(f, "{}", "┈".repeat(width + 22 + 12 * ntrain.min(6)))?;
        for (i, (energy, coeffs)) in self
            .energies
            .iter()
            .zip(self.coefficients.rows())
            .enumerate()
        {
            writeln!(
                f,
                "{:>width$} {:>+20.12}  {}",
                i,
                energy,
                coeffs
                    .iter()
                    .take(6)
                    .map(|c| format!("{c:>+11.6}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            )?;
        }
        writeln!(f, "{}", "┈".repeat(width + 22 + 12 * ntrain.min(6)))?;
        Ok(())
    }
}

// ------
// Driver
// ------

/// A driver for eigenvector continuation of a training set to the Hamiltonian of a new
/// geometry.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ContinuationDriver<'a> {
    /// The control parameters for the subspace eigenvalue problem.
    parameters: &'a ContinuationParams,

    /// The accumulated training set.
    training_set: &'a TrainingSet,

    /// The Hamiltonian of the new geometry, in the orthogonal frame of the training set.
    integrals: &'a OrthogonalIntegrals,

    /// The layout in which the two-body transition density matrices are contracted.
    #[builder(default = "RdmCompression::None")]
    compression: RdmCompression,

    /// The result of the continuation.
    #[builder(setter(skip), default = "None")]
    result: Option<ContinuationResult>,
}

impl<'a> ContinuationDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let training_set = self
            .training_set
            .ok_or("No training set found.".to_string())?;
        let integrals = self
            .integrals
            .ok_or("No Hamiltonian integrals found.".to_string())?;
        let params = self
            .parameters
            .ok_or("No continuation parameters found.".to_string())?;
        if training_set.norb() != integrals.norb() {
            Err(format!(
                "The training set has {} orbitals, but the integrals have {}.",
                training_set.norb(),
                integrals.norb()
            ))
        } else if params.nroots > training_set.ntrain() {
            Err(format!(
                "{} root(s) requested from a training set of only {} state(s).",
                params.nroots,
                training_set.ntrain()
            ))
        } else {
            Ok(())
        }
    }
}

impl<'a> ContinuationDriver<'a> {
    /// Returns a builder to construct a [`ContinuationDriver`] structure.
    pub fn builder() -> ContinuationDriverBuilder<'a> {
        ContinuationDriverBuilder::default()
    }

    fn continue_eigenvectors(&mut self) -> Result<(), anyhow::Error> {
        log_title("Eigenvector Continuation");
        evcont_output!("");
        let params = self.parameters;
        params.log_output_display();
        evcont_output!("Two-body density layout: {}", self.compression);
        self.training_set.log_output_display();
        evcont_output!("");

        let two_rdm = self.training_set.two_body(self.compression)?;
        let (energies, coefficients) = approximate_multistate(
            &self.integrals.h1.view(),
            &self.integrals.h2.view(),
            &self.training_set.one_rdm(),
            &two_rdm,
            &self.training_set.overlap(),
            params,
        )?;
        let energies = energies + self.integrals.enuc;

        let result = ContinuationResult::builder()
            .parameters(params.clone())
            .compression(self.compression)
            .energies(energies)
            .coefficients(coefficients)
            .build()
            .map_err(|err| format_err!(err))?;
        log_subtitle("Continued states");
        evcont_output!("");
        result.log_output_display();
        evcont_output!("");
        self.result = Some(result);
        Ok(())
    }
}

impl<'a> EvcontDriver for ContinuationDriver<'a> {
    type Params = ContinuationParams;

    type Outcome = ContinuationResult;

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.continue_eigenvectors()
    }

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No eigenvector-continuation results found."))
    }
}
