//! YAML input of the `evcont` binary.

use anyhow::{self, format_err};
use serde::{Deserialize, Serialize};

use crate::continuation::{ContinuationParams, RdmCompression, TrainingSet};
use crate::drivers::continuation::{ContinuationDriver, ContinuationResult};
use crate::drivers::EvcontDriver;
use crate::integrals::OrthogonalIntegrals;
use crate::interfaces::InputHandle;
use crate::io::format::{evcont_error, evcont_output};
use crate::io::{read_evcont_binary, write_evcont_yaml, EvcontFileType};


/// A structure containing `EVCont` input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvcontInput {
    /// The name of a [`EvcontFileType::Trn`] binary file containing the accumulated training set
    /// (without the `.evcont.trn` extension).
    pub training_set: String,

    /// The name of a [`EvcontFileType::Int`] binary file containing the Hamiltonian of the new
    /// geometry in the orthogonal frame of the training set (without the `.evcont.int`
    /// extension).
    pub integrals: String,

    /// Control parameters for the subspace eigenvalue problem.
    ///
    /// # Default
    ///
    /// If not specified, the default parameters are used.
    #[serde(default)]
    pub continuation: ContinuationParams,

    /// The layout in which the two-body transition density matrices are contracted.
    ///
    /// # Default
    ///
    /// If not specified, no compression is applied.
    #[serde(default)]
    pub compression: RdmCompression,

    /// Optional name of a YAML file to which the continuation result is written (without the
    /// `.yml` extension).
    #[serde(default)]
    pub result_save_name: Option<String>,
}

impl EvcontInput {
    /// Reads in the training set and the integrals and runs eigenvector continuation.
    pub fn run_continuation(&self) -> Result<ContinuationResult, anyhow::Error> {
        let training_set: TrainingSet =
            read_evcont_binary(&self.training_set, EvcontFileType::Trn).map_err(|err| {
                format_err!("Unable to read the training set `{}`: {err}", self.training_set)
            })?;
        let integrals: OrthogonalIntegrals =
            read_evcont_binary(&self.integrals, EvcontFileType::Int).map_err(|err| {
                format_err!("Unable to read the integrals `{}`: {err}", self.integrals)
            })?;
        let mut driver = ContinuationDriver::builder()
            .parameters(&self.continuation)
            .training_set(&training_set)
            .integrals(&integrals)
            .compression(self.compression)
            .build()
            .map_err(|err| format_err!(err))?;
        driver.run()?;
        driver.result().cloned()
    }
}

impl InputHandle for EvcontInput {
    fn handle(&self) -> Result<(), anyhow::Error> {
        let result = self.run_continuation().map_err(|err| {
            evcont_error!("Eigenvector continuation has failed with error:");
            evcont_error!("  {err:#}");
            err
        })?;
        if let Some(name) = self.result_save_name.as_ref() {
            write_evcont_yaml(name, &result).map_err(|err| {
                evcont_error!("Unable to save the continuation result as {name}.yml:");
                evcont_error!("  {err:#}");
                err
            })?;
            evcont_output!("Continuation result saved as {name}.yml.");
            evcont_output!("");
        }
        Ok(())
    }
}
