//! Distribution of data between cooperating processes.
//!
//! The accumulator never inspects process ranks beyond [`Distributor::is_root`]; values computed
//! on the root process are made available everywhere through [`Distributor::broadcast`].

use anyhow::{self, ensure, format_err};
use bincode;
use ndarray::{s, Array4, Array6};
use serde::{de::DeserializeOwned, Serialize};

#[cfg(test)]
#[path = "distribution_tests.rs"]
mod distribution_tests;

/// Trait for strategies distributing values from a root process to all cooperating processes.
pub trait Distributor {
    /// Returns `true` if the current process is the root process.
    fn is_root(&self) -> bool;

    /// Broadcasts a value from the root process.
    ///
    /// # Arguments
    ///
    /// * `value` - On the root process, the value to be broadcast. On any other process, a value
    ///   of the same shape that is replaced.
    ///
    /// # Returns
    ///
    /// The root process's value.
    fn broadcast<T>(&self, value: T) -> Result<T, anyhow::Error>
    where
        T: Serialize + DeserializeOwned;
}

/// Single-process distributor for which every process is the root process.
///
/// Broadcast values still pass through a `bincode` encoding round trip.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialDistributor;

impl Distributor for SerialDistributor {
    fn is_root(&self) -> bool {
        true
    }

    fn broadcast<T>(&self, value: T) -> Result<T, anyhow::Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let buffer = bincode::serialize(&value).map_err(|err| format_err!(err))?;
        bincode::deserialize(&buffer).map_err(|err| format_err!(err))
    }
}

/// Broadcasts a two-electron integral tensor one `(i, j)` slice at a time.
pub fn broadcast_two_body_integrals<D: Distributor>(
    distributor: &D,
    h2: Array4<f64>,
) -> Result<Array4<f64>, anyhow::Error> {
    let (n0, n1, _, _) = h2.dim();
    let mut received = h2;
    for i in 0..n0 {
        for j in 0..n1 {
            let slice = received.slice(s![i, j, .., ..]).to_owned();
            let slice = distributor.broadcast(slice)?;
            received.slice_mut(s![i, j, .., ..]).assign(&slice);
        }
    }
    Ok(received)
}

/// Broadcasts an accumulated two-body transition density tensor one orbital-pair `(p, q)` slice
/// at a time, *i.e.* in blocks of shape `(Ntrn, Ntrn, Norb, Norb)`.
pub fn broadcast_two_body_rdm<D: Distributor>(
    distributor: &D,
    two_rdm: Array6<f64>,
) -> Result<Array6<f64>, anyhow::Error> {
    let shape = two_rdm.shape().to_vec();
    ensure!(
        shape[2] == shape[3],
        "Unexpected two-body density tensor shape {shape:?}."
    );
    let mut received = two_rdm;
    for p in 0..shape[2] {
        for q in 0..shape[3] {
            let slice = received.slice(s![.., .., p, q, .., ..]).to_owned();
            let slice = distributor.broadcast(slice)?;
            received.slice_mut(s![.., .., p, q, .., ..]).assign(&slice);
        }
    }
    Ok(received)
}

