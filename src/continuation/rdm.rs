//! Storage layouts of two-body transition density matrices across training pairs.

use std::fmt;

use anyhow::{self, ensure, format_err};
use ndarray::{
    s, Array1, Array2, Array3, Array4, Array5, Array6, ArrayD, ArrayView1, ArrayView4,
    ArrayView6, Ix2, Ix3, Ix5, Ix6,
};
use serde::{Deserialize, Serialize};

use crate::integrals::compression::{
    compress_electron_exchange_symmetry, dim_from_tril_len, norb_from_exchange_packed_len,
    tril_indices, tril_len, unpack_electron_exchange_symmetry,
};

#[cfg(test)]
#[path = "rdm_tests.rs"]
mod rdm_tests;

/// An enumerated type for the compression applied to two-body transition density matrices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RdmCompression {
    /// No compression.
    #[default]
    None,

    /// Only the training pairs $`a \ge b`$ are stored.
    Data,

    /// Every block is packed by the electron-exchange symmetry.
    Exchange,

    /// Both compressions are applied.
    DataAndExchange,
}

impl fmt::Display for RdmCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdmCompression::None => write!(f, "none"),
            RdmCompression::Data => write!(f, "training-pair symmetry"),
            RdmCompression::Exchange => write!(f, "electron-exchange symmetry"),
            RdmCompression::DataAndExchange => {
                write!(f, "training-pair and electron-exchange symmetries")
            }
        }
    }
}

/// Two-body transition density matrices of all training pairs in one of four storage layouts.
///
/// With `Ntrn` training states and `Norb` orbitals, the layouts have shapes
///
/// - [`TwoBodyRdm::Full`]: `(Ntrn, Ntrn, Norb, Norb, Norb, Norb)`;
/// - [`TwoBodyRdm::DataPacked`]: `(Ntrn(Ntrn+1)/2, Norb, Norb, Norb, Norb)`, holding the pairs
///   $`(a, b)`$ with $`a \ge b`$ in row-major lower-triangular order;
/// - [`TwoBodyRdm::ExchangePacked`]: `(Ntrn, Ntrn, Norb²(Norb²+1)/2)`;
/// - [`TwoBodyRdm::BothPacked`]: `(Ntrn(Ntrn+1)/2, Norb²(Norb²+1)/2)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TwoBodyRdm {
    /// Uncompressed blocks for every training pair.
    Full(Array6<f64>),

    /// Uncompressed blocks for the training pairs $`a \ge b`$ only.
    DataPacked(Array5<f64>),

    /// Exchange-packed blocks for every training pair.
    ExchangePacked(Array3<f64>),

    /// Exchange-packed blocks for the training pairs $`a \ge b`$ only.
    BothPacked(Array2<f64>),
}

impl TryFrom<ArrayD<f64>> for TwoBodyRdm {
    type Error = anyhow::Error;

    /// Selects the storage layout from the rank of the array.
    fn try_from(value: ArrayD<f64>) -> Result<Self, Self::Error> {
        let rdm = match value.ndim() {
            6 => TwoBodyRdm::Full(value.into_dimensionality::<Ix6>()?),
            5 => TwoBodyRdm::DataPacked(value.into_dimensionality::<Ix5>()?),
            3 => TwoBodyRdm::ExchangePacked(value.into_dimensionality::<Ix3>()?),
            2 => TwoBodyRdm::BothPacked(value.into_dimensionality::<Ix2>()?),
            rank => {
                return Err(format_err!(
                    "Unsupported two-body transition density array of rank {rank} with shape {:?}.",
                    value.shape()
                ))
            }
        };
        rdm.dims()?;
        Ok(rdm)
    }
}

impl TwoBodyRdm {
    /// Builds the requested storage layout from full two-body transition density matrices.
    pub fn compress(
        full: &ArrayView6<f64>,
        compression: RdmCompression,
    ) -> Result<Self, anyhow::Error> {
        let shape = full.shape();
        let (ntrain, norb) = (shape[0], shape[2]);
        ensure!(
            shape == [ntrain, ntrain, norb, norb, norb, norb],
            "Invalid full two-body transition density shape {shape:?}."
        );
        let rdm = match compression {
            RdmCompression::None => TwoBodyRdm::Full(full.to_owned()),
            RdmCompression::Data => {
                let mut packed = Array5::<f64>::zeros((tril_len(ntrain), norb, norb, norb, norb));
                for (k, (a, b)) in tril_indices(ntrain).into_iter().enumerate() {
                    packed
                        .slice_mut(s![k, .., .., .., ..])
                        .assign(&full.slice(s![a, b, .., .., .., ..]));
                }
                TwoBodyRdm::DataPacked(packed)
            }
            RdmCompression::Exchange => {
                let npacked = tril_len(norb * norb);
                let mut packed = Array3::<f64>::zeros((ntrain, ntrain, npacked));
                for a in 0..ntrain {
                    for b in 0..ntrain {
                        let block = full.slice(s![a, b, .., .., .., ..]);
                        packed
                            .slice_mut(s![a, b, ..])
                            .assign(&compress_electron_exchange_symmetry(&block, 1.0)?);
                    }
                }
                TwoBodyRdm::ExchangePacked(packed)
            }
            RdmCompression::DataAndExchange => {
                let npacked = tril_len(norb * norb);
                let mut packed = Array2::<f64>::zeros((tril_len(ntrain), npacked));
                for (k, (a, b)) in tril_indices(ntrain).into_iter().enumerate() {
                    let block = full.slice(s![a, b, .., .., .., ..]);
                    packed
                        .slice_mut(s![k, ..])
                        .assign(&compress_electron_exchange_symmetry(&block, 1.0)?);
                }
                TwoBodyRdm::BothPacked(packed)
            }
        };
        Ok(rdm)
    }

    /// Returns the compression of this storage layout.
    pub fn compression(&self) -> RdmCompression {
        match self {
            TwoBodyRdm::Full(_) => RdmCompression::None,
            TwoBodyRdm::DataPacked(_) => RdmCompression::Data,
            TwoBodyRdm::ExchangePacked(_) => RdmCompression::Exchange,
            TwoBodyRdm::BothPacked(_) => RdmCompression::DataAndExchange,
        }
    }

    /// Returns the number of training states and the number of orbitals, verifying that the
    /// array shape is consistent with the layout.
    pub fn dims(&self) -> Result<(usize, usize), anyhow::Error> {
        let (ntrain, norb, expected) = match self {
            TwoBodyRdm::Full(arr) => {
                let (nt, n) = (arr.shape()[0], arr.shape()[2]);
                (nt, n, vec![nt, nt, n, n, n, n])
            }
            TwoBodyRdm::DataPacked(arr) => {
                let nt = dim_from_tril_len(arr.shape()[0])?;
                let n = arr.shape()[1];
                (nt, n, vec![tril_len(nt), n, n, n, n])
            }
            TwoBodyRdm::ExchangePacked(arr) => {
                let nt = arr.shape()[0];
                let n = norb_from_exchange_packed_len(arr.shape()[2])?;
                (nt, n, vec![nt, nt, tril_len(n * n)])
            }
            TwoBodyRdm::BothPacked(arr) => {
                let nt = dim_from_tril_len(arr.shape()[0])?;
                let n = norb_from_exchange_packed_len(arr.shape()[1])?;
                (nt, n, vec![tril_len(nt), tril_len(n * n)])
            }
        };
        ensure!(
            self.shape() == expected.as_slice(),
            "Two-body transition density array of shape {:?} is inconsistent with the {} layout.",
            self.shape(),
            self.compression()
        );
        Ok((ntrain, norb))
    }

    /// Returns the shape of the underlying array.
    pub fn shape(&self) -> &[usize] {
        match self {
            TwoBodyRdm::Full(arr) => arr.shape(),
            TwoBodyRdm::DataPacked(arr) => arr.shape(),
            TwoBodyRdm::ExchangePacked(arr) => arr.shape(),
            TwoBodyRdm::BothPacked(arr) => arr.shape(),
        }
    }

    /// Contracts every stored block with two-electron integrals in chemists' notation, giving
    /// $`\frac{1}{2}\sum_{pqrs} \Gamma^{(ab)}_{pqrs} g_{pqrs}`$ for every stored training pair.
    ///
    /// # Returns
    ///
    /// An `Ntrn × Ntrn` matrix for the unpacked training-pair layouts, or the lower triangle of
    /// that matrix in row-major order for the data-packed layouts.
    pub(crate) fn contract_two_electron(
        &self,
        h2: &ArrayView4<f64>,
    ) -> Result<TwoBodyContraction, anyhow::Error> {
        let (ntrain, norb) = self.dims()?;
        ensure!(
            h2.shape() == [norb, norb, norb, norb],
            "Two-electron integrals of shape {:?} are inconsistent with {norb} orbitals.",
            h2.shape()
        );
        let n4 = norb.pow(4);
        let h2_flat = h2
            .as_standard_layout()
            .into_owned()
            .into_shape(n4)?;
        let contraction = match self {
            TwoBodyRdm::Full(arr) => {
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((ntrain * ntrain, n4))?;
                let values = flat.dot(&h2_flat) * 0.5;
                TwoBodyContraction::Square(values.into_shape((ntrain, ntrain))?)
            }
            TwoBodyRdm::DataPacked(arr) => {
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((tril_len(ntrain), n4))?;
                TwoBodyContraction::LowerTriangle(flat.dot(&h2_flat) * 0.5)
            }
            TwoBodyRdm::ExchangePacked(arr) => {
                let h2_packed = compress_electron_exchange_symmetry(h2, 0.5)?;
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((ntrain * ntrain, h2_packed.len()))?;
                let values = flat.dot(&h2_packed);
                TwoBodyContraction::Square(values.into_shape((ntrain, ntrain))?)
            }
            TwoBodyRdm::BothPacked(arr) => {
                let h2_packed = compress_electron_exchange_symmetry(h2, 0.5)?;
                TwoBodyContraction::LowerTriangle(arr.dot(&h2_packed))
            }
        };
        Ok(contraction)
    }

    /// Computes the two-body density matrix of the state $`\sum_a v_a |\Psi_a\rangle`$,
    /// $`\sum_{ab} v_a v_b \Gamma^{(ab)}_{pqrs}`$, as a full four-index tensor.
    pub fn predicted_density(
        &self,
        coeffs: &ArrayView1<f64>,
    ) -> Result<Array4<f64>, anyhow::Error> {
        let (ntrain, norb) = self.dims()?;
        ensure!(
            coeffs.len() == ntrain,
            "Expected {ntrain} subspace coefficients, but got {}.",
            coeffs.len()
        );
        let shape4 = (norb, norb, norb, norb);
        let density = match self {
            TwoBodyRdm::Full(arr) => {
                let weights = Array2::from_shape_fn((ntrain, ntrain), |(a, b)| {
                    coeffs[a] * coeffs[b]
                })
                .into_shape(ntrain * ntrain)?;
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((ntrain * ntrain, norb.pow(4)))?;
                flat.t().dot(&weights).into_shape(shape4)?
            }
            TwoBodyRdm::DataPacked(arr) => {
                let (diag_w, off_w) = split_tril_weights(coeffs);
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((tril_len(ntrain), norb.pow(4)))?;
                let diag = flat.t().dot(&diag_w).into_shape(shape4)?;
                let off = flat.t().dot(&off_w).into_shape(shape4)?;
                diag + &off + &off.view().permuted_axes([1, 0, 3, 2])
            }
            TwoBodyRdm::ExchangePacked(arr) => {
                let weights = Array2::from_shape_fn((ntrain, ntrain), |(a, b)| {
                    coeffs[a] * coeffs[b]
                })
                .into_shape(ntrain * ntrain)?;
                let flat = arr
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((ntrain * ntrain, arr.shape()[2]))?;
                unpack_electron_exchange_symmetry(&flat.t().dot(&weights).view())?
            }
            TwoBodyRdm::BothPacked(arr) => {
                let (diag_w, off_w) = split_tril_weights(coeffs);
                let diag = unpack_electron_exchange_symmetry(&arr.t().dot(&diag_w).view())?;
                let off = unpack_electron_exchange_symmetry(&arr.t().dot(&off_w).view())?;
                diag + &off + &off.view().permuted_axes([1, 0, 3, 2])
            }
        };
        Ok(density)
    }
}

/// Result of contracting two-body transition density matrices with two-electron integrals.
pub(crate) enum TwoBodyContraction {
    /// Values for all training pairs.
    Square(Array2<f64>),

    /// Values for the training pairs $`a \ge b`$ in row-major lower-triangular order.
    LowerTriangle(Array1<f64>),
}

/// Splits the weights $`v_a v_b`$ of the lower-triangular training pairs into diagonal and
/// strictly-lower parts.
fn split_tril_weights(coeffs: &ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let pairs = tril_indices(coeffs.len());
    let diag = pairs
        .iter()
        .map(|(a, b)| if a == b { coeffs[*a] * coeffs[*b] } else { 0.0 })
        .collect::<Array1<_>>();
    let off = pairs
        .iter()
        .map(|(a, b)| if a != b { coeffs[*a] * coeffs[*b] } else { 0.0 })
        .collect::<Array1<_>>();
    (diag, off)
}
