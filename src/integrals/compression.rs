//! Packing of four-index tensors and of training-pair indices by permutational symmetry.
//!
//! Two packings are used throughout the crate:
//!
//! - *exchange packing* stores a four-index tensor $`A_{pqrs}`$ with the electron-exchange
//!   symmetry $`A_{pqrs} = A_{rspq}`$ as the lower triangle of the matrix $`A_{(pq),(rs)}`$
//!   whose compound indices are $`(pq) = p N + q`$;
//! - *data packing* stores a Hermitian collection of blocks indexed by training pairs $`(a, b)`$
//!   as the lower triangle $`a \ge b`$ only.
//!
//! Both lower triangles are enumerated in row-major order, *i.e.* $`(0,0), (1,0), (1,1), (2,0),
//! \ldots`$.

use anyhow::{self, ensure, format_err};
use ndarray::{Array1, Array4, ArrayView1, ArrayView4};

#[cfg(test)]
#[path = "compression_tests.rs"]
mod compression_tests;

/// Returns the number of elements in the lower triangle (diagonal included) of an `n × n` matrix.
pub fn tril_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Returns the row-major enumeration of the lower triangle (diagonal included) of an `n × n`
/// matrix.
pub fn tril_indices(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (0..=i).map(move |j| (i, j)))
        .collect()
}

/// Returns the position of `(i, j)` in the enumeration of [`tril_indices`], swapping the indices
/// if `(i, j)` lies in the upper triangle.
pub fn tril_position(i: usize, j: usize) -> usize {
    let (hi, lo) = if i >= j { (i, j) } else { (j, i) };
    tril_len(hi) + lo
}

/// Recovers `n` from the length `n(n+1)/2` of a packed lower triangle.
pub fn dim_from_tril_len(len: usize) -> Result<usize, anyhow::Error> {
    let n = (((8 * len + 1) as f64).sqrt() as usize).saturating_sub(1) / 2;
    [n, n + 1]
        .into_iter()
        .find(|m| tril_len(*m) == len)
        .ok_or_else(|| format_err!("{len} is not the length of a packed lower triangle."))
}

/// Recovers the number of orbitals `n` from the length `n²(n²+1)/2` of an exchange-packed
/// four-index tensor.
pub fn norb_from_exchange_packed_len(len: usize) -> Result<usize, anyhow::Error> {
    let npair = dim_from_tril_len(len)?;
    let norb = (npair as f64).sqrt().round() as usize;
    ensure!(
        norb * norb == npair,
        "{len} is not the length of an exchange-packed four-index tensor."
    );
    Ok(norb)
}

/// Packs a four-index tensor with the electron-exchange symmetry $`A_{pqrs} = A_{rspq}`$ into the
/// lower triangle of its compound-index matrix.
///
/// # Arguments
///
/// * `tensor` - The four-index tensor of shape `(n, n, n, n)`.
/// * `diag_multiplier` - The factor applied to the diagonal elements $`A_{(pq),(pq)}`$. A
///   multiplier of `0.5` on the integrals and `1.0` on the density gives
///   $`\frac{1}{2}\sum_{pqrs} \Gamma_{pqrs} g_{pqrs}`$ as a single dot product of the packed
///   vectors.
///
/// # Returns
///
/// The packed vector of length `n²(n²+1)/2`.
pub fn compress_electron_exchange_symmetry(
    tensor: &ArrayView4<f64>,
    diag_multiplier: f64,
) -> Result<Array1<f64>, anyhow::Error> {
    let (n0, n1, n2, n3) = tensor.dim();
    ensure!(
        n0 == n1 && n1 == n2 && n2 == n3,
        "Exchange packing requires a tensor with four equal dimensions, but got {:?}.",
        tensor.shape()
    );
    let n = n0;
    let packed = tril_indices(n * n)
        .into_iter()
        .map(|(pq, rs)| {
            let value = tensor[(pq / n, pq % n, rs / n, rs % n)];
            if pq == rs {
                value * diag_multiplier
            } else {
                value
            }
        })
        .collect::<Array1<_>>();
    Ok(packed)
}

/// Unpacks an exchange-packed vector produced by [`compress_electron_exchange_symmetry`] with a
/// unit diagonal multiplier back into a full four-index tensor.
pub fn unpack_electron_exchange_symmetry(
    packed: &ArrayView1<f64>,
) -> Result<Array4<f64>, anyhow::Error> {
    let n = norb_from_exchange_packed_len(packed.len())?;
    let mut tensor = Array4::<f64>::zeros((n, n, n, n));
    tril_indices(n * n)
        .into_iter()
        .zip(packed.iter())
        .for_each(|((pq, rs), value)| {
            let (p, q, r, s) = (pq / n, pq % n, rs / n, rs % n);
            tensor[(p, q, r, s)] = *value;
            tensor[(r, s, p, q)] = *value;
        });
    Ok(tensor)
}
