//! Model collaborators shared by the unit tests.
//!
//! [`SphericalGaussianModel`] is a smooth integral provider built from normalised s-type Gaussian
//! overlaps, with analytic nuclear derivatives. [`PairFciSolver`] solves the two-electron
//! $`S_z = 0`$ problem exactly, so that every transition density matrix it returns is exact.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::{self, ensure, format_err};
use nalgebra::{Point3, Vector3};
use ndarray::{s, Array2, Array3, Array4, Array5, Array6, ArrayView2, ArrayView4};
use ndarray_linalg::{Eigh, UPLO};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::accumulator::wavefunction::{TransitionRdms, WavefunctionSolver};
use crate::auxiliary::atom::{Atom, ElementMap};
use crate::auxiliary::molecule::Molecule;
use crate::integrals::{
    get_loewdin_trafo, transform_integrals, AoIntegralDerivatives, AoIntegrals, IntegralProvider,
    LOEWDIN_THRESH_NULL,
};

// ============
// Random data
// ============

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random four-index tensor with $`A_{pqrs} = A_{rspq}`$.
pub(crate) fn random_exchange_symmetric(n: usize, rng: &mut StdRng) -> Array4<f64> {
    let a = Array4::from_shape_fn((n, n, n, n), |_| rng.gen_range(-1.0..1.0));
    let at = a.view().permuted_axes([2, 3, 0, 1]).to_owned();
    (a + at) * 0.5
}

/// Random four-index tensor with the eight-fold permutational symmetry of real two-electron
/// integrals.
pub(crate) fn random_eightfold_symmetric(n: usize, rng: &mut StdRng) -> Array4<f64> {
    let a = Array4::from_shape_fn((n, n, n, n), |_| rng.gen_range(-1.0..1.0));
    let perms = [
        [0, 1, 2, 3],
        [1, 0, 2, 3],
        [0, 1, 3, 2],
        [1, 0, 3, 2],
        [2, 3, 0, 1],
        [3, 2, 0, 1],
        [2, 3, 1, 0],
        [3, 2, 1, 0],
    ];
    let sum = perms
        .iter()
        .fold(Array4::<f64>::zeros((n, n, n, n)), |acc, perm| {
            acc + a.view().permuted_axes(*perm)
        });
    sum / 8.0
}

pub(crate) fn random_symmetric_matrix(n: usize, rng: &mut StdRng) -> Array2<f64> {
    let a = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
    (&a + &a.t()) * 0.5
}

/// Random but self-consistent training data with Hermitian training-pair structure.
pub(crate) fn random_training_data(
    ntrain: usize,
    norb: usize,
    rng: &mut StdRng,
) -> (Array2<f64>, Array4<f64>, Array6<f64>) {
    let mut overlap = Array2::<f64>::eye(ntrain);
    let mut one_rdm = Array4::<f64>::zeros((ntrain, ntrain, norb, norb));
    let mut two_rdm = Array6::<f64>::zeros((ntrain, ntrain, norb, norb, norb, norb));
    for a in 0..ntrain {
        for b in 0..=a {
            if a != b {
                let s = rng.gen_range(0.2..0.6);
                overlap[(a, b)] = s;
                overlap[(b, a)] = s;
            }
            let gamma = random_symmetric_matrix(norb, rng);
            let big_gamma = random_eightfold_symmetric(norb, rng);
            one_rdm.slice_mut(s![a, b, .., ..]).assign(&gamma);
            one_rdm.slice_mut(s![b, a, .., ..]).assign(&gamma);
            two_rdm
                .slice_mut(s![a, b, .., .., .., ..])
                .assign(&big_gamma);
            two_rdm
                .slice_mut(s![b, a, .., .., .., ..])
                .assign(&big_gamma);
        }
    }
    (overlap, one_rdm, two_rdm)
}

// ==================
// Model integrals
// ==================

/// Model integral provider built from normalised s-type Gaussians.
///
/// For basis functions $`p`$ and $`q`$ with exponents $`\alpha_p`$, $`\alpha_q`$ at centres
/// separated by $`\mathbf{d}_{pq} = \mathbf{R}_p - \mathbf{R}_q`$,
///
/// ```math
///     S_{pq} = \left(\frac{2\sqrt{\alpha_p\alpha_q}}{\alpha_p+\alpha_q}\right)^{3/2}
///              e^{-\mu_{pq} d_{pq}^2},\quad
///     h_{pq} = S_{pq} \left(c_1 (\alpha_p+\alpha_q) - c_0 - c_2 d_{pq}^2\right),\quad
///     (pq|rs) = g S_{pq} S_{rs},
/// ```
///
/// with $`\mu_{pq} = \alpha_p\alpha_q/(\alpha_p+\alpha_q)`$.
pub(crate) struct SphericalGaussianModel {
    pub(crate) exponents: Vec<f64>,
    pub(crate) c0: f64,
    pub(crate) c1: f64,
    pub(crate) c2: f64,
    pub(crate) g: f64,
}

impl Default for SphericalGaussianModel {
    fn default() -> Self {
        Self {
            exponents: vec![1.2, 0.4],
            c0: 2.0,
            c1: 0.75,
            c2: 0.05,
            g: 0.7,
        }
    }
}

struct ModelAo {
    atom: usize,
    alpha: f64,
    centre: Point3<f64>,
}

impl SphericalGaussianModel {
    fn aos(&self, mol: &Molecule) -> Vec<ModelAo> {
        mol.atoms
            .iter()
            .enumerate()
            .flat_map(|(iatom, atom)| {
                self.exponents.iter().map(move |alpha| ModelAo {
                    atom: iatom,
                    alpha: *alpha,
                    centre: atom.coordinates,
                })
            })
            .collect()
    }

    /// Returns `(S_pq, μ_pq, d_pq, e_pq)`.
    fn pair(&self, p: &ModelAo, q: &ModelAo) -> (f64, f64, Vector3<f64>, f64) {
        let asum = p.alpha + q.alpha;
        let mu = p.alpha * q.alpha / asum;
        let d = p.centre - q.centre;
        let r2 = d.norm_squared();
        let norm = (2.0 * (p.alpha * q.alpha).sqrt() / asum).powf(1.5);
        let s = norm * (-mu * r2).exp();
        let e = self.c1 * asum - self.c0 - self.c2 * r2;
        (s, mu, d, e)
    }

    fn overlap(&self, aos: &[ModelAo]) -> Array2<f64> {
        let nao = aos.len();
        Array2::from_shape_fn((nao, nao), |(p, q)| self.pair(&aos[p], &aos[q]).0)
    }
}

impl IntegralProvider for SphericalGaussianModel {
    fn ao_integrals(&self, mol: &Molecule) -> Result<AoIntegrals, anyhow::Error> {
        let aos = self.aos(mol);
        let nao = aos.len();
        let sao = self.overlap(&aos);
        let hcore = Array2::from_shape_fn((nao, nao), |(p, q)| {
            let (s, _, _, e) = self.pair(&aos[p], &aos[q]);
            s * e
        });
        let eri = Array4::from_shape_fn((nao, nao, nao, nao), |(p, q, r, s)| {
            self.g * sao[(p, q)] * sao[(r, s)]
        });
        AoIntegrals::builder()
            .sao(sao)
            .hcore(hcore)
            .eri(eri)
            .build()
            .map_err(|err| format_err!(err))
    }

    fn ao_integral_derivatives(
        &self,
        mol: &Molecule,
    ) -> Result<AoIntegralDerivatives, anyhow::Error> {
        let aos = self.aos(mol);
        let nao = aos.len();
        let natm = mol.natoms();
        let nper = self.exponents.len();
        let sao = self.overlap(&aos);

        // ∂S_pq/∂R_p = -2 μ d S
        let ipovlp = Array3::from_shape_fn((3, nao, nao), |(x, p, q)| {
            let (s, mu, d, _) = self.pair(&aos[p], &aos[q]);
            2.0 * mu * d[x] * s
        });

        // ∂h_pq/∂R_p = -d S (2 μ e + 2 c2)
        let dh_dp = Array3::from_shape_fn((3, nao, nao), |(x, p, q)| {
            let (s, mu, d, e) = self.pair(&aos[p], &aos[q]);
            -d[x] * s * (2.0 * mu * e + 2.0 * self.c2)
        });
        let hcore_derivs = Array4::from_shape_fn((natm, 3, nao, nao), |(atm, x, p, q)| {
            let mut v = 0.0;
            if aos[p].atom == atm {
                v += dh_dp[(x, p, q)];
            }
            if aos[q].atom == atm {
                v -= dh_dp[(x, p, q)];
            }
            v
        });

        let ip1_eri = Array5::from_shape_fn((3, nao, nao, nao, nao), |(x, p, q, r, s)| {
            self.g * ipovlp[(x, p, q)] * sao[(r, s)]
        });

        let ao_slices: Vec<Range<usize>> = (0..natm).map(|i| i * nper..(i + 1) * nper).collect();
        AoIntegralDerivatives::builder()
            .ao_slices(ao_slices)
            .ipovlp(ipovlp)
            .hcore_derivs(hcore_derivs)
            .ip1_eri(ip1_eri)
            .build()
            .map_err(|err| format_err!(err))
    }

    /// Canonical orbitals of the core Hamiltonian, standing in for split-localised orbitals.
    fn split_localised_basis(
        &self,
        _: &Molecule,
        ao: &AoIntegrals,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let xmat = get_loewdin_trafo(&ao.sao(), LOEWDIN_THRESH_NULL)?;
        let h_orth = xmat.t().dot(&ao.hcore()).dot(&xmat);
        let (_, vecs) = h_orth.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
        Ok(xmat.dot(&vecs))
    }
}

pub(crate) fn hydrogen_chain(positions: &[[f64; 3]]) -> Molecule {
    let emap = ElementMap::new();
    let atoms = positions
        .iter()
        .map(|pos| Atom::new("H", Point3::new(pos[0], pos[1], pos[2]), &emap))
        .collect::<Result<Vec<_>, _>>()
        .expect("Unable to construct hydrogen atoms.");
    Molecule::from_atoms(&atoms, 0)
}

pub(crate) fn hydrogen_molecule(bond_length: f64) -> Molecule {
    hydrogen_chain(&[[0.0, 0.0, -0.5 * bond_length], [0.0, 0.0, 0.5 * bond_length]])
}

// ======================
// Exact pair solver
// ======================

/// Exact solver for two electrons with opposite spins.
///
/// A state is $`|C\rangle = \sum_{pq} C_{pq} a^\dagger_{p\alpha} a^\dagger_{q\beta} |0\rangle`$,
/// so that transition density matrices and orbital rotations have closed forms.
///
/// States converged under one of `flipped_tags` are stored with their sign flipped, as an
/// iterative solver is free to do.
#[derive(Default)]
pub(crate) struct PairFciSolver {
    pub(crate) states: HashMap<String, Array2<f64>>,
    pub(crate) reverse_orbitals: bool,
    pub(crate) fail_on_converge: bool,
    pub(crate) flipped_tags: Vec<String>,
}

impl PairFciSolver {
    pub(crate) fn ground_state(
        h1: &ArrayView2<f64>,
        h2: &ArrayView4<f64>,
    ) -> Result<(f64, Array2<f64>), anyhow::Error> {
        let n = h1.nrows();
        let hmat = Array2::from_shape_fn((n * n, n * n), |(pq, rs)| {
            let (p, q, r, s) = (pq / n, pq % n, rs / n, rs % n);
            let mut v = h2[(p, r, q, s)];
            if q == s {
                v += h1[(p, r)];
            }
            if p == r {
                v += h1[(q, s)];
            }
            v
        });
        let (eigvals, eigvecs) = hmat.eigh(UPLO::Lower).map_err(|err| format_err!(err))?;
        let mut coeffs = eigvecs
            .column(0)
            .to_owned()
            .into_shape((n, n))
            .map_err(|err| format_err!(err))?;
        let largest = coeffs
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .ok_or_else(|| format_err!("Empty coefficient matrix."))?;
        if largest < 0.0 {
            coeffs.mapv_inplace(|v| -v);
        }
        Ok((eigvals[0], coeffs))
    }

    fn state(&self, tag: &str) -> Result<&Array2<f64>, anyhow::Error> {
        self.states
            .get(tag)
            .ok_or_else(|| format_err!("No state stored under `{tag}`."))
    }
}

impl WavefunctionSolver for PairFciSolver {
    fn converge(
        &mut self,
        h1: &ArrayView2<f64>,
        h2: &ArrayView4<f64>,
        nelec: usize,
        tag: &str,
    ) -> Result<f64, anyhow::Error> {
        ensure!(!self.fail_on_converge, "Model solver did not converge.");
        ensure!(nelec == 2, "The pair solver only handles two electrons.");
        let (energy, mut coeffs) = Self::ground_state(h1, h2)?;
        if self.flipped_tags.iter().any(|flipped| flipped == tag) {
            coeffs.mapv_inplace(|v| -v);
        }
        self.states.insert(tag.to_string(), coeffs);
        Ok(energy)
    }

    fn transition_rdms(
        &mut self,
        bra_tag: &str,
        ket_tag: &str,
    ) -> Result<TransitionRdms, anyhow::Error> {
        let bra = self.state(bra_tag)?;
        let ket = self.state(ket_tag)?;
        let n = bra.nrows();
        let overlap = (bra * ket).sum();
        let one_rdm = bra.dot(&ket.t()) + bra.t().dot(ket);
        let two_rdm = Array4::from_shape_fn((n, n, n, n), |(i, j, k, l)| {
            bra[(i, k)] * ket[(j, l)] + bra[(k, i)] * ket[(l, j)]
        });
        Ok(TransitionRdms {
            overlap,
            one_rdm,
            two_rdm,
        })
    }

    fn rotate(
        &mut self,
        ket_tag: &str,
        new_tag: &str,
        rotation: &ArrayView2<f64>,
        _: f64,
    ) -> Result<(), anyhow::Error> {
        let rotated = rotation.t().dot(self.state(ket_tag)?).dot(rotation);
        self.states.insert(new_tag.to_string(), rotated);
        Ok(())
    }

    fn orbital_reordering(
        &mut self,
        h1: &ArrayView2<f64>,
        _: &ArrayView4<f64>,
    ) -> Result<Vec<usize>, anyhow::Error> {
        let n = h1.nrows();
        if self.reverse_orbitals {
            Ok((0..n).rev().collect())
        } else {
            Ok((0..n).collect())
        }
    }
}

/// Exact electronic ground-state energy of a two-electron molecule in its Löwdin basis.
pub(crate) fn exact_oao_energy<P: IntegralProvider>(
    provider: &P,
    mol: &Molecule,
) -> Result<f64, anyhow::Error> {
    let ao = provider.ao_integrals(mol)?;
    let xmat = get_loewdin_trafo(&ao.sao(), LOEWDIN_THRESH_NULL)?;
    let (h1, h2) = transform_integrals(&ao.hcore(), &ao.eri(), &xmat.view())?;
    Ok(PairFciSolver::ground_state(&h1.view(), &h2.view())?.0)
}
