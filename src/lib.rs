//! # EVCont: eigenvector continuation across nuclear geometries
//!
//! EVCont approximates the electronic ground state (and low-lying excited states) of a molecule
//! at a new nuclear geometry by projecting the Hamiltonian of that geometry onto a subspace
//! spanned by exact eigenstates computed at a handful of training geometries. All it needs of the
//! training states are their mutual overlaps and their one- and two-body transition density
//! matrices, expressed in a common orthogonal orbital frame.
//!
//! The crate provides
//! - accumulation of training sets from an external many-body solver, with distributed
//!   computation of the transition density matrices
//!   (see [`accumulator`]),
//! - construction of orthogonal orbital frames and the transformation of molecular integrals into
//!   them (see [`integrals`]),
//! - compressed storage layouts for two-body transition density matrices that exploit training-pair
//!   and electron-exchange symmetries (see [`continuation::rdm`]),
//! - solution of the subspace generalised eigenvalue problem (see [`continuation`]), and
//! - analytical nuclear gradients of the continued energy in the symmetric orthogonal frame (see
//!   [`gradients`]).
//!
//! ## Linear algebra backend
//!
//! There are six features defining six different ways a linear algebra backend can be configured
//! for EVCont. These are inherited from the
//! [`ndarray-linalg`](https://docs.rs/ndarray-linalg/latest/ndarray_linalg/) crate. One
//! (and only one) of these must be enabled:
//! - `openblas-static`: Downloads, builds OpenBLAS, and links statically
//! - `openblas-system`: Finds and links existing OpenBLAS in the system
//! - `netlib-static`: Downloads, builds LAPACK, and links statically
//! - `netlib-system`: Finds and links existing LAPACK in the system
//! - `intel-mkl-static`: Finds and links existing static Intel MKL in the system, or downloads and
//!   links statically if not found
//! - `intel-mkl-system`: Finds and links existing shared Intel MKL in the system
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. The `evcont` binary reads a YAML input file (see
//! [`interfaces::input::EvcontInput`]) naming a binary training set and a binary set of
//! integrals, and logs the continued energies.

pub mod accumulator;
pub mod auxiliary;
pub mod continuation;
pub mod drivers;
pub mod gradients;
pub mod integrals;
pub mod interfaces;
pub mod io;

#[cfg(test)]
pub(crate) mod testing;
