//! Packed storage and rotation of spherical-harmonic coefficient sets.
//!
//! A spherical-harmonic coefficient set ("alm") for band limit `L` holds one
//! complex value `a(l, m)` per pair with `0 <= m <= l <= L`. This crate
//! provides:
//!
//! - [`AlmLayout`]: the packed storage layout over `(l, m)` pairs, covering
//!   both the dense triangular case and sparse layouts where only a subset of
//!   `m` columns is present.
//! - [`Alm`]: a coefficient store combining an [`AlmLayout`] with an owned or
//!   borrowed buffer, with elementwise algebra on top.
//! - [`WignerDRisbo`]: incremental construction of the Wigner small-d matrix
//!   `d^l(theta)` via the Risbo half-angle recursion.
//! - [`rotate_alm`]: rotation of a complete set by an Euler-angle triple
//!   `(psi, theta, phi)`, built from per-`l` Wigner matrices sandwiched
//!   between diagonal phase factors.
//! - A fixed-size worker pool with range schedulers
//!   ([`exec_single`] / [`exec_static`] / [`exec_dynamic`] / [`exec_guided`] /
//!   [`exec_parallel`]) that the rotation's inner loop is dispatched through.
//!
//! # Example
//!
//! ```rust
//! use alm_rs::{rotate_alm, Alm, Complex};
//!
//! let mut alm = Alm::<Complex<f64>>::zeros(8, 8).unwrap();
//! *alm.at_mut(3, 1) = Complex::new(0.25, -1.5);
//!
//! rotate_alm(&mut alm, 0.3, 0.7, -0.1).unwrap();
//! rotate_alm(&mut alm, 0.1, -0.7, -0.3).unwrap(); // inverse rotation
//! ```
//!
//! # Threading
//!
//! Fan-outs run on a process-wide pool of OS threads, sized to the detected
//! hardware concurrency and shared by all callers. [`set_default_nthreads`]
//! bounds the per-fan-out parallelism. Building without the `parallel`
//! feature removes the pool entirely; every `exec_*` variant then runs its
//! body inline on the calling thread and [`max_threads`] reports 1.

mod alm;
mod matrix;
mod rotate;
mod threading;
mod wigner;

pub use alm::{Alm, AlmLayout};
pub use matrix::Matrix;
pub use rotate::rotate_alm;
pub use threading::{
    default_nthreads, exec_dynamic, exec_guided, exec_parallel, exec_single, exec_static,
    max_threads, set_default_nthreads, Scheduler,
};
pub use wigner::WignerDRisbo;

// Re-exported so downstream code can name coefficient types without an extra
// dependency declaration.
pub use num_complex::Complex;

// ============================================================================
// Error types
// ============================================================================

/// Errors reported by layout construction, store algebra and the pool.
#[derive(Debug, thiserror::Error)]
pub enum AlmError {
    /// No `m` values were supplied for a layout.
    #[error("no m values supplied")]
    NoMValues,

    /// The `m` values of a layout are not strictly ascending.
    #[error("m values not strictly ascending")]
    MNotAscending,

    /// An `m` value exceeds the band limit.
    #[error("m = {m} exceeds lmax = {lmax}")]
    MOutOfRange { m: usize, lmax: usize },

    /// The requested maximum order exceeds the band limit.
    #[error("mmax = {mmax} exceeds lmax = {lmax}")]
    MmaxTooLarge { mmax: usize, lmax: usize },

    /// `mval` and `mstart` have different lengths.
    #[error("mval has {nmval} entries but mstart has {nmstart}")]
    LayoutMismatch { nmval: usize, nmstart: usize },

    /// A column offset places stored coefficients before the buffer start.
    #[error("column m = {m} starts before the buffer")]
    ColumnUnderflow { m: usize },

    /// A borrowed buffer is too small for the layout.
    #[error("buffer has {got} entries, layout needs {need}")]
    BufferTooSmall { need: usize, got: usize },

    /// A borrowed buffer does not match the dense layout size exactly.
    #[error("buffer has {got} entries, expected exactly {expect}")]
    BufferSizeMismatch { expect: usize, got: usize },

    /// A per-degree or per-order factor array is too short.
    #[error("factor array has {got} entries, need at least {need}")]
    FactorTooShort { need: usize, got: usize },

    /// Elementwise operands do not share a layout.
    #[error("coefficient sets are not conformable")]
    NotConformable,

    /// The operation needs every `m` in `[0, lmax]` to be present.
    #[error("operation requires a complete coefficient set")]
    IncompleteSet,

    /// The `m = 0` column is absent.
    #[error("no m = 0 column present")]
    MissingMonopole,

    /// Work was submitted to a pool that has been shut down.
    #[error("work submitted to a thread pool that has been shut down")]
    PoolShutDown,
}

/// Result type for alm operations.
pub type Result<T> = std::result::Result<T, AlmError>;
