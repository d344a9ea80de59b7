//! The external-potential capability.
//!
//! Everything this crate knows about the scalar potential comes through the
//! [`Potential`] trait. Concrete models (tree-level, Coleman-Weinberg,
//! thermal resummation, counterterms, ...) are deliberately out of scope:
//! callers hand the engine a `&dyn Potential` (or any `Box<dyn Potential>`)
//! and the engine only ever calls `V`, `∇V`, the Hessian, `∂V/∂T`, the
//! dimension, the flat-direction quotient and the one-shot global
//! minimizer through that boundary. This mirrors how the teacher isolates
//! evaluation behind a trait object / closure boundary instead of
//! depending on a concrete downstream type (`pineappl`'s `SubgridEnum` and
//! `ConvolutionCache`'s `&mut dyn FnMut` callbacks play the same role).

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Field-space point or gradient: a vector in ℝᵈ.
pub type FieldVec = Array1<f64>;

/// Hessian of the potential in field space: a d×d matrix.
pub type FieldMat = Array2<f64>;

/// Failure surfaced by the external potential, most commonly its one-shot
/// global minimizer.
///
/// The core only ever needs to know *that* the collaborator failed and
/// tolerates it by retrying with a different seed or narrower step; it
/// never inspects the cause beyond this message.
#[derive(Debug, Error)]
pub enum PotentialError {
    /// The optimizer used by [`Potential::global_min`] did not converge
    /// within its configured budget.
    #[error("optimizer did not converge within its configured budget: {0}")]
    OptimizerNotConverged(String),
    /// Any other failure raised by the concrete potential implementation.
    #[error("{0}")]
    Other(String),
}

/// The black-box effective potential V(φ, T) over a d-dimensional field
/// space, together with the derivative and minimization operations the
/// transition engine needs from it.
///
/// Implementations must be usable from multiple threads concurrently: the
/// minimum-location phase may dispatch calls to `V`/`grad_v`/`hess_v`
/// across a `rayon` thread pool when `use_multithreading` is enabled (see
/// [`crate::transition_tracer::TracerConfig`]). Any internal caching the
/// implementation performs must be safe under concurrent read access.
pub trait Potential: Send + Sync {
    /// Dimension `d` of the field space.
    fn dim(&self) -> usize;

    /// Effective potential V(φ, T).
    fn v(&self, phi: &FieldVec, t: f64) -> f64;

    /// Gradient ∇V(φ, T) in field space.
    fn grad_v(&self, phi: &FieldVec, t: f64) -> FieldVec;

    /// Hessian H(φ, T) in field space.
    fn hess_v(&self, phi: &FieldVec, t: f64) -> FieldMat;

    /// Temperature derivative ∂V/∂T(φ, T).
    fn dv_dt(&self, phi: &FieldVec, t: f64) -> f64;

    /// Quotients `phi` by the potential's flat directions, returning a
    /// point in ℝᵏ, k ≤ d. The default implementation assumes no flat
    /// directions and returns `phi` unchanged.
    fn restrict(&self, phi: &FieldVec) -> FieldVec {
        phi.clone()
    }

    /// One-shot global minimizer at temperature `T`. Typically wraps a
    /// nonlinear optimizer with restarts; the core does not inspect how.
    ///
    /// # Errors
    ///
    /// Returns [`PotentialError::OptimizerNotConverged`] (or any other
    /// variant) when the collaborator's optimizer failed to produce a
    /// trustworthy result.
    fn global_min(&self, t: f64) -> Result<FieldVec, PotentialError>;

    /// Discrete symmetries under which `V` is invariant, as d×d
    /// permutation/sign matrices. Supplied once; the engine never mutates
    /// this set. An empty slice means "no known symmetry".
    fn symmetry_elements(&self) -> &[FieldMat];
}

/// Smallest eigenvalue of a symmetric matrix, computed via the Jacobi
/// eigenvalue algorithm. Good enough for the small (d ≲ 10) Hessians this
/// crate deals with; the core only ever needs the smallest eigenvalue, not
/// the full spectrum, so we do not pull in a full linear-algebra crate for
/// it (per the Design Notes: "bundle these into the Potential capability
/// rather than expose linear-algebra types in the core API").
#[must_use]
pub fn smallest_eigenvalue(mat: &FieldMat) -> f64 {
    let n = mat.shape()[0];
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return mat[[0, 0]];
    }

    let mut a = mat.clone();
    const MAX_SWEEPS: usize = 100;
    const EPS: f64 = 1e-14;

    for _ in 0..MAX_SWEEPS {
        let mut off_diag_sum = 0.0;
        let mut p = 0;
        let mut q = 1;
        let mut max_off = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let a_ij = a[[i, j]].abs();
                off_diag_sum += a_ij * a_ij;
                if a_ij > max_off {
                    max_off = a_ij;
                    p = i;
                    q = j;
                }
            }
        }
        if off_diag_sum.sqrt() < EPS {
            break;
        }

        let a_pp = a[[p, p]];
        let a_qq = a[[q, q]];
        let a_pq = a[[p, q]];
        if a_pq.abs() < EPS {
            continue;
        }

        let theta = (a_qq - a_pp) / (2.0 * a_pq);
        let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
        let c = 1.0 / (1.0 + t * t).sqrt();
        let s = t * c;

        for k in 0..n {
            let a_kp = a[[k, p]];
            let a_kq = a[[k, q]];
            a[[k, p]] = c * a_kp - s * a_kq;
            a[[k, q]] = s * a_kp + c * a_kq;
        }
        for k in 0..n {
            let a_pk = a[[p, k]];
            let a_qk = a[[q, k]];
            a[[p, k]] = c * a_pk - s * a_qk;
            a[[q, k]] = s * a_pk + c * a_qk;
        }
    }

    (0..n).map(|i| a[[i, i]]).fold(f64::INFINITY, f64::min)
}
