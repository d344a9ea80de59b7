//! Crate-wide error type.
//!
//! Most failure modes of this crate are not exceptional: a minimizer that
//! does not converge, a bisection that cannot bracket its target, or a
//! bounce integration that never overshoots are all recorded as an explicit
//! `Status*` value on the corresponding result (see [`crate::minimum`],
//! [`crate::bounce_action`], [`crate::bounce_solution`]). [`Error`] is
//! reserved for the remaining "this should never happen if the caller
//! respects the contract" cases: evaluating a spline outside its sampled
//! range, a negative temperature, or a failure surfaced by the external
//! [`Potential`](crate::potential::Potential) implementation.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A temperature argument was negative.
    #[error("temperature must be non-negative, got {0}")]
    NegativeTemperature(f64),

    /// A cubic spline was evaluated outside the range it was built from.
    /// Per invariant I5, the action spline S₃(T) is never extrapolated.
    #[error("spline evaluated at {at} outside sampled range [{low}, {high}]")]
    OutsideSplineRange {
        /// The argument the spline was evaluated at.
        at: f64,
        /// Lower end of the sampled range.
        low: f64,
        /// Upper end of the sampled range.
        high: f64,
    },

    /// A spline was asked to fit fewer than the minimum number of samples
    /// it needs to determine its coefficients.
    #[error("need at least {needed} samples to fit a spline, got {got}")]
    NotEnoughSamples {
        /// Minimum number of samples required.
        needed: usize,
        /// Number of samples actually supplied.
        got: usize,
    },

    /// An error that originates outside this crate, most commonly from the
    /// caller-supplied [`Potential`](crate::potential::Potential)
    /// implementation (e.g. its global minimizer did not converge).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
