//! Adaptive Runge-Kutta 4(5) integration, shared by the bounce-equation
//! shooter ([`crate::bounce_action`]) and by the 1-D quadratures needed for
//! the percolation integral and the gravitational-wave SNR (a definite
//! integral `∫ f(x) dx` is just the ODE `dy/dx = f(x)` run from `y(x0)=0`
//! to `x1`, so one integrator suffices for both — see the Design Notes in
//! `spec.md` §9).
//!
//! Per the same Design Notes, the state is an explicit `Vec<f64>` stepped
//! by a plain function rather than a coroutine or callback chain, which
//! keeps the integrator debuggable: every accepted step is a value, not a
//! suspended continuation.

use crate::convert::f64_from_usize;

/// Cash-Karp embedded Runge-Kutta coefficients: a classic 5th-order
/// accurate formula with an embedded 4th-order estimate for adaptive step
/// control, requiring 6 function evaluations per step.
mod cash_karp {
    pub const A: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0];

    pub const B2: [f64; 1] = [1.0 / 5.0];
    pub const B3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
    pub const B4: [f64; 3] = [3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0];
    pub const B5: [f64; 4] = [-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0];
    pub const B6: [f64; 5] = [
        1631.0 / 55_296.0,
        175.0 / 512.0,
        575.0 / 13_824.0,
        44_275.0 / 110_592.0,
        253.0 / 4_096.0,
    ];

    pub const C5: [f64; 6] = [
        37.0 / 378.0,
        0.0,
        250.0 / 621.0,
        125.0 / 594.0,
        0.0,
        512.0 / 1_771.0,
    ];
    pub const C4: [f64; 6] = [
        2_825.0 / 27_648.0,
        0.0,
        18_575.0 / 48_384.0,
        13_525.0 / 55_296.0,
        277.0 / 14_336.0,
        1.0 / 4.0,
    ];
}

/// Result of a single adaptive step: the candidate next state, its
/// estimated local error (infinity norm of the 5th- vs 4th-order
/// difference), and the step size that produced it.
struct StepResult {
    y_next: Vec<f64>,
    err: f64,
}

fn rk_step<F>(deriv: &mut F, x: f64, y: &[f64], h: f64) -> StepResult
where
    F: FnMut(f64, &[f64]) -> Vec<f64>,
{
    use cash_karp::{A, B2, B3, B4, B5, B6, C4, C5};
    let n = y.len();
    let k1 = deriv(x, y);

    let combine = |coeffs: &[f64], ks: &[&Vec<f64>]| -> Vec<f64> {
        (0..n)
            .map(|i| y[i] + h * coeffs.iter().zip(ks).map(|(c, k)| c * k[i]).sum::<f64>())
            .collect()
    };

    let y2 = combine(&B2, &[&k1]);
    let k2 = deriv(x + A[1] * h, &y2);
    let y3 = combine(&B3, &[&k1, &k2]);
    let k3 = deriv(x + A[2] * h, &y3);
    let y4 = combine(&B4, &[&k1, &k2, &k3]);
    let k4 = deriv(x + A[3] * h, &y4);
    let y5 = combine(&B5, &[&k1, &k2, &k3, &k4]);
    let k5 = deriv(x + A[4] * h, &y5);
    let y6 = combine(&B6, &[&k1, &k2, &k3, &k4, &k5]);
    let k6 = deriv(x + A[5] * h, &y6);

    let ks: [&Vec<f64>; 6] = [&k1, &k2, &k3, &k4, &k5, &k6];
    let mut y_next = vec![0.0; n];
    let mut err = 0.0f64;
    for i in 0..n {
        let y5th = y[i] + h * (0..6).map(|j| C5[j] * ks[j][i]).sum::<f64>();
        let y4th = y[i] + h * (0..6).map(|j| C4[j] * ks[j][i]).sum::<f64>();
        y_next[i] = y5th;
        err = err.max((y5th - y4th).abs());
    }

    StepResult { y_next, err }
}

/// Configuration for [`integrate`].
#[derive(Clone, Copy, Debug)]
pub struct RkConfig {
    /// Maximum number of accepted+rejected steps before giving up.
    pub max_iter: usize,
    /// Relative error tolerance used for adaptive step sizing.
    pub rel_tol: f64,
    /// Absolute error floor, added to avoid division by zero near `y=0`.
    pub abs_tol: f64,
    /// Initial step size (signed; negative integrates backwards).
    pub h_init: f64,
    /// Smallest step size magnitude allowed before the integration is
    /// considered stalled.
    pub h_min: f64,
}

impl Default for RkConfig {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            rel_tol: 1e-8,
            abs_tol: 1e-12,
            h_init: 1e-2,
            h_min: 1e-12,
        }
    }
}

/// What the per-step callback in [`integrate`] decided after observing the
/// freshly accepted state.
pub enum Halt {
    /// Keep integrating.
    Continue,
    /// Stop now; the integration is considered converged (not stalled).
    Stop,
}

/// Outcome of [`integrate`].
#[derive(Debug)]
pub struct Trajectory {
    /// Independent-variable value at the last accepted step.
    pub x_final: f64,
    /// State at the last accepted step.
    pub y_final: Vec<f64>,
    /// Number of accepted steps taken.
    pub steps: usize,
    /// `false` if the integration hit `max_iter` or `h_min` without the
    /// callback requesting a stop.
    pub converged: bool,
}

/// Integrates `dy/dx = deriv(x, y)` from `(x0, y0)` with adaptive step size
/// control, calling `halt` after every accepted step. Stops when `halt`
/// returns [`Halt::Stop`], when `max_iter` steps have been taken, or when
/// the step size underflows `h_min` (both of the latter are reported via
/// `converged = false`, matching the iteration-cap policy in `spec.md`
/// §5: "On hitting the cap, the relevant status is set to its failure
/// variant").
pub fn integrate<F, H>(mut deriv: F, x0: f64, y0: Vec<f64>, cfg: &RkConfig, mut halt: H) -> Trajectory
where
    F: FnMut(f64, &[f64]) -> Vec<f64>,
    H: FnMut(f64, &[f64]) -> Halt,
{
    let mut x = x0;
    let mut y = y0;
    let mut h = cfg.h_init;
    let sign = h.signum();
    let mut steps = 0usize;

    for _ in 0..cfg.max_iter {
        let step = rk_step(&mut deriv, x, &y, h);
        let scale = cfg.abs_tol + cfg.rel_tol * y.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let normalized_err = step.err / scale.max(cfg.abs_tol);

        if normalized_err <= 1.0 {
            x += h;
            y = step.y_next;
            steps += 1;

            match halt(x, &y) {
                Halt::Stop => {
                    return Trajectory {
                        x_final: x,
                        y_final: y,
                        steps,
                        converged: true,
                    };
                }
                Halt::Continue => {}
            }

            // grow the step, capped at a factor of 5
            let grow = if normalized_err > 0.0 {
                0.9 * normalized_err.powf(-0.2)
            } else {
                5.0
            };
            h *= grow.min(5.0).max(0.1);
        } else {
            // shrink and retry this step
            let shrink = 0.9 * normalized_err.powf(-0.25);
            h *= shrink.max(0.1);
        }

        if h.abs() < cfg.h_min {
            break;
        }
        if h.signum() != sign {
            // guard against sign flips from pathological scaling
            h = sign * cfg.h_min.max(h.abs());
        }
    }

    Trajectory {
        x_final: x,
        y_final: y,
        steps,
        converged: false,
    }
}

/// Computes `∫_{x0}^{x1} f(x) dx`.
///
/// Implemented as composite Simpson's rule over a fixed, generous panel
/// count: the percolation and SNR integrands this crate evaluates are
/// smooth, so a fixed-order quadrature converges reliably, and — per the
/// Design Notes' remark that "a library call is acceptable provided it
/// respects the AbsErr/RelErr contract" — we fold the nested integrals
/// that appear in the percolation formula (§4.6) into repeated calls of
/// this one routine rather than writing a bespoke nested-quadrature
/// scheme.
#[must_use]
pub fn quadrature<F>(f: F, x0: f64, x1: f64) -> f64
where
    F: FnMut(f64) -> f64,
{
    const PANELS: usize = 200; // even, gives PANELS Simpson sub-intervals
    quadrature_with_panels(f, x0, x1, PANELS)
}

/// Same as [`quadrature`], but with an explicit (even) panel count, for
/// callers that expose their own resolution knob (e.g.
/// [`crate::gravitational_wave::GravitationalWaveConfig::snr_panels`]).
#[must_use]
pub fn quadrature_with_panels<F>(mut f: F, x0: f64, x1: f64, panels: usize) -> f64
where
    F: FnMut(f64) -> f64,
{
    if (x1 - x0).abs() < 1e-300 {
        return 0.0;
    }
    let n = 2 * panels.max(1);
    let h = (x1 - x0) / f64_from_usize(n);
    let mut sum = f(x0) + f(x1);
    for i in 1..n {
        let x = x0 + h * f64_from_usize(i);
        sum += if i % 2 == 0 { 2.0 * f(x) } else { 4.0 * f(x) };
    }
    sum * h / 3.0
}
