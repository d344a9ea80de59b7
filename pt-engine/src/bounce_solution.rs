//! The temperature-scan driver (`spec.md` §4.5-4.6).
//!
//! Given a coexisting-phase pair, samples the bounce action `S(T)` over
//! `(T_low, T_c)`, fits a natural cubic spline to it, and from that spline
//! derives the nucleation/percolation/completion temperatures, the
//! transition strength `α_PT`, the bubble-wall velocity `v_w`, and the
//! inverse time scale `β/H`.

use crate::bounce_action::{solve_bounce_action, ActionStatus, BounceActionConfig};
use crate::convert::f64_from_usize;
use crate::error::Error;
use crate::ode::quadrature;
use crate::phase::Phase;
use crate::potential::{FieldVec, Potential};
use crate::spline::{ConstantVelocitySpline, NaturalCubicSpline};
use log::{debug, warn};

/// Picks the sign image of `phi_t` under the potential's discrete symmetry
/// group closest (Euclidean) to `phi_f`, ties broken by the lowest index
/// into `symmetry_elements()` — identity (no symmetry applied) counts as
/// the lowest index, so it wins unless some element does strictly better.
fn select_symmetric_image(potential: &dyn Potential, phi_t: &FieldVec, phi_f: &FieldVec) -> FieldVec {
    let mut best = phi_t.clone();
    let mut best_dist = (phi_t - phi_f).dot(&(phi_t - phi_f));
    for m in potential.symmetry_elements() {
        let image = m.dot(phi_t);
        let dist = (&image - phi_f).dot(&(&image - phi_f));
        if dist < best_dist {
            best_dist = dist;
            best = image;
        }
    }
    best
}

/// Reduced Planck mass, GeV (`spec.md` I7's `M_Pl`).
const M_PL: f64 = 2.435e18;

/// Whether a bisected threshold temperature was bracketed in the sampled
/// range.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub enum StatusTemperature {
    /// The target value was bracketed and the bisection converged.
    Success,
    /// The target was never bracketed in the sampled `(T, S)` range.
    NotMet,
}

/// Whether enough `(T, S)` samples were collected to fit `S₃(T)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub enum StatusGW {
    /// At least 4 samples; `S₃(T)` is fit and derived temperatures are
    /// attempted.
    Success,
    /// Fewer than 4 samples; no spline, all derived temperatures `NotMet`.
    Failure,
}

/// One accepted `(T, S(T))` sample from the scan, keeping the converged
/// path so a neighboring temperature can warm-start from it.
#[derive(Clone, Debug)]
pub struct TemperatureSample {
    /// Temperature, GeV.
    pub t: f64,
    /// Bounce action at `t`.
    pub action: f64,
    /// The converged tunneling path at `t`.
    pub path: ConstantVelocitySpline,
}

/// Tuning knobs for [`solve_bounce_solution`].
#[derive(Clone, Debug)]
pub struct BounceSolutionConfig {
    /// Settings forwarded to [`solve_bounce_action`] at each sampled `T`.
    pub bounce: BounceActionConfig,
    /// `N` in the initial scan (`spec.md` default 25).
    pub number_of_initial_scan_temperatures: usize,
    /// Cap on secondary gap-filling passes.
    pub secondary_scan_passes: usize,
    /// `S/T` below which the initial scan stops early ("deep in
    /// nucleation").
    pub st_stop_early: f64,
    /// `S/T` gap between neighboring samples above which a secondary
    /// midpoint sample is inserted.
    pub st_gap_threshold: f64,
    /// Evaluation cap for each extrapolation scan.
    pub extrapolation_max_iter: usize,
    /// Relativistic degrees of freedom `g*` used in `ρ_γ` and `H(T)`.
    pub g_star: f64,
    /// Percolation threshold (default `0.71`).
    pub perc_prbl: f64,
    /// Completion threshold (default `0.01`).
    pub compl_prbl: f64,
    /// Relative temperature tolerance for threshold bisections
    /// (`spec.md`: "10⁻² (×0.1 safety)").
    pub temp_rel_tol: f64,
    /// `v_w` input: sentinels `-1`/`-2`, else a value in `(0, 1]`.
    pub v_w: f64,
    /// `ε_turb` input: sentinel `-1`, else a value in `[0, 1]`.
    pub eps_turb: f64,
    /// Iteration cap for the `α_PT`/`v_w` fixed-point recursion.
    pub fixed_point_max_iter: usize,
    /// Relative convergence tolerance for the fixed-point recursion.
    pub fixed_point_tol: f64,
}

impl Default for BounceSolutionConfig {
    fn default() -> Self {
        Self {
            bounce: BounceActionConfig::default(),
            number_of_initial_scan_temperatures: 25,
            secondary_scan_passes: 2,
            st_stop_early: 40.0,
            st_gap_threshold: 20.0,
            extrapolation_max_iter: 20,
            g_star: 106.75,
            perc_prbl: 0.71,
            compl_prbl: 0.01,
            temp_rel_tol: 1e-2 * 0.1,
            v_w: -1.0,
            eps_turb: -1.0,
            fixed_point_max_iter: 20,
            fixed_point_tol: 1e-7,
        }
    }
}

/// Radiation energy density `ρ_γ(T) = (π²/30)·g*·T⁴`.
#[must_use]
pub fn rho_gamma(g_star: f64, t: f64) -> f64 {
    std::f64::consts::PI.powi(2) / 30.0 * g_star * t.powi(4)
}

/// Hubble rate in radiation domination, `H(T) = π·√(g*/90)·T²/M_Pl`.
#[must_use]
pub fn hubble(g_star: f64, t: f64) -> f64 {
    std::f64::consts::PI * (g_star / 90.0).sqrt() * t * t / M_PL
}

/// Tunneling rate per unit volume per unit time, `Γ(T) = T⁴(S/2πT)^{3/2}
/// e^{-S/T}` (`spec.md` I6).
#[must_use]
pub fn gamma_rate(s: f64, t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    t.powi(4) * (s / (2.0 * std::f64::consts::PI * t)).powf(1.5) * (-s / t).exp()
}

/// The result of a whole `BounceSolution` solve.
#[derive(Clone, Debug)]
pub struct BounceSolution {
    /// Samples collected during the scan, sorted by temperature.
    pub samples: Vec<TemperatureSample>,
    /// `S₃(T)`, if at least 4 samples were collected.
    pub s3: Option<NaturalCubicSpline>,
    /// Whether `s3` could be fit.
    pub status_gw: StatusGW,
    /// Critical temperature the scan started from.
    pub t_c: f64,
    /// Approximate nucleation temperature (`S/T = 140`).
    pub t_n_approx: Option<f64>,
    /// Status of [`BounceSolution::t_n_approx`].
    pub status_t_n_approx: StatusTemperature,
    /// Exact nucleation temperature (`Γ/H⁴ = 1`).
    pub t_n: Option<f64>,
    /// Status of [`BounceSolution::t_n`].
    pub status_t_n: StatusTemperature,
    /// Percolation temperature (`P_f = perc_prbl`).
    pub t_p: Option<f64>,
    /// Status of [`BounceSolution::t_p`].
    pub status_t_p: StatusTemperature,
    /// Completion temperature (`P_f = compl_prbl`).
    pub t_f: Option<f64>,
    /// Status of [`BounceSolution::t_f`].
    pub status_t_f: StatusTemperature,
    /// Transition strength, evaluated at the fixed-point temperature.
    pub alpha_pt: Option<f64>,
    /// Inverse time scale at `t_p`.
    pub beta_over_h: Option<f64>,
    /// `v_w` actually used (after resolving sentinels).
    pub v_w_used: f64,
    /// `ε_turb` actually used (after resolving the sentinel).
    pub eps_turb_used: f64,
}

impl BounceSolution {
    /// Resolves the `v_w` sentinels documented in `spec.md` §4.6/§9 to a
    /// concrete wall velocity.
    ///
    /// `-1`: `v_w = min(√((V_F−V_T)/(α·ρ_γ)), 1)`.
    /// `-2`: an upper-bound ansatz combining `ψ = ∂ₜV_T/∂ₜV_F` and the
    /// Chapman-Jouguet velocity `v_CJ`; references 1704.05871/2305.02357
    /// were not available to this implementation, so the combination below
    /// is held constant as a documented ansatz rather than re-derived (see
    /// `DESIGN.md`).
    /// Anything in `(0, 1]`: used as-is.
    #[must_use]
    pub fn wall_velocity_bound(sentinel: f64, alpha: f64, v_f_minus_v_t: f64, rho_gamma: f64, psi: f64) -> f64 {
        let cs = 1.0 / 3f64.sqrt();
        let v_cj = (cs + (alpha * alpha + 2.0 * alpha / 3.0).sqrt()) / (1.0 + alpha);
        if (sentinel + 1.0).abs() < 1e-9 {
            (v_f_minus_v_t / (alpha * rho_gamma).max(1e-300)).sqrt().min(1.0)
        } else if (sentinel + 2.0).abs() < 1e-9 {
            (v_cj * (1.0 + 0.5 * psi.abs())).min(1.0).max(cs)
        } else {
            sentinel.clamp(1e-6, 1.0)
        }
    }
}

fn alpha_pt(potential: &dyn Potential, false_phase: &Phase, true_phase: &Phase, g_star: f64, t: f64) -> Option<(f64, f64, f64, f64)> {
    let phi_f = false_phase.point_at(t)?;
    let phi_t = true_phase.point_at(t)?;
    let v_f = potential.v(&phi_f, t);
    let v_t = potential.v(&phi_t, t);
    let dv_f = potential.dv_dt(&phi_f, t);
    let dv_t = potential.dv_dt(&phi_t, t);
    let rho = rho_gamma(g_star, t);
    let alpha = (v_f - v_t - (t / 4.0) * (dv_f - dv_t)) / rho;
    Some((alpha, v_f - v_t, dv_t, dv_f))
}

fn false_vacuum_fraction(t: f64, t_upper: f64, v_w: f64, s3: &NaturalCubicSpline, g_star: f64) -> f64 {
    if t >= t_upper {
        return 1.0;
    }
    let lo = s3.x_min();
    let hi = s3.x_max();
    let integrand = |t_prime: f64| -> f64 {
        let t_prime = t_prime.clamp(lo, hi);
        let Ok(s) = s3.evaluate(t_prime) else {
            return 0.0;
        };
        let gamma = gamma_rate(s, t_prime);
        let h = hubble(g_star, t_prime);
        let inner = quadrature(|t_pp| 1.0 / hubble(g_star, t_pp.clamp(lo, hi)), t, t_prime);
        gamma / (t_prime.powi(4) * h) * inner.powi(3)
    };
    let integral = quadrature(integrand, t, t_upper);
    let i_t = (4.0 * std::f64::consts::PI / 3.0) * v_w.powi(3) * integral;
    (-i_t).exp()
}

/// Bisects a monotone `f` for `f(t) = target` over `[lo, hi]`.
fn bisect_monotone<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, target: f64, rel_tol: f64) -> Option<f64> {
    let f_lo = f(lo) - target;
    let f_hi = f(hi) - target;
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }
    let (mut a, mut b) = (lo, hi);
    let (mut fa, _fb) = (f_lo, f_hi);
    for _ in 0..100 {
        let mid = 0.5 * (a + b);
        let fm = f(mid) - target;
        if (b - a).abs() < rel_tol * hi.abs().max(1.0) {
            return Some(mid);
        }
        if fm == 0.0 {
            return Some(mid);
        }
        if fm.signum() == fa.signum() {
            a = mid;
            fa = fm;
        } else {
            b = mid;
        }
    }
    Some(0.5 * (a + b))
}

fn warp_knots(prev: &ConstantVelocitySpline, new_true: &crate::potential::FieldVec, new_false: &crate::potential::FieldVec) -> Option<ConstantVelocitySpline> {
    let old_true = prev.gamma(0.0).ok()?;
    let old_false = prev.gamma(prev.length()).ok()?;
    let denom = prev.length().max(1e-300);
    let n = 16;
    let mut knots = Vec::with_capacity(n);
    for i in 0..n {
        let l = prev.length() * f64_from_usize(i) / f64_from_usize(n - 1);
        let old_pt = prev.gamma(l).ok()?;
        let frac = l / denom;
        // affine warp: map old_true/old_false onto new_true/new_false and
        // carry the interior shape along for the ride.
        let baseline = &old_true + &((&old_false - &old_true) * frac);
        let offset = &old_pt - &baseline;
        let new_baseline = new_true + &((new_false - new_true) * frac);
        knots.push(new_baseline + offset);
    }
    ConstantVelocitySpline::new(&knots).ok()
}

/// Samples `S(T)` over `(t_low, t_c)`, fits `S₃(T)`, and derives all
/// downstream temperatures for one coexisting-phase pair.
#[must_use]
pub fn solve_bounce_solution(
    potential: &dyn Potential,
    false_phase: &Phase,
    true_phase: &Phase,
    t_low: f64,
    t_c: f64,
    cfg: &BounceSolutionConfig,
) -> BounceSolution {
    let mut samples: Vec<TemperatureSample> = Vec::new();
    let mut prev_path: Option<ConstantVelocitySpline> = None;

    let n = cfg.number_of_initial_scan_temperatures.max(2);
    for i in 0..n {
        let frac = f64_from_usize(i + 1) / f64_from_usize(n);
        let t = t_c - (t_c - t_low) * frac;
        if t < 0.0 {
            continue;
        }
        let (Some(phi_t), Some(phi_f)) = (true_phase.point_at(t), false_phase.point_at(t)) else {
            continue;
        };
        let phi_t = select_symmetric_image(potential, &phi_t, &phi_f);
        let alpha = if t > 0.0 { 2.0 } else { 3.0 };
        let init_path = prev_path.as_ref().and_then(|p| warp_knots(p, &phi_t, &phi_f));
        let result = solve_bounce_action(potential, &phi_t, &phi_f, init_path.as_ref(), t, alpha, &cfg.bounce);
        match (result.status, result.action) {
            (ActionStatus::Success, Some(s)) => {
                prev_path = Some(result.path.clone());
                samples.push(TemperatureSample { t, action: s, path: result.path });
                if t > 0.0 && s / t < cfg.st_stop_early {
                    debug!("bounce scan: S/T={} below stop-early threshold at T={t}", s / t);
                    break;
                }
            }
            _ => {
                warn!("bounce scan: no converged action at T={t} ({:?})", result.status);
            }
        }
    }

    samples.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());

    for _pass in 0..cfg.secondary_scan_passes {
        let mut inserted = Vec::new();
        for w in samples.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            let gap = (a.action / a.t.max(1e-300) - b.action / b.t.max(1e-300)).abs();
            if gap > cfg.st_gap_threshold {
                let t = 0.5 * (a.t + b.t);
                if let (Some(phi_t), Some(phi_f)) = (true_phase.point_at(t), false_phase.point_at(t)) {
                    let phi_t = select_symmetric_image(potential, &phi_t, &phi_f);
                    let alpha = if t > 0.0 { 2.0 } else { 3.0 };
                    let init_path = warp_knots(&a.path, &phi_t, &phi_f);
                    let result = solve_bounce_action(potential, &phi_t, &phi_f, init_path.as_ref(), t, alpha, &cfg.bounce);
                    if let (ActionStatus::Success, Some(s)) = (result.status, result.action) {
                        inserted.push(TemperatureSample { t, action: s, path: result.path });
                    }
                }
            }
        }
        if inserted.is_empty() {
            break;
        }
        samples.extend(inserted);
        samples.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());
        samples.dedup_by(|a, b| (a.t - b.t).abs() < 1e-9);
    }

    if samples.len() < 4 {
        return BounceSolution {
            samples,
            s3: None,
            status_gw: StatusGW::Failure,
            t_c,
            t_n_approx: None,
            status_t_n_approx: StatusTemperature::NotMet,
            t_n: None,
            status_t_n: StatusTemperature::NotMet,
            t_p: None,
            status_t_p: StatusTemperature::NotMet,
            t_f: None,
            status_t_f: StatusTemperature::NotMet,
            alpha_pt: None,
            beta_over_h: None,
            v_w_used: cfg.v_w.clamp(1e-6, 1.0),
            eps_turb_used: cfg.eps_turb.clamp(0.0, 1.0),
        };
    }

    let ts: Vec<f64> = samples.iter().map(|s| s.t).collect();
    let ss: Vec<f64> = samples.iter().map(|s| s.action).collect();
    let Ok(s3) = NaturalCubicSpline::new(ts, ss) else {
        return BounceSolution {
            samples,
            s3: None,
            status_gw: StatusGW::Failure,
            t_c,
            t_n_approx: None,
            status_t_n_approx: StatusTemperature::NotMet,
            t_n: None,
            status_t_n: StatusTemperature::NotMet,
            t_p: None,
            status_t_p: StatusTemperature::NotMet,
            t_f: None,
            status_t_f: StatusTemperature::NotMet,
            alpha_pt: None,
            beta_over_h: None,
            v_w_used: cfg.v_w.clamp(1e-6, 1.0),
            eps_turb_used: cfg.eps_turb.clamp(0.0, 1.0),
        };
    };

    let lo = s3.x_min();
    let hi = s3.x_max();

    let t_n_approx = bisect_monotone(|t| s3.evaluate(t).map(|s| s / t).unwrap_or(f64::INFINITY), lo, hi, 140.0, cfg.temp_rel_tol);
    let t_n = bisect_monotone(
        |t| {
            let s = s3.evaluate(t).unwrap_or(f64::INFINITY);
            gamma_rate(s, t) / hubble(cfg.g_star, t).powi(4)
        },
        lo,
        hi,
        1.0,
        cfg.temp_rel_tol,
    );

    // fixed point on (T*, v_w): seed at the highest sampled T, resolve
    // v_w's sentinel there, find the percolation temperature under that
    // v_w, then re-evaluate at the new T* until v_w stabilizes.
    let mut t_star = hi;
    let mut v_w = cfg.v_w.clamp(1e-6, 1.0).max(1e-6);
    let mut alpha_val = None;
    let mut converged = false;
    for _ in 0..cfg.fixed_point_max_iter {
        let Some((alpha, v_f_minus_v_t, dv_t, dv_f)) = alpha_pt(potential, false_phase, true_phase, cfg.g_star, t_star) else {
            break;
        };
        alpha_val = Some(alpha);
        let psi = if dv_f.abs() > 1e-300 { dv_t / dv_f } else { 0.0 };
        let rho = rho_gamma(cfg.g_star, t_star);
        let new_v_w = BounceSolution::wall_velocity_bound(cfg.v_w, alpha, v_f_minus_v_t, rho, psi);
        let new_t_star = bisect_monotone(|t| false_vacuum_fraction(t, hi, new_v_w, &s3, cfg.g_star), lo, hi, cfg.perc_prbl, cfg.temp_rel_tol).unwrap_or(t_star);
        let rel_change = (new_v_w / v_w.max(1e-300) - 1.0).abs();
        v_w = new_v_w;
        t_star = new_t_star;
        if rel_change < cfg.fixed_point_tol {
            converged = true;
            break;
        }
    }
    if !converged {
        warn!("alpha_PT/v_w fixed point did not converge within {} iterations, falling back to v_w=0.95", cfg.fixed_point_max_iter);
        v_w = 0.95;
    }

    let t_p = bisect_monotone(|t| false_vacuum_fraction(t, hi, v_w, &s3, cfg.g_star), lo, hi, cfg.perc_prbl, cfg.temp_rel_tol);
    let t_f = bisect_monotone(|t| false_vacuum_fraction(t, hi, v_w, &s3, cfg.g_star), lo, hi, cfg.compl_prbl, cfg.temp_rel_tol);

    let beta_over_h = t_p.and_then(|tp| {
        let h = 1e-3 * (hi - lo).max(1.0);
        let tp_clamped = tp.clamp(lo + h, hi - h);
        let f = |t: f64| s3.evaluate(t).ok().map(|s| s / t);
        let (up, down) = (f(tp_clamped + h)?, f(tp_clamped - h)?);
        Some(tp * (up - down) / (2.0 * h))
    });

    let eps_turb_used = if (cfg.eps_turb + 1.0).abs() < 1e-9 {
        alpha_val.map_or(0.05, |a| (0.05 * a / (a + 1.0)).min(1.0))
    } else {
        cfg.eps_turb.clamp(0.0, 1.0)
    };

    BounceSolution {
        samples,
        s3: Some(s3),
        status_gw: StatusGW::Success,
        t_c,
        t_n_approx,
        status_t_n_approx: if t_n_approx.is_some() { StatusTemperature::Success } else { StatusTemperature::NotMet },
        t_n,
        status_t_n: if t_n.is_some() { StatusTemperature::Success } else { StatusTemperature::NotMet },
        t_p,
        status_t_p: if t_p.is_some() { StatusTemperature::Success } else { StatusTemperature::NotMet },
        t_f,
        status_t_f: if t_f.is_some() { StatusTemperature::Success } else { StatusTemperature::NotMet },
        alpha_pt: alpha_val,
        beta_over_h,
        v_w_used: v_w,
        eps_turb_used,
    }
}

/// Evaluates `S₃(T)` outside the sampled range, which is a developer error
/// rather than a recoverable status (`spec.md` §7: "DomainViolation ...
/// these throw").
///
/// # Errors
///
/// Returns [`Error::OutsideSplineRange`] if `t` lies outside `s3`'s
/// sampled domain.
pub fn action_at(s3: &NaturalCubicSpline, t: f64) -> Result<f64, Error> {
    s3.evaluate(t).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rho_gamma_and_hubble_scale_as_expected() {
        assert!((rho_gamma(100.0, 1.0) - std::f64::consts::PI.powi(2) / 30.0 * 100.0).abs() < 1e-9);
        assert!(hubble(100.0, 2.0) > hubble(100.0, 1.0));
    }

    #[test]
    fn symmetric_image_prefers_identity_on_ties() {
        use ndarray::array;
        let phi_t = array![1.0, 2.0];
        let phi_f = array![0.0, 0.0];
        // the identity element changes nothing, so it must win the tie.
        let symmetry_elements: Vec<crate::potential::FieldMat> = vec![array![[1.0, 0.0], [0.0, 1.0]]];
        let chosen = select_symmetric_image_for_test(&symmetry_elements, &phi_t, &phi_f);
        assert_eq!(chosen, phi_t);
    }

    #[test]
    fn symmetric_image_picks_the_closer_sign_flip() {
        use ndarray::array;
        // true vacuum at (1, -2), false vacuum at (0, 3): the phi_2 -> -phi_2
        // image (1, 2) sits closer to the false vacuum than the raw point.
        let phi_t = array![1.0, -2.0];
        let phi_f = array![0.0, 3.0];
        let symmetry_elements: Vec<crate::potential::FieldMat> = vec![array![[1.0, 0.0], [0.0, -1.0]]];
        let chosen = select_symmetric_image_for_test(&symmetry_elements, &phi_t, &phi_f);
        assert!((chosen[0] - 1.0).abs() < 1e-12);
        assert!((chosen[1] - 2.0).abs() < 1e-12);
    }

    fn select_symmetric_image_for_test(elements: &[crate::potential::FieldMat], phi_t: &FieldVec, phi_f: &FieldVec) -> FieldVec {
        use crate::potential::{FieldMat, PotentialError};

        struct Stub {
            elements: Vec<FieldMat>,
        }
        impl Potential for Stub {
            fn dim(&self) -> usize {
                2
            }
            fn v(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn grad_v(&self, phi: &FieldVec, _t: f64) -> FieldVec {
                phi.clone()
            }
            fn hess_v(&self, _phi: &FieldVec, _t: f64) -> FieldMat {
                ndarray::Array2::eye(2)
            }
            fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn global_min(&self, _t: f64) -> Result<FieldVec, PotentialError> {
                Ok(ndarray::Array1::zeros(2))
            }
            fn symmetry_elements(&self) -> &[FieldMat] {
                &self.elements
            }
        }
        let stub = Stub { elements: elements.to_vec() };
        select_symmetric_image(&stub, phi_t, phi_f)
    }

    #[test]
    fn z2_symmetric_potential_gives_an_action_invariant_under_the_symmetry() {
        use crate::minimum::Minimum;
        use crate::potential::{FieldMat, PotentialError};
        use ndarray::array;

        /// `V(φ1,φ2) = ½φ1² − φ1³ + ¼φ1⁴ + ¼(φ2²−1)²`: the first field is
        /// the same cubic-quartic well as `bounce_action`'s test potential
        /// (`m2=1,A=3,λ=1`), the second a double well with degenerate
        /// minima at `φ2=±1`, so `V` is invariant under `φ2 → −φ2`.
        struct Z2TwoField {
            elements: Vec<FieldMat>,
        }
        impl Potential for Z2TwoField {
            fn dim(&self) -> usize {
                2
            }
            fn v(&self, phi: &FieldVec, _t: f64) -> f64 {
                let (x, y) = (phi[0], phi[1]);
                0.5 * x * x - x.powi(3) + 0.25 * x.powi(4) + 0.25 * (y * y - 1.0).powi(2)
            }
            fn grad_v(&self, phi: &FieldVec, _t: f64) -> FieldVec {
                let (x, y) = (phi[0], phi[1]);
                array![x - 3.0 * x * x + x.powi(3), y * (y * y - 1.0)]
            }
            fn hess_v(&self, phi: &FieldVec, _t: f64) -> FieldMat {
                let (x, y) = (phi[0], phi[1]);
                array![[1.0 - 6.0 * x + 3.0 * x * x, 0.0], [0.0, 3.0 * y * y - 1.0]]
            }
            fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn global_min(&self, _t: f64) -> Result<FieldVec, PotentialError> {
                Ok(array![0.0, 1.0])
            }
            fn symmetry_elements(&self) -> &[FieldMat] {
                &self.elements
            }
        }

        fn phase_at_fixed_point(t_low: f64, t_high: f64, point: FieldVec) -> Phase {
            Phase {
                id: 0,
                t_low,
                t_high,
                minima: vec![
                    Minimum { point: point.clone(), t: t_low, v: 0.0, is_global_min: false, edge_marker: 1 },
                    Minimum { point, t: t_high, v: 0.0, is_global_min: false, edge_marker: -1 },
                ],
                glob_min_end: None,
            }
        }

        let pot = Z2TwoField { elements: vec![array![[1.0, 0.0], [0.0, -1.0]]] };
        let other_minimum = (3.0 + 5.0f64.sqrt()) / 2.0; // other_minimum(CubicPotential{1,3,1})
        let false_vac = array![0.0, 1.0];
        let true_vac_plus = array![other_minimum, 1.0];
        let true_vac_minus = array![other_minimum, -1.0];

        let t_low = 0.0;
        let t_c = 5.0;
        let false_phase = phase_at_fixed_point(t_low, t_c, false_vac);
        let true_phase_plus = phase_at_fixed_point(t_low, t_c, true_vac_plus);
        let true_phase_minus = phase_at_fixed_point(t_low, t_c, true_vac_minus);

        let cfg = BounceSolutionConfig {
            number_of_initial_scan_temperatures: 4,
            secondary_scan_passes: 0,
            ..BounceSolutionConfig::default()
        };

        let sol_plus = solve_bounce_solution(&pot, &false_phase, &true_phase_plus, t_low, t_c, &cfg);
        let sol_minus = solve_bounce_solution(&pot, &false_phase, &true_phase_minus, t_low, t_c, &cfg);

        assert!(!sol_plus.samples.is_empty(), "expected at least one converged sample");
        assert_eq!(sol_plus.samples.len(), sol_minus.samples.len());
        for (a, b) in sol_plus.samples.iter().zip(sol_minus.samples.iter()) {
            assert!((a.t - b.t).abs() < 1e-9);
            assert!(
                (a.action - b.action).abs() < 1e-4,
                "action differs between symmetry images at T={}: {} vs {}",
                a.t,
                a.action,
                b.action
            );
        }
    }

    #[test]
    fn gamma_rate_vanishes_for_large_action() {
        assert!(gamma_rate(1000.0, 100.0) < 1e-10);
    }

    #[test]
    fn wall_velocity_sentinel_minus_one_is_bounded_by_one() {
        let v = BounceSolution::wall_velocity_bound(-1.0, 0.2, 1e8, 1e6, 0.0);
        assert!(v <= 1.0 && v > 0.0);
    }

    #[test]
    fn wall_velocity_plain_value_passes_through() {
        let v = BounceSolution::wall_velocity_bound(0.6, 0.2, 1e8, 1e6, 0.0);
        assert!((v - 0.6).abs() < 1e-12);
    }

    #[test]
    fn bisect_monotone_finds_known_root() {
        let t = bisect_monotone(|x| x * x, 0.0, 10.0, 16.0, 1e-6).unwrap();
        assert!((t - 4.0).abs() < 1e-3);
    }

    #[test]
    fn bisect_monotone_reports_none_when_not_bracketed() {
        assert!(bisect_monotone(|x| x, 0.0, 1.0, 5.0, 1e-6).is_none());
    }

    #[test]
    fn too_few_samples_reports_gw_failure() {
        // an impossible potential (false vacuum never a minimum) means the
        // scan collects zero samples.
        use crate::phase::{Phase, PhaseTracerConfig, track_phase};
        use crate::potential::{FieldMat, FieldVec, PotentialError};
        use ndarray::array;

        struct Flat;
        impl Potential for Flat {
            fn dim(&self) -> usize {
                1
            }
            fn v(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn grad_v(&self, _phi: &FieldVec, _t: f64) -> FieldVec {
                array![0.0]
            }
            fn hess_v(&self, _phi: &FieldVec, _t: f64) -> FieldMat {
                array![[0.0]]
            }
            fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn global_min(&self, _t: f64) -> Result<FieldVec, PotentialError> {
                Ok(array![0.0])
            }
            fn symmetry_elements(&self) -> &[FieldMat] {
                &[]
            }
        }

        let cfg = PhaseTracerConfig::default();
        let false_phase = track_phase(&Flat, &array![0.0], 10.0, 1.0, 1.0, &cfg).unwrap();
        let true_phase = false_phase.clone();
        let sol_cfg = BounceSolutionConfig {
            number_of_initial_scan_temperatures: 3,
            ..BounceSolutionConfig::default()
        };
        let sol = solve_bounce_solution(&Flat, &false_phase, &true_phase, 0.0, 1.0, &sol_cfg);
        assert_eq!(sol.status_gw, StatusGW::Failure);
    }
}
