//! A single continuous branch of minima of `V(φ,T)` as `T` varies, and the
//! stepping algorithm ([`track_phase`]) that traces one out.

use crate::minimum::{locate_minimum, Minimum, MinimumLocatorConfig};
use crate::potential::{smallest_eigenvalue, FieldVec, Potential};
use thiserror::Error;

/// A continuous family of minima `T ↦ φ*(T)`, bounded by `[t_low, t_high]`.
///
/// The first and last entries of `minima` carry `edge_marker = +1` and
/// `-1` respectively (invariant from `spec.md` §4.3: "Σ edge_marker over
/// phases gives phase count at T").
#[derive(Clone, Debug, serde::Serialize)]
pub struct Phase {
    /// Index of this phase within its owning [`crate::vacuum::Vacuum`].
    pub id: usize,
    /// Lowest temperature this phase was traced to.
    pub t_low: f64,
    /// Highest temperature this phase was traced to.
    pub t_high: f64,
    /// Minima making up this phase, ordered by increasing temperature.
    pub minima: Vec<Minimum>,
    /// Temperature at which this phase ceases to be the global minimum
    /// among all phases known to its owning `Vacuum` ("enforced
    /// global-minimum mode"). Filled in by [`crate::vacuum`] once the full
    /// set of phases is known, not by [`track_phase`] itself.
    pub glob_min_end: Option<f64>,
}

impl Phase {
    /// Linearly interpolates the field-space point of this phase at `t`,
    /// which must lie within `[t_low, t_high]`. Returns `None` otherwise.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Option<FieldVec> {
        if t < self.t_low || t > self.t_high {
            return None;
        }
        if self.minima.len() == 1 {
            return Some(self.minima[0].point.clone());
        }
        let idx = self
            .minima
            .iter()
            .position(|m| m.t >= t)
            .unwrap_or(self.minima.len() - 1)
            .max(1);
        let a = &self.minima[idx - 1];
        let b = &self.minima[idx];
        if (b.t - a.t).abs() < 1e-300 {
            return Some(a.point.clone());
        }
        let s = (t - a.t) / (b.t - a.t);
        Some(&a.point + &(s * (&b.point - &a.point)))
    }

    /// Linearly interpolates `V(φ*(t), t)` along this phase.
    #[must_use]
    pub fn v_at(&self, t: f64) -> Option<f64> {
        if t < self.t_low || t > self.t_high {
            return None;
        }
        if self.minima.len() == 1 {
            return Some(self.minima[0].v);
        }
        let idx = self
            .minima
            .iter()
            .position(|m| m.t >= t)
            .unwrap_or(self.minima.len() - 1)
            .max(1);
        let a = &self.minima[idx - 1];
        let b = &self.minima[idx];
        if (b.t - a.t).abs() < 1e-300 {
            return Some(a.v);
        }
        let s = (t - a.t) / (b.t - a.t);
        Some(a.v + s * (b.v - a.v))
    }
}

/// Why [`track_phase`] could not even start.
#[derive(Debug, Error)]
pub enum TrackPhaseError {
    /// No stationary point with small gradient could be located at
    /// `t_start` at all.
    #[error("could not locate a stationary point at the starting temperature")]
    NoMinimumAtStart,
    /// A stationary point was found at `t_start`, but the smallest
    /// Hessian eigenvalue there is negative, so it is not a minimum.
    #[error("stationary point at starting temperature is not a minimum (smallest eigenvalue = {0})")]
    NotAMinimumAtStart(f64),
}

/// Tuning knobs for [`track_phase`].
#[derive(Clone, Copy, Debug)]
pub struct PhaseTracerConfig {
    /// Passed through to [`locate_minimum`] at every step.
    pub locator: MinimumLocatorConfig,
    /// How many times the temperature step is halved before the phase is
    /// considered to have ended at a boundary rather than continuing.
    pub max_step_halvings: usize,
    /// Tolerance (in the line parameter) used when bisecting for the
    /// temperature at which the smallest eigenvalue crosses zero.
    pub bisection_tol: f64,
    /// Iteration cap for that bisection.
    pub bisection_max_iter: usize,
}

impl Default for PhaseTracerConfig {
    fn default() -> Self {
        Self {
            locator: MinimumLocatorConfig::default(),
            max_step_halvings: 20,
            bisection_tol: 1e-6,
            bisection_max_iter: 60,
        }
    }
}

/// Traces one continuous phase from `(phi0, t_start)` towards `t_end`,
/// taking initial steps of size `delta_t_init` (sign ignored; the
/// direction is `t_end - t_start`).
///
/// Implements `spec.md` §4.3 steps 1-3: locates the starting minimum,
/// advances in `T` re-using the previous minimum as the next guess,
/// halving the step whenever re-location fails, and bisecting for the
/// exact temperature at which the smallest Hessian eigenvalue turns
/// negative (the phase's natural end) whenever that happens before
/// `t_end` is reached.
///
/// # Errors
///
/// Returns [`TrackPhaseError`] if no minimum (or no *bona fide* minimum)
/// can be found at `t_start` at all.
pub fn track_phase(
    potential: &dyn Potential,
    phi0: &FieldVec,
    t_start: f64,
    t_end: f64,
    delta_t_init: f64,
    cfg: &PhaseTracerConfig,
) -> Result<Phase, TrackPhaseError> {
    let start = locate_minimum(potential, phi0, t_start, &cfg.locator)
        .map_err(|_| TrackPhaseError::NoMinimumAtStart)?;
    let start_eig = smallest_eigenvalue(&potential.hess_v(&start.point, t_start));
    if start_eig < 0.0 {
        return Err(TrackPhaseError::NotAMinimumAtStart(start_eig));
    }

    let direction = (t_end - t_start).signum();
    if direction == 0.0 {
        let mut m = start;
        m.edge_marker = 0;
        return Ok(Phase {
            id: 0,
            t_low: t_start,
            t_high: t_start,
            minima: vec![m],
            glob_min_end: None,
        });
    }

    let mut minima = vec![start];
    let mut current_t = t_start;
    let mut current_phi = minima[0].point.clone();
    let mut step = delta_t_init.abs() * direction;

    loop {
        let mut next_t = current_t + step;
        if direction > 0.0 && next_t > t_end {
            next_t = t_end;
        } else if direction < 0.0 && next_t < t_end {
            next_t = t_end;
        }
        if (next_t - current_t).abs() < 1e-300 {
            break;
        }

        match locate_minimum(potential, &current_phi, next_t, &cfg.locator) {
            Ok(candidate) => {
                let eig = smallest_eigenvalue(&potential.hess_v(&candidate.point, next_t));
                if eig < 0.0 {
                    if let Some(t_cross) = crate::minimum::find_zero_smallest_eigenvalue(
                        potential,
                        &current_phi,
                        current_t,
                        &candidate.point,
                        next_t,
                        cfg.bisection_tol,
                        cfg.bisection_max_iter,
                    ) {
                        if let Ok(mut end_min) =
                            locate_minimum(potential, &current_phi, t_cross, &cfg.locator)
                        {
                            end_min.edge_marker = -1;
                            minima.push(end_min);
                        }
                    }
                    break;
                }

                let mut accepted = candidate;
                current_t = next_t;
                current_phi = accepted.point.clone();
                if (next_t - t_end).abs() < 1e-12 {
                    accepted.edge_marker = -1;
                    minima.push(accepted);
                    break;
                }
                minima.push(accepted);
                step = delta_t_init.abs() * direction;
            }
            Err(_) => {
                step /= 2.0;
                let halvings_exhausted = step.abs()
                    < delta_t_init.abs() * direction.abs() / 2f64.powi(cfg.max_step_halvings as i32);
                if halvings_exhausted {
                    if let Some(last) = minima.last_mut() {
                        last.edge_marker = -1;
                    }
                    break;
                }
            }
        }
    }

    if minima.len() == 1 {
        minima[0].edge_marker = if (minima[0].t - t_end).abs() < 1e-12 {
            -1
        } else {
            1
        };
    } else {
        minima[0].edge_marker = 1;
    }

    let t_low = minima.iter().map(|m| m.t).fold(f64::INFINITY, f64::min);
    let t_high = minima.iter().map(|m| m.t).fold(f64::NEG_INFINITY, f64::max);

    Ok(Phase {
        id: 0,
        t_low,
        t_high,
        minima,
        glob_min_end: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// V(φ,T) = (φ - T)^2/2: a single phase tracking φ* = T everywhere.
    struct TrackingQuadratic;

    impl Potential for TrackingQuadratic {
        fn dim(&self) -> usize {
            1
        }
        fn v(&self, phi: &FieldVec, t: f64) -> f64 {
            0.5 * (phi[0] - t).powi(2)
        }
        fn grad_v(&self, phi: &FieldVec, t: f64) -> FieldVec {
            array![phi[0] - t]
        }
        fn hess_v(&self, _phi: &FieldVec, _t: f64) -> crate::potential::FieldMat {
            array![[1.0]]
        }
        fn dv_dt(&self, phi: &FieldVec, t: f64) -> f64 {
            -(phi[0] - t)
        }
        fn global_min(&self, t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
            Ok(array![t])
        }
        fn symmetry_elements(&self) -> &[crate::potential::FieldMat] {
            &[]
        }
    }

    #[test]
    fn traces_a_phase_across_the_full_range() {
        let pot = TrackingQuadratic;
        let cfg = PhaseTracerConfig::default();
        let phase = track_phase(&pot, &array![0.0], 0.0, 10.0, 1.0, &cfg).unwrap();
        assert!((phase.t_low - 0.0).abs() < 1e-9);
        assert!((phase.t_high - 10.0).abs() < 1e-6);
        assert_eq!(phase.minima.first().unwrap().edge_marker, 1);
        assert_eq!(phase.minima.last().unwrap().edge_marker, -1);
        for m in &phase.minima {
            assert!(m.v.abs() < 1e-6);
        }
    }

    #[test]
    fn phase_interpolation_matches_traced_points() {
        let pot = TrackingQuadratic;
        let cfg = PhaseTracerConfig::default();
        let phase = track_phase(&pot, &array![0.0], 0.0, 10.0, 1.0, &cfg).unwrap();
        let mid = phase.point_at(5.0).unwrap();
        assert!((mid[0] - 5.0).abs() < 0.5);
    }

    #[test]
    fn fails_when_no_minimum_at_start() {
        struct Unbounded;
        impl Potential for Unbounded {
            fn dim(&self) -> usize {
                1
            }
            fn v(&self, phi: &FieldVec, _t: f64) -> f64 {
                -phi[0]
            }
            fn grad_v(&self, _phi: &FieldVec, _t: f64) -> FieldVec {
                array![-1.0]
            }
            fn hess_v(&self, _phi: &FieldVec, _t: f64) -> crate::potential::FieldMat {
                array![[0.0]]
            }
            fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn global_min(&self, _t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
                Err(crate::potential::PotentialError::OptimizerNotConverged("n/a".into()))
            }
            fn symmetry_elements(&self) -> &[crate::potential::FieldMat] {
                &[]
            }
        }
        let cfg = PhaseTracerConfig {
            locator: MinimumLocatorConfig {
                max_iter: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = track_phase(&Unbounded, &array![0.0], 0.0, 10.0, 1.0, &cfg);
        assert!(matches!(result, Err(TrackPhaseError::NoMinimumAtStart)));
    }

    /// V = (m^2 + c T^2) phi^2 / 2 + lambda phi^4 / 4: the symmetric
    /// minimum at phi=0 ends (becomes a maximum) once c T^2 + m^2 < 0 is
    /// no longer true, i.e. at T = sqrt(-m2/c).
    struct SymmetricBreaking {
        m2: f64,
        c: f64,
        lambda: f64,
    }

    impl Potential for SymmetricBreaking {
        fn dim(&self) -> usize {
            1
        }
        fn v(&self, phi: &FieldVec, t: f64) -> f64 {
            let mass2 = self.m2 + self.c * t * t;
            0.5 * mass2 * phi[0].powi(2) + 0.25 * self.lambda * phi[0].powi(4)
        }
        fn grad_v(&self, phi: &FieldVec, t: f64) -> FieldVec {
            let mass2 = self.m2 + self.c * t * t;
            array![mass2 * phi[0] + self.lambda * phi[0].powi(3)]
        }
        fn hess_v(&self, phi: &FieldVec, t: f64) -> crate::potential::FieldMat {
            let mass2 = self.m2 + self.c * t * t;
            array![[mass2 + 3.0 * self.lambda * phi[0].powi(2)]]
        }
        fn dv_dt(&self, phi: &FieldVec, t: f64) -> f64 {
            self.c * t * phi[0].powi(2)
        }
        fn global_min(&self, t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
            let mass2 = self.m2 + self.c * t * t;
            Ok(array![(-mass2 / self.lambda).max(0.0).sqrt()])
        }
        fn symmetry_elements(&self) -> &[crate::potential::FieldMat] {
            &[]
        }
    }

    #[test]
    fn symmetric_phase_ends_where_mass_term_flips_sign() {
        let pot = SymmetricBreaking {
            m2: -100.0,
            c: 1.0,
            lambda: 1.0,
        };
        // phi=0 is a minimum for T < 10, a maximum for T > 10
        let phase = track_phase(&pot, &array![0.0], 0.0, 20.0, 1.0, &PhaseTracerConfig::default())
            .unwrap();
        assert!(
            (phase.t_high - 10.0).abs() < 0.1,
            "expected t_high near 10, got {}",
            phase.t_high
        );
        assert_eq!(phase.minima.last().unwrap().edge_marker, -1);
    }
}
