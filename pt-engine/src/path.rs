//! Bernstein-basis path deformation (`spec.md` §4.4 Step C).
//!
//! The tunneling path is a [`ConstantVelocitySpline`]; the force normal to
//! it, `N(l) = ∇V(Γ(l)) − (∇V·Γ′(l))·Γ′(l)`, is not generally zero on a
//! straight-line guess. [`deform_path`] nudges the path towards `N = 0` by
//! representing the nudge as a degree-`n` Bezier curve (its control points
//! are the "knots" the kernel matrix is built over) and solving the normal
//! equations for that curve's control points in one linear solve per field
//! dimension, reusing the dense solver from [`crate::minimum`].

use crate::convert::f64_from_usize;
use crate::minimum::solve_linear;
use crate::potential::{FieldMat, FieldVec, Potential};
use crate::spline::ConstantVelocitySpline;
use ndarray::{Array1, Array2};

fn n_choose_k(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result *= f64_from_usize(n - i) / f64_from_usize(i + 1);
    }
    result
}

/// `B_{ν,n}(x) = C(n,ν) x^ν (1-x)^{n-ν}`, `x ∈ [0, 1]`.
fn bernstein(n: usize, nu: usize, x: f64) -> f64 {
    n_choose_k(n, nu) * x.powi(nu as i32) * (1.0 - x).powi((n - nu) as i32)
}

/// `K_{ij} = ∫₀¹ B_i(x) B_j(x) dx`, independent of the path, so callers
/// that deform many paths at the same degree can build it once.
fn kernel_matrix(n: usize) -> FieldMat {
    let m = n + 1;
    let mut k = Array2::zeros((m, m));
    for i in 0..m {
        for j in i..m {
            let val = crate::ode::quadrature(|x| bernstein(n, i, x) * bernstein(n, j, x), 0.0, 1.0);
            k[[i, j]] = val;
            k[[j, i]] = val;
        }
    }
    k
}

/// Tuning knobs for [`deform_path`].
#[derive(Clone, Copy, Debug)]
pub struct PathDeformerConfig {
    /// Degree of the Bernstein basis representing the deformation
    /// (`spec.md`: "n ≈ 10").
    pub degree: usize,
    /// Number of knots the deformed path is reknotted to after each step.
    pub num_knots: usize,
    /// Convergence threshold on `max|N| / max|∇V|`.
    pub eps_force: f64,
    /// `ε` in the reductor `ε·max|∇V|/L`, keeping each deformation step
    /// small relative to the path's own scale.
    pub eps_step: f64,
    /// Iteration cap.
    pub max_iter: usize,
}

impl Default for PathDeformerConfig {
    fn default() -> Self {
        Self {
            degree: 10,
            num_knots: 40,
            eps_force: 1e-2,
            eps_step: 0.2,
            max_iter: 30,
        }
    }
}

/// Outcome of [`deform_path`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeformStatus {
    /// `max|N|/max|∇V|` fell below `eps_force`.
    Converged,
    /// The iteration cap was hit without converging.
    NotConverged,
    /// The kernel solve failed (singular matrix) or a step made the
    /// residual force strictly worse than the previous iteration.
    Crashed,
}

struct ForceSample {
    max_grad: f64,
    max_force: f64,
}

fn sample_normal_force(
    potential: &dyn Potential,
    spline: &ConstantVelocitySpline,
    t: f64,
    ls: &[f64],
) -> Option<(Vec<FieldVec>, ForceSample)> {
    let mut forces = Vec::with_capacity(ls.len());
    let mut max_grad = 0.0f64;
    let mut max_force = 0.0f64;
    for &l in ls {
        let phi = spline.gamma(l).ok()?;
        let tangent = spline.gamma_prime(l).ok()?;
        let tangent_norm = tangent.mapv(|v| v * v).sum().sqrt();
        if tangent_norm < 1e-300 {
            return None;
        }
        let unit_tangent = &tangent / tangent_norm;
        let grad = potential.grad_v(&phi, t);
        let grad_norm = grad.mapv(|v| v * v).sum().sqrt();
        let along = grad.dot(&unit_tangent);
        let normal = &grad - &(along * &unit_tangent);
        let normal_norm = normal.mapv(|v| v * v).sum().sqrt();
        max_grad = max_grad.max(grad_norm);
        max_force = max_force.max(normal_norm);
        forces.push(normal);
    }
    Some((forces, ForceSample { max_grad, max_force }))
}

/// Deforms `spline` towards zero normal force at fixed temperature `t`,
/// returning the deformed path and the outcome.
#[must_use]
pub fn deform_path(
    potential: &dyn Potential,
    spline: &ConstantVelocitySpline,
    t: f64,
    cfg: &PathDeformerConfig,
) -> (ConstantVelocitySpline, DeformStatus) {
    let k = kernel_matrix(cfg.degree);
    let control_ls: Vec<f64> = (0..=cfg.degree)
        .map(|i| spline.length() * f64_from_usize(i) / f64_from_usize(cfg.degree))
        .collect();

    let mut current = spline.clone();
    let mut prev_relative_force = f64::INFINITY;

    for _ in 0..cfg.max_iter {
        let Some((forces, sample)) = sample_normal_force(potential, &current, t, &control_ls)
        else {
            return (current, DeformStatus::Crashed);
        };
        if sample.max_grad < 1e-300 {
            return (current, DeformStatus::Crashed);
        }
        let relative_force = sample.max_force / sample.max_grad;
        if relative_force < cfg.eps_force {
            return (current, DeformStatus::Converged);
        }
        if relative_force > prev_relative_force * 1.5 {
            return (current, DeformStatus::Crashed);
        }
        prev_relative_force = relative_force;

        let reductor = cfg.eps_step * sample.max_grad / current.length().max(1e-300);
        let dim = current.dim();
        let mut coeffs = vec![Array1::zeros(cfg.degree + 1); dim];
        for d in 0..dim {
            let rhs: FieldVec = forces.iter().map(|f| f[d]).collect();
            let Some(c) = solve_linear(&k, &rhs) else {
                return (current, DeformStatus::Crashed);
            };
            coeffs[d] = c;
        }

        let new_knot_ls: Vec<f64> = (0..cfg.num_knots)
            .map(|i| current.length() * f64_from_usize(i) / f64_from_usize(cfg.num_knots - 1))
            .collect();
        let mut new_knots = Vec::with_capacity(cfg.num_knots);
        for &l in &new_knot_ls {
            let Ok(phi) = current.gamma(l) else {
                return (current, DeformStatus::Crashed);
            };
            let x = l / current.length().max(1e-300);
            let mut delta = Array1::zeros(dim);
            for i in 0..=cfg.degree {
                let b = bernstein(cfg.degree, i, x);
                for d in 0..dim {
                    delta[d] += coeffs[d][i] * b;
                }
            }
            new_knots.push(&phi + &(&delta / reductor));
        }

        let Ok(rebuilt) = ConstantVelocitySpline::new(&new_knots) else {
            return (current, DeformStatus::Crashed);
        };
        current = rebuilt;
    }

    (current, DeformStatus::NotConverged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Quadratic;
    impl Potential for Quadratic {
        fn dim(&self) -> usize {
            2
        }
        fn v(&self, phi: &FieldVec, _t: f64) -> f64 {
            0.5 * (phi[0].powi(2) + phi[1].powi(2))
        }
        fn grad_v(&self, phi: &FieldVec, _t: f64) -> FieldVec {
            array![phi[0], phi[1]]
        }
        fn hess_v(&self, _phi: &FieldVec, _t: f64) -> FieldMat {
            Array2::eye(2)
        }
        fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
            0.0
        }
        fn global_min(&self, _t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
            Ok(array![0.0, 0.0])
        }
        fn symmetry_elements(&self) -> &[FieldMat] {
            &[]
        }
    }

    #[test]
    fn bernstein_basis_partitions_unity() {
        let n = 10;
        for &x in &[0.0, 0.2, 0.5, 0.9, 1.0] {
            let sum: f64 = (0..=n).map(|nu| bernstein(n, nu, x)).sum();
            assert!((sum - 1.0).abs() < 1e-9, "x={x} sum={sum}");
        }
    }

    #[test]
    fn kernel_matrix_is_symmetric_positive_entries_on_diagonal() {
        let k = kernel_matrix(5);
        for i in 0..6 {
            assert!(k[[i, i]] > 0.0);
            for j in 0..6 {
                assert!((k[[i, j]] - k[[j, i]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn deforms_a_bowed_path_towards_the_straight_line() {
        // true vacuum at (-2,0), false vacuum at (2,0), but routed through
        // a knot bowed out to (0, 3): under a radially symmetric V the
        // straight line through the origin has zero normal force, so
        // deformation should reduce the bow.
        let knots = vec![array![-2.0, 0.0], array![0.0, 3.0], array![2.0, 0.0]];
        let spline = ConstantVelocitySpline::new(&knots).unwrap();
        let cfg = PathDeformerConfig {
            degree: 6,
            num_knots: 12,
            max_iter: 25,
            ..Default::default()
        };
        let (deformed, status) = deform_path(&Quadratic, &spline, 0.0, &cfg);
        assert!(matches!(status, DeformStatus::Converged | DeformStatus::NotConverged));
        let mid = deformed.gamma(deformed.length() / 2.0).unwrap();
        let mid_before = spline.gamma(spline.length() / 2.0).unwrap();
        assert!(mid[1].abs() < mid_before[1].abs());
    }
}
