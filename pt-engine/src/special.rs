//! Special functions needed by the bounce-action short-distance expansion
//! and by the percolation/gravitational-wave integrals: the modified
//! Bessel function of the first kind `I_ν` (real, possibly half-integer,
//! order) and the dilogarithm `Li₂`.
//!
//! Both are implemented as truncated series rather than pulled from a
//! special-functions crate: the orders and argument ranges needed here are
//! narrow and fixed by the physics (ν ∈ {1, 3/2}; |x| bounded by the field
//! range), so a small self-contained series with an explicit convergence
//! criterion is both sufficient and auditable.

/// Series truncation: stop once the last term is below this fraction of
/// the running sum.
const SERIES_REL_TOL: f64 = 1e-15;
/// Hard cap on series terms, matching the spec's stated truncation rule.
const MAX_TERMS: usize = 100;

/// Lanczos approximation to the Gamma function, accurate to ~15 digits for
/// `x > 0`.
pub(crate) fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + G + 0.5;
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
    }
}

/// Modified Bessel function of the first kind, `I_ν(x)`, for real order
/// `ν ≥ 0` and `x ≥ 0`, via its defining series
///
/// `I_ν(x) = Σ_{m=0}^∞ (x/2)^{2m+ν} / (m! Γ(m+ν+1))`.
///
/// Truncated once the last term contributes less than `1e-15` of the
/// running sum, with a hard cap of 100 terms.
#[must_use]
pub fn bessel_i(nu: f64, x: f64) -> f64 {
    if x == 0.0 {
        return if nu == 0.0 { 1.0 } else { 0.0 };
    }

    let half_x = x / 2.0;
    let mut term = half_x.powf(nu) / gamma(nu + 1.0);
    let mut sum = term;

    for m in 1..MAX_TERMS {
        term *= half_x * half_x / (m as f64 * (m as f64 + nu));
        sum += term;
        if term.abs() < SERIES_REL_TOL * sum.abs() {
            break;
        }
    }

    sum
}

/// The dilogarithm (Spence's function) `Li₂(x) = -∫₀ˣ ln(1-t)/t dt`, for
/// real `x ≤ 1`.
///
/// Uses the direct series for `|x| ≤ 1/2` and the standard reflection
/// identities
///
/// `Li₂(x) = π²/6 − ln(x)·ln(1−x) − Li₂(1−x)`  for `x ∈ (1/2, 1]`,
/// `Li₂(x) = −Li₂(x/(x−1)) − ½ ln²(1−x)`       for `x < 0`,
///
/// to reduce any other real argument into that range.
#[must_use]
pub fn li2(x: f64) -> f64 {
    assert!(x <= 1.0, "li2: real dilogarithm requires x <= 1, got {x}");

    if x == 1.0 {
        return std::f64::consts::PI * std::f64::consts::PI / 6.0;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x < 0.0 {
        return -li2(x / (x - 1.0)) - 0.5 * (1.0 - x).ln().powi(2);
    }
    if x > 0.5 {
        return std::f64::consts::PI * std::f64::consts::PI / 6.0 - x.ln() * (1.0 - x).ln()
            - li2(1.0 - x);
    }

    let mut term = x;
    let mut sum = term;
    for k in 2..=MAX_TERMS * 4 {
        term *= x;
        let contrib = term / (k as f64 * k as f64);
        sum += contrib;
        if contrib.abs() < SERIES_REL_TOL * sum.abs() {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_matches_factorials() {
        assert!((gamma(1.0) - 1.0).abs() < 1e-10);
        assert!((gamma(2.0) - 1.0).abs() < 1e-10);
        assert!((gamma(5.0) - 24.0).abs() < 1e-8);
        assert!((gamma(0.5) - std::f64::consts::PI.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn bessel_i0_at_zero_is_one() {
        assert!((bessel_i(0.0, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bessel_i_nu_at_zero_vanishes_for_positive_order() {
        assert_eq!(bessel_i(1.0, 0.0), 0.0);
        assert_eq!(bessel_i(1.5, 0.0), 0.0);
    }

    #[test]
    fn bessel_i1_reference_value() {
        // I_1(1) ~= 0.5651591...
        assert!((bessel_i(1.0, 1.0) - 0.565_159_103_992_485).abs() < 1e-10);
    }

    #[test]
    fn li2_known_values() {
        assert!((li2(0.0)).abs() < 1e-12);
        assert!((li2(1.0) - std::f64::consts::PI * std::f64::consts::PI / 6.0).abs() < 1e-10);
        // Li2(-1) = -pi^2/12
        assert!((li2(-1.0) - (-std::f64::consts::PI * std::f64::consts::PI / 12.0)).abs() < 1e-9);
        // Li2(0.5) = pi^2/12 - 0.5*ln(2)^2
        let expected = std::f64::consts::PI * std::f64::consts::PI / 12.0
            - 0.5 * std::f64::consts::LN_2.powi(2);
        assert!((li2(0.5) - expected).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "x <= 1")]
    fn li2_rejects_arguments_above_one() {
        let _ = li2(1.5);
    }
}
