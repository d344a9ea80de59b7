//! Small numeric conversion helpers shared across the crate.

/// Widens a count into `f64` for use in a formula, routed through `u32` so
/// the conversion is exact rather than merely rounded (panics if `x`
/// exceeds `u32::MAX`, which no grid/knot/sample count in this crate does).
#[must_use]
pub fn f64_from_usize(x: usize) -> f64 {
    f64::from(u32::try_from(x).unwrap())
}

/// Linearly maps `x` from `[a0, a1]` into `[b0, b1]`.
pub fn rescale(x: f64, a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    b0 + (x - a0) * (b1 - b0) / (a1 - a0)
}
