//! Compile-time capacity caps and floating-point tolerances.
//!
//! Grounded on the scattered magic numbers in the teacher's solver code
//! (iteration caps, convergence tolerances); gathered here into one module
//! since this crate has a single configuration surface rather than one cap
//! per solver variant.

/// Maximum number of alternatives a frame may hold.
pub const MAX_ALTS: usize = 64;
/// Maximum number of real (leaf) nodes across all alternatives.
pub const MAX_CONS: usize = 4096;
/// Maximum number of real nodes within a single alternative.
pub const MAX_COPA: usize = 1024;
/// Maximum number of total (real + intermediate) nodes within a single alternative.
pub const MAX_NOPA: usize = 2048;
/// Maximum number of statements a single base may hold.
pub const MAX_STMTS: usize = 8192;
/// Maximum number of "more important" steps between two criteria/nodes in a CAR ranking.
pub const MAX_STEPS_PW: i32 = 64;

/// General-purpose floating point comparison tolerance.
pub const EPS: f64 = 1e-9;
/// Tolerance for the "siblings sum to 1" mass-point check (§8 property 1).
pub const EPS_SUM: f64 = 1e-6;
/// Minimum admissible statement width before `too-narrow-stmt` is raised.
///
/// Only enforced when a caller opts in; a zero-width statement (`lobo == upbo`)
/// is always legal as it is how CAR pins down exact points.
pub const MIN_WIDTH: f64 = 0.0;

/// Below this dimension, the warp correction is blended at a flat 1/2 weight.
pub const VX_CUTOFFDIM: usize = 6;
/// Above this dimension, the warp correction is skipped entirely (N-1 DoF point only).
pub const VX_MAXDIM: usize = 30;

/// Lower bound of the accepted weight-uncertainty compat range, `CAR::set_compat`.
pub const W_UNC_MIN: f64 = 0.02;
/// Upper bound of the accepted weight-uncertainty compat range, `CAR::set_compat`.
pub const W_UNC_MAX: f64 = 0.20;
/// Lower bound of the accepted value-uncertainty compat range, `CAR::set_compat`.
pub const V_UNC_MIN: f64 = 0.01;
/// Upper bound of the accepted value-uncertainty compat range, `CAR::set_compat`.
pub const V_UNC_MAX: f64 = 0.10;

/// Returns true if `a` and `b` differ by no more than [`EPS`].
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS
}

/// Clamps round-off noise below [`EPS`] to exactly zero.
pub fn snap_zero(x: f64) -> f64 {
    if x.abs() < EPS { 0.0 } else { x }
}
