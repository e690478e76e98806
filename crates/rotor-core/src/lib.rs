//! Core numerics for the rotor aerodynamics workspace
//!
//! Includes:
//! - Unit conversions (degrees/radians, RPM/rad s^-1)
//! - Trapezoidal quadrature over non-uniform grids
//! - Shape-preserving monotone cubic interpolation with analytic slope
//! - Brent scalar root-finding with an iteration budget and status report
//!
//! Everything here is plain `f64` math with no solver-specific state; the
//! blade-element crates build on these pieces.

use std::f64::consts::PI;

pub mod interp;
pub mod roots;

pub use interp::MonotoneCubic;
pub use roots::{brent, BracketError, RootResult};

/// -------------------------
/// Units & Conversions
/// -------------------------

/// Degrees to radians.
#[inline]
#[must_use]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Radians to degrees.
#[inline]
#[must_use]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Rotor speed in revolutions per minute to rad/s.
#[inline]
#[must_use]
pub fn rpm_to_rad_s(rpm: f64) -> f64 {
    rpm * PI / 30.0
}

/// Chain-rule factor for derivatives taken per degree instead of per radian.
pub const PER_DEG: f64 = PI / 180.0;

/// Chain-rule factor for derivatives taken per RPM instead of per rad/s.
pub const PER_RPM: f64 = PI / 30.0;

/// -------------------------
/// Quadrature
/// -------------------------

/// Trapezoidal rule over a non-uniform grid.
///
/// `x` must be ordered (ascending or descending); `y` is sampled at `x`.
/// Returns 0 for fewer than two samples.
#[must_use]
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    debug_assert_eq!(y.len(), x.len());
    let mut total = 0.0;
    for i in 1..x.len() {
        total += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    total
}

/// Directional derivative of [`trapz`] when both ordinates and abscissae
/// move: `dy` and `dx` are the perturbations of `y` and `x` along one input
/// direction.
#[must_use]
pub fn trapz_directional(y: &[f64], dy: &[f64], x: &[f64], dx: &[f64]) -> f64 {
    debug_assert_eq!(y.len(), x.len());
    debug_assert_eq!(dy.len(), y.len());
    debug_assert_eq!(dx.len(), x.len());
    let mut total = 0.0;
    for i in 1..x.len() {
        total += 0.5 * (dy[i] + dy[i - 1]) * (x[i] - x[i - 1])
            + 0.5 * (y[i] + y[i - 1]) * (dx[i] - dx[i - 1]);
    }
    total
}

/* ----------------------------------- tests ---------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_conversions_round_trip() {
        assert_relative_eq!(rad_to_deg(deg_to_rad(37.5)), 37.5, epsilon = 1e-12);
        // 30 RPM = pi rad/s
        assert_relative_eq!(rpm_to_rad_s(30.0), PI, epsilon = 1e-12);
    }

    #[test]
    fn trapz_linear_exact() {
        // integral of 2x over [0, 3] = 9, exact for trapezoids
        let x = [0.0, 0.5, 1.2, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&v| 2.0 * v).collect();
        assert_relative_eq!(trapz(&y, &x), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn trapz_degenerate() {
        assert_eq!(trapz(&[1.0], &[0.0]), 0.0);
        assert_eq!(trapz(&[], &[]), 0.0);
    }

    #[test]
    fn trapz_directional_matches_finite_difference() {
        let x = [0.0, 0.7, 1.5, 2.4];
        let y = [1.0, 0.4, -0.2, 0.9];
        let dx = [0.0, 0.3, -0.1, 0.2];
        let dy = [0.5, -0.2, 0.1, 0.0];
        let h = 1e-7;
        let xp: Vec<f64> = x.iter().zip(&dx).map(|(v, d)| v + h * d).collect();
        let yp: Vec<f64> = y.iter().zip(&dy).map(|(v, d)| v + h * d).collect();
        let fd = (trapz(&yp, &xp) - trapz(&y, &x)) / h;
        assert_relative_eq!(trapz_directional(&y, &dy, &x, &dx), fd, epsilon = 1e-6);
    }
}
