//! Smooth switching functions used throughout the model.
//!
//! Each filter keeps the energy surface C¹- or C²-continuous across a
//! threshold: near-zero high-order overlap volumes, negative or oversized raw
//! surface areas, and negative or implausibly large inverse Born radii are all
//! clamped through one of these instead of a hard cut.

/// Quintic switch rising smoothly from 0 at `xa` to 1 at `xb`.
///
/// Value, slope and curvature vanish at both ends. Returns
/// `(f, f', f'')`.
#[inline]
pub fn poly_switch(x: f64, xa: f64, xb: f64) -> (f64, f64, f64) {
    if x > xb {
        return (1.0, 0.0, 0.0);
    }
    if x < xa {
        return (0.0, 0.0, 0.0);
    }
    let d = 1.0 / (xb - xa);
    let u = (x - xa) * d;
    let u2 = u * u;
    let u3 = u * u2;
    let f = u3 * (10.0 - 15.0 * u + 6.0 * u2);
    let fp = d * 30.0 * u2 * (1.0 - 2.0 * u + u2);
    let fpp = d * d * 60.0 * u * (1.0 - 3.0 * u + 2.0 * u2);
    (f, fp, fpp)
}

/// Volume filter `v·s(v)`: zero below `va`, identity above `vb`.
///
/// Returns `(f, f', f'')` with derivatives taken against the raw volume.
#[inline]
pub fn switch_volume(v: f64, va: f64, vb: f64) -> (f64, f64, f64) {
    if v > vb {
        return (v, 1.0, 0.0);
    }
    if v < va {
        return (0.0, 0.0, 0.0);
    }
    let (s, sp, spp) = poly_switch(v, va, vb);
    (s * v, s + v * sp, 2.0 * sp + v * spp)
}

/// Inverse Born radius floor parameter (Å⁻¹); caps Born radii at 50 Å.
const INVBR_FLOOR: f64 = 0.02;

/// Filter for the raw inverse Born radius.
///
/// Negative accumulations are clamped to the constant floor; non-negative
/// values map to `sqrt(a² + β²)`, which approaches the identity for large β.
/// Returns `(β', dβ'/dβ)`.
#[inline]
pub fn switch_inverse_born(beta: f64) -> (f64, f64) {
    if beta < 0.0 {
        return (INVBR_FLOOR, 0.0);
    }
    let t = (INVBR_FLOOR * INVBR_FLOOR + beta * beta).sqrt();
    (t, beta / t)
}

const AREA_FILTER_A2: f64 = 5.0 * 5.0;

/// Sigmoid filter applied to raw surface areas.
///
/// Zero for negative input, `a²/(25 + a²)` otherwise; the filtered area is
/// `a·f(a)`. Returns `(f, f')`.
#[inline]
pub fn switch_area(a: f64) -> (f64, f64) {
    if a < 0.0 {
        return (0.0, 0.0);
    }
    let t = a / (AREA_FILTER_A2 + a * a);
    let f = a * t;
    (f, 2.0 * t * (1.0 - f))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn fd_slope(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn poly_switch_is_clamped_outside_the_window() {
        assert_eq!(poly_switch(-1.0, 0.0, 1.0), (0.0, 0.0, 0.0));
        assert_eq!(poly_switch(2.0, 0.0, 1.0), (1.0, 0.0, 0.0));
    }

    #[test]
    fn poly_switch_is_half_at_midpoint() {
        let (f, _, _) = poly_switch(0.5, 0.0, 1.0);
        assert!(f64_approx_equal(f, 0.5));
    }

    #[test]
    fn poly_switch_derivatives_vanish_at_both_ends() {
        let (f, fp, fpp) = poly_switch(0.0, 0.0, 1.0);
        assert!(f64_approx_equal(f, 0.0));
        assert!(f64_approx_equal(fp, 0.0));
        assert!(f64_approx_equal(fpp, 0.0));
        let (f, fp, fpp) = poly_switch(1.0, 0.0, 1.0);
        assert!(f64_approx_equal(f, 1.0));
        assert!(f64_approx_equal(fp, 0.0));
        assert!(f64_approx_equal(fpp, 0.0));
    }

    #[test]
    fn poly_switch_slope_matches_finite_difference() {
        let (_, fp, _) = poly_switch(0.3, 0.1, 0.9);
        let fd = fd_slope(|x| poly_switch(x, 0.1, 0.9).0, 0.3);
        assert!((fp - fd).abs() < 1e-6);
    }

    #[test]
    fn switch_volume_is_identity_above_upper_threshold() {
        let (f, fp, fpp) = switch_volume(0.5, 0.01, 0.1);
        assert!(f64_approx_equal(f, 0.5));
        assert!(f64_approx_equal(fp, 1.0));
        assert!(f64_approx_equal(fpp, 0.0));
    }

    #[test]
    fn switch_volume_vanishes_below_lower_threshold() {
        let (f, fp, _) = switch_volume(0.001, 0.01, 0.1);
        assert_eq!(f, 0.0);
        assert_eq!(fp, 0.0);
    }

    #[test]
    fn switch_volume_slope_matches_finite_difference_inside_window() {
        let (_, fp, _) = switch_volume(0.05, 0.01, 0.1);
        let fd = fd_slope(|x| switch_volume(x, 0.01, 0.1).0, 0.05);
        assert!((fp - fd).abs() < 1e-6);
    }

    #[test]
    fn switch_inverse_born_clamps_negative_input_to_floor() {
        let (f, fp) = switch_inverse_born(-3.0);
        assert!(f64_approx_equal(f, 0.02));
        assert_eq!(fp, 0.0);
    }

    #[test]
    fn switch_inverse_born_approaches_identity_for_large_input() {
        let (f, fp) = switch_inverse_born(2.0);
        assert!((f - 2.0).abs() < 1e-4);
        assert!((fp - 1.0).abs() < 1e-4);
    }

    #[test]
    fn switch_inverse_born_slope_matches_finite_difference() {
        let (_, fp) = switch_inverse_born(0.05);
        let fd = fd_slope(|x| switch_inverse_born(x).0, 0.05);
        assert!((fp - fd).abs() < 1e-6);
    }

    #[test]
    fn switch_area_suppresses_negative_and_small_areas() {
        assert_eq!(switch_area(-10.0), (0.0, 0.0));
        let (f, _) = switch_area(1.0);
        assert!(f < 0.05);
    }

    #[test]
    fn switch_area_approaches_one_for_large_areas() {
        let (f, _) = switch_area(200.0);
        assert!(f > 0.999);
    }

    #[test]
    fn switch_area_slope_matches_finite_difference() {
        let (_, fp) = switch_area(7.0);
        let fd = fd_slope(|x| switch_area(x).0, 7.0);
        assert!((fp - fd).abs() < 1e-6);
    }
}
