//! The pairwise descreening integral and its spline-table form.
//!
//! `descreening_integral` is the closed-form integral of `1/r⁴` over the
//! volume of a neighbor sphere, as seen from a descreened atom. It feeds the
//! inverse Born radius sums. The closed form needs logarithms in three
//! piecewise branches, so per structure it is tabulated once per distinct
//! (quantized) radius-ratio as a cubic spline over the scaled distance
//! `u = rij/rj`, and the hot loops interpolate.

use std::collections::HashMap;
use std::f64::consts::PI;

use super::constants::{Q4_KEY_SCALE, Q4_NODES, Q4_UMAX, RADIUS_INCREMENT};
use super::math::spline::CubicSpline;

/// Integral of `1/r⁴` over the sphere of radius `rj` centered `rij` away,
/// excluding the region inside the sphere of radius `ri` around the origin.
///
/// Returns the value and its derivative with respect to `rij`. The three
/// branches cover separated spheres, partial overlap, and full inclusion;
/// the inclusion branch switches to a series form at very small separation
/// where the direct expression has a removable singularity.
pub fn descreening_integral(rij: f64, ri: f64, rj: f64) -> (f64, f64) {
    let two_pi = 2.0 * PI;
    let two_thirds = 2.0 / 3.0;
    let rij2 = rij * rij;

    if rij > ri + rj {
        // separated spheres
        let u1 = rij + rj;
        let u2 = rij - rj;
        let u3 = u1 * u2;
        let u4 = 0.5 * (u1 / u2).ln();
        let q = two_pi * (rj / u3 - u4 / rij);
        let dq = two_pi * ((rj / (rij * u3)) * (1.0 - 2.0 * rij2 / u3) + u4 / rij2);
        return (q, dq);
    }

    let u1 = rj - ri;
    if rij2 > u1 * u1 {
        // partial overlap, neither sphere contains the other
        let u1 = rij + rj;
        let u3 = u1 * (rij - rj);
        let u4 = 1.0 / u1;
        let u4sq = u4 * u4;
        let u5 = 1.0 / ri;
        let u5sq = u5 * u5;
        let u6 = 0.5 * (u1 / ri).ln();
        let q = two_pi * (-(u4 - u5) + (0.25 * u3 * (u4sq - u5sq) - u6) / rij);
        let dq = two_pi * (0.5 * (1.0 - 0.5 * u3 / rij2) * (u4sq - u5sq) + u6 / rij2);
        return (q, dq);
    }

    // inclusion
    if ri > rj {
        return (0.0, 0.0);
    }
    let u1 = rij + rj;
    let u2 = rj - rij;
    let u3 = -u1 * u2; // rij² − rj²
    if rij < 0.001 * rj {
        let a = rij / rj;
        let ad = a * a - 1.0;
        let u6 = (1.0 + two_thirds * a * a) / rj;
        let q = two_pi * (2.0 / ri + rj / u3 - u6);
        let dq = -(2.0 * two_pi * a / (rj * rj)) * (1.0 / ad + two_thirds);
        (q, dq)
    } else {
        let u6 = 0.5 * (u1 / u2).ln();
        let q = two_pi * (2.0 / ri + rj / u3 - u6 / rij);
        let dq = two_pi * (-(rj / u3) * (2.0 * rij / u3 - 1.0 / rij) + u6 / rij2);
        (q, dq)
    }
}

/// Spline tables of the descreening integral, one per quantized radius ratio.
///
/// Built once at structure registration from the distinct radii present;
/// immutable and shared read-only across workers afterwards.
#[derive(Debug)]
pub struct DescreeningTable {
    tables: HashMap<i64, CubicSpline>,
    du: f64,
}

impl DescreeningTable {
    fn ratio_key(rho_i: f64, rj: f64) -> i64 {
        ((rho_i / rj) * Q4_KEY_SCALE).round() as i64
    }

    /// Builds tables for every ordered pair of the distinct inflated radii.
    ///
    /// The table for ratio `b = (r_i − increment)/r_j` holds the integral at
    /// unit `rj`; evaluation rescales by `1/rj` (value) and `1/rj²`
    /// (derivative).
    pub fn build(inflated_radii: &[f64]) -> Self {
        let mut distinct: Vec<f64> = Vec::new();
        for &r in inflated_radii {
            if !distinct.iter().any(|&d| (d - r).abs() < 1e-12) {
                distinct.push(r);
            }
        }

        let du = Q4_UMAX / (Q4_NODES - 1) as f64;
        let mut tables = HashMap::with_capacity(distinct.len() * distinct.len());
        for &ri in &distinct {
            for &rj in &distinct {
                let rho_i = ri - RADIUS_INCREMENT;
                let key = Self::ratio_key(rho_i, rj);
                tables
                    .entry(key)
                    .or_insert_with(|| Self::fit_spline(rho_i / rj, du));
            }
        }
        Self { tables, du }
    }

    fn fit_spline(b: f64, du: f64) -> CubicSpline {
        let mut y = vec![0.0; Q4_NODES];
        let mut yp1 = 0.0;
        let mut u = 0.0;
        for (i, node) in y.iter_mut().take(Q4_NODES - 1).enumerate() {
            let (q, dq) = descreening_integral(u, b, 1.0);
            if i == 0 {
                yp1 = dq;
            }
            *node = q;
            u += du;
        }
        // last node pinned to the large-distance limit
        CubicSpline::fit(du, y, Some(yp1), Some(0.0))
    }

    /// Interpolated integral and radial derivative for the pair geometry
    /// `(rij, rho_i, rj)`, where `rho_i` is the descreened atom's van der
    /// Waals radius and `rj` the neighbor's inflated radius.
    #[inline]
    pub fn eval(&self, rij: f64, rho_i: f64, rj: f64) -> (f64, f64) {
        let key = Self::ratio_key(rho_i, rj);
        match self.tables.get(&key) {
            Some(spline) => {
                let (f, fp) = spline.eval(rij / rj);
                (f / rj, fp / (rj * rj))
            }
            None => (0.0, 0.0),
        }
    }

    /// Grid spacing of the underlying splines (scaled-distance units).
    pub fn spacing(&self) -> f64 {
        self.du
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }
}
