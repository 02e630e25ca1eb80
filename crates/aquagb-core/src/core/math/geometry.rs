//! Derivative helpers for the water-site geometric constructions.

use nalgebra::{Matrix3, Vector3};

/// Jacobian of the unit vector `u = r/|r|` with respect to `r`.
///
/// `inv_len` is the precomputed `1/|r|`; the formula is
/// `du/dr = (I − u uᵀ)/|r|`.
#[inline]
pub fn unit_vector_jacobian(u: &Vector3<f64>, inv_len: f64) -> Matrix3<f64> {
    (Matrix3::identity() - u * u.transpose()) * inv_len
}

/// Normalizes `v`, returning the unit vector and `1/|v|`.
#[inline]
pub fn normalized_with_inv(v: &Vector3<f64>) -> (Vector3<f64>, f64) {
    let inv = 1.0 / v.norm();
    (v * inv, inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_vector_jacobian_matches_finite_difference() {
        let r = Vector3::new(0.3, -1.2, 2.1);
        let (u, inv) = normalized_with_inv(&r);
        let jac = unit_vector_jacobian(&u, inv);

        let h = 1e-6;
        for j in 0..3 {
            let mut rp = r;
            let mut rm = r;
            rp[j] += h;
            rm[j] -= h;
            let fd = (rp.normalize() - rm.normalize()) / (2.0 * h);
            for i in 0..3 {
                assert!((jac[(i, j)] - fd[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn unit_vector_jacobian_annihilates_the_radial_direction() {
        let r = Vector3::new(1.0, 2.0, -0.5);
        let (u, inv) = normalized_with_inv(&r);
        let jac = unit_vector_jacobian(&u, inv);
        assert!((jac * u).norm() < 1e-12);
    }
}
