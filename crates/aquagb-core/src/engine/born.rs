//! Inverse Born radii from cached pairwise descreening integrals.
//!
//! The fill pass walks each worker's near and far lists once, streaming the
//! interpolated integral value and radial derivative for both directions of
//! every pair into the worker's cache while accumulating the raw inverse
//! radii. Later passes consume the cache in exactly the same traversal
//! order; fill order and consume order diverging is a correctness bug, not a
//! performance issue.
//!
//! Cache layout per heavy/heavy pair: `(q_ij, q'_ij, q_ji, q'_ji)` where
//! `q_ij` descreens atom i by neighbor j. Hydrogen/heavy pairs store the
//! hydrogen direction only: `(q_hj, q'_hj)`.

use crate::core::constants::{INV_FOUR_PI, WATER_RADIUS};
use crate::core::integrals::DescreeningTable;
use crate::core::models::solute::SoluteModel;
use crate::core::switching::switch_inverse_born;
use crate::engine::neighbor::NeighborLists;

/// Streams the pairwise integrals into `cache` and accumulates the raw
/// inverse Born radii into the worker-private `br1`.
pub(crate) fn accumulate_inverse_radii(
    model: &SoluteModel,
    table: &DescreeningTable,
    nb: &NeighborLists,
    heavy_owned: &[usize],
    hydrogen_owned: &[usize],
    sp: &[f64],
    cache: &mut Vec<f64>,
    br1: &mut [f64],
) {
    for &iat in heavy_owned {
        for &jat in nb.near.neighbors(iat) {
            pair_fill(model, table, sp, cache, br1, iat, jat);
        }
    }
    for &iat in heavy_owned {
        for &jat in nb.far.neighbors(iat) {
            pair_fill(model, table, sp, cache, br1, iat, jat);
        }
    }
    for &iat in hydrogen_owned {
        for &jat in nb.far.neighbors(iat) {
            let d = (model.pos[jat] - model.pos[iat]).norm();
            let (q, dq) = table.eval(d, model.rho[iat], model.r[jat]);
            cache.push(q);
            cache.push(dq);
            br1[iat] -= INV_FOUR_PI * sp[jat] * q;
        }
    }
}

#[inline]
fn pair_fill(
    model: &SoluteModel,
    table: &DescreeningTable,
    sp: &[f64],
    cache: &mut Vec<f64>,
    br1: &mut [f64],
    iat: usize,
    jat: usize,
) {
    let d = (model.pos[jat] - model.pos[iat]).norm();
    let (qij, dqij) = table.eval(d, model.rho[iat], model.r[jat]);
    let (qji, dqji) = table.eval(d, model.rho[jat], model.r[iat]);
    cache.push(qij);
    cache.push(dqij);
    cache.push(qji);
    cache.push(dqji);
    br1[iat] -= INV_FOUR_PI * sp[jat] * qij;
    br1[jat] -= INV_FOUR_PI * sp[iat] * qji;
}

/// Filters the merged raw inverse radii, keeping the filter derivative for
/// the chain rule, and derives Born radii and the vdW auxiliary `brw`.
pub(crate) fn filter_born_radii(
    model: &SoluteModel,
    br1: &mut [f64],
    swf_der: &mut [f64],
    br: &mut [f64],
    brw: &mut [f64],
) {
    for iat in 0..model.natoms {
        let (f, fp) = switch_inverse_born(br1[iat]);
        br1[iat] = f;
        swf_der[iat] = fp;
        let b = 1.0 / f;
        br[iat] = b;
        brw[iat] = 3.0 * b * b / (b + WATER_RADIUS).powi(4);
    }
}

/// Per-atom chain-rule coefficients through the Born-radius filter:
/// `q2ab = ∂E_gb/∂β_raw` and `abrw = ∂E_vdw/∂β_raw`.
pub(crate) fn chain_coefficients(
    model: &SoluteModel,
    dera: &[f64],
    br: &[f64],
    swf_der: &[f64],
    brw: &[f64],
    q2ab: &mut [f64],
    abrw: &mut [f64],
) {
    for iat in 0..model.natoms {
        q2ab[iat] = -dera[iat] * br[iat] * br[iat] * swf_der[iat];
        abrw[iat] = model.alpha_total[iat] * swf_der[iat] * brw[iat];
    }
}
