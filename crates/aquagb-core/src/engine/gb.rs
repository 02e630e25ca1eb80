//! Generalized-Born energy, non-polar energies, and the pairwise derivative
//! passes at fixed self-volumes.
//!
//! The all-pairs loops run over caller-partitioned rows; descreening-force
//! and volume-sensitivity passes consume the worker's integral cache in the
//! exact order the fill pass produced it (see `engine::born`).

use nalgebra::Vector3;
use std::ops::Range;

use crate::core::constants::{INV_FOUR_PI, WATER_RADIUS};
use crate::core::models::solute::SoluteModel;
use crate::engine::neighbor::NeighborLists;

/// Sequential reader over a worker's pairwise-integral cache.
struct CacheCursor<'a> {
    data: &'a [f64],
    pos: usize,
}

impl<'a> CacheCursor<'a> {
    fn new(data: &'a [f64]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    fn read2(&mut self) -> (f64, f64) {
        let v = (self.data[self.pos], self.data[self.pos + 1]);
        self.pos += 2;
        v
    }

    #[inline]
    fn read4(&mut self) -> (f64, f64, f64, f64) {
        let v = (
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        );
        self.pos += 4;
        v
    }

    fn finish(self) {
        debug_assert_eq!(self.pos, self.data.len(), "cache fill/consume order diverged");
    }
}

/// Self and pair generalized-Born energy over the owned rows, with
/// `dera = ∂E_gb/∂B` accumulated per atom. Energies are in internal units;
/// the driver applies the kcal/mol conversion.
pub(crate) fn gb_energy(
    model: &SoluteModel,
    br: &[f64],
    rows: Range<usize>,
    dera: &mut [f64],
) -> (f64, f64) {
    let df = model.dielectric_factor();
    let mut e_self = 0.0;
    let mut e_pair = 0.0;
    for iat in rows {
        if model.is_dummy[iat] {
            continue;
        }
        let qi = model.charge[iat];
        if qi == 0.0 {
            continue;
        }
        let bi = br[iat];
        e_self += df * qi * qi / bi;
        dera[iat] -= df * qi * qi / (bi * bi);
        for jat in iat + 1..model.natoms {
            if model.is_dummy[jat] {
                continue;
            }
            let qq = qi * model.charge[jat];
            if qq == 0.0 {
                continue;
            }
            let bj = br[jat];
            let u = (model.pos[jat] - model.pos[iat]).norm_squared();
            let b = bi * bj;
            let g = (-u / (4.0 * b)).exp();
            let f2 = u + b * g;
            let f = f2.sqrt();
            let f3 = f2 * f;
            e_pair += 2.0 * df * qq / f;
            let w = df * qq * g * (1.0 + u / (4.0 * b)) / f3;
            dera[iat] -= w * bj;
            dera[jat] -= w * bi;
        }
    }
    (e_self, e_pair)
}

/// Direct pair forces of the GB smoothing kernel at constant Born radii.
pub(crate) fn gb_pair_forces(
    model: &SoluteModel,
    br: &[f64],
    rows: Range<usize>,
    dgbdr: &mut [Vector3<f64>],
) {
    let df = model.dielectric_factor();
    for iat in rows {
        if model.is_dummy[iat] {
            continue;
        }
        let qi = model.charge[iat];
        if qi == 0.0 {
            continue;
        }
        for jat in iat + 1..model.natoms {
            if model.is_dummy[jat] {
                continue;
            }
            let qq = qi * model.charge[jat];
            if qq == 0.0 {
                continue;
            }
            if model.frozen[iat] && model.frozen[jat] {
                continue;
            }
            let b = br[iat] * br[jat];
            let rij = model.pos[iat] - model.pos[jat];
            let u = rij.norm_squared();
            let g = (-u / (4.0 * b)).exp();
            let f2 = u + b * g;
            let f3 = f2 * f2.sqrt();
            let w = -2.0 * df * qq * (1.0 - 0.25 * g) / f3;
            dgbdr[iat] += rij * w;
            dgbdr[jat] -= rij * w;
        }
    }
}

/// Van der Waals energy `Σ α(B+R_w)⁻³ + δ`, ideal and correction parts.
pub(crate) fn vdw_energy(model: &SoluteModel, br: &[f64]) -> (f64, f64) {
    let mut e = 0.0;
    let mut ec = 0.0;
    for iat in 0..model.natoms {
        if model.is_dummy[iat] {
            continue;
        }
        let a = 1.0 / (br[iat] + WATER_RADIUS);
        let a3 = a * a * a;
        e += model.alpha_ideal[iat] * a3 + model.delta_ideal[iat];
        ec += model.alpha_corr[iat] * a3 + model.delta_corr[iat];
    }
    (e, ec)
}

/// Distance forces through the Born-radius dependence of the GB and vdW
/// energies, consuming the cached integral derivatives.
#[allow(clippy::too_many_arguments)]
pub(crate) fn descreening_forces(
    model: &SoluteModel,
    nb: &NeighborLists,
    cache: &[f64],
    heavy_owned: &[usize],
    hydrogen_owned: &[usize],
    sp: &[f64],
    q2ab: &[f64],
    abrw: &[f64],
    dgbdr: &mut [Vector3<f64>],
    dvwdr: &mut [Vector3<f64>],
) {
    let mut cur = CacheCursor::new(cache);
    let mut pair = |cur: &mut CacheCursor, iat: usize, jat: usize| {
        let (_, dqij, _, dqji) = cur.read4();
        if model.frozen[iat] && model.frozen[jat] {
            return;
        }
        let rij = model.pos[iat] - model.pos[jat];
        let u = rij / rij.norm();
        let ti = -INV_FOUR_PI * sp[jat] * dqij;
        let tj = -INV_FOUR_PI * sp[iat] * dqji;
        let fg = q2ab[iat] * ti + q2ab[jat] * tj;
        let fv = abrw[iat] * ti + abrw[jat] * tj;
        dgbdr[iat] += u * fg;
        dgbdr[jat] -= u * fg;
        dvwdr[iat] += u * fv;
        dvwdr[jat] -= u * fv;
    };

    for &iat in heavy_owned {
        for &jat in nb.near.neighbors(iat) {
            pair(&mut cur, iat, jat);
        }
    }
    for &iat in heavy_owned {
        for &jat in nb.far.neighbors(iat) {
            pair(&mut cur, iat, jat);
        }
    }
    for &iat in hydrogen_owned {
        for &jat in nb.far.neighbors(iat) {
            let (_, dq) = cur.read2();
            if model.frozen[iat] && model.frozen[jat] {
                continue;
            }
            let rij = model.pos[iat] - model.pos[jat];
            let u = rij / rij.norm();
            let t = -INV_FOUR_PI * sp[jat] * dq;
            let fg = q2ab[iat] * t;
            let fv = abrw[iat] * t;
            dgbdr[iat] += u * fg;
            dgbdr[jat] -= u * fg;
            dvwdr[iat] += u * fv;
            dvwdr[jat] -= u * fv;
        }
    }
    cur.finish();
}

/// Accumulates the sensitivity of the GB and vdW energies to every atom's
/// self-volume, consuming the cached integral values. Raw sums here;
/// `finish_volume_sensitivities` applies the `−1/(4π V)` factor.
#[allow(clippy::too_many_arguments)]
pub(crate) fn volume_sensitivities(
    model: &SoluteModel,
    nb: &NeighborLists,
    cache: &[f64],
    heavy_owned: &[usize],
    hydrogen_owned: &[usize],
    q2ab: &[f64],
    abrw: &[f64],
    deru: &mut [f64],
    derv: &mut [f64],
) {
    let mut cur = CacheCursor::new(cache);
    let mut pair = |cur: &mut CacheCursor, iat: usize, jat: usize| {
        let (qij, _, qji, _) = cur.read4();
        if model.frozen[iat] && model.frozen[jat] {
            return;
        }
        deru[jat] += q2ab[iat] * qij;
        derv[jat] += abrw[iat] * qij;
        deru[iat] += q2ab[jat] * qji;
        derv[iat] += abrw[jat] * qji;
    };

    for &iat in heavy_owned {
        for &jat in nb.near.neighbors(iat) {
            pair(&mut cur, iat, jat);
        }
    }
    for &iat in heavy_owned {
        for &jat in nb.far.neighbors(iat) {
            pair(&mut cur, iat, jat);
        }
    }
    for &iat in hydrogen_owned {
        for &jat in nb.far.neighbors(iat) {
            let (q, _) = cur.read2();
            if model.frozen[iat] && model.frozen[jat] {
                continue;
            }
            deru[jat] += q2ab[iat] * q;
            derv[jat] += abrw[iat] * q;
        }
    }
    cur.finish();
}

/// Turns the raw sensitivity sums into `∂E/∂V'` and derives the effective
/// area weights introduced by the surface correction of the self-volumes.
pub(crate) fn finish_volume_sensitivities(
    model: &SoluteModel,
    deru: &mut [f64],
    derv: &mut [f64],
    psvol: &[f64],
    derus: &mut [f64],
    dervs: &mut [f64],
) {
    for iat in 0..model.natoms {
        let w = -INV_FOUR_PI / model.vols[iat];
        deru[iat] *= w;
        derv[iat] *= w;
    }
    for &iat in &model.heavy {
        derus[iat] = -deru[iat] * psvol[iat];
        dervs[iat] = -derv[iat] * psvol[iat];
    }
}
