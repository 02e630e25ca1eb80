//! Recursive n-body Gaussian-overlap engine.
//!
//! Spheres are represented by Gaussians (`a = KFC/r²`, prefactor `PFC`), so
//! the k-body overlap volume has a closed incremental form: combining the
//! (k−1)-body overlap kernel with the k-th kernel gives a new exponent (sum),
//! center (precision-weighted average), prefactor (product times an
//! exponential separation penalty) and volume `p·(π/a)^{3/2}`. Raw volumes
//! pass through the two-sided volume filter so near-zero high-order overlaps
//! vanish smoothly.
//!
//! The depth-first traversal over a root atom's ascending near list is shared
//! by every pass that walks overlaps: self-volumes/areas, the two derivative
//! back-propagation passes, and the water-site free volumes. A branch is
//! pruned once its filtered volume falls under a hard floor or the maximum
//! order is reached.

use nalgebra::Vector3;
use std::f64::consts::PI;

use crate::core::constants::{GVOL_FLOOR, KFC, MAX_OVERLAP_LEVEL, MIN_VOLA, MIN_VOLB, PFC};
use crate::core::models::solute::SoluteModel;
use crate::core::switching::switch_volume;
use crate::engine::neighbor::NeighborList;

pub(crate) const MAXO: usize = MAX_OVERLAP_LEVEL;

/// A single Gaussian kernel with its originating sphere radius.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Kernel {
    pub a: f64,
    pub p: f64,
    pub c: Vector3<f64>,
    pub r: f64,
}

impl Kernel {
    #[inline]
    pub fn of_atom(model: &SoluteModel, iat: usize) -> Self {
        Self {
            a: model.galpha[iat],
            p: PFC,
            c: model.pos[iat].coords,
            r: model.r[iat],
        }
    }

    #[inline]
    pub fn of_sphere(center: Vector3<f64>, r: f64) -> Self {
        Self {
            a: KFC / (r * r),
            p: PFC,
            c: center,
            r,
        }
    }
}

/// Combined kernel parameters of a partial overlap chain.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Combined {
    pub a: f64,
    pub p: f64,
    pub c: Vector3<f64>,
}

impl From<Kernel> for Combined {
    fn from(k: Kernel) -> Self {
        Self { a: k.a, p: k.p, c: k.c }
    }
}

/// Result of one incremental combination step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Overlap {
    pub combined: Combined,
    /// Raw overlap volume.
    pub vol: f64,
    /// Filtered volume and the filter's first two derivatives.
    pub volf: f64,
    pub fp: f64,
    pub fpp: f64,
}

/// Combines the running overlap kernel with one more Gaussian.
#[inline]
pub(crate) fn combine(prev: &Combined, k: &Kernel) -> Overlap {
    let delta = prev.a + k.a;
    let deltai = 1.0 / delta;
    let c = (prev.c * prev.a + k.c * k.a) * deltai;
    let d2 = (k.c - prev.c).norm_squared();
    let kappa = (-prev.a * k.a * d2 * deltai).exp();
    let p = prev.p * k.p * kappa;
    let u = PI * deltai;
    let vol = p * u * u.sqrt();
    let (volf, fp, fpp) = switch_volume(vol, MIN_VOLA, MIN_VOLB);
    Overlap {
        combined: Combined { a: delta, p, c },
        vol,
        volf,
        fp,
        fpp,
    }
}

/// First derivatives of an overlap volume: positional gradients per kernel
/// center and radius derivatives per kernel sphere, both raw and filtered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OverlapDerivs {
    pub dpos_raw: [Vector3<f64>; MAXO],
    pub dpos: [Vector3<f64>; MAXO],
    pub drad_raw: [f64; MAXO],
    pub drad: [f64; MAXO],
}

pub(crate) fn first_derivatives(kernels: &[Kernel], ov: &Overlap) -> OverlapDerivs {
    let deltai = 1.0 / ov.combined.a;
    let mut d = OverlapDerivs {
        dpos_raw: [Vector3::zeros(); MAXO],
        dpos: [Vector3::zeros(); MAXO],
        drad_raw: [0.0; MAXO],
        drad: [0.0; MAXO],
    };
    for (i, k) in kernels.iter().enumerate() {
        let u = -2.0 * k.a * ov.vol;
        let dri = (k.c - ov.combined.c) * u;
        let d2 = dri.norm_squared();
        let w = k.a * ov.vol;
        let drad = (3.0 * w * deltai + 0.5 * d2 / w) / k.r;
        d.dpos_raw[i] = dri;
        d.dpos[i] = dri * ov.fp;
        d.drad_raw[i] = drad;
        d.drad[i] = drad * ov.fp;
    }
    d
}

/// Position gradients of the filtered radius derivatives:
/// `out[k][m] = ∂(drad_m)/∂x_k`, feeding the surface-area derivative pass.
pub(crate) fn radius_gradient_cross(
    kernels: &[Kernel],
    ov: &Overlap,
    d: &OverlapDerivs,
) -> [[Vector3<f64>; MAXO]; MAXO] {
    let n = kernels.len();
    let deltai = 1.0 / ov.combined.a;
    let mut out = [[Vector3::zeros(); MAXO]; MAXO];

    for i in 0..n {
        let u = -2.0 * ov.fp * (1.0 - kernels[i].a * deltai) / kernels[i].r
            + (ov.fpp + ov.fp / ov.vol) * d.drad_raw[i];
        out[i][i] = d.dpos_raw[i] * u;
    }
    let u = ov.fpp + ov.fp / ov.vol;
    let v = 2.0 * ov.fp * deltai;
    for i in 0..n {
        for j in i + 1..n {
            out[i][j] = d.dpos_raw[j] * (v * kernels[i].a / kernels[j].r)
                + d.dpos_raw[i] * (u * d.drad_raw[j]);
            out[j][i] = d.dpos_raw[i] * (v * kernels[j].a / kernels[i].r)
                + d.dpos_raw[j] * (u * d.drad_raw[i]);
        }
    }
    out
}

/// Bounded depth-first walk over all overlap chains rooted at `root`.
///
/// `neighbors` must be sorted ascending by distance to the root; chains pick
/// strictly increasing positions in that list. `visit` runs for every
/// accepted overlap with the chain's neighbor ids (root excluded), the full
/// kernel chain (root included) and the combination result; a chain is
/// extended only while its filtered volume stays above the floor and the
/// order below the maximum.
pub(crate) fn traverse<K, F>(root: Kernel, neighbors: &[usize], kernel_of: K, mut visit: F)
where
    K: Fn(usize) -> Kernel,
    F: FnMut(usize, &[usize], &[Kernel], &Overlap),
{
    let nn = neighbors.len();
    if nn == 0 {
        return;
    }
    let mut kernels = [Kernel::default(); MAXO];
    let mut combined = [Combined::default(); MAXO];
    let mut atoms = [0usize; MAXO];
    let mut idx = [0usize; MAXO];
    kernels[0] = root;
    combined[0] = Combined::from(root);

    let mut order = 2usize;
    idx[order - 1] = 0;
    while order > 1 {
        let jat = neighbors[idx[order - 1]];
        let k = kernel_of(jat);
        let ov = combine(&combined[order - 2], &k);
        combined[order - 1] = ov.combined;
        kernels[order - 1] = k;
        atoms[order - 2] = jat;

        if ov.volf > GVOL_FLOOR && order < MAXO {
            visit(order, &atoms[..order - 1], &kernels[..order], &ov);
            order += 1;
            idx[order - 1] = idx[order - 2] + 1;
        } else {
            idx[order - 1] += 1;
        }
        while order > 1 && idx[order - 1] >= nn {
            order -= 1;
            idx[order - 1] += 1;
        }
    }
}

#[inline]
pub(crate) fn order_sign(order: usize) -> f64 {
    if order % 2 == 0 { -1.0 } else { 1.0 }
}

/// Self-volume and raw-surface-area pass.
///
/// Every accepted overlap of order n contributes `(−1)^{n+1} volf / n` to the
/// self-volume of each participant and `(−1)^{n+1} drad` to each
/// participant's raw area. Accumulators are worker-private and merged later.
pub(crate) fn self_volumes(
    model: &SoluteModel,
    near: &NeighborList,
    heavy_owned: &[usize],
    volumep: &mut [f64],
    surf_area: &mut [f64],
) {
    for &iat in heavy_owned {
        let root = Kernel::of_atom(model, iat);
        traverse(
            root,
            near.neighbors(iat),
            |j| Kernel::of_atom(model, j),
            |order, chain, kernels, ov| {
                let sign = order_sign(order);
                let cvol = sign / order as f64;
                let d = first_derivatives(kernels, ov);
                volumep[iat] += cvol * ov.volf;
                surf_area[iat] += sign * d.drad[0];
                for (k, &at) in chain.iter().enumerate() {
                    volumep[at] += cvol * ov.volf;
                    surf_area[at] += sign * d.drad[k + 1];
                }
            },
        );
    }
}

/// Back-propagates the energy dependence on self-volumes to positions.
///
/// `deru`/`derv` hold `∂E_gb/∂V'` and `∂E_vdw/∂V'` per atom; each overlap's
/// positional gradient is weighted by the participants' summed sensitivities.
pub(crate) fn volume_derivatives(
    model: &SoluteModel,
    near: &NeighborList,
    heavy_owned: &[usize],
    deru: &[f64],
    derv: &[f64],
    dgbdr: &mut [Vector3<f64>],
    dvwdr: &mut [Vector3<f64>],
) {
    for &iat in heavy_owned {
        let root = Kernel::of_atom(model, iat);
        traverse(
            root,
            near.neighbors(iat),
            |j| Kernel::of_atom(model, j),
            |order, chain, kernels, ov| {
                let cvol = order_sign(order) / order as f64;
                let d = first_derivatives(kernels, ov);
                let mut wu = deru[iat];
                let mut wv = derv[iat];
                for &at in chain {
                    wu += deru[at];
                    wv += derv[at];
                }
                dgbdr[iat] += d.dpos[0] * (cvol * wu);
                dvwdr[iat] += d.dpos[0] * (cvol * wv);
                for (k, &at) in chain.iter().enumerate() {
                    dgbdr[at] += d.dpos[k + 1] * (cvol * wu);
                    dvwdr[at] += d.dpos[k + 1] * (cvol * wv);
                }
            },
        );
    }
}

/// Back-propagates the energy dependence on raw surface areas to positions.
///
/// Raw areas are inclusion-exclusion sums of radius derivatives, so their
/// position gradients need the `∂(drad)/∂x` tensors. `gammap` weights the
/// cavity term; `derus`/`dervs` weight the GB and vdW dependence introduced
/// by the area correction of the self-volumes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn area_derivatives(
    model: &SoluteModel,
    near: &NeighborList,
    heavy_owned: &[usize],
    gammap: &[f64],
    derus: &[f64],
    dervs: &[f64],
    decav: &mut [Vector3<f64>],
    dgbdr: &mut [Vector3<f64>],
    dvwdr: &mut [Vector3<f64>],
) {
    for &iat in heavy_owned {
        let root = Kernel::of_atom(model, iat);
        traverse(
            root,
            near.neighbors(iat),
            |j| Kernel::of_atom(model, j),
            |order, chain, kernels, ov| {
                let sign = order_sign(order);
                let d = first_derivatives(kernels, ov);
                let cross = radius_gradient_cross(kernels, ov, &d);
                let mut parts = [0usize; MAXO];
                parts[0] = iat;
                parts[1..order].copy_from_slice(chain);
                for k in 0..order {
                    let mut dc = Vector3::zeros();
                    let mut dg = Vector3::zeros();
                    let mut dv = Vector3::zeros();
                    for (m, &pm) in parts[..order].iter().enumerate() {
                        let t = cross[k][m] * sign;
                        dc += t * gammap[pm];
                        dg += t * derus[pm];
                        dv += t * dervs[pm];
                    }
                    decav[parts[k]] += dc;
                    dgbdr[parts[k]] += dg;
                    dvwdr[parts[k]] += dv;
                }
            },
        );
    }
}
