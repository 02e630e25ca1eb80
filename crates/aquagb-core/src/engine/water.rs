//! Water-site pseudo atoms and the hydrogen-bond correction energy.
//!
//! Hydrogen-bond-active atoms get 1–4 geometric pseudo atoms placed around
//! them by closed-form constructions from their bonded neighbors, together
//! with the analytic 3×3 derivative tensor of the site position with respect
//! to every parent atom. Each site's free volume against the nearby heavy
//! atoms, filtered through the free-volume switch, contributes
//! `khb · s(free/volume)` to the correction energy; the gradient flows back
//! to the parents through the stored tensors.
//!
//! A placement rule that does not find its expected bonded topology degrades
//! to zero sites for that atom and logs a warning, except the out-of-plane
//! trigonal rule whose failure aborts the evaluation.

use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{trace, warn};

use crate::core::constants::{HB_LENGTH, HB_RADIUS, HB_SWA, HB_SWB, MIN_VOLA, NB_OFFSET, sphere_volume};
use crate::core::math::geometry::{normalized_with_inv, unit_vector_jacobian};
use crate::core::models::atom::HbClass;
use crate::core::models::solute::SoluteModel;
use crate::core::switching::poly_switch;
use crate::engine::error::EngineError;
use crate::engine::overlap::{self, Combined, Kernel};

/// Placement rule that produced a site; drives the positional update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SiteGeometry {
    PolarH,
    Trigonal1,
    Trigonal2,
    TrigonalS,
    TrigonalOop,
    Tetrahedral1,
    Tetrahedral2,
    Tetrahedral3,
}

#[derive(Debug, Clone)]
pub struct WaterSite {
    pub(crate) pos: Point3<f64>,
    pub(crate) radius: f64,
    pub(crate) geometry: SiteGeometry,
    pub(crate) parents: [usize; 4],
    pub(crate) nparents: usize,
    /// Position within the placement group (e.g. which of a site pair).
    pub(crate) seq: u8,
    /// `dpos[p]` is the Jacobian of the site position in parent `p`'s
    /// coordinates.
    pub(crate) dpos: [Matrix3<f64>; 4],
    pub(crate) khb: f64,
    pub(crate) volume: f64,
    pub(crate) free_volume: f64,
    pub(crate) sp: f64,
    /// `khb · s'(sp) / volume`, the per-site energy sensitivity to its free
    /// volume.
    pub(crate) dhw: f64,
    /// Heavy atoms whose Gaussians overlap this site, ascending by distance.
    pub(crate) neighbors: Vec<usize>,
}

// ---------------------------------------------------------------------------
// placement rules
// ---------------------------------------------------------------------------

/// Site along the donor→hydrogen direction at distance `d` from the donor.
///
/// Returns the site and the Jacobians with respect to the hydrogen and the
/// donor.
pub(crate) fn place_polar_h(
    donor: &Point3<f64>,
    hydrogen: &Point3<f64>,
    d: f64,
) -> (Point3<f64>, Matrix3<f64>, Matrix3<f64>) {
    let dx = hydrogen - donor;
    let (u, inv) = normalized_with_inv(&dx);
    let w = d * inv;
    let site = donor + dx * w;
    let dh = (Matrix3::identity() - u * u.transpose()) * w;
    let dd = Matrix3::identity() - dh;
    (site, dh, dd)
}

/// In-plane pair of sites of an sp² acceptor `A` bound to `R`, placed
/// opposite the two substituents `R1`, `R2` of `R`.
///
/// Jacobian order per site: `[A, R, R1, R2]`.
#[allow(clippy::type_complexity)]
pub(crate) fn place_trigonal1(
    a: &Point3<f64>,
    r: &Point3<f64>,
    r1: &Point3<f64>,
    r2: &Point3<f64>,
    d: f64,
) -> ([Point3<f64>; 2], [Matrix3<f64>; 4], [Matrix3<f64>; 4]) {
    let (u1, inv1) = normalized_with_inv(&(r1 - r));
    let (u2, inv2) = normalized_with_inv(&(r2 - r));
    let site1 = a - u1 * d;
    let site2 = a - u2 * d;

    let j1 = unit_vector_jacobian(&u1, inv1) * d;
    let j2 = unit_vector_jacobian(&u2, inv2) * d;
    let zero = Matrix3::zeros();
    let der1 = [Matrix3::identity(), j1, -j1, zero];
    let der2 = [Matrix3::identity(), j2, zero, -j2];
    ([site1, site2], der1, der2)
}

/// Out-of-plane pair completing the `TrigonalS` rule: sites at ±60° from the
/// `R→A` direction, out of the `R, R1, A` plane.
///
/// Jacobian order per site: `[A, R, R1]`.
#[allow(clippy::type_complexity)]
pub(crate) fn place_trigonal_oop_pair(
    a: &Point3<f64>,
    r: &Point3<f64>,
    r1: &Point3<f64>,
    d: f64,
) -> ([Point3<f64>; 2], [Matrix3<f64>; 3], [Matrix3<f64>; 3]) {
    let cos_t = 0.5;
    let sin_t = 3.0_f64.sqrt() / 2.0;
    let dx0 = a - r;
    let dx1 = r1 - r;
    let (uin, inv0) = normalized_with_inv(&dx0);
    let (uout, invo) = normalized_with_inv(&dx1.cross(&dx0));

    let site1 = a + (uin * cos_t + uout * sin_t) * d;
    let site2 = a + (uin * cos_t - uout * sin_t) * d;

    let jin = unit_vector_jacobian(&uin, inv0);
    let jout = unit_vector_jacobian(&uout, invo);
    // raw out-of-plane vector is dx1 × dx0
    let duout_da = jout * dx1.cross_matrix();
    let duout_dr1 = -(jout * dx0.cross_matrix());

    let wc = d * cos_t;
    let ws = d * sin_t;
    let d1_r1 = duout_dr1 * ws;
    let d1_a = jin * wc + duout_da * ws;
    let der1 = [
        Matrix3::identity() + d1_a,
        -(jin * wc) - (duout_da + duout_dr1) * ws,
        d1_r1,
    ];
    let d2_a = jin * wc - duout_da * ws;
    let der2 = [
        Matrix3::identity() + d2_a,
        -(jin * wc) + (duout_da + duout_dr1) * ws,
        -d1_r1,
    ];
    ([site1, site2], der1, der2)
}

/// Single in-plane lone-pair site of an sp² acceptor with two bonded
/// neighbors, along the negative bisector of the bond directions.
///
/// Jacobian order: `[A, R1, R2]`.
pub(crate) fn place_trigonal2(
    a: &Point3<f64>,
    r1: &Point3<f64>,
    r2: &Point3<f64>,
    d: f64,
) -> (Point3<f64>, [Matrix3<f64>; 3]) {
    let (u1, inv1) = normalized_with_inv(&(r1 - a));
    let (u2, inv2) = normalized_with_inv(&(r2 - a));
    let (uw, invw) = normalized_with_inv(&(u1 + u2));
    let site = a - uw * d;

    let jw = unit_vector_jacobian(&uw, invw);
    let m1 = -(jw * unit_vector_jacobian(&u1, inv1)) * d;
    let m2 = -(jw * unit_vector_jacobian(&u2, inv2)) * d;
    let m0 = Matrix3::identity() - m1 - m2;
    (site, [m0, m1, m2])
}

/// Pair of sites across a trigonal atom along the normal of its three
/// bonded neighbors' plane, at distance `d + 0.2`.
///
/// Jacobian order per site: `[A, R1, R2, R3]`.
#[allow(clippy::type_complexity)]
pub(crate) fn place_trigonal_oop(
    a: &Point3<f64>,
    r1: &Point3<f64>,
    r2: &Point3<f64>,
    r3: &Point3<f64>,
    d: f64,
) -> ([Point3<f64>; 2], [Matrix3<f64>; 4], [Matrix3<f64>; 4]) {
    let dd = d + 0.2;
    let v1 = r2 - r1;
    let v2 = r3 - r1;
    let (nu, inv) = normalized_with_inv(&v2.cross(&v1));
    let site1 = a + nu * dd;
    let site2 = a - nu * dd;

    let jnu = unit_vector_jacobian(&nu, inv);
    // raw normal is v2 × v1
    let dnu_dv1 = jnu * v2.cross_matrix();
    let dnu_dv2 = -(jnu * v1.cross_matrix());
    let m2 = dnu_dv1 * dd;
    let m3 = dnu_dv2 * dd;
    let der1 = [Matrix3::identity(), -(m2 + m3), m2, m3];
    let der2 = [Matrix3::identity(), m2 + m3, -m2, -m3];
    ([site1, site2], der1, der2)
}

/// Lone-pair site pair of an sp³ acceptor with two bonded neighbors, at the
/// tetrahedral angle in and out of the bond plane.
///
/// Jacobian order per site: `[A, R1, R2]`.
#[allow(clippy::type_complexity)]
pub(crate) fn place_tetrahedral2(
    a: &Point3<f64>,
    r1: &Point3<f64>,
    r2: &Point3<f64>,
    d: f64,
) -> ([Point3<f64>; 2], [Matrix3<f64>; 3], [Matrix3<f64>; 3]) {
    let cos_t = -1.0 / 3.0_f64.sqrt();
    let sin_t = (2.0 / 3.0_f64).sqrt();
    let rv1 = r1 - a;
    let rv2 = r2 - a;
    let (u1, inv1) = normalized_with_inv(&rv1);
    let (u2, inv2) = normalized_with_inv(&rv2);
    let (uin, invin) = normalized_with_inv(&(u1 + u2));
    let (uout, invo) = normalized_with_inv(&rv2.cross(&rv1));

    let site1 = a + (uin * cos_t + uout * sin_t) * d;
    let site2 = a + (uin * cos_t - uout * sin_t) * d;

    let jin = unit_vector_jacobian(&uin, invin);
    let wc = d * cos_t;
    let m1 = (jin * unit_vector_jacobian(&u1, inv1)) * wc;
    let m2 = (jin * unit_vector_jacobian(&u2, inv2)) * wc;

    let jout = unit_vector_jacobian(&uout, invo);
    // raw out-of-plane vector is rv2 × rv1
    let ws = d * sin_t;
    let o1 = (jout * rv2.cross_matrix()) * ws;
    let o2 = -(jout * rv1.cross_matrix()) * ws;

    let d1_1 = m1 + o1;
    let d1_2 = m2 + o2;
    let der1 = [Matrix3::identity() - d1_1 - d1_2, d1_1, d1_2];
    let d2_1 = m1 - o1;
    let d2_2 = m2 - o2;
    let der2 = [Matrix3::identity() - d2_1 - d2_2, d2_1, d2_2];
    ([site1, site2], der1, der2)
}

/// Single lone-pair site of an sp³ atom with three bonded neighbors, along
/// the negative sum of the bond unit vectors.
///
/// Jacobian order: `[A, R1, R2, R3]`.
pub(crate) fn place_tetrahedral3(
    a: &Point3<f64>,
    r1: &Point3<f64>,
    r2: &Point3<f64>,
    r3: &Point3<f64>,
    d: f64,
) -> (Point3<f64>, [Matrix3<f64>; 4]) {
    let (u1, inv1) = normalized_with_inv(&(r1 - a));
    let (u2, inv2) = normalized_with_inv(&(r2 - a));
    let (u3, inv3) = normalized_with_inv(&(r3 - a));
    let (uw, invw) = normalized_with_inv(&(u1 + u2 + u3));
    let site = a - uw * d;

    let jw = unit_vector_jacobian(&uw, invw);
    let m1 = -(jw * unit_vector_jacobian(&u1, inv1)) * d;
    let m2 = -(jw * unit_vector_jacobian(&u2, inv2)) * d;
    let m3 = -(jw * unit_vector_jacobian(&u3, inv3)) * d;
    let m0 = Matrix3::identity() - m1 - m2 - m3;
    (site, [m0, m1, m2, m3])
}

/// One of the three sites of a singly-bonded acceptor on a tetrahedral
/// center (sulfone-like oxygens): anti to the substituent `R1` of `R`.
///
/// Jacobian order: `[A, R, R1]`.
pub(crate) fn place_tetrahedral1(
    a: &Point3<f64>,
    r: &Point3<f64>,
    r1: &Point3<f64>,
    d: f64,
) -> (Point3<f64>, [Matrix3<f64>; 3]) {
    let (u, inv) = normalized_with_inv(&(r1 - r));
    let site = a - u * d;
    let j = unit_vector_jacobian(&u, inv) * d;
    (site, [Matrix3::identity(), j, -j])
}

// ---------------------------------------------------------------------------
// site creation and update
// ---------------------------------------------------------------------------

struct RuleFailure(String);

fn push_site(
    sites: &mut Vec<WaterSite>,
    model: &SoluteModel,
    iat: usize,
    geometry: SiteGeometry,
    seq: u8,
    pos: Point3<f64>,
    parents: &[usize],
    dpos: &[Matrix3<f64>],
) {
    let mut p = [0usize; 4];
    let mut d = [Matrix3::zeros(); 4];
    p[..parents.len()].copy_from_slice(parents);
    d[..dpos.len()].copy_from_slice(dpos);
    sites.push(WaterSite {
        pos,
        radius: HB_RADIUS,
        geometry,
        parents: p,
        nparents: parents.len(),
        seq,
        dpos: d,
        khb: model.hb_strength[iat],
        volume: sphere_volume(HB_RADIUS),
        free_volume: 0.0,
        sp: 0.0,
        dhw: 0.0,
        neighbors: Vec::new(),
    });
}

/// Finds the substituents `R1, R2` of `r` other than `iat` in a 3-coordinated
/// trigonal center.
fn trigonal_substituents(
    model: &SoluteModel,
    iat: usize,
    r: usize,
) -> Result<(usize, usize), RuleFailure> {
    if model.bonded[r].len() != 3 {
        return Err(RuleFailure(format!(
            "atom bound to acceptor should have 3 bonded neighbors, found {}",
            model.bonded[r].len()
        )));
    }
    let mut others = model.bonded[r].iter().copied().filter(|&j| j != iat);
    match (others.next(), others.next()) {
        (Some(r1), Some(r2)) => Ok((r1, r2)),
        _ => Err(RuleFailure("acceptor appears twice in the center's bonded list".into())),
    }
}

fn place_for_atom(
    model: &SoluteModel,
    iat: usize,
    sites: &mut Vec<WaterSite>,
) -> Result<(), RuleFailure> {
    let pos = &model.pos;
    let nb = &model.bonded[iat];
    match model.hb_class[iat] {
        HbClass::Inactive => Ok(()),

        HbClass::PolarH => {
            let jat = nb
                .iter()
                .copied()
                .find(|&j| model.is_heavy[j])
                .ok_or_else(|| RuleFailure("polar hydrogen has no bonded heavy atom".into()))?;
            let (site, dh, dd) = place_polar_h(&pos[jat], &pos[iat], HB_LENGTH);
            push_site(sites, model, iat, SiteGeometry::PolarH, 0, site, &[iat, jat], &[dh, dd]);
            Ok(())
        }

        HbClass::Trigonal => match nb.len() {
            1 => {
                let r = nb[0];
                let (r1, r2) = trigonal_substituents(model, iat, r)?;
                let (s, der1, der2) =
                    place_trigonal1(&pos[iat], &pos[r], &pos[r1], &pos[r2], HB_LENGTH);
                let parents = [iat, r, r1, r2];
                push_site(sites, model, iat, SiteGeometry::Trigonal1, 0, s[0], &parents, &der1);
                push_site(sites, model, iat, SiteGeometry::Trigonal1, 1, s[1], &parents, &der2);
                Ok(())
            }
            2 => {
                let (r1, r2) = (nb[0], nb[1]);
                let (site, der) = place_trigonal2(&pos[iat], &pos[r1], &pos[r2], HB_LENGTH);
                push_site(sites, model, iat, SiteGeometry::Trigonal2, 0, site, &[iat, r1, r2], &der);
                Ok(())
            }
            _ => Ok(()),
        },

        HbClass::TrigonalS => {
            if nb.len() != 1 {
                return Err(RuleFailure(format!(
                    "acceptor should have one bonded neighbor, found {}",
                    nb.len()
                )));
            }
            let r = nb[0];
            let (r1, r2) = trigonal_substituents(model, iat, r)?;
            let parents = [iat, r, r1, r2];
            let (s, der1, der2) =
                place_trigonal1(&pos[iat], &pos[r], &pos[r1], &pos[r2], HB_LENGTH);
            push_site(sites, model, iat, SiteGeometry::TrigonalS, 0, s[0], &parents, &der1);
            push_site(sites, model, iat, SiteGeometry::TrigonalS, 1, s[1], &parents, &der2);
            let (s, der1, der2) = place_trigonal_oop_pair(&pos[iat], &pos[r], &pos[r1], HB_LENGTH);
            push_site(sites, model, iat, SiteGeometry::TrigonalS, 2, s[0], &parents, &der1);
            push_site(sites, model, iat, SiteGeometry::TrigonalS, 3, s[1], &parents, &der2);
            Ok(())
        }

        HbClass::TrigonalOop => {
            if nb.len() != 3 {
                return Err(RuleFailure(format!(
                    "trigonal atom should have 3 bonded neighbors, found {}",
                    nb.len()
                )));
            }
            let (r1, r2, r3) = (nb[0], nb[1], nb[2]);
            let (s, der1, der2) =
                place_trigonal_oop(&pos[iat], &pos[r1], &pos[r2], &pos[r3], HB_LENGTH);
            let parents = [iat, r1, r2, r3];
            push_site(sites, model, iat, SiteGeometry::TrigonalOop, 0, s[0], &parents, &der1);
            push_site(sites, model, iat, SiteGeometry::TrigonalOop, 1, s[1], &parents, &der2);
            Ok(())
        }

        HbClass::Tetrahedral => match nb.len() {
            2 => {
                let (r1, r2) = (nb[0], nb[1]);
                let (s, der1, der2) = place_tetrahedral2(&pos[iat], &pos[r1], &pos[r2], HB_LENGTH);
                let parents = [iat, r1, r2];
                push_site(sites, model, iat, SiteGeometry::Tetrahedral2, 0, s[0], &parents, &der1);
                push_site(sites, model, iat, SiteGeometry::Tetrahedral2, 1, s[1], &parents, &der2);
                Ok(())
            }
            3 => {
                let (r1, r2, r3) = (nb[0], nb[1], nb[2]);
                let (site, der) =
                    place_tetrahedral3(&pos[iat], &pos[r1], &pos[r2], &pos[r3], HB_LENGTH);
                push_site(
                    sites,
                    model,
                    iat,
                    SiteGeometry::Tetrahedral3,
                    0,
                    site,
                    &[iat, r1, r2, r3],
                    &der,
                );
                Ok(())
            }
            1 => {
                let r = nb[0];
                if model.bonded[r].len() != 4 {
                    return Err(RuleFailure(format!(
                        "tetrahedral center should have 4 bonded neighbors, found {}",
                        model.bonded[r].len()
                    )));
                }
                for (seq, &rk) in model.bonded[r]
                    .iter()
                    .filter(|&&j| j != iat)
                    .enumerate()
                    .take(3)
                {
                    let (site, der) = place_tetrahedral1(&pos[iat], &pos[r], &pos[rk], HB_LENGTH);
                    push_site(
                        sites,
                        model,
                        iat,
                        SiteGeometry::Tetrahedral1,
                        seq as u8,
                        site,
                        &[iat, r, rk],
                        &der,
                    );
                }
                Ok(())
            }
            _ => Ok(()),
        },
    }
}

/// Places the water sites of one atom, appending to `sites`.
///
/// Topology mismatches degrade to zero sites with a warning, except for the
/// out-of-plane trigonal rule whose failure is propagated.
pub(crate) fn create_sites_for_atom(
    model: &SoluteModel,
    iat: usize,
    sites: &mut Vec<WaterSite>,
) -> Result<(), EngineError> {
    let before = sites.len();
    match place_for_atom(model, iat, sites) {
        Ok(()) => Ok(()),
        Err(RuleFailure(reason)) => {
            sites.truncate(before);
            if model.hb_class[iat] == HbClass::TrigonalOop {
                Err(EngineError::Placement { atom: iat, reason })
            } else {
                warn!(atom = iat, %reason, "skipping water sites for atom");
                Ok(())
            }
        }
    }
}

/// Rebuilds the site list for the owned atom range.
pub(crate) fn create_sites(
    model: &SoluteModel,
    atoms: std::ops::Range<usize>,
    sites: &mut Vec<WaterSite>,
) -> Result<(), EngineError> {
    sites.clear();
    for iat in atoms {
        if model.hb_class[iat].is_active() {
            create_sites_for_atom(model, iat, sites)?;
        }
    }
    Ok(())
}

/// Refreshes positions and derivative tensors of existing sites from the
/// current coordinates, without re-deriving topology or neighbor lists.
pub(crate) fn update_sites(model: &SoluteModel, sites: &mut [WaterSite]) {
    let pos = &model.pos;
    for site in sites.iter_mut() {
        let p = site.parents;
        match site.geometry {
            SiteGeometry::PolarH => {
                let (s, dh, dd) = place_polar_h(&pos[p[1]], &pos[p[0]], HB_LENGTH);
                site.pos = s;
                site.dpos[0] = dh;
                site.dpos[1] = dd;
            }
            SiteGeometry::Trigonal1 => {
                let (s, der1, der2) =
                    place_trigonal1(&pos[p[0]], &pos[p[1]], &pos[p[2]], &pos[p[3]], HB_LENGTH);
                let (s, der) = if site.seq == 0 { (s[0], der1) } else { (s[1], der2) };
                site.pos = s;
                site.dpos = der;
            }
            SiteGeometry::Trigonal2 => {
                let (s, der) = place_trigonal2(&pos[p[0]], &pos[p[1]], &pos[p[2]], HB_LENGTH);
                site.pos = s;
                site.dpos[..3].copy_from_slice(&der);
            }
            SiteGeometry::TrigonalS => {
                if site.seq < 2 {
                    let (s, der1, der2) =
                        place_trigonal1(&pos[p[0]], &pos[p[1]], &pos[p[2]], &pos[p[3]], HB_LENGTH);
                    let (s, der) = if site.seq == 0 { (s[0], der1) } else { (s[1], der2) };
                    site.pos = s;
                    site.dpos = der;
                } else {
                    let (s, der1, der2) =
                        place_trigonal_oop_pair(&pos[p[0]], &pos[p[1]], &pos[p[2]], HB_LENGTH);
                    let (s, der) = if site.seq == 2 { (s[0], der1) } else { (s[1], der2) };
                    site.pos = s;
                    site.dpos[..3].copy_from_slice(&der);
                    site.dpos[3] = Matrix3::zeros();
                }
            }
            SiteGeometry::TrigonalOop => {
                let (s, der1, der2) =
                    place_trigonal_oop(&pos[p[0]], &pos[p[1]], &pos[p[2]], &pos[p[3]], HB_LENGTH);
                let (s, der) = if site.seq == 0 { (s[0], der1) } else { (s[1], der2) };
                site.pos = s;
                site.dpos = der;
            }
            SiteGeometry::Tetrahedral1 => {
                let (s, der) = place_tetrahedral1(&pos[p[0]], &pos[p[1]], &pos[p[2]], HB_LENGTH);
                site.pos = s;
                site.dpos[..3].copy_from_slice(&der);
            }
            SiteGeometry::Tetrahedral2 => {
                let (s, der1, der2) =
                    place_tetrahedral2(&pos[p[0]], &pos[p[1]], &pos[p[2]], HB_LENGTH);
                let (s, der) = if site.seq == 0 { (s[0], der1) } else { (s[1], der2) };
                site.pos = s;
                site.dpos[..3].copy_from_slice(&der);
            }
            SiteGeometry::Tetrahedral3 => {
                let (s, der) =
                    place_tetrahedral3(&pos[p[0]], &pos[p[1]], &pos[p[2]], &pos[p[3]], HB_LENGTH);
                site.pos = s;
                site.dpos = der;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// free volumes and energy
// ---------------------------------------------------------------------------

/// Computes a site's free volume against the heavy atoms.
///
/// When `rebuild_neighbors` is set the cached per-site neighbor list is
/// regathered (distance prefilter plus a two-body overlap test) and sorted
/// ascending by distance; otherwise it is reused as-is.
pub(crate) fn site_free_volume(
    model: &SoluteModel,
    site: &mut WaterSite,
    rebuild_neighbors: bool,
    scratch: &mut Vec<(f64, usize)>,
) {
    let root = Kernel::of_sphere(site.pos.coords, site.radius);
    if rebuild_neighbors {
        scratch.clear();
        for &jat in &model.heavy {
            let d2 = (model.pos[jat].coords - site.pos.coords).norm_squared();
            let cut = (model.r[jat] + site.radius) * NB_OFFSET;
            if d2 < cut * cut {
                let ov = overlap::combine(&Combined::from(root), &Kernel::of_atom(model, jat));
                if ov.vol > MIN_VOLA {
                    scratch.push((d2, jat));
                }
            }
        }
        scratch.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        site.neighbors.clear();
        site.neighbors.extend(scratch.iter().map(|&(_, j)| j));
    }

    let mut free = site.volume;
    overlap::traverse(
        root,
        &site.neighbors,
        |j| Kernel::of_atom(model, j),
        |order, _, _, ov| {
            free += overlap::order_sign(order) * ov.volf;
        },
    );
    site.free_volume = free;
    site.sp = free / site.volume;
}

/// Switches the scaled free volume into an energy contribution, storing the
/// per-site sensitivity for the gradient pass.
pub(crate) fn site_energy(site: &mut WaterSite) -> f64 {
    let (s, ds, _) = poly_switch(site.sp, HB_SWA, HB_SWB);
    site.dhw = site.khb * ds / site.volume;
    trace!(
        sp = site.sp,
        khb = site.khb,
        energy = site.khb * s,
        "water site contribution"
    );
    site.khb * s
}

/// Back-propagates one site's free-volume gradient into `dehb`: overlap
/// gradients on the site flow to its parents through the placement tensors,
/// gradients on the heavy neighbors accumulate directly.
pub(crate) fn site_gradient(model: &SoluteModel, site: &WaterSite, dehb: &mut [Vector3<f64>]) {
    if site.dhw == 0.0 {
        return;
    }
    let root = Kernel::of_sphere(site.pos.coords, site.radius);
    overlap::traverse(
        root,
        &site.neighbors,
        |j| Kernel::of_atom(model, j),
        |order, chain, kernels, ov| {
            let w = site.dhw * overlap::order_sign(order);
            let d = overlap::first_derivatives(kernels, ov);
            let g0 = d.dpos[0] * w;
            for p in 0..site.nparents {
                dehb[site.parents[p]] += site.dpos[p].transpose() * g0;
            }
            for (k, &at) in chain.iter().enumerate() {
                dehb[at] += d.dpos[k + 1] * w;
            }
        },
    );
}
