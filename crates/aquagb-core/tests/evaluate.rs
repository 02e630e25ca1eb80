//! End-to-end evaluation scenarios: energy consistency against the closed
//! forms, determinism, ordering invariance, and finite-difference checks of
//! the returned gradients.

use aquagb::SolvationContext;
use aquagb::core::models::atom::{AtomParams, HbClass};
use aquagb::core::models::solute::SoluteDescriptor;

fn atom(radius: f64, charge: f64, gamma: f64, alpha: f64) -> AtomParams {
    let mut a = AtomParams::with_radius(radius);
    a.charge = charge;
    a.gamma = gamma;
    a.alpha = alpha;
    a
}

fn descriptor(atoms: Vec<AtomParams>, positions: Vec<[f64; 3]>) -> SoluteDescriptor {
    let n = atoms.len();
    SoluteDescriptor {
        atoms,
        positions,
        hydrogens: vec![],
        dummies: vec![],
        connectivity: vec![vec![]; n],
        dielectric_in: 1.0,
        dielectric_out: 80.0,
    }
}

/// Sum of every energy component reported by one evaluation.
fn total_energy(ctx: &mut SolvationContext, id: aquagb::StructureId, coords: &[[f64; 3]]) -> f64 {
    let out = ctx.evaluate(id, coords, true).unwrap();
    out.e_gb + out.e_vdw + out.e_vdw_corr + out.e_cav + out.e_cav_corr + out.e_hb
}

/// Central finite-difference check of the summed per-atom gradients.
fn assert_gradients_match_finite_difference(
    desc: &SoluteDescriptor,
    coords: &[[f64; 3]],
    tolerance: f64,
) {
    let mut ctx = SolvationContext::with_workers(2);
    let id = ctx.register(desc).unwrap();
    let out = ctx.evaluate(id, coords, true).unwrap();

    let h = 1e-5;
    for iat in 0..coords.len() {
        for axis in 0..3 {
            let mut cp = coords.to_vec();
            let mut cm = coords.to_vec();
            cp[iat][axis] += h;
            cm[iat][axis] -= h;
            let fd = (total_energy(&mut ctx, id, &cp) - total_energy(&mut ctx, id, &cm))
                / (2.0 * h);
            let analytic = out.gb_gradient[iat][axis]
                + out.vdw_gradient[iat][axis]
                + out.cavity_gradient[iat][axis]
                + out.hb_gradient[iat][axis];
            assert!(
                (analytic - fd).abs() < tolerance * fd.abs().max(1.0),
                "atom {iat} axis {axis}: analytic {analytic} vs finite difference {fd}"
            );
        }
    }
}

#[test]
fn isolated_pair_gb_energy_is_consistent_with_returned_born_radii() {
    let d: f64 = 6.0;
    let (q0, q1) = (0.5, -0.5);
    let desc = descriptor(
        vec![atom(1.5, q0, 0.0, 0.0), atom(1.6, q1, 0.0, 0.0)],
        vec![[0.0; 3], [d, 0.0, 0.0]],
    );
    let mut ctx = SolvationContext::with_workers(1);
    let id = ctx.register(&desc).unwrap();
    let out = ctx.evaluate(id, &[[0.0; 3], [d, 0.0, 0.0]], true).unwrap();

    let df = -0.5 * (1.0 - 1.0 / 80.0);
    let (b0, b1) = (out.born_radii[0], out.born_radii[1]);
    let f = (d * d + b0 * b1 * (-d * d / (4.0 * b0 * b1)).exp()).sqrt();
    let expected = 332.0 * df * (q0 * q0 / b0 + q1 * q1 / b1 + 2.0 * q0 * q1 / f);
    assert!(
        (out.e_gb - expected).abs() < 1e-9 * expected.abs(),
        "{} vs {expected}",
        out.e_gb
    );
    // both atoms are descreened, so Born radii exceed the vdW radii
    assert!(b0 > 1.5 && b1 > 1.6);
}

#[test]
fn evaluation_is_idempotent_for_identical_coordinates() {
    let coords = vec![[0.0; 3], [2.8, 0.6, 0.0], [5.0, -0.4, 1.0]];
    let desc = descriptor(
        vec![
            atom(1.5, 0.3, 0.05, 0.5),
            atom(1.7, -0.4, 0.06, 0.7),
            atom(1.6, 0.1, 0.04, 0.6),
        ],
        coords.clone(),
    );
    let mut ctx = SolvationContext::with_workers(2);
    let id = ctx.register(&desc).unwrap();
    let a = ctx.evaluate(id, &coords, true).unwrap();
    let b = ctx.evaluate(id, &coords, true).unwrap();
    assert_eq!(a.e_gb, b.e_gb);
    assert_eq!(a.e_cav, b.e_cav);
    assert_eq!(a.e_vdw, b.e_vdw);
    assert_eq!(a.mol_volume, b.mol_volume);
    for iat in 0..3 {
        assert_eq!(a.gb_gradient[iat], b.gb_gradient[iat]);
        assert_eq!(a.cavity_gradient[iat], b.cavity_gradient[iat]);
        assert_eq!(a.born_radii[iat], b.born_radii[iat]);
    }
}

#[test]
fn atom_ordering_does_not_change_the_physics() {
    let fwd = descriptor(
        vec![atom(1.5, 0.3, 0.05, 0.4), atom(1.7, -0.4, 0.06, 0.6)],
        vec![[0.0; 3], [3.1, 0.0, 0.0]],
    );
    let rev = descriptor(
        vec![atom(1.7, -0.4, 0.06, 0.6), atom(1.5, 0.3, 0.05, 0.4)],
        vec![[3.1, 0.0, 0.0], [0.0; 3]],
    );
    let mut ctx = SolvationContext::with_workers(1);
    let id_f = ctx.register(&fwd).unwrap();
    let id_r = ctx.register(&rev).unwrap();
    let out_f = ctx
        .evaluate(id_f, &[[0.0; 3], [3.1, 0.0, 0.0]], true)
        .unwrap();
    let out_r = ctx
        .evaluate(id_r, &[[3.1, 0.0, 0.0], [0.0; 3]], true)
        .unwrap();
    assert!((out_f.e_gb - out_r.e_gb).abs() < 1e-9);
    assert!((out_f.e_cav - out_r.e_cav).abs() < 1e-9);
    assert!((out_f.born_radii[0] - out_r.born_radii[1]).abs() < 1e-12);
    for axis in 0..3 {
        assert!(
            (out_f.gb_gradient[0][axis] - out_r.gb_gradient[1][axis]).abs() < 1e-9,
            "axis {axis}"
        );
    }
}

#[test]
fn separated_atoms_keep_full_spheres() {
    let desc = descriptor(
        vec![atom(1.5, 0.0, 0.05, 0.0), atom(1.5, 0.0, 0.05, 0.0)],
        vec![[0.0; 3], [12.0, 0.0, 0.0]],
    );
    let mut ctx = SolvationContext::with_workers(1);
    let id = ctx.register(&desc).unwrap();
    let out = ctx
        .evaluate(id, &[[0.0; 3], [12.0, 0.0, 0.0]], true)
        .unwrap();

    // no overlaps: both atoms keep the full inflated sphere before the
    // surface correction, and equal (filtered) full-sphere areas
    let r = 2.0_f64;
    let area = 4.0 * std::f64::consts::PI * r * r;
    let filtered = area * area * area / (25.0 + area * area);
    assert!((out.surface_areas[0] - filtered).abs() < 1e-9);
    assert!((out.surface_areas[0] - out.surface_areas[1]).abs() < 1e-12);
    assert!(out.mol_volume > 0.0);
}

#[test]
fn overlapping_pair_loses_self_volume_and_area() {
    let close = descriptor(
        vec![atom(1.5, 0.0, 0.05, 0.0), atom(1.5, 0.0, 0.05, 0.0)],
        vec![[0.0; 3], [3.0, 0.0, 0.0]],
    );
    let apart = descriptor(
        vec![atom(1.5, 0.0, 0.05, 0.0), atom(1.5, 0.0, 0.05, 0.0)],
        vec![[0.0; 3], [12.0, 0.0, 0.0]],
    );
    let mut ctx = SolvationContext::with_workers(1);
    let id_c = ctx.register(&close).unwrap();
    let id_a = ctx.register(&apart).unwrap();
    let out_c = ctx.evaluate(id_c, &[[0.0; 3], [3.0, 0.0, 0.0]], true).unwrap();
    let out_a = ctx
        .evaluate(id_a, &[[0.0; 3], [12.0, 0.0, 0.0]], true)
        .unwrap();
    assert!(out_c.mol_volume < out_a.mol_volume);
    assert!(out_c.surface_areas[0] < out_a.surface_areas[0]);
    assert!(out_c.e_cav < out_a.e_cav);
    assert!(out_c.scaled_volumes[0] < out_a.scaled_volumes[0]);
    // corrected self-volumes stay within (0, full atomic volume]
    for &sp in &out_c.scaled_volumes {
        assert!(sp > 0.0 && sp <= 1.0);
    }
}

#[test]
fn gradients_match_finite_difference_for_a_separated_charged_trio() {
    // two heavy atoms and one hydrogen; no overlaps, so this isolates the
    // GB pair forces and the descreening chain including the hydrogen path
    let mut h = AtomParams::with_radius(1.2);
    h.charge = 0.25;
    let mut desc = descriptor(
        vec![
            atom(1.5, 0.4, 0.05, 1.0),
            atom(1.6, -0.3, 0.05, 1.0),
            h,
        ],
        vec![[0.0; 3], [5.5, 0.0, 0.0], [0.7, 0.8, 0.0]],
    );
    desc.hydrogens = vec![2];
    desc.connectivity = vec![vec![2], vec![], vec![0]];
    let coords = vec![[0.0; 3], [5.5, 0.0, 0.0], [0.7, 0.8, 0.0]];
    assert_gradients_match_finite_difference(&desc, &coords, 1e-5);
}

#[test]
fn gradients_match_finite_difference_for_an_overlapping_neutral_pair() {
    // pure cavity system: only the surface-area derivative chain is live
    let desc = descriptor(
        vec![atom(1.5, 0.0, 0.06, 0.0), atom(1.5, 0.0, 0.06, 0.0)],
        vec![[0.0; 3], [3.0, 0.4, 0.0]],
    );
    let coords = vec![[0.0; 3], [3.0, 0.4, 0.0]];
    assert_gradients_match_finite_difference(&desc, &coords, 1e-5);
}

#[test]
fn gradients_match_finite_difference_for_an_overlapping_charged_pair() {
    // the full coupled chain: overlaps, scaled volumes, Born radii, GB,
    // vdW and cavity derivatives all active at once
    let desc = descriptor(
        vec![atom(1.5, 0.5, 0.06, 0.8), atom(1.6, -0.5, 0.05, 0.7)],
        vec![[0.0; 3], [3.0, 0.0, 0.0]],
    );
    let coords = vec![[0.0; 3], [3.0, 0.0, 0.0]];
    assert_gradients_match_finite_difference(&desc, &coords, 1e-5);
}

#[test]
fn gradients_match_finite_difference_for_a_polar_donor() {
    // hydrogen-bond correction only: the water-site free-volume gradient
    // flows back through the placement tensors
    let mut heavy = AtomParams::with_radius(1.5);
    heavy.charge = 0.0;
    let mut h = AtomParams::with_radius(1.2);
    h.hb_class = HbClass::PolarH;
    h.hb_strength = -1.5;
    let mut desc = descriptor(vec![heavy, h], vec![[0.0; 3], [1.0, 0.2, 0.0]]);
    desc.hydrogens = vec![1];
    desc.connectivity = vec![vec![1], vec![0]];
    let coords = vec![[0.0; 3], [1.0, 0.2, 0.0]];
    assert_gradients_match_finite_difference(&desc, &coords, 1e-4);
}

#[test]
fn polar_donor_contributes_a_hydrogen_bond_energy() {
    let mut heavy = AtomParams::with_radius(1.5);
    heavy.charge = 0.0;
    let mut h = AtomParams::with_radius(1.2);
    h.hb_class = HbClass::PolarH;
    h.hb_strength = -1.5;
    let mut desc = descriptor(vec![heavy, h], vec![[0.0; 3], [1.0, 0.0, 0.0]]);
    desc.hydrogens = vec![1];
    desc.connectivity = vec![vec![1], vec![0]];
    let mut ctx = SolvationContext::with_workers(1);
    let id = ctx.register(&desc).unwrap();
    let coords = [[0.0; 3], [1.0, 0.0, 0.0]];
    let out = ctx.evaluate(id, &coords, true).unwrap();
    assert!(out.e_hb < 0.0);
    assert!(out.e_hb > -1.5, "switch must attenuate the full strength");

    // a repositioning-only call reproduces the same energy
    let again = ctx.evaluate(id, &coords, false).unwrap();
    assert!((again.e_hb - out.e_hb).abs() < 1e-12);
}

#[test]
fn burying_a_donor_site_weakens_the_correction() {
    let mut heavy = AtomParams::with_radius(1.5);
    heavy.charge = 0.0;
    let mut h = AtomParams::with_radius(1.2);
    h.hb_class = HbClass::PolarH;
    h.hb_strength = -1.5;
    let blocker = AtomParams::with_radius(1.7);
    let mut desc = descriptor(
        vec![heavy, h, blocker],
        vec![[0.0; 3], [1.0, 0.0, 0.0], [3.5, 0.0, 0.0]],
    );
    desc.hydrogens = vec![1];
    desc.connectivity = vec![vec![1], vec![0], vec![]];
    let mut ctx = SolvationContext::with_workers(1);
    let id = ctx.register(&desc).unwrap();
    // the blocker sits on top of the would-be water site
    let buried = ctx
        .evaluate(id, &[[0.0; 3], [1.0, 0.0, 0.0], [3.5, 0.0, 0.0]], true)
        .unwrap();
    let exposed = ctx
        .evaluate(id, &[[0.0; 3], [1.0, 0.0, 0.0], [30.0, 0.0, 0.0]], true)
        .unwrap();
    assert!(buried.e_hb > exposed.e_hb, "burial must cost binding strength");
}
