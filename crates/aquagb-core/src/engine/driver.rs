//! Total-energy driver.
//!
//! Sequences the pipeline stages once per energy call: reset → neighbor
//! lists → self-volumes/areas → scaling factors → inverse Born radii → Born
//! radii → vdW energy → GB energy → constant-volume derivatives → water
//! sites → volume sensitivities → volume-derivative pass → area-derivative
//! pass → reduction.
//!
//! Each worker owns a private `WorkData` and processes a static contiguous
//! chunk of the relevant index set; the joins of the parallel iterators are
//! the barriers, the sequential sections between them are the
//! one-designated-worker reductions. Pair loops write to both endpoints of a
//! pair, so per-atom accumulators stay worker-private until the merge. A
//! stage error aborts the remaining stages and leaves the outputs undefined.

use std::ops::Range;

use tracing::{debug, instrument};

use crate::core::constants::TO_KCALMOL;
use crate::core::integrals::DescreeningTable;
use crate::core::models::solute::SoluteModel;
use crate::core::switching::switch_area;
use crate::engine::error::EngineError;
use crate::engine::workdata::WorkData;
use crate::engine::{born, gb, overlap, water};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Scalar results of one evaluation; per-atom outputs stay in the master
/// `WorkData`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Energies {
    pub mol_volume: f64,
    pub e_gb: f64,
    pub e_vdw: f64,
    pub e_vdw_corr: f64,
    pub e_cav: f64,
    pub e_cav_corr: f64,
    pub e_hb: f64,
}

/// Static contiguous partition of `0..len` across `nworkers`.
#[inline]
fn chunk(len: usize, nworkers: usize, w: usize) -> Range<usize> {
    (len * w / nworkers)..(len * (w + 1) / nworkers)
}

fn for_each_worker<F>(workers: &mut [WorkData], f: F) -> Result<(), EngineError>
where
    F: Fn(usize, &mut WorkData) -> Result<(), EngineError> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        workers
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(w, wd)| f(w, wd))
    }
    #[cfg(not(feature = "parallel"))]
    {
        workers.iter_mut().enumerate().try_for_each(|(w, wd)| f(w, wd))
    }
}

/// Surface-area filtering, scaled-volume factors and the solvent-excluded
/// volume correction, plus the cavity energy and molecular volume.
fn scaling_factors(model: &SoluteModel, wd: &mut WorkData, en: &mut Energies) {
    for &iat in &model.heavy {
        let a_raw = wd.surf_area[iat];
        let (f, fp) = switch_area(a_raw);
        wd.surf_area_f[iat] = a_raw * f;
        wd.gammap[iat] = model.gamma_total[iat] * (f + a_raw * fp);
        wd.spe[iat] = wd.volumep[iat] / model.vols[iat];

        // volume subtended by the surface shell between the vdW and the
        // inflated sphere: A · (R/3) · (1 − (ρ/R)³)
        let pr = model.r[iat] * (1.0 - (model.rho[iat] / model.r[iat]).powi(3)) / 3.0;
        wd.psvol[iat] = (fp * a_raw + f) * pr;
        wd.volumep[iat] -= wd.surf_area_f[iat] * pr;
        wd.sp[iat] = wd.volumep[iat] / model.vols[iat];

        en.e_cav += model.gamma_ideal[iat] * wd.surf_area_f[iat];
        en.e_cav_corr += model.gamma_corr[iat] * wd.surf_area_f[iat];
        en.mol_volume += wd.volumep[iat];
    }
}

#[instrument(skip_all, name = "total_energy")]
pub(crate) fn total_energy(
    model: &SoluteModel,
    table: &DescreeningTable,
    master: &mut WorkData,
    workers: &mut [WorkData],
    init: bool,
) -> Result<Energies, EngineError> {
    let natoms = model.natoms;
    let nheavy = model.heavy.len();
    let nhydro = model.hydrogens.len();
    let nw = workers.len();
    debug_assert!(nw > 0);

    master.reset_master(model);
    for_each_worker(workers, |_, wd| {
        wd.reset_accumulators();
        Ok(())
    })?;

    // neighbor lists and integral-cache sizing
    for_each_worker(workers, |w, wd| {
        let (near, far, hpairs) =
            wd.nb
                .rebuild(model, chunk(nheavy, nw, w), chunk(nhydro, nw, w));
        wd.ensure_cache(4 * (near + far) + 2 * hpairs);
        Ok(())
    })?;

    // self volumes and raw surface areas
    for_each_worker(workers, |w, wd| {
        let heavy_owned = &model.heavy[chunk(nheavy, nw, w)];
        overlap::self_volumes(
            model,
            &wd.nb.near,
            heavy_owned,
            &mut wd.volumep,
            &mut wd.surf_area,
        );
        Ok(())
    })?;
    for wd in workers.iter() {
        for &iat in &model.heavy {
            master.volumep[iat] += wd.volumep[iat];
            master.surf_area[iat] += wd.surf_area[iat];
        }
    }

    let mut en = Energies::default();
    scaling_factors(model, master, &mut en);

    // inverse Born radii: fill the integral caches, accumulate raw sums
    {
        let master_ro: &WorkData = master;
        for_each_worker(workers, |w, wd| {
            let heavy_owned = &model.heavy[chunk(nheavy, nw, w)];
            let hydro_owned = &model.hydrogens[chunk(nhydro, nw, w)];
            born::accumulate_inverse_radii(
                model,
                table,
                &wd.nb,
                heavy_owned,
                hydro_owned,
                &master_ro.sp,
                &mut wd.cache,
                &mut wd.br1,
            );
            Ok(())
        })?;
    }
    for wd in workers.iter() {
        for iat in 0..natoms {
            master.br1[iat] += wd.br1[iat];
        }
    }

    // Born radii and the non-polar energies that need only them
    born::filter_born_radii(
        model,
        &mut master.br1,
        &mut master.br1_swf_der,
        &mut master.br,
        &mut master.brw,
    );
    let (e_vdw, e_vdw_corr) = gb::vdw_energy(model, &master.br);
    en.e_vdw = e_vdw;
    en.e_vdw_corr = e_vdw_corr;

    // GB self + pair energy at fixed self-volumes
    {
        let master_ro: &WorkData = master;
        for_each_worker(workers, |w, wd| {
            let (e_self, e_pair) =
                gb::gb_energy(model, &master_ro.br, chunk(natoms, nw, w), &mut wd.dera);
            wd.e_gb_self = e_self;
            wd.e_gb_pair = e_pair;
            Ok(())
        })?;
    }
    let mut e_self = 0.0;
    let mut e_pair = 0.0;
    for wd in workers.iter() {
        e_self += wd.e_gb_self;
        e_pair += wd.e_gb_pair;
        for iat in 0..natoms {
            master.dera[iat] += wd.dera[iat];
        }
    }
    en.e_gb = TO_KCALMOL * (e_self + e_pair);
    debug!(e_gb = en.e_gb, e_vdw = en.e_vdw, e_cav = en.e_cav, "energies at fixed volumes");

    born::chain_coefficients(
        model,
        &master.dera,
        &master.br,
        &master.br1_swf_der,
        &master.brw,
        &mut master.q2ab,
        &mut master.abrw,
    );

    // derivative contributions at constant self-volumes
    {
        let master_ro: &WorkData = master;
        for_each_worker(workers, |w, wd| {
            gb::gb_pair_forces(model, &master_ro.br, chunk(natoms, nw, w), &mut wd.dgbdr);
            let heavy_owned = &model.heavy[chunk(nheavy, nw, w)];
            let hydro_owned = &model.hydrogens[chunk(nhydro, nw, w)];
            gb::descreening_forces(
                model,
                &wd.nb,
                &wd.cache,
                heavy_owned,
                hydro_owned,
                &master_ro.sp,
                &master_ro.q2ab,
                &master_ro.abrw,
                &mut wd.dgbdr,
                &mut wd.dvwdr,
            );
            Ok(())
        })?;
    }

    // water sites: placement, free volumes, correction energy and gradient
    for_each_worker(workers, |w, wd| {
        let atoms = chunk(natoms, nw, w);
        let rebuild = init || wd.sites.is_empty();
        let mut sites = std::mem::take(&mut wd.sites);
        if rebuild {
            water::create_sites(model, atoms, &mut sites)?;
        } else {
            water::update_sites(model, &mut sites);
        }
        wd.e_hb = 0.0;
        for site in sites.iter_mut() {
            water::site_free_volume(model, site, rebuild, &mut wd.sort_scratch);
            wd.e_hb += water::site_energy(site);
            water::site_gradient(model, site, &mut wd.dehb);
        }
        wd.sites = sites;
        Ok(())
    })?;
    en.e_hb = workers.iter().map(|wd| wd.e_hb).sum();

    // sensitivity of the energy to every atom's self-volume
    {
        let master_ro: &WorkData = master;
        for_each_worker(workers, |w, wd| {
            let heavy_owned = &model.heavy[chunk(nheavy, nw, w)];
            let hydro_owned = &model.hydrogens[chunk(nhydro, nw, w)];
            gb::volume_sensitivities(
                model,
                &wd.nb,
                &wd.cache,
                heavy_owned,
                hydro_owned,
                &master_ro.q2ab,
                &master_ro.abrw,
                &mut wd.deru,
                &mut wd.derv,
            );
            Ok(())
        })?;
    }
    for wd in workers.iter() {
        for iat in 0..natoms {
            master.deru[iat] += wd.deru[iat];
            master.derv[iat] += wd.derv[iat];
        }
    }
    gb::finish_volume_sensitivities(
        model,
        &mut master.deru,
        &mut master.derv,
        &master.psvol,
        &mut master.derus,
        &mut master.dervs,
    );

    // back-propagation through self-volumes and surface areas
    {
        let master_ro: &WorkData = master;
        for_each_worker(workers, |w, wd| {
            let heavy_owned = &model.heavy[chunk(nheavy, nw, w)];
            overlap::volume_derivatives(
                model,
                &wd.nb.near,
                heavy_owned,
                &master_ro.deru,
                &master_ro.derv,
                &mut wd.dgbdr,
                &mut wd.dvwdr,
            );
            overlap::area_derivatives(
                model,
                &wd.nb.near,
                heavy_owned,
                &master_ro.gammap,
                &master_ro.derus,
                &master_ro.dervs,
                &mut wd.decav,
                &mut wd.dgbdr,
                &mut wd.dvwdr,
            );
            Ok(())
        })?;
    }

    // reduce per-worker gradients and convert the GB gradient to kcal/mol
    for wd in workers.iter() {
        for iat in 0..natoms {
            master.dgbdr[iat] += wd.dgbdr[iat];
            master.dvwdr[iat] += wd.dvwdr[iat];
            master.decav[iat] += wd.decav[iat];
            master.dehb[iat] += wd.dehb[iat];
        }
    }
    for g in &mut master.dgbdr {
        *g *= TO_KCALMOL;
    }

    Ok(en)
}
