//! Per-worker scratch buffers.
//!
//! One `WorkData` instance is the authoritative accumulator (the "master");
//! each worker owns a private instance whose partial sums are merged into the
//! master at stage boundaries. Buffers are sized at registration and reused
//! across evaluations; the pairwise-integral cache grows geometrically on
//! demand and is never shrunk within a run.

use nalgebra::Vector3;

use crate::core::constants::GROWTH_FACTOR;
use crate::core::models::solute::SoluteModel;
use crate::engine::neighbor::NeighborLists;
use crate::engine::water::WaterSite;

#[derive(Debug)]
pub struct WorkData {
    pub nb: NeighborLists,
    /// Cached descreening integrals `(value, derivative)` per traversal
    /// direction, in exactly the order the fill pass walks the lists.
    pub cache: Vec<f64>,

    // accumulators merged across workers
    pub volumep: Vec<f64>,
    pub surf_area: Vec<f64>,
    pub br1: Vec<f64>,
    pub dera: Vec<f64>,
    pub deru: Vec<f64>,
    pub derv: Vec<f64>,
    pub dgbdr: Vec<Vector3<f64>>,
    pub dvwdr: Vec<Vector3<f64>>,
    pub decav: Vec<Vector3<f64>>,
    pub dehb: Vec<Vector3<f64>>,
    pub e_gb_self: f64,
    pub e_gb_pair: f64,
    pub e_hb: f64,

    // master-side derived arrays, read-only for the workers
    pub spe: Vec<f64>,
    pub sp: Vec<f64>,
    pub psvol: Vec<f64>,
    pub surf_area_f: Vec<f64>,
    pub gammap: Vec<f64>,
    pub derus: Vec<f64>,
    pub dervs: Vec<f64>,
    pub br: Vec<f64>,
    pub br1_swf_der: Vec<f64>,
    pub brw: Vec<f64>,
    pub q2ab: Vec<f64>,
    pub abrw: Vec<f64>,

    pub sites: Vec<WaterSite>,
    pub sort_scratch: Vec<(f64, usize)>,
}

impl WorkData {
    pub fn new(natoms: usize) -> Self {
        Self {
            nb: NeighborLists::new(natoms),
            cache: Vec::with_capacity(8 * natoms),
            volumep: vec![0.0; natoms],
            surf_area: vec![0.0; natoms],
            br1: vec![0.0; natoms],
            dera: vec![0.0; natoms],
            deru: vec![0.0; natoms],
            derv: vec![0.0; natoms],
            dgbdr: vec![Vector3::zeros(); natoms],
            dvwdr: vec![Vector3::zeros(); natoms],
            decav: vec![Vector3::zeros(); natoms],
            dehb: vec![Vector3::zeros(); natoms],
            e_gb_self: 0.0,
            e_gb_pair: 0.0,
            e_hb: 0.0,
            spe: vec![0.0; natoms],
            sp: vec![1.0; natoms],
            psvol: vec![0.0; natoms],
            surf_area_f: vec![0.0; natoms],
            gammap: vec![0.0; natoms],
            derus: vec![0.0; natoms],
            dervs: vec![0.0; natoms],
            br: vec![0.0; natoms],
            br1_swf_der: vec![0.0; natoms],
            brw: vec![0.0; natoms],
            q2ab: vec![0.0; natoms],
            abrw: vec![0.0; natoms],
            sites: Vec::new(),
            sort_scratch: Vec::new(),
        }
    }

    /// Zeroes the worker-side accumulators at the start of an evaluation.
    pub fn reset_accumulators(&mut self) {
        for v in &mut self.volumep {
            *v = 0.0;
        }
        for v in &mut self.surf_area {
            *v = 0.0;
        }
        for v in &mut self.br1 {
            *v = 0.0;
        }
        for v in &mut self.dera {
            *v = 0.0;
        }
        for v in &mut self.deru {
            *v = 0.0;
        }
        for v in &mut self.derv {
            *v = 0.0;
        }
        for v in &mut self.dgbdr {
            *v = Vector3::zeros();
        }
        for v in &mut self.dvwdr {
            *v = Vector3::zeros();
        }
        for v in &mut self.decav {
            *v = Vector3::zeros();
        }
        for v in &mut self.dehb {
            *v = Vector3::zeros();
        }
        self.e_gb_self = 0.0;
        self.e_gb_pair = 0.0;
        self.e_hb = 0.0;
    }

    /// Seeds the authoritative buffers: full atomic self-volumes, full-sphere
    /// surface areas, and the bare inverse van der Waals radii.
    pub fn reset_master(&mut self, model: &SoluteModel) {
        self.reset_accumulators();
        for &iat in &model.heavy {
            self.volumep[iat] = model.vols[iat];
            self.surf_area[iat] = 4.0 * std::f64::consts::PI * model.r[iat] * model.r[iat];
        }
        for iat in 0..model.natoms {
            self.br1[iat] = 1.0 / model.rho[iat];
            self.sp[iat] = 1.0;
        }
    }

    /// Grows the pairwise-integral cache to hold `slots` floats.
    pub fn ensure_cache(&mut self, slots: usize) {
        if slots > self.cache.capacity() {
            let target = ((self.cache.capacity() as f64 * GROWTH_FACTOR) as usize).max(slots);
            self.cache.reserve_exact(target - self.cache.len());
        }
        self.cache.clear();
    }
}
