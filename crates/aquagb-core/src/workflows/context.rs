//! The solvation context: structure registration and energy evaluation.

use slotmap::{SlotMap, new_key_type};
use tracing::{info, instrument};

use crate::core::integrals::DescreeningTable;
use crate::core::models::solute::{SoluteDescriptor, SoluteModel};
use crate::engine::driver;
use crate::engine::error::EngineError;
use crate::engine::workdata::WorkData;

new_key_type! {
    /// Opaque handle of a registered structure.
    pub struct StructureId;
}

struct Structure {
    model: SoluteModel,
    table: DescreeningTable,
    master: WorkData,
    workers: Vec<WorkData>,
}

/// Everything one evaluation returns, in the caller's atom order.
///
/// Energies are in kcal/mol, gradients in kcal/mol/Å, volumes in Å³, areas
/// in Å², Born radii in Å.
#[derive(Debug, Clone)]
pub struct SolvationOutput {
    pub mol_volume: f64,
    pub e_gb: f64,
    pub e_vdw: f64,
    pub e_vdw_corr: f64,
    pub e_cav: f64,
    pub e_cav_corr: f64,
    pub e_hb: f64,
    pub gb_gradient: Vec<[f64; 3]>,
    pub vdw_gradient: Vec<[f64; 3]>,
    pub cavity_gradient: Vec<[f64; 3]>,
    pub hb_gradient: Vec<[f64; 3]>,
    pub scaled_volumes: Vec<f64>,
    pub born_radii: Vec<f64>,
    pub surface_areas: Vec<f64>,
}

/// Owns every registered structure and its worker scratch.
///
/// The worker team size is fixed at construction; a single structure must not
/// be evaluated concurrently from two calls (the scratch is shared across
/// calls), which the `&mut self` receiver enforces.
pub struct SolvationContext {
    structures: SlotMap<StructureId, Structure>,
    workers: usize,
}

impl SolvationContext {
    pub fn new() -> Self {
        #[cfg(feature = "parallel")]
        let workers = rayon::current_num_threads().max(1);
        #[cfg(not(feature = "parallel"))]
        let workers = 1;
        Self::with_workers(workers)
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            structures: SlotMap::with_key(),
            workers: workers.max(1),
        }
    }

    /// Validates and registers a structure: builds the internal index
    /// remapping, the descreening-integral tables and the per-worker scratch.
    #[instrument(skip_all, name = "register_structure")]
    pub fn register(&mut self, desc: &SoluteDescriptor) -> Result<StructureId, EngineError> {
        let model = SoluteModel::build(desc)?;
        let table = DescreeningTable::build(&model.r);
        let natoms = model.natoms;
        let master = WorkData::new(natoms);
        let workers = (0..self.workers).map(|_| WorkData::new(natoms)).collect();
        info!(
            natoms,
            nheavy = model.heavy.len(),
            tables = table.num_tables(),
            workers = self.workers,
            "registered structure"
        );
        Ok(self.structures.insert(Structure {
            model,
            table,
            master,
            workers,
        }))
    }

    /// Releases everything owned by a structure. Returns whether the handle
    /// was valid.
    pub fn unregister(&mut self, id: StructureId) -> bool {
        self.structures.remove(id).is_some()
    }

    pub fn contains(&self, id: StructureId) -> bool {
        self.structures.contains_key(id)
    }

    /// Evaluates the solvation model at the given caller-order coordinates.
    ///
    /// With `init` set, water sites and their neighbor lists are rebuilt from
    /// the current topology and geometry; otherwise existing sites are only
    /// repositioned. On error the structure's output buffers are undefined
    /// and the caller must not consume them.
    #[instrument(skip_all, name = "evaluate_structure")]
    pub fn evaluate(
        &mut self,
        id: StructureId,
        coords: &[[f64; 3]],
        init: bool,
    ) -> Result<SolvationOutput, EngineError> {
        let s = self
            .structures
            .get_mut(id)
            .ok_or(EngineError::UnknownStructure)?;
        if coords.len() != s.model.natoms {
            return Err(EngineError::CoordinateLength {
                expected: s.model.natoms,
                got: coords.len(),
            });
        }
        s.model.set_positions_external(coords);
        let en = driver::total_energy(&s.model, &s.table, &mut s.master, &mut s.workers, init)?;

        let natoms = s.model.natoms;
        let mut out = SolvationOutput {
            mol_volume: en.mol_volume,
            e_gb: en.e_gb,
            e_vdw: en.e_vdw,
            e_vdw_corr: en.e_vdw_corr,
            e_cav: en.e_cav,
            e_cav_corr: en.e_cav_corr,
            e_hb: en.e_hb,
            gb_gradient: vec![[0.0; 3]; natoms],
            vdw_gradient: vec![[0.0; 3]; natoms],
            cavity_gradient: vec![[0.0; 3]; natoms],
            hb_gradient: vec![[0.0; 3]; natoms],
            scaled_volumes: vec![0.0; natoms],
            born_radii: vec![0.0; natoms],
            surface_areas: vec![0.0; natoms],
        };
        for ext in 0..natoms {
            let int = s.model.external_to_internal[ext];
            out.gb_gradient[ext] = s.master.dgbdr[int].into();
            out.vdw_gradient[ext] = s.master.dvwdr[int].into();
            out.cavity_gradient[ext] = s.master.decav[int].into();
            out.hb_gradient[ext] = s.master.dehb[int].into();
            out.scaled_volumes[ext] = s.master.sp[int];
            out.born_radii[ext] = s.master.br[int];
            out.surface_areas[ext] = s.master.surf_area_f[int];
        }
        Ok(out)
    }
}

impl Default for SolvationContext {
    fn default() -> Self {
        Self::new()
    }
}
