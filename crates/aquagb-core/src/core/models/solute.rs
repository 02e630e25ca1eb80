use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::atom::{AtomParams, HbClass};
use crate::core::constants::{KFC, RADIUS_INCREMENT, sphere_volume};

#[derive(Debug, Error)]
pub enum ModelBuildError {
    #[error("a bonded connectivity table is required")]
    MissingConnectivity,

    #[error("atom {atom} is listed both as hydrogen and as dummy")]
    HydrogenAlsoDummy { atom: usize },

    #[error("{field} has length {got}, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{field} references atom {index} outside 0..{natoms}")]
    IndexOutOfRange {
        field: &'static str,
        index: usize,
        natoms: usize,
    },

    #[error("atom {atom} has non-positive radius {radius}")]
    NonPositiveRadius { atom: usize, radius: f64 },
}

/// Caller-side description of a structure to register.
///
/// All arrays are in the caller's atom order; indices in `hydrogens`,
/// `dummies` and `connectivity` refer to that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoluteDescriptor {
    pub atoms: Vec<AtomParams>,
    pub positions: Vec<[f64; 3]>,
    pub hydrogens: Vec<usize>,
    pub dummies: Vec<usize>,
    /// Bonded adjacency, one neighbor list per atom. Required.
    pub connectivity: Vec<Vec<usize>>,
    pub dielectric_in: f64,
    pub dielectric_out: f64,
}

/// The internally reordered solute: hydrogens occupy the trailing index
/// range, and the `internal_to_external` / `external_to_internal` pair is a
/// bijection used for all I/O. Immutable after construction except for the
/// coordinates refreshed on every evaluation.
#[derive(Debug)]
pub struct SoluteModel {
    pub natoms: usize,
    pub heavy: Vec<usize>,
    pub hydrogens: Vec<usize>,
    pub dummies: Vec<usize>,
    pub is_heavy: Vec<bool>,
    pub is_dummy: Vec<bool>,
    pub internal_to_external: Vec<usize>,
    pub external_to_internal: Vec<usize>,

    /// Current coordinates, internal order.
    pub pos: Vec<Point3<f64>>,
    /// Inflated radii (vdW + solvent increment).
    pub r: Vec<f64>,
    /// Plain van der Waals radii.
    pub rho: Vec<f64>,
    pub charge: Vec<f64>,

    pub gamma_ideal: Vec<f64>,
    pub gamma_corr: Vec<f64>,
    pub alpha_ideal: Vec<f64>,
    pub alpha_corr: Vec<f64>,
    pub delta_ideal: Vec<f64>,
    pub delta_corr: Vec<f64>,
    /// `gamma_ideal + gamma_corr`, used by the derivative chains.
    pub gamma_total: Vec<f64>,
    /// `alpha_ideal + alpha_corr`.
    pub alpha_total: Vec<f64>,

    pub hb_class: Vec<HbClass>,
    pub hb_strength: Vec<f64>,
    pub frozen: Vec<bool>,

    /// Bonded adjacency in internal order.
    pub bonded: Vec<Vec<usize>>,

    /// Unscaled atomic volumes of the inflated spheres.
    pub vols: Vec<f64>,
    /// Gaussian exponents `KFC / r²` of the inflated spheres.
    pub galpha: Vec<f64>,

    pub dielectric_in: f64,
    pub dielectric_out: f64,
}

impl SoluteModel {
    pub fn build(desc: &SoluteDescriptor) -> Result<Self, ModelBuildError> {
        let natoms = desc.atoms.len();
        check_len("positions", desc.positions.len(), natoms)?;
        if desc.connectivity.is_empty() && natoms > 0 {
            return Err(ModelBuildError::MissingConnectivity);
        }
        check_len("connectivity", desc.connectivity.len(), natoms)?;
        check_indices("hydrogens", &desc.hydrogens, natoms)?;
        check_indices("dummies", &desc.dummies, natoms)?;
        for nbrs in &desc.connectivity {
            check_indices("connectivity", nbrs, natoms)?;
        }
        for (i, a) in desc.atoms.iter().enumerate() {
            if a.radius <= 0.0 {
                return Err(ModelBuildError::NonPositiveRadius {
                    atom: i,
                    radius: a.radius,
                });
            }
        }

        let mut is_hydrogen = vec![false; natoms];
        for &h in &desc.hydrogens {
            is_hydrogen[h] = true;
        }
        for &d in &desc.dummies {
            if is_hydrogen[d] {
                return Err(ModelBuildError::HydrogenAlsoDummy { atom: d });
            }
        }

        // renumber so hydrogens occupy the trailing index range
        let nheavy_slots = natoms - desc.hydrogens.len();
        let mut internal_to_external = vec![0usize; natoms];
        let mut external_to_internal = vec![0usize; natoms];
        let mut nc = 0;
        let mut nh = 0;
        for ext in 0..natoms {
            let int = if is_hydrogen[ext] {
                nh += 1;
                nheavy_slots + nh - 1
            } else {
                nc += 1;
                nc - 1
            };
            internal_to_external[int] = ext;
            external_to_internal[ext] = int;
        }

        let mut is_dummy = vec![false; natoms];
        for &d in &desc.dummies {
            is_dummy[external_to_internal[d]] = true;
        }

        let at = |int: usize| &desc.atoms[internal_to_external[int]];

        let hydrogens: Vec<usize> = desc
            .hydrogens
            .iter()
            .map(|&h| external_to_internal[h])
            .collect();
        let dummies: Vec<usize> = desc
            .dummies
            .iter()
            .map(|&d| external_to_internal[d])
            .collect();
        let heavy: Vec<usize> = (0..natoms)
            .filter(|&i| !is_dummy[i] && !is_hydrogen[internal_to_external[i]])
            .collect();
        let mut is_heavy = vec![false; natoms];
        for &i in &heavy {
            is_heavy[i] = true;
        }

        let pos: Vec<Point3<f64>> = (0..natoms)
            .map(|i| {
                let p = desc.positions[internal_to_external[i]];
                Point3::new(p[0], p[1], p[2])
            })
            .collect();
        let r: Vec<f64> = (0..natoms)
            .map(|i| at(i).radius + RADIUS_INCREMENT)
            .collect();
        let rho: Vec<f64> = (0..natoms).map(|i| at(i).radius).collect();

        let bonded: Vec<Vec<usize>> = (0..natoms)
            .map(|i| {
                desc.connectivity[internal_to_external[i]]
                    .iter()
                    .map(|&j| external_to_internal[j])
                    .collect()
            })
            .collect();

        let vols = r.iter().map(|&ri| sphere_volume(ri)).collect();
        let galpha = r.iter().map(|&ri| KFC / (ri * ri)).collect();

        let charge = (0..natoms).map(|i| at(i).charge).collect();
        let gamma_ideal: Vec<f64> = (0..natoms).map(|i| at(i).gamma).collect();
        let gamma_corr: Vec<f64> = (0..natoms).map(|i| at(i).gamma_corr).collect();
        let alpha_ideal: Vec<f64> = (0..natoms).map(|i| at(i).alpha).collect();
        let alpha_corr: Vec<f64> = (0..natoms).map(|i| at(i).alpha_corr).collect();
        let delta_ideal = (0..natoms).map(|i| at(i).delta).collect();
        let delta_corr = (0..natoms).map(|i| at(i).delta_corr).collect();
        let hb_class = (0..natoms).map(|i| at(i).hb_class).collect();
        let hb_strength = (0..natoms).map(|i| at(i).hb_strength).collect();
        let frozen = (0..natoms).map(|i| at(i).frozen).collect();
        let gamma_total = (0..natoms)
            .map(|i| gamma_ideal[i] + gamma_corr[i])
            .collect();
        let alpha_total = (0..natoms)
            .map(|i| alpha_ideal[i] + alpha_corr[i])
            .collect();

        Ok(Self {
            natoms,
            heavy,
            hydrogens,
            dummies,
            is_heavy,
            is_dummy,
            pos,
            rho,
            charge,
            gamma_ideal,
            gamma_corr,
            alpha_ideal,
            alpha_corr,
            delta_ideal,
            delta_corr,
            gamma_total,
            alpha_total,
            hb_class,
            hb_strength,
            frozen,
            bonded,
            vols,
            galpha,
            internal_to_external,
            external_to_internal,
            r,
            dielectric_in: desc.dielectric_in,
            dielectric_out: desc.dielectric_out,
        })
    }

    /// `−½ (1/ε_in − 1/ε_out)`, the prefactor of every generalized-Born term.
    #[inline]
    pub fn dielectric_factor(&self) -> f64 {
        -0.5 * (1.0 / self.dielectric_in - 1.0 / self.dielectric_out)
    }

    /// Refreshes internal coordinates from a caller-order slice.
    pub fn set_positions_external(&mut self, coords: &[[f64; 3]]) {
        for int in 0..self.natoms {
            let p = coords[self.internal_to_external[int]];
            self.pos[int] = Point3::new(p[0], p[1], p[2]);
        }
    }
}

fn check_len(field: &'static str, got: usize, expected: usize) -> Result<(), ModelBuildError> {
    if got != expected {
        return Err(ModelBuildError::LengthMismatch {
            field,
            expected,
            got,
        });
    }
    Ok(())
}

fn check_indices(
    field: &'static str,
    indices: &[usize],
    natoms: usize,
) -> Result<(), ModelBuildError> {
    for &i in indices {
        if i >= natoms {
            return Err(ModelBuildError::IndexOutOfRange {
                field,
                index: i,
                natoms,
            });
        }
    }
    Ok(())
}
