use std::f64::consts::PI;

/// Solvent-probe increment added to every van der Waals radius on input (Å).
pub const RADIUS_INCREMENT: f64 = 0.5;

/// Water probe radius used by the non-polar energy function (Å).
pub const WATER_RADIUS: f64 = 1.4;

/// Exponent constant of the Gaussian representation of a sphere: `a = KFC / r²`.
pub const KFC: f64 = 2.226_985_925_3;

/// Prefactor of the Gaussian representation of a sphere.
pub const PFC: f64 = 2.5;

/// Maximum order of the Gaussian-overlap inclusion-exclusion expansion.
pub const MAX_OVERLAP_LEVEL: usize = 6;

/// Volume filter onset: filtered overlap volumes vanish below this (Å³).
pub const MIN_VOLA: f64 = 0.01;
/// Volume filter end: the filter is the identity above this (Å³).
pub const MIN_VOLB: f64 = 0.1;

/// Hard floor under which an overlap branch is pruned.
pub const GVOL_FLOOR: f64 = 1.0e-30;

/// Safety factor on the sum-of-radii near-neighbor cutoff.
pub const NB_OFFSET: f64 = 1.2;

/// Center-distance cutoff of the far (non-overlapping) neighbor shell (Å).
pub const FAR_CUTOFF: f64 = 16.0;

/// Electrostatic conversion to kcal/mol (charges in e, distances in Å).
pub const TO_KCALMOL: f64 = 332.0;

/// Distance from a donor/acceptor at which water sites are placed (Å).
pub const HB_LENGTH: f64 = 2.5;

/// Radius of a water-site pseudo atom (Å).
pub const HB_RADIUS: f64 = 1.4 + RADIUS_INCREMENT;

/// Free-volume fraction at which the hydrogen-bond switch turns on.
pub const HB_SWA: f64 = 0.5;
/// Free-volume fraction at which the hydrogen-bond switch saturates.
pub const HB_SWB: f64 = 1.0;

pub const FOUR_PI: f64 = 4.0 * PI;
pub const INV_FOUR_PI: f64 = 1.0 / FOUR_PI;

/// Quantization scale turning a radius ratio into an integer table key.
pub const Q4_KEY_SCALE: f64 = 10_000.0;
/// Nodes per descreening-integral spline table.
pub const Q4_NODES: usize = 2048;
/// Upper bound of the tabulated scaled distance `rij / rj`.
pub const Q4_UMAX: f64 = 20.0;

/// Geometric growth factor for reusable engine buffers.
pub const GROWTH_FACTOR: f64 = 1.2;

/// Volume of a sphere of radius `r`.
#[inline]
pub fn sphere_volume(r: f64) -> f64 {
    (4.0 / 3.0) * PI * r * r * r
}
