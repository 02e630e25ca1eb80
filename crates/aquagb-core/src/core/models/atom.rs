use serde::{Deserialize, Serialize};

/// Hydrogen-bond class of an atom, selecting its water-site placement rule.
///
/// The acceptor classes fan out further on the atom's bonded coordination
/// number when sites are placed (e.g. a trigonal acceptor with one bonded
/// neighbor gets the in-plane pair of sites, with two the single lone-pair
/// site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HbClass {
    /// Not hydrogen-bond active; no water sites are placed.
    #[default]
    Inactive,
    /// Polar hydrogen of a donor group.
    PolarH,
    /// sp² acceptor (carbonyl-like or aromatic-nitrogen-like).
    Trigonal,
    /// sp² acceptor carrying both in-plane and out-of-plane site pairs.
    TrigonalS,
    /// sp² atom with a pair of out-of-plane sites across its bonded plane.
    TrigonalOop,
    /// sp³ acceptor (hydroxyl/thioether oxygen-like, amine-like, sulfone-like).
    Tetrahedral,
}

impl HbClass {
    pub fn is_active(self) -> bool {
        self != HbClass::Inactive
    }
}

/// Input parameters of a single atom.
///
/// Radii are plain van der Waals radii; the solvent-probe increment is added
/// internally. The non-polar coefficients come split into an "ideal" part and
/// a "correction" part so the two energy contributions can be reported
/// separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomParams {
    /// Van der Waals radius (Å).
    pub radius: f64,
    /// Partial charge (e).
    pub charge: f64,
    /// Ideal cavity surface-tension coefficient (kcal/mol/Å²).
    pub gamma: f64,
    /// Correction cavity coefficient.
    pub gamma_corr: f64,
    /// Ideal van der Waals solute-solvent coefficient.
    pub alpha: f64,
    /// Correction van der Waals coefficient.
    pub alpha_corr: f64,
    /// Ideal van der Waals offset.
    pub delta: f64,
    /// Correction van der Waals offset.
    pub delta_corr: f64,
    /// Hydrogen-bond class.
    pub hb_class: HbClass,
    /// Hydrogen-bond correction strength `khb` (kcal/mol).
    pub hb_strength: f64,
    /// Whether the atom is held fixed by the caller.
    pub frozen: bool,
}

impl AtomParams {
    /// A neutral, hydrogen-bond-inactive atom with the given radius and
    /// everything else zeroed.
    pub fn with_radius(radius: f64) -> Self {
        Self {
            radius,
            charge: 0.0,
            gamma: 0.0,
            gamma_corr: 0.0,
            alpha: 0.0,
            alpha_corr: 0.0,
            delta: 0.0,
            delta_corr: 0.0,
            hb_class: HbClass::Inactive,
            hb_strength: 0.0,
            frozen: false,
        }
    }
}
