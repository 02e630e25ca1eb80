//! Near/far neighbor lists.
//!
//! Each worker builds lists for its own contiguous slice of atoms and keeps
//! them between evaluations; backing storage only ever grows. The near list
//! of a heavy atom holds the heavy partners `j > i` inside the
//! sum-of-radii cutoff, sorted ascending by squared distance with the partner
//! index as tie-break; the downstream overlap recursion is order-sensitive,
//! so the ordering must be deterministic. The far list holds the remaining
//! heavy partners inside the extended cutoff. Hydrogens carry a single far
//! list with every heavy atom inside the extended cutoff, which is the pair
//! stream feeding their inverse Born radii.

use crate::core::constants::{FAR_CUTOFF, GROWTH_FACTOR, NB_OFFSET};
use crate::core::models::solute::SoluteModel;

/// Per-atom variable-length partner lists in one growable backing buffer.
#[derive(Debug, Default)]
pub struct NeighborList {
    start: Vec<usize>,
    count: Vec<usize>,
    partners: Vec<usize>,
}

impl NeighborList {
    pub fn new(natoms: usize, capacity_per_atom: usize) -> Self {
        Self {
            start: vec![0; natoms],
            count: vec![0; natoms],
            partners: Vec::with_capacity(natoms * capacity_per_atom),
        }
    }

    fn reset(&mut self, natoms: usize) {
        self.start.clear();
        self.start.resize(natoms, 0);
        self.count.clear();
        self.count.resize(natoms, 0);
        self.partners.clear();
    }

    /// Grows the backing buffer by at least the configured factor when the
    /// requested extra capacity does not fit.
    fn reserve_growing(&mut self, extra: usize) {
        let needed = self.partners.len() + extra;
        if needed > self.partners.capacity() {
            let target = ((self.partners.capacity() as f64 * GROWTH_FACTOR) as usize).max(needed);
            self.partners.reserve_exact(target - self.partners.len());
        }
    }

    fn begin_atom(&mut self, iat: usize) {
        self.start[iat] = self.partners.len();
        self.count[iat] = 0;
    }

    fn push(&mut self, iat: usize, jat: usize) {
        self.reserve_growing(1);
        self.partners.push(jat);
        self.count[iat] += 1;
    }

    #[inline]
    pub fn neighbors(&self, iat: usize) -> &[usize] {
        &self.partners[self.start[iat]..self.start[iat] + self.count[iat]]
    }

    pub fn total_pairs(&self) -> usize {
        self.partners.len()
    }
}

/// The near/far list pair owned by one worker, plus sort scratch.
#[derive(Debug, Default)]
pub struct NeighborLists {
    pub near: NeighborList,
    pub far: NeighborList,
    scratch: Vec<(f64, usize)>,
}

impl NeighborLists {
    pub fn new(natoms: usize) -> Self {
        Self {
            near: NeighborList::new(natoms, 16),
            far: NeighborList::new(natoms, 48),
            scratch: Vec::new(),
        }
    }

    /// Rebuilds the lists for the owned slices of the heavy and hydrogen
    /// index sets from current coordinates.
    ///
    /// Returns `(near_pairs, far_pairs, hydrogen_pairs)` for sizing the
    /// pairwise-integral cache.
    pub fn rebuild(
        &mut self,
        model: &SoluteModel,
        heavy_owned: std::ops::Range<usize>,
        hydrogen_owned: std::ops::Range<usize>,
    ) -> (usize, usize, usize) {
        let natoms = model.natoms;
        self.near.reset(natoms);
        self.far.reset(natoms);
        let far_cut2 = FAR_CUTOFF * FAR_CUTOFF;

        for hi in heavy_owned {
            let iat = model.heavy[hi];
            self.near.begin_atom(iat);
            self.far.begin_atom(iat);
            self.scratch.clear();
            for &jat in &model.heavy[hi + 1..] {
                let d2 = (model.pos[jat] - model.pos[iat]).norm_squared();
                let cut = (model.r[iat] + model.r[jat]) * NB_OFFSET;
                if d2 < cut * cut {
                    self.scratch.push((d2, jat));
                } else if d2 < far_cut2 {
                    self.far.push(iat, jat);
                }
            }
            self.scratch
                .sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            for &(_, jat) in &self.scratch {
                self.near.push(iat, jat);
            }
        }

        let mut hydrogen_pairs = 0;
        for hi in hydrogen_owned {
            let iat = model.hydrogens[hi];
            self.far.begin_atom(iat);
            for &jat in &model.heavy {
                let d2 = (model.pos[jat] - model.pos[iat]).norm_squared();
                if d2 < far_cut2 {
                    self.far.push(iat, jat);
                    hydrogen_pairs += 1;
                }
            }
        }

        let near_pairs = self.near.total_pairs();
        let far_pairs = self.far.total_pairs() - hydrogen_pairs;
        (near_pairs, far_pairs, hydrogen_pairs)
    }
}
