//! # Engine Module
//!
//! The stateful evaluation pipeline of the solvation model: neighbor lists,
//! the Gaussian-overlap engine, Born radii, generalized-Born energies,
//! water-site placement and the total-energy driver that sequences the
//! stages and reduces per-worker contributions.

pub(crate) mod born;
pub(crate) mod driver;
pub mod error;
pub(crate) mod gb;
pub(crate) mod neighbor;
pub(crate) mod overlap;
pub(crate) mod water;
pub(crate) mod workdata;
