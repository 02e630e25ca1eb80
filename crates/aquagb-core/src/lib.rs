//! # AquaGB Core Library
//!
//! An analytic implicit-solvent free-energy model combining generalized-Born
//! electrostatics, surface-area-dependent cavity and van der Waals terms, and a
//! water-site hydrogen-bond correction, with per-atom analytic gradients for
//! use inside a molecular mechanics force evaluator.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Stateless data models (atom parameters,
//!   solute topology, index remapping) and the pure mathematics of the model:
//!   switching functions, cubic-spline tables, the closed-form descreening
//!   integral, and small geometric derivative helpers.
//!
//! - **[`engine`]: The Logic Core.** The stateful evaluation pipeline:
//!   neighbor lists, the recursive Gaussian-overlap engine, the Born-radius
//!   and generalized-Born energy models, water-site placement, per-worker
//!   scratch buffers, and the total-energy driver that sequences the stages
//!   and reduces worker contributions.
//!
//! - **[`workflows`]: The Public API.** The solvation context that owns
//!   registered structures behind opaque handles, validates and marshals
//!   caller data in and out of internal atom order, and exposes the
//!   register/evaluate/unregister surface.

pub mod core;
pub mod engine;
pub mod workflows;

pub use workflows::context::{SolvationContext, SolvationOutput, StructureId};
