//! Structure relaxation driven by a graph-based interatomic potential.
//!
//! A [`Structure`] is turned into a [`CrystalGraph`] by a
//! [`CrystalGraphConverter`], a [`Model`] predicts energies, forces, stresses
//! and magnetic moments from it, and a [`StructOptimizer`] moves atoms and
//! cell until the forces vanish.

pub mod core;
pub mod engine;
pub mod graph;
pub mod relax;
pub mod solvers;

pub use crate::core::domain::{Atom, Lattice, Species, Structure};
pub use crate::core::error::{ConfigError, Error, Result};
pub use crate::engine::{Calculator, CalculatorResults, Device, Model, PairPotential, Potential, Prediction};
pub use crate::graph::{CrystalGraph, CrystalGraphConverter, GraphAlgorithm, IsolatedAtomPolicy};
pub use crate::relax::{CellFilter, RelaxOptions, RelaxResult, StructOptimizer, Trajectory};
pub use crate::solvers::OptimizerKind;
