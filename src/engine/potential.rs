use anyhow::Result;
use nalgebra::{Matrix3, Vector3};

use crate::core::domain::Structure;
use crate::graph::CrystalGraph;

/// eV/Å³ expressed in GPa.
pub const EV_PER_A3_IN_GPA: f64 = 160.2176621;

/// The raw output of a potential for one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Potential energy per atom (eV/atom).
    pub energy_per_atom: f64,
    /// Per-site forces (eV/Å).
    pub forces: Vec<Vector3<f64>>,
    /// Cell stress (GPa). Positive components are tensile.
    pub stress: Matrix3<f64>,
    /// Per-site magnetic moments (μB).
    pub magmoms: Vec<f64>,
}

/// A generic interface for interatomic potentials.
/// Implementations must be Thread-Safe (Sync) and must not keep state between
/// calls; the relaxer and batch predictions share one instance.
pub trait Potential: Send + Sync {
    /// Evaluates a structure whose graph was built by the bound converter.
    fn predict(&self, structure: &Structure, graph: &CrystalGraph) -> Result<Prediction>;

    /// Returns the name of the potential.
    fn name(&self) -> &str;
}
