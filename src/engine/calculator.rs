use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::core::error::Result;
use crate::engine::model::Model;
use crate::engine::potential::EV_PER_A3_IN_GPA;

/// Converts GPa to eV/Å³.
pub const STRESS_WEIGHT: f64 = 1.0 / EV_PER_A3_IN_GPA;

/// Properties of one structure in relaxer units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorResults {
    /// Total energy (eV).
    pub energy: f64,
    /// eV/Å
    pub forces: Vec<Vector3<f64>>,
    /// eV/Å³, positive components are tensile.
    pub stress: Matrix3<f64>,
    /// μB
    pub magmoms: Vec<f64>,
}

/// Adapts a [`Model`] to the units the optimizers work in.
#[derive(Debug, Clone)]
pub struct Calculator {
    model: Model,
    stress_weight: f64,
    device: String,
}

impl Calculator {
    pub fn new(model: Model) -> Self {
        let device = model.device().identifier();
        Self {
            model,
            stress_weight: STRESS_WEIGHT,
            device,
        }
    }

    /// Overrides the GPa → eV/Å³ factor applied to predicted stresses.
    pub fn with_stress_weight(mut self, stress_weight: f64) -> Self {
        self.stress_weight = stress_weight;
        self
    }

    /// Identifier of the bound device, e.g. `cpu` or `cuda:0`.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn stress_weight(&self) -> f64 {
        self.stress_weight
    }

    pub fn calculate(&self, structure: &Structure) -> Result<CalculatorResults> {
        let prediction = self.model.predict_structure(structure)?;
        Ok(CalculatorResults {
            energy: prediction.energy_per_atom * structure.num_atoms() as f64,
            forces: prediction.forces,
            stress: prediction.stress * self.stress_weight,
            magmoms: prediction.magmoms,
        })
    }
}
