use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use log::info;
use rayon::prelude::*;

use crate::core::domain::Structure;
use crate::core::error::Result;
use crate::engine::device::Device;
use crate::engine::pair::PairPotential;
use crate::engine::potential::{Potential, Prediction};
use crate::graph::{CrystalGraph, CrystalGraphConverter};

/// A potential bound to a graph converter and a compute device.
///
/// The converter can be swapped before relaxation; the device is fixed at
/// construction.
#[derive(Clone)]
pub struct Model {
    potential: Arc<dyn Potential>,
    graph_converter: CrystalGraphConverter,
    device: Device,
}

impl Model {
    pub fn new(potential: Arc<dyn Potential>) -> Self {
        Self::with_device(potential, Device::Cpu)
    }

    pub fn with_device(potential: Arc<dyn Potential>, device: Device) -> Self {
        info!("{} will run on {}", potential.name(), device);
        Self {
            potential,
            graph_converter: CrystalGraphConverter::default(),
            device,
        }
    }

    /// Default potential bound to `device`.
    pub fn load(device: Device) -> Self {
        Self::with_device(Arc::new(PairPotential::universal()), device)
    }

    pub fn set_graph_converter(&mut self, converter: CrystalGraphConverter) {
        self.graph_converter = converter;
    }

    pub fn with_graph_converter(mut self, converter: CrystalGraphConverter) -> Self {
        self.graph_converter = converter;
        self
    }

    pub fn graph_converter(&self) -> &CrystalGraphConverter {
        &self.graph_converter
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn potential_name(&self) -> &str {
        self.potential.name()
    }

    pub fn predict_graph(&self, structure: &Structure, graph: &CrystalGraph) -> Result<Prediction> {
        let prediction = self.potential.predict(structure, graph)?;

        // STRICT VALIDATION
        let n = structure.num_atoms();
        if prediction.forces.len() != n || prediction.magmoms.len() != n {
            return Err(anyhow!(
                "{} returned {} forces and {} magmoms for {} atoms",
                self.potential.name(),
                prediction.forces.len(),
                prediction.magmoms.len(),
                n
            )
            .into());
        }

        let finite = prediction.energy_per_atom.is_finite()
            && prediction.forces.iter().all(|f| f.iter().all(|x| x.is_finite()))
            && prediction.stress.iter().all(|x| x.is_finite())
            && prediction.magmoms.iter().all(|m| m.is_finite());
        if !finite {
            return Err(anyhow!(
                "{} returned non-finite values for {}",
                self.potential.name(),
                structure.formula()
            )
            .into());
        }
        Ok(prediction)
    }

    pub fn predict_structure(&self, structure: &Structure) -> Result<Prediction> {
        let graph = self.graph_converter.convert(structure)?;
        self.predict_graph(structure, &graph)
    }

    /// Predicts independent structures in parallel.
    pub fn predict_structures(&self, structures: &[Structure]) -> Vec<Result<Prediction>> {
        structures
            .par_iter()
            .map(|s| self.predict_structure(s))
            .collect()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("potential", &self.potential.name())
            .field("graph_converter", &self.graph_converter)
            .field("device", &self.device)
            .finish()
    }
}
