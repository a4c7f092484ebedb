use anyhow::{anyhow, Result};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::chemistry::{PairForm, PairTable};
use crate::core::domain::Structure;
use crate::engine::potential::{Potential, Prediction, EV_PER_A3_IN_GPA};
use crate::graph::CrystalGraph;

pub const DEFAULT_EPSILON: f64 = 0.1;
pub const DEFAULT_MOMENT_QUENCH: f64 = 0.1;

/// Source of pair parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PairModel {
    /// Lennard-Jones with the minimum at the sum of covalent radii.
    Mixed { epsilon: f64 },
    /// Explicit per-species-pair parameters.
    Table(PairTable),
}

/// Pairwise potential evaluated over the atom graph.
///
/// Every pair term is shifted so that it vanishes at the atom-graph cutoff.
/// Magnetic moments are the bare species moment quenched by the number of
/// bonds: `m_i = m0 / (1 + q * cn_i)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairPotential {
    model: PairModel,
    moment_quench: f64,
}

impl PairPotential {
    /// Parameter-free potential usable for any species with a covalent radius.
    pub fn universal() -> Self {
        Self::mixed(DEFAULT_EPSILON)
    }

    pub fn mixed(epsilon: f64) -> Self {
        Self {
            model: PairModel::Mixed { epsilon },
            moment_quench: DEFAULT_MOMENT_QUENCH,
        }
    }

    pub fn from_table(table: PairTable) -> Self {
        Self {
            model: PairModel::Table(table),
            moment_quench: DEFAULT_MOMENT_QUENCH,
        }
    }

    pub fn with_moment_quench(mut self, quench: f64) -> Self {
        self.moment_quench = quench;
        self
    }

    /// Pair forms indexed by the structure's own element ids (flattened, row-major).
    fn resolve(&self, structure: &Structure) -> Result<Vec<PairForm>> {
        let species = &structure.species;
        let n = species.len();
        let mut forms = vec![PairForm::Zero; n * n];

        match &self.model {
            PairModel::Mixed { epsilon } => {
                for i in 0..n {
                    for j in 0..n {
                        forms[i * n + j] = PairForm::from_radii(&species[i], &species[j], *epsilon);
                    }
                }
            }
            PairModel::Table(table) => {
                let ids = species
                    .iter()
                    .map(|s| {
                        table
                            .index_of(&s.symbol)
                            .ok_or_else(|| anyhow!("no pair parameters for species '{}'", s.symbol))
                    })
                    .collect::<Result<Vec<_>>>()?;
                for i in 0..n {
                    for j in 0..n {
                        forms[i * n + j] = table.get(ids[i], ids[j]);
                    }
                }
            }
        }
        Ok(forms)
    }
}

impl Potential for PairPotential {
    fn name(&self) -> &str {
        match self.model {
            PairModel::Mixed { .. } => "Pair (mixed Lennard-Jones)",
            PairModel::Table(_) => "Pair (tabulated)",
        }
    }

    fn predict(&self, structure: &Structure, graph: &CrystalGraph) -> Result<Prediction> {
        let n = structure.num_atoms();
        let ns = structure.species.len();
        let forms = self.resolve(structure)?;
        let cutoff = graph.atom_graph_cutoff;

        let mut energy = 0.0;
        let mut forces = vec![Vector3::zeros(); n];
        let mut virial = Matrix3::zeros();

        // Each unordered pair appears once per direction, hence the halves.
        for edge in &graph.atom_graph {
            let ti = structure.atoms[edge.center].element_id;
            let tj = structure.atoms[edge.neighbor].element_id;
            let form = forms[ti * ns + tj];

            let (phi, dphi) = form.evaluate(edge.distance);
            let (phi_cut, _) = form.evaluate(cutoff);
            energy += 0.5 * (phi - phi_cut);

            forces[edge.center] += edge.vector * (dphi / edge.distance);
            virial += edge.vector * edge.vector.transpose() * (0.5 * dphi / edge.distance);
        }

        let stress = virial / structure.volume() * EV_PER_A3_IN_GPA;

        let magmoms = graph
            .coordination_numbers()
            .iter()
            .enumerate()
            .map(|(i, &cn)| {
                structure.species_of(i).magnetic_moment / (1.0 + self.moment_quench * cn as f64)
            })
            .collect();

        Ok(Prediction {
            energy_per_atom: energy / n as f64,
            forces,
            stress,
            magmoms,
        })
    }
}
