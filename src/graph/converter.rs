use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::core::error::{ConfigError, Error, Result};
use crate::graph::crystal_graph::CrystalGraph;
use crate::graph::neighbors;

pub const DEFAULT_ATOM_GRAPH_CUTOFF: f64 = 6.0;
pub const DEFAULT_BOND_GRAPH_CUTOFF: f64 = 3.0;

/// Neighbor enumeration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphAlgorithm {
    /// Exhaustive image enumeration.
    Legacy,
    /// Periodic cell list.
    Fast,
}

impl GraphAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphAlgorithm::Legacy => "legacy",
            GraphAlgorithm::Fast => "fast",
        }
    }
}

impl fmt::Display for GraphAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(GraphAlgorithm::Legacy),
            "fast" => Ok(GraphAlgorithm::Fast),
            other => Err(ConfigError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl PartialEq<&str> for GraphAlgorithm {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// What to do with an atom that has no neighbor within the atom cutoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolatedAtomPolicy {
    #[default]
    Error,
    Warn,
    Ignore,
}

impl FromStr for IsolatedAtomPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "error" => Ok(IsolatedAtomPolicy::Error),
            "warn" => Ok(IsolatedAtomPolicy::Warn),
            "ignore" => Ok(IsolatedAtomPolicy::Ignore),
            other => Err(ConfigError::UnknownIsolatedPolicy(other.to_string())),
        }
    }
}

/// Turns structures into [`CrystalGraph`]s.
///
/// Immutable after construction; all parameters are validated up front.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalGraphConverter {
    atom_graph_cutoff: f64,
    bond_graph_cutoff: f64,
    algorithm: GraphAlgorithm,
    on_isolated_atoms: IsolatedAtomPolicy,
}

impl CrystalGraphConverter {
    /// Builds a converter from an algorithm name (`"legacy"` or `"fast"`).
    pub fn new(atom_graph_cutoff: f64, bond_graph_cutoff: f64, algorithm: &str) -> Result<Self> {
        let algorithm = algorithm.parse::<GraphAlgorithm>()?;
        Self::with_algorithm(atom_graph_cutoff, bond_graph_cutoff, algorithm)
    }

    pub fn with_algorithm(
        atom_graph_cutoff: f64,
        bond_graph_cutoff: f64,
        algorithm: GraphAlgorithm,
    ) -> Result<Self> {
        check_cutoff("atom_graph_cutoff", atom_graph_cutoff)?;
        check_cutoff("bond_graph_cutoff", bond_graph_cutoff)?;
        if bond_graph_cutoff > atom_graph_cutoff {
            return Err(ConfigError::BondCutoffExceedsAtom {
                atom: atom_graph_cutoff,
                bond: bond_graph_cutoff,
            }
            .into());
        }
        Ok(Self {
            atom_graph_cutoff,
            bond_graph_cutoff,
            algorithm,
            on_isolated_atoms: IsolatedAtomPolicy::default(),
        })
    }

    pub fn on_isolated_atoms(mut self, policy: IsolatedAtomPolicy) -> Self {
        self.on_isolated_atoms = policy;
        self
    }

    pub fn algorithm(&self) -> GraphAlgorithm {
        self.algorithm
    }

    pub fn atom_graph_cutoff(&self) -> f64 {
        self.atom_graph_cutoff
    }

    pub fn bond_graph_cutoff(&self) -> f64 {
        self.bond_graph_cutoff
    }

    pub fn isolated_atom_policy(&self) -> IsolatedAtomPolicy {
        self.on_isolated_atoms
    }

    pub fn convert(&self, structure: &Structure) -> Result<CrystalGraph> {
        structure.validate()?;

        let mut edges = match self.algorithm {
            GraphAlgorithm::Legacy => neighbors::legacy_edges(structure, self.atom_graph_cutoff),
            GraphAlgorithm::Fast => neighbors::fast_edges(structure, self.atom_graph_cutoff),
        };
        edges.sort_by(|a, b| (a.center, a.neighbor, a.image).cmp(&(b.center, b.neighbor, b.image)));

        let graph = CrystalGraph::assemble(
            structure.num_atoms(),
            self.atom_graph_cutoff,
            self.bond_graph_cutoff,
            edges,
        );

        let counts = graph.neighbor_counts();
        if let Some(index) = counts.iter().position(|&c| c == 0) {
            match self.on_isolated_atoms {
                IsolatedAtomPolicy::Error => {
                    return Err(Error::IsolatedAtom {
                        index,
                        cutoff: self.atom_graph_cutoff,
                    })
                }
                IsolatedAtomPolicy::Warn => warn!(
                    "{}: {} isolated atom(s), first is atom {} (cutoff {} Å)",
                    structure.formula(),
                    counts.iter().filter(|&&c| c == 0).count(),
                    index,
                    self.atom_graph_cutoff
                ),
                IsolatedAtomPolicy::Ignore => {}
            }
        }

        Ok(graph)
    }
}

impl Default for CrystalGraphConverter {
    fn default() -> Self {
        Self {
            atom_graph_cutoff: DEFAULT_ATOM_GRAPH_CUTOFF,
            bond_graph_cutoff: DEFAULT_BOND_GRAPH_CUTOFF,
            algorithm: GraphAlgorithm::Fast,
            on_isolated_atoms: IsolatedAtomPolicy::Error,
        }
    }
}

fn check_cutoff(name: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCutoff { name, value })
    }
}
