use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A directed periodic edge `center -> neighbor + image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomEdge {
    pub center: usize,
    pub neighbor: usize,
    /// Lattice translation applied to the neighbor, relative to the stored positions.
    pub image: [i32; 3],
    pub distance: f64,
    /// Cartesian vector from the center to the neighbor image.
    pub vector: Vector3<f64>,
}

/// Two distinct bonds sharing a center atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondAngle {
    pub center: usize,
    /// Indices into [`CrystalGraph::atom_graph`].
    pub bond_a: usize,
    pub bond_b: usize,
    pub cos_angle: f64,
}

/// Graph representation of a periodic structure.
///
/// The atom graph holds every directed edge within the atom cutoff, sorted by
/// `(center, neighbor, image)`. Bonds are the edges within the bond cutoff and
/// the bond graph pairs up bonds that share a center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrystalGraph {
    pub num_atoms: usize,
    pub atom_graph_cutoff: f64,
    pub bond_graph_cutoff: f64,
    pub atom_graph: Vec<AtomEdge>,
    pub bonds: Vec<usize>,
    pub bond_graph: Vec<BondAngle>,
}

impl CrystalGraph {
    pub(crate) fn assemble(
        num_atoms: usize,
        atom_graph_cutoff: f64,
        bond_graph_cutoff: f64,
        atom_graph: Vec<AtomEdge>,
    ) -> Self {
        let bonds: Vec<usize> = atom_graph
            .iter()
            .enumerate()
            .filter(|(_, e)| e.distance <= bond_graph_cutoff)
            .map(|(i, _)| i)
            .collect();

        // Edges are sorted by center, so bonds of one center are contiguous.
        let mut bond_graph = Vec::new();
        let mut start = 0;
        while start < bonds.len() {
            let center = atom_graph[bonds[start]].center;
            let mut end = start;
            while end < bonds.len() && atom_graph[bonds[end]].center == center {
                end += 1;
            }
            for &a in &bonds[start..end] {
                for &b in &bonds[start..end] {
                    if a == b {
                        continue;
                    }
                    let va = &atom_graph[a].vector;
                    let vb = &atom_graph[b].vector;
                    let cos = va.dot(vb) / (atom_graph[a].distance * atom_graph[b].distance);
                    bond_graph.push(BondAngle {
                        center,
                        bond_a: a,
                        bond_b: b,
                        cos_angle: cos.clamp(-1.0, 1.0),
                    });
                }
            }
            start = end;
        }

        Self {
            num_atoms,
            atom_graph_cutoff,
            bond_graph_cutoff,
            atom_graph,
            bonds,
            bond_graph,
        }
    }

    pub fn num_edges(&self) -> usize {
        self.atom_graph.len()
    }

    /// Edges centered on atom `index`.
    pub fn edges_of(&self, index: usize) -> impl Iterator<Item = &AtomEdge> {
        self.atom_graph.iter().filter(move |e| e.center == index)
    }

    /// Number of neighbors within the atom cutoff, per atom.
    pub fn neighbor_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_atoms];
        for e in &self.atom_graph {
            counts[e.center] += 1;
        }
        counts
    }

    /// Number of bonds (neighbors within the bond cutoff), per atom.
    pub fn coordination_numbers(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_atoms];
        for &b in &self.bonds {
            counts[self.atom_graph[b].center] += 1;
        }
        counts
    }
}
