pub mod converter;
pub mod crystal_graph;
pub mod neighbors;

pub use converter::{CrystalGraphConverter, GraphAlgorithm, IsolatedAtomPolicy};
pub use crystal_graph::{AtomEdge, BondAngle, CrystalGraph};
