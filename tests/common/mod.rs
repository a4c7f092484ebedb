#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use nalgebra::{Matrix3, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crystal_relax::core::domain::{Lattice, Species, Structure};
use crystal_relax::engine::operators::Perturbation;
use crystal_relax::engine::{Calculator, Model, Potential, Prediction};
use crystal_relax::graph::CrystalGraph;

/// Lattice parameter of the fixture FCC cell that minimizes the universal pair potential.
pub const ARGON_EQUILIBRIUM_A: f64 = 5.271;
/// Energy of the 4-atom fixture cell at [`ARGON_EQUILIBRIUM_A`] (eV).
pub const ARGON_EQUILIBRIUM_ENERGY: f64 = -2.2655;

pub fn argon() -> Species {
    Species {
        symbol: "Ar".into(),
        atomic_number: 18,
        mass: 39.948,
        radius_covalent: 1.88,
        magnetic_moment: 0.0,
    }
}

/// Conventional 4-atom FCC cell.
pub fn fcc(species: Species, a: f64) -> Structure {
    let sites = [
        (0, [0.0, 0.0, 0.0]),
        (0, [0.5, 0.5, 0.0]),
        (0, [0.5, 0.0, 0.5]),
        (0, [0.0, 0.5, 0.5]),
    ];
    Structure::from_fractional(vec![species], Lattice::cubic(a).unwrap(), &sites).unwrap()
}

pub fn fcc_argon(a: f64) -> Structure {
    fcc(argon(), a)
}

/// FCC argon with every atom displaced, deterministic per seed.
pub fn rattled_argon(a: f64, seed: u64) -> Structure {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Perturbation::new()
        .rattle(0.15)
        .apply(&fcc_argon(a), &mut rng)
        .unwrap()
}

/// Rattled argon in a sheared, stretched cell.
pub fn triclinic_argon(seed: u64) -> Structure {
    let mut s = rattled_argon(5.4, seed);
    let deform = Matrix3::new(1.02, 0.05, -0.03, 0.0, 0.97, 0.04, 0.01, 0.0, 1.05);
    let lattice = Lattice::from_matrix(deform * s.lattice.vectors).unwrap();
    s.set_lattice(lattice, true);
    s
}

/// One atom per cell.
pub fn simple_cubic(species: Species, a: f64) -> Structure {
    Structure::from_fractional(vec![species], Lattice::cubic(a).unwrap(), &[(0, [0.0, 0.0, 0.0])]).unwrap()
}

pub fn calculator() -> Calculator {
    Calculator::new(Model::new(Arc::new(
        crystal_relax::engine::PairPotential::universal(),
    )))
}

/// Flat energy landscape: every structure is already relaxed.
pub struct FlatPotential;

impl Potential for FlatPotential {
    fn predict(&self, structure: &Structure, _graph: &CrystalGraph) -> Result<Prediction> {
        let n = structure.num_atoms();
        Ok(Prediction {
            energy_per_atom: -1.0,
            forces: vec![Vector3::zeros(); n],
            stress: Matrix3::zeros(),
            magmoms: vec![0.5; n],
        })
    }

    fn name(&self) -> &str {
        "Flat"
    }
}

/// Returns one force too few.
pub struct TruncatedPotential;

impl Potential for TruncatedPotential {
    fn predict(&self, structure: &Structure, _graph: &CrystalGraph) -> Result<Prediction> {
        let n = structure.num_atoms();
        Ok(Prediction {
            energy_per_atom: 0.0,
            forces: vec![Vector3::zeros(); n.saturating_sub(1)],
            stress: Matrix3::zeros(),
            magmoms: vec![0.0; n],
        })
    }

    fn name(&self) -> &str {
        "Truncated"
    }
}

/// Numerically broken model: NaN energy, forces and stress.
pub struct NanPotential;

impl Potential for NanPotential {
    fn predict(&self, structure: &Structure, _graph: &CrystalGraph) -> Result<Prediction> {
        let n = structure.num_atoms();
        Ok(Prediction {
            energy_per_atom: f64::NAN,
            forces: vec![Vector3::repeat(f64::NAN); n],
            stress: Matrix3::repeat(f64::NAN),
            magmoms: vec![0.0; n],
        })
    }

    fn name(&self) -> &str {
        "NaN"
    }
}
