use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

// --- Physics Types ---

/// Represents a single chemical element/species properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub symbol: String,
    pub atomic_number: u8,
    pub mass: f64,            // amu
    pub radius_covalent: f64, // Å
    /// Bare magnetic moment before coordination quenching (μB).
    #[serde(default)]
    pub magnetic_moment: f64,
}

impl Default for Species {
    fn default() -> Self {
        Self {
            symbol: "X".to_string(),
            atomic_number: 0,
            mass: 1.0,
            radius_covalent: 1.0,
            magnetic_moment: 0.0,
        }
    }
}

/// A single site of a periodic structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element_id: usize, // Index into Structure::species
    pub position: Point3<f64>, // Cartesian, Å
}

/// Periodic cell of a crystal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Lattice {
    pub vectors: Matrix3<f64>, // Columns are a, b, c
    pub inverse: Matrix3<f64>, // Precomputed for fractional conversion
}

impl Lattice {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Self> {
        Self::from_matrix(Matrix3::from_columns(&[a, b, c]))
    }

    /// Builds a lattice from a matrix whose columns are the cell vectors.
    /// Returns `None` for singular or non-finite cells.
    pub fn from_matrix(vectors: Matrix3<f64>) -> Option<Self> {
        if vectors.iter().any(|x| !x.is_finite()) {
            return None;
        }
        if vectors.determinant().abs() < 1e-12 {
            return None;
        }
        let inverse = vectors.try_inverse()?;
        Some(Self { vectors, inverse })
    }

    pub fn cubic(a: f64) -> Option<Self> {
        Self::from_matrix(Matrix3::from_diagonal_element(a))
    }

    pub fn to_fractional(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.inverse * p.coords;
        Point3::from(v)
    }

    pub fn to_cartesian(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.vectors * p.coords;
        Point3::from(v)
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }

    /// Lengths of a, b, c.
    pub fn lengths(&self) -> [f64; 3] {
        [
            self.vectors.column(0).norm(),
            self.vectors.column(1).norm(),
            self.vectors.column(2).norm(),
        ]
    }

    /// Distances between opposite faces of the cell, one per lattice direction.
    /// These bound how many periodic images a cutoff sphere can reach.
    pub fn perpendicular_heights(&self) -> [f64; 3] {
        let volume = self.volume();
        let a = self.vectors.column(0).into_owned();
        let b = self.vectors.column(1).into_owned();
        let c = self.vectors.column(2).into_owned();
        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }
}

impl TryFrom<[[f64; 3]; 3]> for Lattice {
    type Error = String;

    fn try_from(rows: [[f64; 3]; 3]) -> std::result::Result<Self, Self::Error> {
        let [a, b, c] = rows.map(Vector3::from);
        Lattice::new(a, b, c).ok_or_else(|| "lattice vectors are singular or non-finite".to_string())
    }
}

impl From<Lattice> for [[f64; 3]; 3] {
    fn from(lattice: Lattice) -> Self {
        let v = lattice.vectors;
        [
            [v[(0, 0)], v[(1, 0)], v[(2, 0)]],
            [v[(0, 1)], v[(1, 1)], v[(2, 1)]],
            [v[(0, 2)], v[(1, 2)], v[(2, 2)]],
        ]
    }
}

// --- The Core Entity ---

/// A periodic crystal structure: species table, cell and sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub species: Vec<Species>,
    pub lattice: Lattice,
    pub atoms: Vec<Atom>,
    /// Per-site magnetic moments assigned after a prediction.
    #[serde(default)]
    pub magmoms: Option<Vec<f64>>,
}

impl Structure {
    pub fn new(species: Vec<Species>, lattice: Lattice, atoms: Vec<Atom>) -> Result<Self> {
        let s = Self {
            species,
            lattice,
            atoms,
            magmoms: None,
        };
        s.validate()?;
        Ok(s)
    }

    /// Builds a structure from fractional coordinates.
    pub fn from_fractional(
        species: Vec<Species>,
        lattice: Lattice,
        sites: &[(usize, [f64; 3])],
    ) -> Result<Self> {
        let atoms = sites
            .iter()
            .map(|&(element_id, frac)| Atom {
                element_id,
                position: lattice.to_cartesian(&Point3::from(frac)),
            })
            .collect();
        Self::new(species, lattice, atoms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.atoms.is_empty() {
            return Err(Error::Structure("structure has no atoms".into()));
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            if atom.element_id >= self.species.len() {
                return Err(Error::Structure(format!(
                    "atom {} references element_id {} but only {} species are defined",
                    i,
                    atom.element_id,
                    self.species.len()
                )));
            }
            if atom.position.coords.iter().any(|x| !x.is_finite()) {
                return Err(Error::Structure(format!("atom {} has non-finite coordinates", i)));
            }
        }
        if let Some(m) = &self.magmoms {
            if m.len() != self.atoms.len() {
                return Err(Error::Structure(format!(
                    "{} magmoms for {} atoms",
                    m.len(),
                    self.atoms.len()
                )));
            }
        }
        Ok(())
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn species_of(&self, index: usize) -> &Species {
        &self.species[self.atoms[index].element_id]
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn frac_coords(&self) -> Vec<Point3<f64>> {
        self.atoms
            .iter()
            .map(|a| self.lattice.to_fractional(&a.position))
            .collect()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume()
    }

    /// Replaces the cell. With `scale_atoms` the fractional coordinates are kept,
    /// otherwise the cartesian ones are.
    pub fn set_lattice(&mut self, lattice: Lattice, scale_atoms: bool) {
        if scale_atoms {
            for atom in &mut self.atoms {
                let frac = self.lattice.to_fractional(&atom.position);
                atom.position = lattice.to_cartesian(&frac);
            }
        }
        self.lattice = lattice;
    }

    /// Reduced-order formula in species order, e.g. "Li2Mn2O4".
    pub fn formula(&self) -> String {
        let mut counts = vec![0usize; self.species.len()];
        for atom in &self.atoms {
            counts[atom.element_id] += 1;
        }
        self.species
            .iter()
            .zip(counts)
            .filter(|(_, n)| *n > 0)
            .map(|(s, n)| if n == 1 { s.symbol.clone() } else { format!("{}{}", s.symbol, n) })
            .collect()
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let s: Structure = serde_json::from_reader(reader)?;
        s.validate()?;
        Ok(s)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
