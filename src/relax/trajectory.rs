use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::{Matrix3, Point3, Vector3};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::domain::Structure;
use crate::core::error::{Error, Result};
use crate::engine::calculator::CalculatorResults;
use crate::engine::potential::EV_PER_A3_IN_GPA;

/// State of the structure at one recorded relaxation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub atoms: Structure,
    /// eV
    pub energy: f64,
    /// eV/Å
    pub forces: Vec<Vector3<f64>>,
    /// eV/Å³
    pub stress: Matrix3<f64>,
    pub magmoms: Vec<f64>,
    pub atom_positions: Vec<Point3<f64>>,
    /// Columns are lattice vectors.
    pub cell: Matrix3<f64>,
}

impl Frame {
    pub fn new(structure: &Structure, results: CalculatorResults) -> Self {
        Self {
            atoms: structure.clone(),
            energy: results.energy,
            forces: results.forces,
            stress: results.stress,
            magmoms: results.magmoms,
            atom_positions: structure.positions(),
            cell: structure.lattice.vectors,
        }
    }

    fn check(&self) -> Result<()> {
        let n = self.atoms.num_atoms();
        if self.forces.len() != n || self.magmoms.len() != n || self.atom_positions.len() != n {
            return Err(Error::Structure(format!(
                "frame for {} atoms carries {} forces, {} magmoms and {} positions",
                n,
                self.forces.len(),
                self.magmoms.len(),
                self.atom_positions.len()
            )));
        }
        Ok(())
    }
}

/// Append-only record of a relaxation.
///
/// Frames are stored whole, so the per-quantity sequences exposed by the
/// accessors always have the same length and index `i` of each describes the
/// same step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    frames: Vec<Frame>,
}

impl Trajectory {
    /// Names of the per-step sequences, in storage order.
    pub const ATTRIBUTES: [&'static str; 7] = [
        "atoms",
        "energies",
        "forces",
        "stresses",
        "magmoms",
        "atom_positions",
        "cells",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, frame: Frame) -> Result<()> {
        frame.check()?;
        self.frames.push(frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn atoms(&self) -> impl ExactSizeIterator<Item = &Structure> + '_ {
        self.frames.iter().map(|f| &f.atoms)
    }

    pub fn energies(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.frames.iter().map(|f| f.energy)
    }

    pub fn forces(&self) -> impl ExactSizeIterator<Item = &[Vector3<f64>]> + '_ {
        self.frames.iter().map(|f| f.forces.as_slice())
    }

    pub fn stresses(&self) -> impl ExactSizeIterator<Item = &Matrix3<f64>> + '_ {
        self.frames.iter().map(|f| &f.stress)
    }

    pub fn magmoms(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.frames.iter().map(|f| f.magmoms.as_slice())
    }

    pub fn atom_positions(&self) -> impl ExactSizeIterator<Item = &[Point3<f64>]> + '_ {
        self.frames.iter().map(|f| f.atom_positions.as_slice())
    }

    pub fn cells(&self) -> impl ExactSizeIterator<Item = &Matrix3<f64>> + '_ {
        self.frames.iter().map(|f| &f.cell)
    }

    /// Writes the trajectory as JSON, one array per attribute.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Writes one CSV row per frame: step, energy, largest atomic force,
    /// volume and pressure.
    pub fn write_summary_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for (step, frame) in self.frames.iter().enumerate() {
            writer.serialize(SummaryRow {
                step,
                energy: frame.energy,
                fmax: frame.forces.iter().map(|f| f.norm()).fold(0.0, f64::max),
                volume: frame.cell.determinant().abs(),
                pressure_gpa: -frame.stress.trace() / 3.0 * EV_PER_A3_IN_GPA,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SummaryRow {
    step: usize,
    energy: f64,
    fmax: f64,
    volume: f64,
    pressure_gpa: f64,
}

#[derive(Serialize)]
struct ColumnsRef<'a> {
    atoms: Vec<&'a Structure>,
    energies: Vec<f64>,
    forces: Vec<&'a [Vector3<f64>]>,
    stresses: Vec<&'a Matrix3<f64>>,
    magmoms: Vec<&'a [f64]>,
    atom_positions: Vec<&'a [Point3<f64>]>,
    cells: Vec<&'a Matrix3<f64>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Columns {
    atoms: Vec<Structure>,
    energies: Vec<f64>,
    forces: Vec<Vec<Vector3<f64>>>,
    stresses: Vec<Matrix3<f64>>,
    magmoms: Vec<Vec<f64>>,
    atom_positions: Vec<Vec<Point3<f64>>>,
    cells: Vec<Matrix3<f64>>,
}

impl Serialize for Trajectory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ColumnsRef {
            atoms: self.atoms().collect(),
            energies: self.energies().collect(),
            forces: self.forces().collect(),
            stresses: self.stresses().collect(),
            magmoms: self.magmoms().collect(),
            atom_positions: self.atom_positions().collect(),
            cells: self.cells().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Trajectory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let c = Columns::deserialize(deserializer)?;
        let n = c.energies.len();
        let lengths = [
            c.atoms.len(),
            c.forces.len(),
            c.stresses.len(),
            c.magmoms.len(),
            c.atom_positions.len(),
            c.cells.len(),
        ];
        if lengths.iter().any(|&l| l != n) {
            return Err(D::Error::custom(format!(
                "trajectory columns are misaligned: {} energies vs {:?}",
                n, lengths
            )));
        }

        let mut trajectory = Trajectory::new();
        let rows = c
            .atoms
            .into_iter()
            .zip(c.energies)
            .zip(c.forces)
            .zip(c.stresses)
            .zip(c.magmoms)
            .zip(c.atom_positions)
            .zip(c.cells);
        for ((((((atoms, energy), forces), stress), magmoms), atom_positions), cell) in rows {
            let frame = Frame {
                atoms,
                energy,
                forces,
                stress,
                magmoms,
                atom_positions,
                cell,
            };
            trajectory.append(frame).map_err(D::Error::custom)?;
        }
        Ok(trajectory)
    }
}
