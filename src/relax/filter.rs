//! Cell filters: expose atomic positions and the cell as one set of
//! generalized coordinates so a plain optimizer relaxes both together.
//!
//! The cell is tracked through a deformation gradient `F` relative to the
//! starting cell (`cell = F * cell0`, columns are lattice vectors). Atoms are
//! presented in the undeformed frame, `s = F^-1 r`, which makes their
//! generalized forces `F^T f`. The cell rows carry a filter-specific
//! parameterization of `F`, scaled by `cell_factor`.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Matrix6, Point3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::domain::{Lattice, Structure};
use crate::core::error::{ConfigError, Error, Result};
use crate::engine::{Calculator, CalculatorResults};
use crate::relax::trajectory::Frame;
use crate::solvers::Optimizable;

/// Eigenvalue gap below which the divided difference of `exp` degenerates to its derivative.
const DEGENERATE_GAP: f64 = 1e-10;

/// Parameterization of the cell degrees of freedom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellFilter {
    /// `F = expm(X / c)` over the full 3x3 log-deformation, forces through the
    /// exact Fréchet derivative of the matrix exponential.
    #[default]
    #[serde(rename = "FrechetCellFilter", alias = "frechet")]
    Frechet,
    /// `F = expm(X / c)` restricted to symmetric `X`, evaluated in its eigenbasis.
    #[serde(rename = "ExpCellFilter", alias = "exp")]
    Exp,
    /// `F = X / c`.
    #[serde(rename = "UnitCellFilter", alias = "unit")]
    Unit,
}

impl CellFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellFilter::Frechet => "FrechetCellFilter",
            CellFilter::Exp => "ExpCellFilter",
            CellFilter::Unit => "UnitCellFilter",
        }
    }

    /// Generalized cell coordinates of the undeformed cell.
    fn initial_coords(&self, cell_factor: f64) -> Matrix3<f64> {
        match self {
            CellFilter::Unit => Matrix3::identity() * cell_factor,
            CellFilter::Frechet | CellFilter::Exp => Matrix3::zeros(),
        }
    }

    /// Projects incoming coordinates onto the filter's manifold.
    fn normalize(&self, coords: &Matrix3<f64>) -> Matrix3<f64> {
        match self {
            CellFilter::Exp => symmetric_part(coords),
            CellFilter::Frechet | CellFilter::Unit => *coords,
        }
    }

    /// Deformation gradient for (normalized) generalized cell coordinates.
    fn deformation(&self, coords: &Matrix3<f64>, cell_factor: f64) -> Matrix3<f64> {
        let x = coords / cell_factor;
        match self {
            CellFilter::Unit => x,
            CellFilter::Frechet => x.exp(),
            CellFilter::Exp => {
                let eig = SymmetricEigen::new(x);
                let v = eig.eigenvectors;
                let exp_diag = Matrix3::from_diagonal(&eig.eigenvalues.map(f64::exp));
                v * exp_diag * v.transpose()
            }
        }
    }

    /// Generalized cell forces given `gradient = -dH/dF`.
    fn cell_forces(&self, coords: &Matrix3<f64>, cell_factor: f64, gradient: &Matrix3<f64>) -> Matrix3<f64> {
        let x = coords / cell_factor;
        let forces = match self {
            CellFilter::Unit => *gradient,
            CellFilter::Frechet => {
                let mut out = Matrix3::zeros();
                for i in 0..3 {
                    for j in 0..3 {
                        let mut direction = Matrix3::zeros();
                        direction[(i, j)] = 1.0;
                        let derivative = expm_frechet(&x, &direction);
                        out[(i, j)] = gradient.component_mul(&derivative).sum();
                    }
                }
                out
            }
            CellFilter::Exp => {
                // Daleckii-Krein: D expm(L)[E] = V ((V^T E V) o Γ) V^T
                let eig = SymmetricEigen::new(x);
                let v = eig.eigenvectors;
                let lambda = eig.eigenvalues;
                let gamma = Matrix3::from_fn(|i, j| {
                    let (a, b) = (lambda[i], lambda[j]);
                    if (a - b).abs() < DEGENERATE_GAP {
                        (0.5 * (a + b)).exp()
                    } else {
                        (a.exp() - b.exp()) / (a - b)
                    }
                });
                let projected = (v.transpose() * gradient * v).component_mul(&gamma);
                symmetric_part(&(v * projected * v.transpose()))
            }
        };
        forces / cell_factor
    }
}

impl fmt::Display for CellFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frechetcellfilter" | "frechet" => Ok(CellFilter::Frechet),
            "expcellfilter" | "exp" => Ok(CellFilter::Exp),
            "unitcellfilter" | "unit" => Ok(CellFilter::Unit),
            _ => Err(ConfigError::UnknownFilter(s.to_string())),
        }
    }
}

fn symmetric_part(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}

/// Fréchet derivative of `expm` at `x` along `direction`: the upper-right block
/// of `expm([[x, direction], [0, x]])`.
fn expm_frechet(x: &Matrix3<f64>, direction: &Matrix3<f64>) -> Matrix3<f64> {
    let mut block = Matrix6::zeros();
    block.fixed_view_mut::<3, 3>(0, 0).copy_from(x);
    block.fixed_view_mut::<3, 3>(0, 3).copy_from(direction);
    block.fixed_view_mut::<3, 3>(3, 3).copy_from(x);
    block.exp().fixed_view::<3, 3>(0, 3).into_owned()
}

/// Tuning knobs shared by all filters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterOptions {
    /// External pressure (eV/Å³); the filter minimizes `E + P V`.
    pub scalar_pressure: f64,
    /// Only allow isotropic cell changes.
    pub hydrostatic_strain: bool,
    /// Scale of the cell coordinates; defaults to the number of atoms.
    pub cell_factor: Option<f64>,
}

/// A structure wrapped together with a calculator and, optionally, a cell filter.
///
/// Without a filter only the atomic positions are exposed.
pub struct FilteredStructure<'c> {
    calculator: &'c Calculator,
    structure: Structure,
    filter: Option<CellFilter>,
    scalar_pressure: f64,
    hydrostatic_strain: bool,
    cell_factor: f64,
    orig_cell: Matrix3<f64>,
    deform_grad: Matrix3<f64>,
    deform_inv: Matrix3<f64>,
    cell_coords: Matrix3<f64>,
    results: Option<CalculatorResults>,
}

impl<'c> FilteredStructure<'c> {
    pub fn new(
        calculator: &'c Calculator,
        structure: Structure,
        filter: CellFilter,
        options: &FilterOptions,
    ) -> Result<Self> {
        let cell_factor = options.cell_factor.unwrap_or(structure.num_atoms() as f64);
        if !(cell_factor.is_finite() && cell_factor > 0.0) {
            return Err(ConfigError::InvalidOption {
                name: "cell_factor",
                reason: format!("must be positive, got {}", cell_factor),
            }
            .into());
        }
        let mut wrapped = Self::atoms_only(calculator, structure);
        wrapped.filter = Some(filter);
        wrapped.scalar_pressure = options.scalar_pressure;
        wrapped.hydrostatic_strain = options.hydrostatic_strain;
        wrapped.cell_factor = cell_factor;
        wrapped.cell_coords = filter.initial_coords(cell_factor);
        Ok(wrapped)
    }

    pub fn atoms_only(calculator: &'c Calculator, structure: Structure) -> Self {
        let orig_cell = structure.lattice.vectors;
        Self {
            calculator,
            structure,
            filter: None,
            scalar_pressure: 0.0,
            hydrostatic_strain: false,
            cell_factor: 1.0,
            orig_cell,
            deform_grad: Matrix3::identity(),
            deform_inv: Matrix3::identity(),
            cell_coords: Matrix3::zeros(),
            results: None,
        }
    }

    pub fn filter(&self) -> Option<CellFilter> {
        self.filter
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn into_structure(self) -> Structure {
        self.structure
    }

    pub fn deformation_gradient(&self) -> &Matrix3<f64> {
        &self.deform_grad
    }

    /// Calculator results for the current coordinates, evaluated at most once.
    pub fn results(&mut self) -> Result<&CalculatorResults> {
        let results = match self.results.take() {
            Some(r) => r,
            None => self.calculator.calculate(&self.structure)?,
        };
        Ok(&*self.results.insert(results))
    }

    /// Trajectory frame of the current state.
    pub fn snapshot(&mut self) -> Result<Frame> {
        let results = self.results()?.clone();
        Ok(Frame::new(&self.structure, results))
    }

    fn expected_rows(&self) -> usize {
        self.structure.num_atoms() + if self.filter.is_some() { 3 } else { 0 }
    }
}

impl Optimizable for FilteredStructure<'_> {
    fn get_positions(&self) -> Vec<Vector3<f64>> {
        match self.filter {
            None => self.structure.atoms.iter().map(|a| a.position.coords).collect(),
            Some(_) => {
                let mut rows: Vec<Vector3<f64>> = self
                    .structure
                    .atoms
                    .iter()
                    .map(|a| self.deform_inv * a.position.coords)
                    .collect();
                rows.extend((0..3).map(|i| self.cell_coords.row(i).transpose()));
                rows
            }
        }
    }

    fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()> {
        if positions.len() != self.expected_rows() {
            return Err(Error::Structure(format!(
                "expected {} coordinate rows, got {}",
                self.expected_rows(),
                positions.len()
            )));
        }
        let n = self.structure.num_atoms();

        match self.filter {
            None => {
                for (atom, r) in self.structure.atoms.iter_mut().zip(positions) {
                    atom.position = Point3::from(*r);
                }
            }
            Some(filter) => {
                let raw = Matrix3::from_rows(&[
                    positions[n].transpose(),
                    positions[n + 1].transpose(),
                    positions[n + 2].transpose(),
                ]);
                let coords = filter.normalize(&raw);
                let deform = filter.deformation(&coords, self.cell_factor);
                let deform_inv = deform
                    .try_inverse()
                    .ok_or_else(|| Error::Structure("cell deformation became singular".into()))?;
                let lattice = Lattice::from_matrix(deform * self.orig_cell)
                    .ok_or_else(|| Error::Structure("optimizer step produced a degenerate cell".into()))?;

                self.structure.lattice = lattice;
                for (atom, s) in self.structure.atoms.iter_mut().zip(&positions[..n]) {
                    atom.position = Point3::from(deform * s);
                }
                self.deform_grad = deform;
                self.deform_inv = deform_inv;
                self.cell_coords = coords;
            }
        }

        self.results = None;
        Ok(())
    }

    fn get_forces(&mut self) -> Result<Vec<Vector3<f64>>> {
        let (forces, stress) = {
            let r = self.results()?;
            (r.forces.clone(), r.stress)
        };
        let Some(filter) = self.filter else {
            return Ok(forces);
        };

        // -dH/dF for H = E + P V
        let volume = self.structure.volume();
        let virial = -(stress + Matrix3::identity() * self.scalar_pressure) * volume;
        let gradient = virial * self.deform_inv.transpose();

        let mut cell = filter.cell_forces(&self.cell_coords, self.cell_factor, &gradient);
        if self.hydrostatic_strain {
            cell = Matrix3::identity() * (cell.trace() / 3.0);
        }

        let mut rows: Vec<Vector3<f64>> = forces
            .iter()
            .map(|f| self.deform_grad.transpose() * f)
            .collect();
        rows.extend((0..3).map(|i| cell.row(i).transpose()));
        Ok(rows)
    }

    fn get_potential_energy(&mut self) -> Result<f64> {
        let energy = self.results()?.energy;
        Ok(match self.filter {
            Some(_) => energy + self.scalar_pressure * self.structure.volume(),
            None => energy,
        })
    }
}
