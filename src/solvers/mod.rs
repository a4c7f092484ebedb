use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigError, Result};

pub mod bfgs;
pub mod fire;

/// A system seen through generalized coordinates, one 3-vector per row.
///
/// Implementations cache the last evaluation; `set_positions` invalidates it.
pub trait Optimizable {
    fn get_positions(&self) -> Vec<Vector3<f64>>;

    fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()>;

    /// Generalized forces, `-dE/dx` for every row returned by `get_positions`.
    fn get_forces(&mut self) -> Result<Vec<Vector3<f64>>>;

    /// The quantity being minimized (eV).
    fn get_potential_energy(&mut self) -> Result<f64>;
}

/// A local optimizer taking one step at a time.
pub trait Optimizer {
    /// Moves the system once, given the forces at its current coordinates.
    fn step(&mut self, system: &mut dyn Optimizable, forces: &[Vector3<f64>]) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Selectable optimizer algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[default]
    #[serde(rename = "FIRE")]
    Fire,
    #[serde(rename = "BFGS")]
    Bfgs,
}

impl OptimizerKind {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Fire => Box::new(fire::Fire::default()),
            OptimizerKind::Bfgs => Box::new(bfgs::Bfgs::default()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Fire => "FIRE",
            OptimizerKind::Bfgs => "BFGS",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIRE" => Ok(OptimizerKind::Fire),
            "BFGS" => Ok(OptimizerKind::Bfgs),
            _ => Err(ConfigError::UnknownOptimizer(s.to_string())),
        }
    }
}

/// Snapshot handed to the observer after each evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub energy: f64,
    pub fmax: f64,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub converged: bool,
    pub steps: usize,
    pub fmax: f64,
}

/// Largest row norm, the convergence measure. NaN if any row is NaN, so a
/// broken state never counts as converged.
pub fn max_row_norm(forces: &[Vector3<f64>]) -> f64 {
    forces.iter().map(|f| f.norm()).fold(0.0, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            acc.max(n)
        }
    })
}

/// Drives `optimizer` until every generalized force row is below `fmax` or
/// `max_steps` steps were taken.
///
/// The observer sees step 0 (the initial state) and every state after a step.
pub fn run<S, F>(
    optimizer: &mut dyn Optimizer,
    system: &mut S,
    fmax: f64,
    max_steps: usize,
    mut observe: F,
) -> Result<RunSummary>
where
    S: Optimizable,
    F: FnMut(&StepReport, &mut S) -> Result<()>,
{
    let mut forces = system.get_forces()?;
    let mut current = max_row_norm(&forces);
    let mut steps = 0;

    let energy = system.get_potential_energy()?;
    observe(&StepReport { step: 0, energy, fmax: current }, &mut *system)?;

    let mut converged = current < fmax;
    while !converged && steps < max_steps {
        optimizer.step(&mut *system, &forces)?;
        steps += 1;

        forces = system.get_forces()?;
        current = max_row_norm(&forces);
        converged = current < fmax;

        let energy = system.get_potential_energy()?;
        observe(&StepReport { step: steps, energy, fmax: current }, &mut *system)?;
    }

    Ok(RunSummary {
        converged,
        steps,
        fmax: current,
    })
}
