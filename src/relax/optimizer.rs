use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::core::error::{ConfigError, Error, Result};
use crate::engine::calculator::STRESS_WEIGHT;
use crate::engine::{Calculator, Device, Model};
use crate::relax::filter::{CellFilter, FilterOptions, FilteredStructure};
use crate::relax::progress::ProgressLog;
use crate::relax::trajectory::Trajectory;
use crate::solvers::{self, OptimizerKind};

/// Parameters of a single relaxation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxOptions {
    /// Convergence threshold on the largest generalized force row (eV/Å).
    pub fmax: f64,
    /// Optimizer step budget.
    pub steps: usize,
    /// Relax the cell together with the positions.
    pub relax_cell: bool,
    pub ase_filter: CellFilter,
    /// External pressure (GPa).
    pub scalar_pressure: f64,
    pub hydrostatic_strain: bool,
    pub cell_factor: Option<f64>,
    /// Record every n-th optimizer step.
    pub loginterval: usize,
    /// Print a progress line per step.
    pub verbose: bool,
    /// Fail with [`Error::NotConverged`] when the budget runs out.
    pub strict: bool,
    /// Attach the final predicted magmoms to the final structure.
    pub assign_magmoms: bool,
    /// Write the trajectory here after relaxing.
    pub save_path: Option<PathBuf>,
}

impl Default for RelaxOptions {
    fn default() -> Self {
        Self {
            fmax: 0.1,
            steps: 500,
            relax_cell: true,
            ase_filter: CellFilter::default(),
            scalar_pressure: 0.0,
            hydrostatic_strain: false,
            cell_factor: None,
            loginterval: 1,
            verbose: false,
            strict: false,
            assign_magmoms: true,
            save_path: None,
        }
    }
}

impl RelaxOptions {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.fmax.is_finite() && self.fmax > 0.0) {
            return Err(ConfigError::InvalidOption {
                name: "fmax",
                reason: format!("must be positive, got {}", self.fmax),
            });
        }
        if self.loginterval == 0 {
            return Err(ConfigError::InvalidOption {
                name: "loginterval",
                reason: "must be at least 1".into(),
            });
        }
        if !self.scalar_pressure.is_finite() {
            return Err(ConfigError::InvalidOption {
                name: "scalar_pressure",
                reason: format!("must be finite, got {}", self.scalar_pressure),
            });
        }
        if let Some(c) = self.cell_factor {
            if !(c.is_finite() && c > 0.0) {
                return Err(ConfigError::InvalidOption {
                    name: "cell_factor",
                    reason: format!("must be positive, got {}", c),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of [`StructOptimizer::relax`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxResult {
    pub final_structure: Structure,
    pub trajectory: Trajectory,
}

impl RelaxResult {
    /// Field names in the order they are populated and serialized.
    pub const KEYS: [&'static str; 2] = ["final_structure", "trajectory"];

    pub fn keys(&self) -> [&'static str; 2] {
        Self::KEYS
    }
}

/// Relaxes positions and cells with a bound calculator.
#[derive(Debug, Clone)]
pub struct StructOptimizer {
    calculator: Calculator,
    optimizer: OptimizerKind,
}

impl StructOptimizer {
    pub fn new(model: Model) -> Self {
        Self::from_calculator(Calculator::new(model))
    }

    /// Builds the default model on the device named by `selector`.
    pub fn with_device(selector: &str) -> Result<Self> {
        let device = Device::resolve(Some(selector))?;
        Ok(Self::new(Model::load(device)))
    }

    pub fn from_calculator(calculator: Calculator) -> Self {
        Self {
            calculator,
            optimizer: OptimizerKind::default(),
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    pub fn optimizer(&self) -> OptimizerKind {
        self.optimizer
    }

    pub fn relax(&self, structure: &Structure, options: &RelaxOptions) -> Result<RelaxResult> {
        options.validate()?;
        structure.validate()?;

        let mut optimizer = self.optimizer.build();
        let mut progress = ProgressLog::stdout(optimizer.name(), options.verbose);

        let mut system = if options.relax_cell {
            let filter_options = FilterOptions {
                scalar_pressure: options.scalar_pressure * STRESS_WEIGHT,
                hydrostatic_strain: options.hydrostatic_strain,
                cell_factor: options.cell_factor,
            };
            FilteredStructure::new(&self.calculator, structure.clone(), options.ase_filter, &filter_options)?
        } else {
            FilteredStructure::atoms_only(&self.calculator, structure.clone())
        };

        let mut trajectory = Trajectory::new();
        let summary = solvers::run(
            optimizer.as_mut(),
            &mut system,
            options.fmax,
            options.steps,
            |report, system| {
                debug!(
                    "{} step {}: E = {:.6} eV, fmax = {:.6}",
                    self.optimizer, report.step, report.energy, report.fmax
                );
                progress.log(report)?;
                if report.step % options.loginterval == 0 {
                    trajectory.append(system.snapshot()?)?;
                }
                Ok(())
            },
        )?;
        trajectory.append(system.snapshot()?)?;

        if !summary.converged {
            if options.strict {
                return Err(Error::NotConverged {
                    steps: summary.steps,
                    fmax: summary.fmax,
                    target: options.fmax,
                });
            }
            warn!(
                "{}: not converged after {} steps (fmax {:.4} > {})",
                structure.formula(),
                summary.steps,
                summary.fmax,
                options.fmax
            );
        }

        let magmoms = system.results()?.magmoms.clone();
        let mut final_structure = system.into_structure();
        final_structure.magmoms = options.assign_magmoms.then_some(magmoms);

        info!(
            "{}: relaxed in {} steps with {} ({}), E = {:.6} eV, V = {:.3} Å³",
            final_structure.formula(),
            summary.steps,
            self.optimizer,
            if options.relax_cell { options.ase_filter.as_str() } else { "fixed cell" },
            trajectory.energies().last().unwrap_or(f64::NAN),
            final_structure.volume()
        );

        if let Some(path) = &options.save_path {
            trajectory.save(path)?;
        }

        Ok(RelaxResult {
            final_structure,
            trajectory,
        })
    }

    /// Relaxes independent structures in parallel. A `save_path` gets the
    /// structure index appended to its file stem.
    pub fn relax_many(&self, structures: &[Structure], options: &RelaxOptions) -> Vec<Result<RelaxResult>> {
        structures
            .par_iter()
            .enumerate()
            .map(|(i, s)| {
                let mut options = options.clone();
                if structures.len() > 1 {
                    options.save_path = options.save_path.as_deref().map(|p| indexed_path(p, i));
                }
                self.relax(s, &options)
            })
            .collect()
    }
}

fn indexed_path(path: &Path, index: usize) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index),
    };
    path.with_file_name(name)
}
