use nalgebra::Vector3;

use crystal_relax::core::error::{ConfigError, Result};
use crystal_relax::solvers::{self, max_row_norm, Optimizable, Optimizer, OptimizerKind, StepReport};

/// Anisotropic harmonic well centered on `minimum`.
struct Bowl {
    positions: Vec<Vector3<f64>>,
    minimum: Vec<Vector3<f64>>,
    stiffness: Vector3<f64>,
    evaluations: usize,
}

impl Bowl {
    fn new() -> Self {
        Self {
            positions: vec![Vector3::new(1.0, -0.5, 0.3), Vector3::new(-0.2, 0.8, 1.1)],
            minimum: vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.0, 0.0, 0.0)],
            stiffness: Vector3::new(1.0, 4.0, 9.0),
            evaluations: 0,
        }
    }
}

impl Optimizable for Bowl {
    fn get_positions(&self) -> Vec<Vector3<f64>> {
        self.positions.clone()
    }

    fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()> {
        self.positions = positions.to_vec();
        Ok(())
    }

    fn get_forces(&mut self) -> Result<Vec<Vector3<f64>>> {
        self.evaluations += 1;
        Ok(self
            .positions
            .iter()
            .zip(&self.minimum)
            .map(|(r, m)| -(r - m).component_mul(&self.stiffness))
            .collect())
    }

    fn get_potential_energy(&mut self) -> Result<f64> {
        Ok(self
            .positions
            .iter()
            .zip(&self.minimum)
            .map(|(r, m)| 0.5 * (r - m).component_mul(&(r - m)).dot(&self.stiffness))
            .sum())
    }
}

fn converge(kind: OptimizerKind) -> (Bowl, solvers::RunSummary, Vec<StepReport>) {
    let mut bowl = Bowl::new();
    let mut optimizer = kind.build();
    let mut reports = Vec::new();
    let summary = solvers::run(optimizer.as_mut(), &mut bowl, 1e-4, 1000, |report, _| {
        reports.push(*report);
        Ok(())
    })
    .unwrap();
    (bowl, summary, reports)
}

#[test]
fn test_fire_converges() {
    let (mut bowl, summary, reports) = converge(OptimizerKind::Fire);

    assert!(summary.converged);
    assert!(summary.fmax < 1e-4);
    assert!(max_row_norm(&bowl.get_forces().unwrap()) < 1e-4);
    for (r, m) in bowl.positions.iter().zip(&bowl.minimum) {
        assert!((r - m).norm() < 1e-4);
    }

    // Step 0 plus one report per step, in order
    assert_eq!(reports.len(), summary.steps + 1);
    for (i, r) in reports.iter().enumerate() {
        assert_eq!(r.step, i);
    }
    assert!(reports.last().unwrap().energy < reports[0].energy);
}

#[test]
fn test_bfgs_converges() {
    let (bowl, summary, reports) = converge(OptimizerKind::Bfgs);

    assert!(summary.converged);
    for (r, m) in bowl.positions.iter().zip(&bowl.minimum) {
        assert!((r - m).norm() < 1e-4);
    }
    assert_eq!(reports.len(), summary.steps + 1);
}

#[test]
fn test_bfgs_faster_than_fire_on_quadratic() {
    let (_, fire, _) = converge(OptimizerKind::Fire);
    let (_, bfgs, _) = converge(OptimizerKind::Bfgs);
    assert!(bfgs.steps < fire.steps, "BFGS {} vs FIRE {}", bfgs.steps, fire.steps);
}

#[test]
fn test_step_limit() {
    let mut bowl = Bowl::new();
    let mut optimizer = OptimizerKind::Fire.build();
    let summary = solvers::run(optimizer.as_mut(), &mut bowl, 1e-8, 3, |_, _| Ok(())).unwrap();

    assert!(!summary.converged);
    assert_eq!(summary.steps, 3);
    // One evaluation before stepping, one after each step
    assert_eq!(bowl.evaluations, 4);
}

#[test]
fn test_already_converged_takes_no_step() {
    let mut bowl = Bowl::new();
    bowl.positions = bowl.minimum.clone();
    let mut optimizer = OptimizerKind::Bfgs.build();
    let mut seen = 0;
    let summary = solvers::run(optimizer.as_mut(), &mut bowl, 0.05, 100, |_, _| {
        seen += 1;
        Ok(())
    })
    .unwrap();

    assert!(summary.converged);
    assert_eq!(summary.steps, 0);
    assert_eq!(seen, 1);
}

#[test]
fn test_nan_forces_never_converge() {
    let rows = [Vector3::new(0.1, 0.0, 0.0), Vector3::repeat(f64::NAN), Vector3::new(0.0, 0.2, 0.0)];
    assert!(max_row_norm(&rows).is_nan());
    assert!(max_row_norm(&rows[..1]) > 0.0);

    let mut bowl = Bowl::new();
    bowl.positions[1] = Vector3::repeat(f64::NAN);
    let mut optimizer = OptimizerKind::Fire.build();
    let summary = solvers::run(optimizer.as_mut(), &mut bowl, 0.05, 0, |_, _| Ok(())).unwrap();

    assert!(!summary.converged);
    assert!(summary.fmax.is_nan());
}

#[test]
fn test_max_step_respected() {
    let mut bowl = Bowl::new();
    bowl.positions[0] = Vector3::new(100.0, 0.0, 0.0);
    let forces = bowl.get_forces().unwrap();
    let before = bowl.get_positions();

    for kind in [OptimizerKind::Fire, OptimizerKind::Bfgs] {
        let mut b = Bowl::new();
        b.positions = before.clone();
        let mut optimizer: Box<dyn Optimizer> = kind.build();
        optimizer.step(&mut b, &forces).unwrap();
        for (new, old) in b.positions.iter().zip(&before) {
            assert!((new - old).norm() <= 0.2 + 1e-12, "{} moved too far", optimizer.name());
        }
    }
}

#[test]
fn test_observer_error_stops_run() {
    let mut bowl = Bowl::new();
    let mut optimizer = OptimizerKind::Fire.build();
    let result = solvers::run(optimizer.as_mut(), &mut bowl, 1e-6, 100, |report, _| {
        if report.step == 2 {
            Err(ConfigError::InvalidOption {
                name: "observer",
                reason: "stop".into(),
            }
            .into())
        } else {
            Ok(())
        }
    });
    assert!(result.is_err());
}

#[test]
fn test_optimizer_kind_parsing() {
    assert_eq!("FIRE".parse::<OptimizerKind>().unwrap(), OptimizerKind::Fire);
    assert_eq!("bfgs".parse::<OptimizerKind>().unwrap(), OptimizerKind::Bfgs);
    assert!(matches!(
        "LBFGS".parse::<OptimizerKind>(),
        Err(ConfigError::UnknownOptimizer(_))
    ));
    assert_eq!(OptimizerKind::default(), OptimizerKind::Fire);
    assert_eq!(OptimizerKind::Bfgs.to_string(), "BFGS");
    assert_eq!(OptimizerKind::Fire.build().name(), "FIRE");
    assert_eq!(serde_json::to_string(&OptimizerKind::Bfgs).unwrap(), "\"BFGS\"");
}
