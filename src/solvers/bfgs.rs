use nalgebra::{DMatrix, DVector, SymmetricEigen, Vector3};

use crate::core::error::Result;
use crate::solvers::{Optimizable, Optimizer};

/// Quasi-Newton optimizer with a dense Hessian estimate.
///
/// Steps follow `|H|^-1 f` in the Hessian eigenbasis and are scaled so that
/// no row moves further than `maxstep`.
#[derive(Debug, Clone)]
pub struct Bfgs {
    pub maxstep: f64,
    /// Initial Hessian guess (eV/Å²).
    pub alpha: f64,

    // State
    hessian: Option<DMatrix<f64>>,
    r0: Option<DVector<f64>>,
    f0: Option<DVector<f64>>,
}

impl Default for Bfgs {
    fn default() -> Self {
        Self {
            maxstep: 0.2,
            alpha: 70.0,
            hessian: None,
            r0: None,
            f0: None,
        }
    }
}

fn flatten(rows: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(rows.len() * 3, rows.iter().flat_map(|r| r.iter().copied()))
}

impl Bfgs {
    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        let dim = r.len();
        if self.hessian.as_ref().map_or(true, |h| h.nrows() != dim) {
            self.hessian = Some(DMatrix::identity(dim, dim) * self.alpha);
            return;
        }
        let (Some(h), Some(r0), Some(f0)) = (self.hessian.as_mut(), self.r0.as_ref(), self.f0.as_ref())
        else {
            return;
        };

        let dr = r - r0;
        if dr.amax() < 1e-7 {
            return;
        }
        let df = f - f0;
        let a = dr.dot(&df);
        let dg = &*h * &dr;
        let b = dr.dot(&dg);
        if a.abs() < f64::EPSILON || b.abs() < f64::EPSILON {
            return;
        }
        *h -= &df * df.transpose() / a + &dg * dg.transpose() / b;
    }
}

impl Optimizer for Bfgs {
    fn name(&self) -> &'static str {
        "BFGS"
    }

    fn step(&mut self, system: &mut dyn Optimizable, forces: &[Vector3<f64>]) -> Result<()> {
        let positions = system.get_positions();
        let r = flatten(&positions);
        let f = flatten(forces);

        self.update(&r, &f);
        let h = match &self.hessian {
            Some(h) => h.clone(),
            None => DMatrix::identity(r.len(), r.len()) * self.alpha,
        };

        let eigen = SymmetricEigen::new(h);
        let v = &eigen.eigenvectors;
        let projected = v.transpose() * &f;
        let scaled = DVector::from_iterator(
            projected.len(),
            projected
                .iter()
                .zip(eigen.eigenvalues.iter())
                .map(|(p, w)| p / w.abs()),
        );
        let mut dr = v * scaled;

        let longest = dr
            .as_slice()
            .chunks(3)
            .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
            .fold(0.0, f64::max);
        if longest > self.maxstep {
            dr *= self.maxstep / longest;
        }

        let moved: Vec<Vector3<f64>> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| p + Vector3::new(dr[3 * i], dr[3 * i + 1], dr[3 * i + 2]))
            .collect();
        system.set_positions(&moved)?;

        self.r0 = Some(r);
        self.f0 = Some(f);
        Ok(())
    }
}
