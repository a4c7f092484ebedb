use nalgebra::Vector3;

use crate::core::error::Result;
use crate::solvers::{Optimizable, Optimizer};

/// Fast Inertial Relaxation Engine (Bitzek et al., PRL 97, 170201).
#[derive(Debug, Clone)]
pub struct Fire {
    pub dt: f64,
    pub maxstep: f64,
    pub dtmax: f64,
    pub n_min: usize,
    pub finc: f64,
    pub fdec: f64,
    pub astart: f64,
    pub fa: f64,

    // State
    a: f64,
    n_positive: usize,
    velocity: Option<Vec<Vector3<f64>>>,
}

impl Default for Fire {
    fn default() -> Self {
        Self {
            dt: 0.1,
            maxstep: 0.2,
            dtmax: 1.0,
            n_min: 5,
            finc: 1.1,
            fdec: 0.5,
            astart: 0.1,
            fa: 0.99,
            a: 0.1,
            n_positive: 0,
            velocity: None,
        }
    }
}

fn vdot(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x.dot(y)).sum()
}

impl Optimizer for Fire {
    fn name(&self) -> &'static str {
        "FIRE"
    }

    fn step(&mut self, system: &mut dyn Optimizable, forces: &[Vector3<f64>]) -> Result<()> {
        let mut v = match self.velocity.take() {
            None => vec![Vector3::zeros(); forces.len()],
            Some(mut v) => {
                let vf = vdot(forces, &v);
                if vf > 0.0 {
                    // Mix the velocity towards the force direction
                    let f_norm = vdot(forces, forces).sqrt();
                    let v_norm = vdot(&v, &v).sqrt();
                    for (vi, fi) in v.iter_mut().zip(forces) {
                        *vi = *vi * (1.0 - self.a) + fi * (self.a * v_norm / f_norm);
                    }
                    if self.n_positive > self.n_min {
                        self.dt = (self.dt * self.finc).min(self.dtmax);
                        self.a *= self.fa;
                    }
                    self.n_positive += 1;
                } else {
                    // Uphill: stop and restart cautiously
                    v.iter_mut().for_each(|vi| *vi = Vector3::zeros());
                    self.a = self.astart;
                    self.dt *= self.fdec;
                    self.n_positive = 0;
                }
                v
            }
        };

        for (vi, fi) in v.iter_mut().zip(forces) {
            *vi += fi * self.dt;
        }
        let mut dr: Vec<Vector3<f64>> = v.iter().map(|vi| vi * self.dt).collect();
        let norm_dr = vdot(&dr, &dr).sqrt();
        if norm_dr > self.maxstep {
            let scale = self.maxstep / norm_dr;
            dr.iter_mut().for_each(|d| *d *= scale);
        }

        let positions: Vec<Vector3<f64>> = system
            .get_positions()
            .iter()
            .zip(&dr)
            .map(|(r, d)| r + d)
            .collect();
        system.set_positions(&positions)?;

        self.velocity = Some(v);
        Ok(())
    }
}
