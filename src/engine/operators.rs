use nalgebra::Matrix3;
use rand::Rng;

use crate::core::domain::{Lattice, Structure};
use crate::core::error::{Error, Result};
use crate::core::spatial;

/// Attempts before a perturbation that keeps colliding is given up.
const MAX_ATTEMPTS: usize = 100;

/// A composable structure perturbation builder.
#[derive(Clone, Debug, Default)]
pub struct Perturbation {
    rattle_intensity: Option<f64>, // Max atom displacement per axis (Å)
    strain_intensity: Option<f64>, // Max strain component
    min_distance: Option<f64>,     // Reject results with closer pairs (Å)
}

impl Perturbation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rattle(mut self, max_dist: f64) -> Self {
        self.rattle_intensity = Some(max_dist);
        self
    }

    pub fn strain(mut self, max_strain: f64) -> Self {
        self.strain_intensity = Some(max_strain);
        self
    }

    pub fn min_distance(mut self, distance: f64) -> Self {
        self.min_distance = Some(distance);
        self
    }

    pub fn apply(&self, structure: &Structure, rng: &mut impl Rng) -> Result<Structure> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.apply_once(structure, rng)?;
            match self.min_distance {
                Some(d) if !spatial::check_overlap(&candidate, d) => continue,
                _ => return Ok(candidate),
            }
        }
        Err(Error::Structure(format!(
            "no perturbation without overlaps below {:?} Å after {} attempts",
            self.min_distance, MAX_ATTEMPTS
        )))
    }

    fn apply_once(&self, structure: &Structure, rng: &mut impl Rng) -> Result<Structure> {
        let mut s = structure.clone();
        s.magmoms = None;

        // 1. Strain (symmetric, atoms follow the cell)
        if let Some(mag) = self.strain_intensity.filter(|m| *m > 0.0) {
            let mut eps = Matrix3::zeros();
            for i in 0..3 {
                for j in i..3 {
                    let e = rng.gen_range(-mag..mag);
                    eps[(i, j)] = e;
                    eps[(j, i)] = e;
                }
            }
            let deformed = (Matrix3::identity() + eps) * s.lattice.vectors;
            let lattice = Lattice::from_matrix(deformed)
                .ok_or_else(|| Error::Structure("strain produced a singular cell".into()))?;
            s.set_lattice(lattice, true);
        }

        // 2. Rattle
        if let Some(mag) = self.rattle_intensity.filter(|m| *m > 0.0) {
            for atom in &mut s.atoms {
                atom.position.x += rng.gen_range(-mag..mag);
                atom.position.y += rng.gen_range(-mag..mag);
                atom.position.z += rng.gen_range(-mag..mag);
            }
        }

        Ok(s)
    }
}
