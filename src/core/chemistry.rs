use crate::core::domain::Species;
use serde::{Deserialize, Serialize};

/// Functional form of a pair interaction. Distances in Å, energies in eV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum PairForm {
    /// `4ε[(σ/r)^12 - (σ/r)^6]`
    LennardJones { epsilon: f64, sigma: f64 },
    /// `A exp(-r/ρ) - C/r^6`
    Buckingham { a: f64, rho: f64, c: f64 },
    /// No interaction.
    Zero,
}

impl PairForm {
    /// Lennard-Jones parameters whose minimum sits at the sum of covalent radii.
    pub fn from_radii(a: &Species, b: &Species, epsilon: f64) -> Self {
        let r_min = a.radius_covalent + b.radius_covalent;
        PairForm::LennardJones {
            epsilon,
            sigma: r_min / 2f64.powf(1.0 / 6.0),
        }
    }

    /// Returns `(φ(r), dφ/dr)`.
    #[inline]
    pub fn evaluate(&self, r: f64) -> (f64, f64) {
        match *self {
            PairForm::LennardJones { epsilon, sigma } => {
                let sr6 = (sigma / r).powi(6);
                let sr12 = sr6 * sr6;
                let e = 4.0 * epsilon * (sr12 - sr6);
                let de = 4.0 * epsilon * (-12.0 * sr12 + 6.0 * sr6) / r;
                (e, de)
            }
            PairForm::Buckingham { a, rho, c } => {
                let rep = a * (-r / rho).exp();
                let r6 = r.powi(6);
                let e = rep - c / r6;
                let de = -rep / rho + 6.0 * c / (r6 * r);
                (e, de)
            }
            PairForm::Zero => (0.0, 0.0),
        }
    }
}

/// A flattened 2D matrix storing pair interactions between named species.
/// Access is O(1) via `index = i * N + j`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairTable {
    symbols: Vec<String>,
    forms: Vec<PairForm>,
}

impl PairTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PairTable::insert`].
    pub fn with_pair(mut self, a: &str, b: &str, form: PairForm) -> Self {
        self.insert(a, b, form);
        self
    }

    /// Sets the (symmetric) interaction between two species, registering
    /// unseen symbols. Pairs never set default to [`PairForm::Zero`].
    pub fn insert(&mut self, a: &str, b: &str, form: PairForm) {
        let i = self.register(a);
        let j = self.register(b);
        let n = self.symbols.len();
        self.forms[i * n + j] = form;
        self.forms[j * n + i] = form;
    }

    fn register(&mut self, symbol: &str) -> usize {
        if let Some(i) = self.index_of(symbol) {
            return i;
        }
        let old_n = self.symbols.len();
        let new_n = old_n + 1;
        let mut grid = vec![PairForm::Zero; new_n * new_n];
        for i in 0..old_n {
            for j in 0..old_n {
                grid[i * new_n + j] = self.forms[i * old_n + j];
            }
        }
        self.symbols.push(symbol.to_string());
        self.forms = grid;
        old_n
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    #[inline(always)]
    pub fn get(&self, id_a: usize, id_b: usize) -> PairForm {
        // Indices come from index_of(); callers resolve symbols once per structure.
        self.forms[id_a * self.symbols.len() + id_b]
    }
}
