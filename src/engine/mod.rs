pub mod calculator;
pub mod device;
pub mod model;
pub mod operators;
pub mod pair;
pub mod potential;

pub use calculator::{Calculator, CalculatorResults};
pub use device::{Accelerators, Device};
pub use model::Model;
pub use pair::PairPotential;
pub use potential::{Potential, Prediction};
