pub mod filter;
pub mod optimizer;
pub mod progress;
pub mod trajectory;

pub use filter::{CellFilter, FilterOptions, FilteredStructure};
pub use optimizer::{RelaxOptions, RelaxResult, StructOptimizer};
pub use trajectory::{Frame, Trajectory};
