use thiserror::Error;

/// Invalid construction parameters. Raised eagerly, never defaulted away.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown graph algorithm '{0}' (expected one of: legacy, fast)")]
    UnknownAlgorithm(String),

    #[error("{name} must be a positive finite distance, got {value}")]
    InvalidCutoff { name: &'static str, value: f64 },

    #[error("bond_graph_cutoff ({bond}) must not exceed atom_graph_cutoff ({atom})")]
    BondCutoffExceedsAtom { atom: f64, bond: f64 },

    #[error("unknown isolated-atom policy '{0}' (expected one of: error, warn, ignore)")]
    UnknownIsolatedPolicy(String),

    #[error("unrecognized device selector '{0}' (expected cpu, cuda, cuda:<index>, mps or auto)")]
    UnknownDevice(String),

    #[error("device '{0}' is not available on this host")]
    DeviceUnavailable(String),

    #[error("unknown cell filter '{0}' (expected FrechetCellFilter, ExpCellFilter or UnitCellFilter)")]
    UnknownFilter(String),

    #[error("unknown optimizer '{0}' (expected FIRE or BFGS)")]
    UnknownOptimizer(String),

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("relaxation did not converge within {steps} steps (fmax {fmax:.4} > {target})")]
    NotConverged { steps: usize, fmax: f64, target: f64 },

    #[error("invalid structure: {0}")]
    Structure(String),

    #[error("atom {index} has no neighbors within {cutoff} Å")]
    IsolatedAtom { index: usize, cutoff: f64 },

    #[error(transparent)]
    Potential(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
