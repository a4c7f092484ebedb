//! Compute-target selection.
//!
//! A device is resolved once, when a model is built, and stays bound to it.
//! Accelerator availability is probed locally: CUDA through `/dev/nvidia<N>`
//! nodes (narrowed by `CUDA_VISIBLE_DEVICES`), MPS by the Apple-silicon target.

use std::fmt;
use std::fs;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Only `cuda` takes an index suffix.
const SELECTOR_PATTERN: &str = r"^(cpu|mps|auto)$|^(cuda)(?::(\d+))?$";

static SELECTOR: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(usize),
    Mps,
}

/// Accelerators visible to this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accelerators {
    pub cuda_devices: usize,
    pub mps: bool,
}

impl Accelerators {
    pub fn probe() -> Self {
        let found = Self {
            cuda_devices: probe_cuda(),
            mps: cfg!(all(target_os = "macos", target_arch = "aarch64")),
        };
        debug!("accelerator probe: {:?}", found);
        found
    }

    /// Host without accelerators.
    pub fn none() -> Self {
        Self::default()
    }
}

fn probe_cuda() -> usize {
    let nodes = fs::read_dir("/dev")
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy();
                    name.strip_prefix("nvidia")
                        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0);

    match std::env::var("CUDA_VISIBLE_DEVICES") {
        Ok(visible) => {
            let listed = visible
                .split(',')
                .map(str::trim)
                .take_while(|s| !s.is_empty() && !s.starts_with('-'))
                .count();
            listed.min(nodes)
        }
        Err(_) => nodes,
    }
}

impl Device {
    /// Resolves a selector (`cpu`, `cuda`, `cuda:<N>`, `mps`, `auto`) against the
    /// accelerators of this host. `None` behaves like `auto`.
    pub fn resolve(selector: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with(selector, &Accelerators::probe())
    }

    pub fn resolve_with(selector: Option<&str>, available: &Accelerators) -> Result<Self, ConfigError> {
        let raw = selector.unwrap_or("auto");
        let normalized = raw.trim().to_ascii_lowercase();
        let unknown = || ConfigError::UnknownDevice(raw.to_string());

        let pattern = SELECTOR
            .get_or_init(|| Regex::new(SELECTOR_PATTERN).ok())
            .as_ref()
            .ok_or_else(unknown)?;
        let caps = pattern.captures(&normalized).ok_or_else(unknown)?;
        let kind = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).ok_or_else(unknown)?;
        let index = match caps.get(3) {
            Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| unknown())?),
            None => None,
        };

        match (kind, index) {
            ("cpu", None) => Ok(Device::Cpu),
            ("mps", None) if available.mps => Ok(Device::Mps),
            ("mps", None) => Err(ConfigError::DeviceUnavailable(raw.to_string())),
            ("cuda", idx) => {
                let idx = idx.unwrap_or(0);
                if idx < available.cuda_devices {
                    Ok(Device::Cuda(idx))
                } else {
                    Err(ConfigError::DeviceUnavailable(raw.to_string()))
                }
            }
            ("auto", None) => Ok(if available.cuda_devices > 0 {
                Device::Cuda(0)
            } else if available.mps {
                Device::Mps
            } else {
                Device::Cpu
            }),
            _ => Err(unknown()),
        }
    }

    /// Identifier such as `cpu`, `cuda:0` or `mps`.
    pub fn identifier(&self) -> String {
        match self {
            Device::Cpu => "cpu".to_string(),
            Device::Cuda(i) => format!("cuda:{}", i),
            Device::Mps => "mps".to_string(),
        }
    }

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}
