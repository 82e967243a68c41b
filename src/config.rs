//! Code generation settings
//!
//! Everything has a built-in default matching the VCK190 / IPU bring-up flow.
//! A JSON file may override any subset of the fields:
//!
//! ```json
//! { "base_addr": 35184372088832, "axi": { "burst_len": 8 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Default device base address written into the driver context
pub const DEFAULT_BASE_ADDR: u64 = 0x200_0000_0000;

/// AXI attributes applied to shim DMA descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxiConfig {
    pub smid: u8,
    pub burst_len: u8,
    pub qos: u8,
    pub cache: u8,
    pub secure: bool,
}

impl Default for AxiConfig {
    fn default() -> Self {
        Self {
            smid: 0,
            burst_len: 4,
            qos: 0,
            cache: 0,
            secure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Device base address
    pub base_addr: u64,
    pub axi: AxiConfig,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            base_addr: DEFAULT_BASE_ADDR,
            axi: AxiConfig::default(),
        }
    }
}

impl CodegenConfig {
    pub fn from_json(source: &str) -> CompileResult<Self> {
        serde_json::from_str(source).map_err(|e| CompileError::config(e.to_string()))
    }

    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> CompileResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&source)?;
        log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }
}
