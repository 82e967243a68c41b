//! Error types for the netlist to libxaie lowering

use thiserror::Error;

/// Result type for lowering operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Lowering errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Input error: {message}")]
    InputError { message: String },

    #[error("expected a device at the top level of the netlist")]
    MissingDevice,

    #[error("Invalid reference: {message}")]
    InvalidReference { message: String },

    #[error("{engine}: unsupported lock action")]
    UnsupportedLockAction { engine: String },

    #[error(
        "{engine}: DMA contains at least one multi-dimensional buffer descriptor, \
         which is only supported for AIE-ML devices"
    )]
    MultiDimUnsupported { engine: String },

    #[error("{engine}: buffer descriptor pool exhausted ({requested} requested, {available} available)")]
    BdPoolExhausted {
        engine: String,
        requested: usize,
        available: usize,
    },

    #[error("Code generation error: {message}")]
    CodeGenError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl CompileError {
    pub fn input(msg: impl Into<String>) -> Self {
        CompileError::InputError { message: msg.into() }
    }

    pub fn invalid_ref(msg: impl Into<String>) -> Self {
        CompileError::InvalidReference { message: msg.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CompileError::CodeGenError { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CompileError::ConfigError { message: msg.into() }
    }
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::input(err.to_string())
    }
}
