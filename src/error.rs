//! Error types for engine operations
//!
//! Almost every failure in the engine is recovered locally (out-of-range
//! configuration is clamped, unmatched note-offs are ignored, failed modulation
//! wiring falls back to independent voices). `EngineError` exists for the few
//! places that surface a failure to the host and for log context.

use crate::config::ModulationType;
use crate::graph::PatchError;

/// Error types for engine operations
#[derive(Debug, Clone)]
pub enum EngineError {
    /// A note identifier could not be parsed
    InvalidNote(String),
    /// The node runtime rejected an operation
    Patch(PatchError),
    /// Building the wiring for a modulation mode failed
    TopologyConstruction {
        mode: ModulationType,
        source: PatchError,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidNote(note) => write!(f, "Invalid note: {:?}", note),
            EngineError::Patch(err) => write!(f, "Patch error: {}", err),
            EngineError::TopologyConstruction { mode, source } => {
                write!(f, "Failed to build {} modulation: {}", mode, source)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Patch(err) => Some(err),
            EngineError::TopologyConstruction { source, .. } => Some(source),
            EngineError::InvalidNote(_) => None,
        }
    }
}

impl From<PatchError> for EngineError {
    fn from(err: PatchError) -> Self {
        EngineError::Patch(err)
    }
}
