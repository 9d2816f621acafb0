//! Error types for the analog MVM bridge.

use crate::types::{DType, TileId};
use thiserror::Error;

/// Errors produced by quantization, tensor handles, and tile operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MvmError {
    /// A host or device buffer could not be allocated.
    #[error("out of memory: failed to allocate {requested_bytes} bytes for {what}")]
    OutOfMemory { what: &'static str, requested_bytes: usize },

    /// An operation was attempted on a handle or tile that is not in the
    /// required state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A host shape does not fit the fixed tile geometry.
    #[error(
        "capacity exceeded: {what} shape {rows}x{cols} exceeds tile geometry {max_rows}x{max_cols}"
    )]
    CapacityExceeded {
        what: &'static str,
        rows: usize,
        cols: usize,
        max_rows: usize,
        max_cols: usize,
    },

    /// The requested host/device element pairing cannot be quantized or
    /// dequantized as asked.
    #[error("unsupported quantization {host} -> {device}: {reason}")]
    UnsupportedQuantization { host: DType, device: DType, reason: String },

    /// The device trigger reported a nonzero status.
    #[error("device fault during {operation} on tile {tile_id}: status {status}")]
    DeviceFault { operation: &'static str, tile_id: TileId, status: u16 },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MvmError {
    /// Shorthand for [`MvmError::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Allocation and capacity failures cannot be recovered locally and end
    /// the operation chain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::CapacityExceeded { .. })
    }
}

impl From<crate::config::ConfigError> for MvmError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, MvmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_mentions_size_and_target() {
        let e = MvmError::OutOfMemory { what: "device buffer", requested_bytes: 4096 };
        let s = e.to_string();
        assert!(s.contains("4096"));
        assert!(s.contains("device buffer"));
        assert!(e.is_fatal());
    }

    #[test]
    fn capacity_exceeded_formats_both_shapes() {
        let e = MvmError::CapacityExceeded {
            what: "matrix",
            rows: 8,
            cols: 9,
            max_rows: 5,
            max_cols: 6,
        };
        let s = e.to_string();
        assert!(s.contains("8x9"));
        assert!(s.contains("5x6"));
        assert!(e.is_fatal());
    }

    #[test]
    fn unsupported_quantization_names_types() {
        let e = MvmError::UnsupportedQuantization {
            host: DType::F64,
            device: DType::F32,
            reason: "float targets are pass-through only".into(),
        };
        let s = e.to_string();
        assert!(s.contains("f64 -> f32"));
        assert!(!e.is_fatal());
    }

    #[test]
    fn device_fault_carries_status() {
        let e = MvmError::DeviceFault { operation: "mvm.set", tile_id: 3, status: 7 };
        let s = e.to_string();
        assert!(s.contains("mvm.set"));
        assert!(s.contains("tile 3"));
        assert!(s.contains("status 7"));
    }

    #[test]
    fn invalid_state_helper() {
        assert_eq!(
            MvmError::invalid_state("compute before load"),
            MvmError::InvalidState("compute before load".to_string())
        );
    }
}
