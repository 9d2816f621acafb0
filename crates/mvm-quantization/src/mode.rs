//! Host/device transfer mode resolution.

use mvm_common::{Element, MvmError, Result};
use std::fmt;

/// How values move between a host type `T` and a device type `Q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// `T == Q`: values are copied unchanged and the scale is fixed at 1.0.
    PassThrough,
    /// `Q` is an integer type different from `T`: values are quantized onto
    /// the range of `Q`.
    Quantize,
}

impl TransferMode {
    /// Resolve the mode for host type `T` and device type `Q`.
    ///
    /// Floating-point device types only support pass-through; asking for
    /// `f64 -> f32` (or any other pair ending in a float) is rejected with
    /// `UnsupportedQuantization`.
    pub fn resolve<T: Element, Q: Element>() -> Result<Self> {
        if T::DTYPE == Q::DTYPE {
            Ok(Self::PassThrough)
        } else if Q::DTYPE.is_float() {
            Err(MvmError::UnsupportedQuantization {
                host: T::DTYPE,
                device: Q::DTYPE,
                reason: "floating-point device types are pass-through only".into(),
            })
        } else {
            Ok(Self::Quantize)
        }
    }

    /// Integer range values are mapped onto for device type `Q`.
    pub fn levels<Q: Element>(self) -> f64 {
        match self {
            Self::PassThrough => 1.0,
            Self::Quantize => Q::MAX,
        }
    }

    pub fn is_pass_through(self) -> bool {
        self == Self::PassThrough
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PassThrough => write!(f, "pass-through"),
            Self::Quantize => write!(f, "quantize"),
        }
    }
}
