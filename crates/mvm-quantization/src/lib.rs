//! Quantization engine for analog MVM tiles
//!
//! This crate converts host buffers into the fixed-point representation a
//! tile consumes and back:
//! - [`Quantizer`]: symmetric, per-tensor, dynamic-range quantization with a
//!   single scale factor (largest absolute host value)
//! - [`Dequantizer`]: multiplies device values by a caller-supplied scale
//! - [`TransferMode`]: decides whether a host/device type pair is quantized or
//!   copied through unchanged
//!
//! Scale factors are reported as [`Scale`] records so that tile runtimes can
//! compose them across chained matrix-vector products.

pub mod dequantizer;
pub mod mode;
pub mod quantizer;
pub mod utils;

pub use dequantizer::Dequantizer;
pub use mode::TransferMode;
pub use quantizer::{QuantizedBuffer, Quantizer};

pub use mvm_common::{Element, MvmError, Result, Scale};

/// Quantize `host` into a freshly allocated device buffer of the same length.
///
/// Convenience wrapper over [`Quantizer::quantize`] with default settings.
pub fn quantize<T: Element, Q: Element>(host: &[T]) -> Result<QuantizedBuffer<Q>> {
    Quantizer::new().quantize(host)
}

/// Dequantize `device` into a new host buffer using `scale` as the per-unit
/// multiplier.
///
/// Convenience wrapper over [`Dequantizer::dequantize`].
pub fn dequantize<Q: Element, T: Element>(device: &[Q], scale: f64) -> Result<Vec<T>> {
    Dequantizer::new().dequantize(device, scale)
}

/// Quantize then dequantize `original`, returning the largest absolute
/// element error.
pub fn validate_round_trip<T: Element, Q: Element>(original: &[T]) -> Result<f64> {
    let quantized = quantize::<T, Q>(original)?;
    let recovered: Vec<T> = dequantize(&quantized.data, quantized.scale.step())?;
    let original: Vec<f64> = original.iter().map(|v| v.to_f64()).collect();
    let recovered: Vec<f64> = recovered.iter().map(|v| v.to_f64()).collect();
    utils::max_abs_error(&original, &recovered)
}
