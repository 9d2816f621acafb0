//! Symmetric per-tensor quantization.
//!
//! The scale factor is the largest absolute host value (1.0 for an all-zero
//! buffer). Each element maps to `round(x / scale_factor * MAX(Q))`, rounded
//! half away from zero and clamped to the range of `Q` before narrowing.
//! When host and device types coincide the data is copied through unchanged.

use crate::mode::TransferMode;
use crate::utils::{max_abs, quantize_value, scale_factor_from_max_abs};
use mvm_common::{Element, MvmError, Result, Scale, try_zeroed};
use rayon::prelude::*;
use std::any::Any;
use tracing::trace;

/// Default element count above which quantization runs on the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// A quantized buffer together with the scale needed to recover it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedBuffer<Q> {
    /// Device-ready values.
    pub data: Vec<Q>,
    /// Scale record (`magnitude` is the raw scale factor).
    pub scale: Scale,
    /// Whether the values were quantized or copied through.
    pub mode: TransferMode,
}

impl<Q: Element> QuantizedBuffer<Q> {
    /// Raw scale factor (largest absolute host value).
    pub fn scale_factor(&self) -> f64 {
        self.scale.magnitude
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Symmetric per-tensor quantizer.
#[derive(Debug, Clone)]
pub struct Quantizer {
    parallel_threshold: usize,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Quantizer {
    /// Create a quantizer with the default parallel threshold.
    pub fn new() -> Self {
        Self { parallel_threshold: DEFAULT_PARALLEL_THRESHOLD }
    }

    /// Create a quantizer that switches to parallel scaling at `threshold`
    /// elements.
    pub fn with_parallel_threshold(threshold: usize) -> Self {
        Self { parallel_threshold: threshold.max(1) }
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Scale factor for `host`: `max |x|`, or 1.0 when every element is zero.
    pub fn scale_factor<T: Element>(&self, host: &[T]) -> f64 {
        let max = if host.len() >= self.parallel_threshold {
            host.par_iter().map(|x| x.to_f64().abs()).reduce(|| 0.0, f64::max)
        } else {
            max_abs(host)
        };
        scale_factor_from_max_abs(max)
    }

    /// Quantize `host` into a newly allocated device buffer of equal length.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if `host` is empty or holds a non-finite value
    /// - `UnsupportedQuantization` for float device types other than `T`
    /// - `OutOfMemory` if the device buffer cannot be allocated
    pub fn quantize<T: Element, Q: Element>(&self, host: &[T]) -> Result<QuantizedBuffer<Q>> {
        let mode = TransferMode::resolve::<T, Q>()?;
        ensure_not_empty(host)?;
        let mut data = try_zeroed::<Q>(host.len(), "device buffer")?;
        let scale = self.quantize_into(host, &mut data)?;
        Ok(QuantizedBuffer { data, scale, mode })
    }

    /// Quantize `host` into the front of `dst`.
    pub fn quantize_into<T: Element, Q: Element>(
        &self,
        host: &[T],
        dst: &mut [Q],
    ) -> Result<Scale> {
        self.quantize_strided(host, host.len(), dst, host.len())
    }

    /// Quantize a row-major `host` matrix with `cols` columns into `dst`,
    /// whose rows are `dst_stride` elements apart.
    ///
    /// One scale factor covers the whole matrix. Elements of `dst` outside
    /// the host region are left untouched.
    pub fn quantize_strided<T: Element, Q: Element>(
        &self,
        host: &[T],
        cols: usize,
        dst: &mut [Q],
        dst_stride: usize,
    ) -> Result<Scale> {
        let mode = TransferMode::resolve::<T, Q>()?;
        ensure_not_empty(host)?;
        if cols == 0 || host.len() % cols != 0 {
            return Err(MvmError::invalid_state(format!(
                "host buffer of {} elements is not a whole number of {cols}-column rows",
                host.len()
            )));
        }
        if dst_stride < cols {
            return Err(MvmError::invalid_state(format!(
                "device row stride {dst_stride} is narrower than {cols} host columns"
            )));
        }
        let rows = host.len() / cols;
        let needed = (rows - 1) * dst_stride + cols;
        if dst.len() < needed {
            return Err(MvmError::CapacityExceeded {
                what: "device buffer",
                rows,
                cols,
                max_rows: dst.len() / dst_stride,
                max_cols: dst_stride,
            });
        }
        if let Some(idx) = host.iter().position(|x| !x.to_f64().is_finite()) {
            return Err(MvmError::invalid_state(format!(
                "host buffer holds a non-finite value at index {idx}"
            )));
        }

        let parallel = host.len() >= self.parallel_threshold;
        let scale = match mode {
            TransferMode::PassThrough => {
                dst.chunks_mut(dst_stride).zip(host.chunks(cols)).for_each(|(d, h)| copy_row(d, h));
                Scale::UNIT
            }
            TransferMode::Quantize => {
                let scale_factor = self.scale_factor(host);
                if parallel && dst_stride == cols {
                    dst[..host.len()]
                        .par_iter_mut()
                        .zip(host.par_iter())
                        .for_each(|(slot, &x)| *slot = quantize_value(x.to_f64(), scale_factor));
                } else if parallel {
                    dst.par_chunks_mut(dst_stride)
                        .zip(host.par_chunks(cols))
                        .for_each(|(d, h)| quantize_row(d, h, scale_factor));
                } else {
                    dst.chunks_mut(dst_stride)
                        .zip(host.chunks(cols))
                        .for_each(|(d, h)| quantize_row(d, h, scale_factor));
                }
                Scale::new(scale_factor, mode.levels::<Q>())
            }
        };

        trace!(
            host = %T::DTYPE,
            device = %Q::DTYPE,
            elements = host.len(),
            rows,
            %mode,
            scale_factor = scale.magnitude,
            parallel,
            "quantized host buffer"
        );
        Ok(scale)
    }
}

fn ensure_not_empty<T>(host: &[T]) -> Result<()> {
    if host.is_empty() {
        return Err(MvmError::invalid_state("cannot quantize an absent or empty host buffer"));
    }
    Ok(())
}

fn quantize_row<T: Element, Q: Element>(dst: &mut [Q], host: &[T], scale_factor: f64) {
    for (slot, &x) in dst.iter_mut().zip(host) {
        *slot = quantize_value(x.to_f64(), scale_factor);
    }
}

fn copy_row<T: Element, Q: Element>(dst: &mut [Q], host: &[T]) {
    for (slot, &x) in dst.iter_mut().zip(host) {
        *slot = pass_through(x);
    }
}

/// Exact element copy for `T == Q`.
#[inline]
pub(crate) fn pass_through<T: Element, Q: Element>(x: T) -> Q {
    match (&x as &dyn Any).downcast_ref::<Q>() {
        Some(&q) => q,
        None => Q::from_f64(x.to_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_matrix_quantizes_to_max() {
        let host = vec![3.0f32; 12];
        let q = Quantizer::new().quantize::<f32, i8>(&host).unwrap();
        assert_eq!(q.scale_factor(), 3.0);
        assert_eq!(q.scale.levels, 127.0);
        assert_eq!(q.mode, TransferMode::Quantize);
        assert!(q.data.iter().all(|&v| v == 127));
    }

    #[test]
    fn test_all_zero_uses_unit_scale() {
        let q = Quantizer::new().quantize::<f32, i8>(&[0.0; 8]).unwrap();
        assert_eq!(q.scale_factor(), 1.0);
        assert!(q.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_negative_extreme_maps_to_negative_max() {
        let q = Quantizer::new().quantize::<f64, i8>(&[-2.0, 1.0]).unwrap();
        assert_eq!(q.data, vec![-127, 64]);
    }

    #[test]
    fn test_pass_through_is_exact_copy() {
        let host = [1.5f32, -2.25, 1e-7];
        let q = Quantizer::new().quantize::<f32, f32>(&host).unwrap();
        assert_eq!(q.data, host.to_vec());
        assert_eq!(q.scale, Scale::UNIT);
        assert!(q.mode.is_pass_through());
    }

    #[test]
    fn test_pass_through_i64_keeps_full_precision() {
        let host = [i64::MAX, i64::MIN, (1i64 << 53) + 1];
        let q = Quantizer::new().quantize::<i64, i64>(&host).unwrap();
        assert_eq!(q.data, host.to_vec());
    }

    #[test]
    fn test_empty_host_is_invalid_state() {
        let err = Quantizer::new().quantize::<f32, i8>(&[]).unwrap_err();
        assert!(matches!(err, MvmError::InvalidState(_)));
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let err = Quantizer::new().quantize::<f32, i8>(&[1.0, f32::NAN]).unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_float_to_float_is_unsupported() {
        let err = Quantizer::new().quantize::<f64, f32>(&[1.0]).unwrap_err();
        assert!(matches!(err, MvmError::UnsupportedQuantization { .. }));
    }

    #[test]
    fn test_strided_layout_leaves_padding() {
        let host = [1.0f32, 2.0, 3.0, 4.0];
        let mut dst = [0i8; 6];
        let scale = Quantizer::new().quantize_strided(&host, 2, &mut dst, 3).unwrap();
        assert_eq!(scale.magnitude, 4.0);
        assert_eq!(dst, [32, 64, 0, 95, 127, 0]);
    }

    #[test]
    fn test_strided_rejects_short_destination() {
        let host = [1.0f32; 6];
        let mut dst = [0i8; 5];
        let err = Quantizer::new().quantize_strided(&host, 3, &mut dst, 3).unwrap_err();
        assert!(matches!(err, MvmError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_strided_rejects_ragged_rows() {
        let mut dst = [0i8; 8];
        let err = Quantizer::new().quantize_strided(&[1.0f32; 5], 2, &mut dst, 4).unwrap_err();
        assert!(matches!(err, MvmError::InvalidState(_)));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let host: Vec<f32> = (0..10_000).map(|i| ((i as f32) * 0.37).sin() * 5.0).collect();
        let serial_quantizer = Quantizer::with_parallel_threshold(usize::MAX);
        let parallel_quantizer = Quantizer::with_parallel_threshold(16);
        let serial = serial_quantizer.quantize::<f32, i16>(&host).unwrap();
        let parallel = parallel_quantizer.quantize::<f32, i16>(&host).unwrap();
        assert_eq!(serial, parallel);

        let mut s = vec![0i8; 10_000 / 4 * 5];
        let mut p = s.clone();
        serial_quantizer.quantize_strided(&host, 4, &mut s, 5).unwrap();
        parallel_quantizer.quantize_strided(&host, 4, &mut p, 5).unwrap();
        assert_eq!(s, p);
    }
}
