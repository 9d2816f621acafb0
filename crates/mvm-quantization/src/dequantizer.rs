//! Dequantization of device buffers back into host precision.

use crate::mode::TransferMode;
use crate::quantizer::{DEFAULT_PARALLEL_THRESHOLD, pass_through};
use crate::utils::dequantize_value;
use mvm_common::{Element, MvmError, Result, try_zeroed};
use rayon::prelude::*;
use tracing::trace;

/// Multiplies device values by a caller-supplied per-unit scale.
///
/// The scale is the step between adjacent device levels; for a buffer
/// produced by [`crate::Quantizer`] that is `Scale::step()`. Pass-through
/// pairs (`T == Q`) accept only a scale of exactly 1.0.
#[derive(Debug, Clone)]
pub struct Dequantizer {
    parallel_threshold: usize,
}

impl Default for Dequantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dequantizer {
    pub fn new() -> Self {
        Self { parallel_threshold: DEFAULT_PARALLEL_THRESHOLD }
    }

    pub fn with_parallel_threshold(threshold: usize) -> Self {
        Self { parallel_threshold: threshold.max(1) }
    }

    /// Dequantize all of `device` into a new host buffer.
    pub fn dequantize<Q: Element, T: Element>(&self, device: &[Q], scale: f64) -> Result<Vec<T>> {
        let mut host = try_zeroed::<T>(device.len(), "host buffer")?;
        self.dequantize_into(device, scale, &mut host)?;
        Ok(host)
    }

    /// Dequantize the first `host.len()` elements of `device` into `host`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedQuantization` for a pass-through pair with a scale other
    ///   than 1.0, or for a float device type that differs from `T`
    /// - `InvalidState` if `device` is shorter than `host` or `scale` is not
    ///   finite
    pub fn dequantize_into<Q: Element, T: Element>(
        &self,
        device: &[Q],
        scale: f64,
        host: &mut [T],
    ) -> Result<()> {
        let cols = host.len();
        self.dequantize_strided(device, cols, scale, host, cols)
    }

    /// Check that a `Q` device buffer can be dequantized into `T` with
    /// `scale`, without touching any data.
    pub fn check_transfer<Q: Element, T: Element>(scale: f64) -> Result<TransferMode> {
        let mode = TransferMode::resolve::<T, Q>()?;
        if !scale.is_finite() {
            return Err(MvmError::invalid_state(format!(
                "dequantization scale {scale} is not finite"
            )));
        }
        if mode.is_pass_through() && scale != 1.0 {
            return Err(MvmError::UnsupportedQuantization {
                host: T::DTYPE,
                device: Q::DTYPE,
                reason: format!("pass-through transfer requires scale 1.0, got {scale}"),
            });
        }
        Ok(mode)
    }

    /// Dequantize a row-major matrix whose device rows are `src_stride`
    /// elements apart into a dense `host` matrix with `cols` columns.
    pub fn dequantize_strided<Q: Element, T: Element>(
        &self,
        device: &[Q],
        src_stride: usize,
        scale: f64,
        host: &mut [T],
        cols: usize,
    ) -> Result<()> {
        let mode = Self::check_transfer::<Q, T>(scale)?;
        if host.is_empty() {
            return Ok(());
        }
        if cols == 0 || host.len() % cols != 0 || src_stride < cols {
            return Err(MvmError::invalid_state(format!(
                "cannot lay {} host elements out as {cols}-column rows \
                 with device stride {src_stride}",
                host.len()
            )));
        }
        let rows = host.len() / cols;
        let needed = (rows - 1) * src_stride + cols;
        if device.len() < needed {
            return Err(MvmError::invalid_state(format!(
                "device buffer of {} elements cannot fill a host buffer of {}",
                device.len(),
                host.len()
            )));
        }

        let parallel = host.len() >= self.parallel_threshold;
        match mode {
            TransferMode::PassThrough => {
                for (h, d) in host.chunks_mut(cols).zip(device.chunks(src_stride)) {
                    for (slot, &q) in h.iter_mut().zip(d) {
                        *slot = pass_through(q);
                    }
                }
            }
            TransferMode::Quantize if parallel && src_stride == cols => {
                let len = host.len();
                host.par_iter_mut()
                    .zip(device[..len].par_iter())
                    .for_each(|(slot, &q)| *slot = T::from_f64(dequantize_value(q, scale)));
            }
            TransferMode::Quantize if parallel => {
                host.par_chunks_mut(cols)
                    .zip(device.par_chunks(src_stride))
                    .for_each(|(h, d)| dequantize_row(h, d, scale));
            }
            TransferMode::Quantize => {
                for (h, d) in host.chunks_mut(cols).zip(device.chunks(src_stride)) {
                    dequantize_row(h, d, scale);
                }
            }
        }

        trace!(
            host = %T::DTYPE,
            device = %Q::DTYPE,
            elements = host.len(),
            rows,
            %mode,
            scale,
            parallel,
            "dequantized device buffer"
        );
        Ok(())
    }
}

fn dequantize_row<Q: Element, T: Element>(host: &mut [T], device: &[Q], scale: f64) {
    for (slot, &q) in host.iter_mut().zip(device) {
        *slot = T::from_f64(dequantize_value(q, scale));
    }
}
