//! Utility functions for quantization operations

use mvm_common::{Element, MvmError, Result};

/// Largest absolute value in `data`, or 0.0 when empty.
pub fn max_abs<T: Element>(data: &[T]) -> f64 {
    data.iter().fold(0.0f64, |acc, &x| acc.max(x.to_f64().abs()))
}

/// Scale factor for symmetric per-tensor quantization.
///
/// This is the raw magnitude `max |x|`, floored to 1.0 for an all-zero
/// buffer so quantization never divides by zero.
pub fn scale_factor_from_max_abs(max_abs: f64) -> f64 {
    if max_abs == 0.0 { 1.0 } else { max_abs }
}

/// Quantize one value onto the range of `Q`.
///
/// Computes `round(value / scale_factor * MAX(Q))`, rounding half away from
/// zero, and clamps to `[MIN(Q), MAX(Q)]` before narrowing.
#[inline]
pub fn quantize_value<Q: Element>(value: f64, scale_factor: f64) -> Q {
    let scaled = (value / scale_factor * Q::MAX).round();
    Q::from_f64(scaled.clamp(Q::MIN, Q::MAX))
}

/// Dequantize one value: `device * scale`.
#[inline]
pub fn dequantize_value<Q: Element>(quantized: Q, scale: f64) -> f64 {
    quantized.to_f64() * scale
}

/// Largest per-element error expected from a round trip through `Q`.
pub fn quantization_error_bound<Q: Element>(scale_factor: f64) -> f64 {
    scale_factor / Q::MAX
}

/// Fail unless two buffers have the same length.
pub fn validate_lengths(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(MvmError::invalid_state(format!("buffer length mismatch: {a} vs {b}")));
    }
    Ok(())
}

/// Calculate mean squared error between two buffers
pub fn calculate_mse(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_lengths(a.len(), b.len())?;
    if a.is_empty() {
        return Ok(0.0);
    }
    let mse = a.iter().zip(b).map(|(&x, &y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64;
    Ok(mse)
}

/// Calculate signal-to-noise ratio in decibels
pub fn calculate_snr(original: &[f64], recovered: &[f64]) -> Result<f64> {
    let noise_power = calculate_mse(original, recovered)?;
    if noise_power == 0.0 {
        return Ok(f64::INFINITY);
    }
    let signal_power = original.iter().map(|&x| x.powi(2)).sum::<f64>() / original.len() as f64;
    Ok(10.0 * (signal_power / noise_power).log10())
}

/// Largest absolute element-wise difference.
pub fn max_abs_error(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_lengths(a.len(), b.len())?;
    Ok(a.iter().zip(b).fold(0.0f64, |acc, (&x, &y)| acc.max((x - y).abs())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs_uses_magnitude() {
        assert_eq!(max_abs(&[1.0f32, -4.0, 3.0]), 4.0);
        assert_eq!(max_abs::<f32>(&[]), 0.0);
    }

    #[test]
    fn test_scale_floor() {
        assert_eq!(scale_factor_from_max_abs(0.0), 1.0);
        assert_eq!(scale_factor_from_max_abs(2.5), 2.5);
    }

    #[test]
    fn test_quantize_value_hits_limits() {
        assert_eq!(quantize_value::<i8>(3.0, 3.0), 127);
        assert_eq!(quantize_value::<i8>(-3.0, 3.0), -127);
        assert_eq!(quantize_value::<i8>(0.0, 3.0), 0);
    }

    #[test]
    fn test_quantize_value_clamps_overshoot() {
        // values past the scale factor saturate instead of wrapping
        assert_eq!(quantize_value::<i8>(10.0, 1.0), 127);
        assert_eq!(quantize_value::<i8>(-10.0, 1.0), -128);
    }

    #[test]
    fn test_quantize_value_rounds_instead_of_truncating() {
        assert_eq!(quantize_value::<i8>(0.7, 127.0), 1);
        assert_eq!(quantize_value::<i8>(-0.7, 127.0), -1);
        assert_eq!(quantize_value::<i8>(0.3, 127.0), 0);
    }

    #[test]
    fn test_dequantize_value() {
        assert!((dequantize_value(127i8, 3.0 / 127.0) - 3.0).abs() < 1e-12);
        assert_eq!(dequantize_value(-2i32, 0.5), -1.0);
    }

    #[test]
    fn test_error_bound() {
        assert_eq!(quantization_error_bound::<i8>(127.0), 1.0);
    }

    #[test]
    fn test_mse_and_snr() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(calculate_mse(&a, &a).unwrap(), 0.0);
        assert_eq!(calculate_snr(&a, &a).unwrap(), f64::INFINITY);

        let b = [1.0, 2.0, 4.0];
        let mse = calculate_mse(&a, &b).unwrap();
        assert!((mse - 1.0 / 3.0).abs() < 1e-12);
        assert!(calculate_snr(&a, &b).unwrap() > 10.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(calculate_mse(&[1.0], &[1.0, 2.0]).is_err());
        assert!(max_abs_error(&[1.0], &[]).is_err());
    }
}
