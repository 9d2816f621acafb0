//! Property-based tests for the mvm-quantization public API.
//!
//! Invariants checked for arbitrary finite inputs:
//! - round trip error never exceeds `scale_factor / MAX(Q)`
//! - the extreme element maps to exactly `±MAX(Q)` and nothing leaves the range
//! - all-zero buffers quantize with scale 1.0 to all-zero device values
//! - same-type transfers are exact copies
//! - parallel and serial quantization agree

use mvm_quantization::utils::quantization_error_bound;
use mvm_quantization::{Dequantizer, Quantizer, TransferMode, dequantize, quantize};
use proptest::prelude::*;

// ── round trip ──────────────────────────────────────────────────────────────

proptest! {
    /// f64 host through i8 stays within one quantization step.
    #[test]
    fn round_trip_i8_bounded(data in prop::collection::vec(-1000.0f64..1000.0, 1..256)) {
        let q = quantize::<f64, i8>(&data).unwrap();
        let back: Vec<f64> = dequantize(&q.data, q.scale.step()).unwrap();
        let bound = quantization_error_bound::<i8>(q.scale_factor());
        for (orig, rec) in data.iter().zip(&back) {
            prop_assert!(
                (orig - rec).abs() <= bound + 1e-9,
                "{} vs {} (bound {})",
                orig,
                rec,
                bound
            );
        }
    }

    /// f32 host through i16 stays within one step plus f32 representation error.
    #[test]
    fn round_trip_i16_bounded(data in prop::collection::vec(-50.0f32..50.0, 1..256)) {
        let q = quantize::<f32, i16>(&data).unwrap();
        let back: Vec<f32> = dequantize(&q.data, q.scale.step()).unwrap();
        let bound = quantization_error_bound::<i16>(q.scale_factor());
        for (orig, rec) in data.iter().zip(&back) {
            let err = (f64::from(*orig) - f64::from(*rec)).abs();
            prop_assert!(err <= bound + 1e-5, "{} vs {} (bound {})", orig, rec, bound);
        }
    }

    /// Integer host through a narrower integer device type.
    #[test]
    fn round_trip_i32_host_bounded(data in prop::collection::vec(-100_000i32..100_000, 1..128)) {
        let q = quantize::<i32, i8>(&data).unwrap();
        let back: Vec<f64> = Dequantizer::new().dequantize(&q.data, q.scale.step()).unwrap();
        let bound = quantization_error_bound::<i8>(q.scale_factor());
        for (orig, rec) in data.iter().zip(&back) {
            prop_assert!((f64::from(*orig) - rec).abs() <= bound + 1e-9);
        }
    }
}

// ── clamp ───────────────────────────────────────────────────────────────────

proptest! {
    /// The element with the largest magnitude lands exactly on ±MAX(Q).
    #[test]
    fn extreme_maps_to_max(data in prop::collection::vec(-1e6f64..1e6, 1..128)) {
        prop_assume!(data.iter().any(|x| *x != 0.0));
        let q = quantize::<f64, i8>(&data).unwrap();
        let (idx, max) = data
            .iter()
            .enumerate()
            .fold((0, 0.0f64), |acc, (i, x)| if x.abs() > acc.1 { (i, x.abs()) } else { acc });
        prop_assert_eq!(q.scale_factor(), max);
        let expected = if data[idx] > 0.0 { 127 } else { -127 };
        prop_assert_eq!(q.data[idx], expected);
    }

    /// No value ever reaches MIN(Q) for symmetric input.
    #[test]
    fn never_below_negative_max(data in prop::collection::vec(-1e3f32..1e3, 1..128)) {
        let q = quantize::<f32, i8>(&data).unwrap();
        prop_assert!(q.data.iter().all(|&v| v >= -127));
    }
}

// ── scale floor and pass-through ────────────────────────────────────────────

proptest! {
    #[test]
    fn zeros_use_unit_scale(len in 1usize..512) {
        let q = quantize::<f32, i16>(&vec![0.0f32; len]).unwrap();
        prop_assert_eq!(q.scale_factor(), 1.0);
        prop_assert!(q.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn pass_through_identity_f32(
        data in prop::collection::vec(any::<f32>().prop_filter("finite", |x| x.is_finite()), 1..128)
    ) {
        let q = quantize::<f32, f32>(&data).unwrap();
        prop_assert_eq!(q.mode, TransferMode::PassThrough);
        prop_assert_eq!(&q.data, &data);
        let back: Vec<f32> = dequantize(&q.data, 1.0).unwrap();
        prop_assert_eq!(back, data);
    }

    #[test]
    fn pass_through_identity_i64(data in prop::collection::vec(any::<i64>(), 1..128)) {
        let q = quantize::<i64, i64>(&data).unwrap();
        prop_assert_eq!(q.data, data);
    }
}

// ── parallel path ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn parallel_matches_serial(data in prop::collection::vec(-10.0f32..10.0, 64..2048)) {
        let serial = Quantizer::with_parallel_threshold(usize::MAX);
        let parallel = Quantizer::with_parallel_threshold(32);
        let s = serial.quantize::<f32, i8>(&data).unwrap();
        let p = parallel.quantize::<f32, i8>(&data).unwrap();
        prop_assert_eq!(s, p);
    }

    #[test]
    fn parallel_dequantize_matches_serial(
        device in prop::collection::vec(any::<i16>(), 64..2048),
        step in 1e-6f64..1.0,
    ) {
        let serial = Dequantizer::with_parallel_threshold(usize::MAX);
        let parallel = Dequantizer::with_parallel_threshold(32);
        let s: Vec<f32> = serial.dequantize(&device, step).unwrap();
        let p: Vec<f32> = parallel.dequantize(&device, step).unwrap();
        prop_assert_eq!(s, p);
    }
}
