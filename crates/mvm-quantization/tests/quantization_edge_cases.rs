//! Edge-case tests for transfer-mode resolution, quantization limits,
//! dequantization guards, and accuracy helpers.

use half::{bf16, f16};
use mvm_quantization::utils::{calculate_mse, calculate_snr};
use mvm_quantization::{
    Dequantizer, MvmError, Quantizer, Scale, TransferMode, dequantize, quantize,
    validate_round_trip,
};

// ── reference scenario ──────────────────────────────────────────────────────

#[test]
fn constant_matrix_and_vector_quantize_to_int8_max() {
    let matrix = quantize::<f32, i8>(&[3.0; 12]).unwrap();
    let vector = quantize::<f32, i8>(&[2.0; 4]).unwrap();
    assert_eq!(matrix.scale_factor(), 3.0);
    assert_eq!(vector.scale_factor(), 2.0);
    assert!(matrix.data.iter().chain(&vector.data).all(|&v| v == 127));

    let output = matrix.scale.compose(vector.scale);
    assert_eq!(output.magnitude, 6.0);
    assert_eq!(output.levels, 127.0 * 127.0);

    let raw = [4 * 127 * 127i32; 3];
    let host: Vec<f32> = dequantize(&raw, output.step()).unwrap();
    for v in host {
        assert!((v - 24.0).abs() < 1e-4, "got {v}");
    }
}

// ── type pairings ───────────────────────────────────────────────────────────

#[test]
fn half_precision_hosts_quantize() {
    let host = [f16::from_f32(1.0), f16::from_f32(-0.5), f16::from_f32(0.25)];
    let q = quantize::<f16, i8>(&host).unwrap();
    assert_eq!(q.data, vec![127, -64, 32]);

    let host = [bf16::from_f32(4.0), bf16::from_f32(-4.0)];
    let q = quantize::<bf16, i16>(&host).unwrap();
    assert_eq!(q.data, vec![32767, -32767]);
}

#[test]
fn half_precision_pass_through() {
    let host = [f16::from_f32(0.1), f16::from_f32(-7.5)];
    let q = quantize::<f16, f16>(&host).unwrap();
    assert_eq!(q.data, host.to_vec());
    assert_eq!(q.scale, Scale::UNIT);
}

#[test]
fn integer_host_into_float_device_is_unsupported() {
    let err = quantize::<i32, f32>(&[1, 2, 3]).unwrap_err();
    match err {
        MvmError::UnsupportedQuantization { reason, .. } => {
            assert!(reason.contains("pass-through"));
        }
        other => panic!("expected UnsupportedQuantization, got {other}"),
    }
}

#[test]
fn bf16_device_from_f32_is_unsupported() {
    assert!(matches!(
        quantize::<f32, bf16>(&[1.0]),
        Err(MvmError::UnsupportedQuantization { .. })
    ));
}

#[test]
fn wider_device_type_uses_its_own_range() {
    let q = quantize::<f64, i32>(&[1.0, -1.0]).unwrap();
    assert_eq!(q.mode, TransferMode::Quantize);
    assert_eq!(q.scale.levels, f64::from(i32::MAX));
    assert_eq!(q.data, vec![i32::MAX, -i32::MAX]);
}

// ── guards ──────────────────────────────────────────────────────────────────

#[test]
fn infinite_host_value_is_rejected() {
    let err = quantize::<f64, i8>(&[1.0, 2.0, f64::INFINITY]).unwrap_err();
    assert!(matches!(err, MvmError::InvalidState(_)));
}

#[test]
fn quantize_into_short_destination_is_capacity_error() {
    let mut dst = [0i8; 2];
    let err = Quantizer::new().quantize_into(&[1.0f32; 3], &mut dst).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn quantize_into_longer_destination_keeps_tail() {
    let mut dst = [9i8; 4];
    Quantizer::new().quantize_into(&[1.0f32, -1.0], &mut dst).unwrap();
    assert_eq!(dst, [127, -127, 9, 9]);
}

#[test]
fn dequantize_empty_device_yields_empty_host() {
    let host: Vec<f32> = Dequantizer::new().dequantize::<i8, f32>(&[], 0.5).unwrap();
    assert!(host.is_empty());
}

#[test]
fn pass_through_dequantize_with_non_unit_scale_names_both_types() {
    let err = dequantize::<i8, i8>(&[1, 2], 0.5).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("i8 -> i8"), "{msg}");
    assert!(msg.contains("0.5"), "{msg}");
}

// ── accuracy helpers ────────────────────────────────────────────────────────

#[test]
fn round_trip_error_shrinks_with_wider_device() {
    let data: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.11).cos() * 3.0).collect();
    let e8 = validate_round_trip::<f32, i8>(&data).unwrap();
    let e16 = validate_round_trip::<f32, i16>(&data).unwrap();
    assert!(e8 <= 3.0 / 127.0);
    assert!(e16 < e8);
}

#[test]
fn snr_of_int8_round_trip_is_reasonable() {
    let data: Vec<f64> = (0..512).map(|i| ((i as f64) * 0.07).sin()).collect();
    let q = quantize::<f64, i8>(&data).unwrap();
    let back: Vec<f64> = dequantize(&q.data, q.scale.step()).unwrap();
    assert!(calculate_mse(&data, &back).unwrap() < 1e-4);
    assert!(calculate_snr(&data, &back).unwrap() > 35.0);
}
