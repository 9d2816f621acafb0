//! Element types, device views, tile geometry, and scale records.

use crate::error::{MvmError, Result};
use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tile identifier as passed to the accelerator.
pub type TileId = u32;

// ── DType ───────────────────────────────────────────────────────────────────

/// Runtime tag for an [`Element`] type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl DType {
    /// Whether the type is a floating-point type.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::I16 | Self::F16 | Self::BF16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for DType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "i8" | "int8" => Ok(Self::I8),
            "i16" | "int16" => Ok(Self::I16),
            "i32" | "int32" => Ok(Self::I32),
            "i64" | "int64" => Ok(Self::I64),
            "f16" => Ok(Self::F16),
            "bf16" => Ok(Self::BF16),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            other => Err(format!("unknown element type: {other}")),
        }
    }
}

// ── Element ─────────────────────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
}

/// A numeric element that can live in a host or device buffer.
///
/// The trait is sealed: only the built-in integer and floating-point types
/// implement it, so a handle over a non-numeric type does not compile.
pub trait Element:
    sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Runtime tag for this type.
    const DTYPE: DType;
    /// Largest representable value (`max_representable`).
    const MAX: f64;
    /// Smallest representable value (`min_representable`).
    const MIN: f64;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`. Integer types round half away from zero and
    /// saturate; NaN maps to zero.
    fn from_f64(value: f64) -> Self;

    /// Borrow a slice as a typed device view.
    fn view(data: &[Self]) -> DeviceView<'_>;

    /// Borrow a slice as a mutable typed device view.
    fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_>;
}

macro_rules! impl_int_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const DTYPE: DType = DType::$variant;
            const MAX: f64 = <$ty>::MAX as f64;
            const MIN: f64 = <$ty>::MIN as f64;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                // `as` saturates float -> int casts and maps NaN to 0
                value.round() as $ty
            }

            fn view(data: &[Self]) -> DeviceView<'_> {
                DeviceView::$variant(data)
            }

            fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_> {
                DeviceViewMut::$variant(data)
            }
        }
    )*};
}

impl_int_element!(i8 => I8, i16 => I16, i32 => I32, i64 => I64);

impl sealed::Sealed for f32 {}
impl sealed::Sealed for f64 {}
impl sealed::Sealed for f16 {}
impl sealed::Sealed for bf16 {}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
    const MAX: f64 = f32::MAX as f64;
    const MIN: f64 = f32::MIN as f64;

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn view(data: &[Self]) -> DeviceView<'_> {
        DeviceView::F32(data)
    }

    fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_> {
        DeviceViewMut::F32(data)
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
    const MAX: f64 = f64::MAX;
    const MIN: f64 = f64::MIN;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    fn view(data: &[Self]) -> DeviceView<'_> {
        DeviceView::F64(data)
    }

    fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_> {
        DeviceViewMut::F64(data)
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;
    const MAX: f64 = 65504.0;
    const MIN: f64 = -65504.0;

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn view(data: &[Self]) -> DeviceView<'_> {
        DeviceView::F16(data)
    }

    fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_> {
        DeviceViewMut::F16(data)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;
    const MAX: f64 = 3.389_531_389_251_535_5e38;
    const MIN: f64 = -3.389_531_389_251_535_5e38;

    #[inline]
    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        bf16::from_f64(value)
    }

    fn view(data: &[Self]) -> DeviceView<'_> {
        DeviceView::BF16(data)
    }

    fn view_mut(data: &mut [Self]) -> DeviceViewMut<'_> {
        DeviceViewMut::BF16(data)
    }
}

// ── Device views ────────────────────────────────────────────────────────────

/// Typed, borrowed view of a device buffer handed to the device trigger.
///
/// Stands in for the (pointer, element type) pair the accelerator receives.
#[derive(Debug, Clone, Copy)]
pub enum DeviceView<'a> {
    I8(&'a [i8]),
    I16(&'a [i16]),
    I32(&'a [i32]),
    I64(&'a [i64]),
    F16(&'a [f16]),
    BF16(&'a [bf16]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

/// Mutable counterpart of [`DeviceView`], written by the store trigger.
#[derive(Debug)]
pub enum DeviceViewMut<'a> {
    I8(&'a mut [i8]),
    I16(&'a mut [i16]),
    I32(&'a mut [i32]),
    I64(&'a mut [i64]),
    F16(&'a mut [f16]),
    BF16(&'a mut [bf16]),
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

macro_rules! dispatch {
    ($value:expr, $ty:ident, $slice:ident => $body:expr) => {
        match $value {
            $ty::I8($slice) => $body,
            $ty::I16($slice) => $body,
            $ty::I32($slice) => $body,
            $ty::I64($slice) => $body,
            $ty::F16($slice) => $body,
            $ty::BF16($slice) => $body,
            $ty::F32($slice) => $body,
            $ty::F64($slice) => $body,
        }
    };
}

impl DeviceView<'_> {
    /// Element type of the underlying buffer.
    pub fn dtype(&self) -> DType {
        dispatch!(self, DeviceView, s => element_dtype(*s))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, DeviceView, s => s.len())
    }

    /// Whether the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(self, DeviceView, s => s.iter().map(|&v| Element::to_f64(v)).collect())
    }
}

impl DeviceViewMut<'_> {
    /// Element type of the underlying buffer.
    pub fn dtype(&self) -> DType {
        dispatch!(self, DeviceViewMut, s => element_dtype(&**s))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, DeviceViewMut, s => s.len())
    }

    /// Whether the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the buffer from `values`, narrowing each value to the
    /// buffer's element type. Elements past `values.len()` are zeroed.
    /// Returns the number of values written.
    pub fn write_f64(&mut self, values: &[f64]) -> usize {
        dispatch!(self, DeviceViewMut, s => write_narrowed(&mut **s, values))
    }

    /// Whether every value, rounded, lies within the element type's range,
    /// so [`write_f64`](Self::write_f64) would not saturate.
    pub fn can_hold(&self, values: &[f64]) -> bool {
        dispatch!(self, DeviceViewMut, s => fits_range(&**s, values))
    }
}

fn fits_range<T: Element>(_: &[T], values: &[f64]) -> bool {
    values.iter().all(|v| (T::MIN..=T::MAX).contains(&v.round()))
}

fn element_dtype<T: Element>(_: &[T]) -> DType {
    T::DTYPE
}

fn write_narrowed<T: Element>(dst: &mut [T], values: &[f64]) -> usize {
    let written = dst.len().min(values.len());
    for (slot, &v) in dst.iter_mut().zip(values) {
        *slot = T::from_f64(v);
    }
    dst[written..].fill(T::default());
    written
}

// ── TileGeometry ────────────────────────────────────────────────────────────

/// Fixed row/column capacity of one accelerator tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGeometry {
    pub rows: usize,
    pub cols: usize,
}

impl TileGeometry {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of device elements backing a matrix.
    pub const fn matrix_len(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of device elements backing a vector.
    pub const fn vector_len(&self) -> usize {
        self.cols
    }

    /// Fail with `CapacityExceeded` unless a `rows x cols` host matrix fits.
    pub fn check_matrix(&self, rows: usize, cols: usize) -> Result<()> {
        if rows > self.rows || cols > self.cols {
            return Err(MvmError::CapacityExceeded {
                what: "matrix",
                rows,
                cols,
                max_rows: self.rows,
                max_cols: self.cols,
            });
        }
        Ok(())
    }

    /// Fail with `CapacityExceeded` unless a host vector of `len` fits.
    pub fn check_vector(&self, len: usize) -> Result<()> {
        if len > self.vector_len() {
            return Err(MvmError::CapacityExceeded {
                what: "vector",
                rows: 1,
                cols: len,
                max_rows: 1,
                max_cols: self.vector_len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TileGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

// ── Scale ───────────────────────────────────────────────────────────────────

/// Scale record of a quantized tensor or of a composed tile output.
///
/// `magnitude` is the raw scale factor (largest absolute host value) and
/// composes by direct multiplication. `levels` is the integer range the
/// values were mapped onto and composes the same way. A device value `q`
/// recovers the host value `q * step()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub magnitude: f64,
    pub levels: f64,
}

impl Scale {
    /// Scale of a pass-through (unquantized) tensor.
    pub const UNIT: Scale = Scale { magnitude: 1.0, levels: 1.0 };

    pub const fn new(magnitude: f64, levels: f64) -> Self {
        Self { magnitude, levels }
    }

    /// Host value represented by one device unit.
    pub fn step(&self) -> f64 {
        self.magnitude / self.levels
    }

    /// Scale of a product of two tensors with these scales.
    #[must_use]
    pub fn compose(self, other: Scale) -> Scale {
        Scale { magnitude: self.magnitude * other.magnitude, levels: self.levels * other.levels }
    }

    /// Whether this is exactly the pass-through scale.
    pub fn is_unit(&self) -> bool {
        *self == Self::UNIT
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::UNIT
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (levels {})", self.magnitude, self.levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_limits_match_primitives() {
        assert_eq!(<i8 as Element>::MAX, 127.0);
        assert_eq!(<i8 as Element>::MIN, -128.0);
        assert_eq!(<i16 as Element>::MAX, 32767.0);
        assert_eq!(<i32 as Element>::MIN, -2_147_483_648.0);
    }

    #[test]
    fn int_from_f64_rounds_half_away_from_zero() {
        assert_eq!(i8::from_f64(0.5), 1);
        assert_eq!(i8::from_f64(-0.5), -1);
        assert_eq!(i8::from_f64(1.5), 2);
        assert_eq!(i8::from_f64(2.5), 3);
        assert_eq!(i8::from_f64(-2.5), -3);
    }

    #[test]
    fn int_from_f64_saturates() {
        assert_eq!(i8::from_f64(1000.0), 127);
        assert_eq!(i8::from_f64(-1000.0), -128);
        assert_eq!(i16::from_f64(f64::NAN), 0);
    }

    #[test]
    fn float_elements_report_float_dtype() {
        assert!(<f32 as Element>::DTYPE.is_float());
        assert!(<f16 as Element>::DTYPE.is_float());
        assert!(<bf16 as Element>::DTYPE.is_float());
        assert!(!<i32 as Element>::DTYPE.is_float());
    }

    #[test]
    fn half_max_constants_match_crate() {
        assert_eq!(<f16 as Element>::MAX, f16::MAX.to_f64());
        assert_eq!(<bf16 as Element>::MAX, bf16::MAX.to_f64());
    }

    #[test]
    fn dtype_parse_display_roundtrip() {
        for dt in [
            DType::I8,
            DType::I16,
            DType::I32,
            DType::I64,
            DType::F16,
            DType::BF16,
            DType::F32,
            DType::F64,
        ] {
            let parsed: DType = dt.to_string().parse().unwrap();
            assert_eq!(parsed, dt);
        }
        assert_eq!("int8".parse::<DType>().unwrap(), DType::I8);
        assert!("u8".parse::<DType>().is_err());
    }

    #[test]
    fn device_view_reports_dtype_and_values() {
        let data = [1i8, -2, 3];
        let view = i8::view(&data);
        assert_eq!(view.dtype(), DType::I8);
        assert_eq!(view.len(), 3);
        assert_eq!(view.to_f64_vec(), vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn device_view_mut_writes_and_zero_fills() {
        let mut data = [9i32; 4];
        let mut view = i32::view_mut(&mut data);
        assert_eq!(view.dtype(), DType::I32);
        let written = view.write_f64(&[1.4, 2.6]);
        assert_eq!(written, 2);
        assert_eq!(data, [1, 3, 0, 0]);
    }

    #[test]
    fn device_view_mut_truncates_long_input() {
        let mut data = [0i8; 2];
        let written = i8::view_mut(&mut data).write_f64(&[1.0, 2.0, 300.0]);
        assert_eq!(written, 2);
        assert_eq!(data, [1, 2]);
    }

    #[test]
    fn device_view_mut_range_check() {
        let mut narrow = [0i16; 3];
        let view = i16::view_mut(&mut narrow);
        assert!(view.can_hold(&[32767.0, -32767.4, 0.0]));
        assert!(!view.can_hold(&[64516.0]));
        assert!(!view.can_hold(&[-32768.6]));

        let mut wide = [0i32; 3];
        assert!(i32::view_mut(&mut wide).can_hold(&[64516.0, -64516.0]));
        let mut half_precision = [f16::ZERO; 1];
        assert!(!f16::view_mut(&mut half_precision).can_hold(&[1.0e6]));
    }

    #[test]
    fn geometry_capacity_checks() {
        let g = TileGeometry::new(5, 6);
        assert_eq!(g.matrix_len(), 30);
        assert_eq!(g.vector_len(), 6);
        assert!(g.check_matrix(3, 4).is_ok());
        assert!(g.check_matrix(5, 6).is_ok());
        assert!(matches!(
            g.check_matrix(6, 6),
            Err(MvmError::CapacityExceeded { what: "matrix", .. })
        ));
        assert!(g.check_vector(6).is_ok());
        assert!(matches!(
            g.check_vector(7),
            Err(MvmError::CapacityExceeded { what: "vector", .. })
        ));
    }

    #[test]
    fn scale_compose_multiplies_both_fields() {
        let m = Scale::new(3.0, 127.0);
        let v = Scale::new(2.0, 127.0);
        let out = m.compose(v);
        assert_eq!(out.magnitude, 6.0);
        assert_eq!(out.levels, 16129.0);
        assert_eq!(out.step(), 6.0 / 16129.0);
    }

    #[test]
    fn unit_scale_is_identity_for_compose() {
        let s = Scale::new(2.5, 127.0);
        assert_eq!(s.compose(Scale::UNIT), s);
        assert!(Scale::default().is_unit());
        assert_eq!(Scale::UNIT.step(), 1.0);
    }
}
