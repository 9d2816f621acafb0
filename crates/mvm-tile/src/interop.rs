//! Conversions between tensor handles and `candle_core::Tensor`.
//!
//! Enabled by the `candle` feature. Host element types must be usable by
//! both crates (`i64`, `f16`, `bf16`, `f32`, `f64`).

use crate::tensor::{AnalogMatrix, AnalogVector};
use candle_core::{Device, Tensor, WithDType};
use mvm_common::{Element, MvmError, Result, TileGeometry};

fn conversion_error(err: candle_core::Error) -> MvmError {
    MvmError::invalid_state(format!("tensor conversion failed: {err}"))
}

fn host_values<T: WithDType>(tensor: &Tensor) -> Result<Vec<T>> {
    tensor
        .to_dtype(T::DTYPE)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<T>())
        .map_err(conversion_error)
}

impl<T: Element + WithDType, Q: Element> AnalogMatrix<'static, T, Q> {
    /// Copy a rank-2 tensor into an owned matrix handle.
    pub fn from_tensor(tensor: &Tensor, geometry: TileGeometry) -> Result<Self> {
        let (rows, cols) = tensor.dims2().map_err(conversion_error)?;
        Self::from_vec(host_values(tensor)?, rows, cols, geometry)
    }
}

impl<T: Element + WithDType, Q: Element> AnalogMatrix<'_, T, Q> {
    /// Export the host matrix as a `rows x cols` tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Tensor::from_slice(self.host(), (self.rows(), self.cols()), device)
            .map_err(conversion_error)
    }
}

impl<T: Element + WithDType, Q: Element> AnalogVector<'static, T, Q> {
    /// Copy a rank-1 tensor into an owned vector handle.
    pub fn from_tensor(tensor: &Tensor, geometry: TileGeometry) -> Result<Self> {
        tensor.dims1().map_err(conversion_error)?;
        Self::from_vec(host_values(tensor)?, geometry)
    }
}

impl<T: Element + WithDType, Q: Element> AnalogVector<'_, T, Q> {
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Tensor::from_slice(self.host(), self.len(), device).map_err(conversion_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOM: TileGeometry = TileGeometry::new(5, 6);

    #[test]
    fn test_matrix_from_tensor() {
        let data = vec![1.0f32, -2.0, 3.0, 4.0, 5.0, -6.0];
        let t = Tensor::from_vec(data, (2, 3), &Device::Cpu).unwrap();
        let mut m = AnalogMatrix::<f32, i8>::from_tensor(&t, GEOM).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert!(m.owns_host_buffer());
        assert_eq!(m.transfer_to_device().unwrap().magnitude, 6.0);

        let back = m.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(back.dims2().unwrap(), (2, 3));
        assert_eq!(
            back.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, -2.0, 3.0], vec![4.0, 5.0, -6.0]]
        );
    }

    #[test]
    fn test_tensor_dtype_is_converted() {
        let t = Tensor::from_vec(vec![0.5f64, 1.5], 2, &Device::Cpu).unwrap();
        let v = AnalogVector::<f32, i16>::from_tensor(&t, GEOM).unwrap();
        assert_eq!(v.host(), &[0.5f32, 1.5]);
        assert_eq!(v.to_tensor(&Device::Cpu).unwrap().to_vec1::<f32>().unwrap(), vec![0.5, 1.5]);
    }

    #[test]
    fn test_rank_mismatch_is_rejected() {
        let t = Tensor::zeros((2, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(AnalogMatrix::<f32, i8>::from_tensor(&t, GEOM).is_err());
        assert!(AnalogVector::<f32, i8>::from_tensor(&t, GEOM).is_err());
    }

    #[test]
    fn test_oversized_tensor_is_capacity_exceeded() {
        let t = Tensor::zeros((6, 6), candle_core::DType::F32, &Device::Cpu).unwrap();
        let err = AnalogMatrix::<f32, i8>::from_tensor(&t, GEOM).err().unwrap();
        assert!(err.is_fatal());
    }
}
