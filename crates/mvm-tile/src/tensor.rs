//! Tensor handles: host data plus its tile-shaped device representation.
//!
//! A handle quantizes its host buffer into a device buffer laid out with the
//! tile geometry (row-major, zero-padded) and keeps the resulting [`Scale`].
//! Handles exclusively own their device buffers and own the host buffer only
//! when they allocated it.

use crate::buffer::{DeviceBuffer, HostBuffer};
use crate::token::{Liveness, TensorKind, TensorToken};
use mvm_common::{DeviceView, DeviceViewMut, Element, MvmError, Result, Scale, TileGeometry};
use mvm_quantization::{Dequantizer, Quantizer};
use std::fmt;

fn not_transferred(kind: TensorKind, id: u64) -> MvmError {
    MvmError::invalid_state(format!(
        "{kind}#{id} has no device buffer; transfer it to the device first"
    ))
}

/// A host matrix bound to one tile's weight array.
///
/// `T` is the host element type and `Q` the device element type. When they
/// are equal the data is copied through without quantization.
pub struct AnalogMatrix<'a, T: Element, Q: Element = T> {
    host: HostBuffer<'a, T>,
    rows: usize,
    cols: usize,
    geometry: TileGeometry,
    device: Option<DeviceBuffer<Q>>,
    scale: Scale,
    quantizer: Quantizer,
    dequantizer: Dequantizer,
    liveness: Liveness,
}

impl<'a, T: Element, Q: Element> AnalogMatrix<'a, T, Q> {
    fn build(
        host: HostBuffer<'a, T>,
        rows: usize,
        cols: usize,
        geometry: TileGeometry,
    ) -> Result<Self> {
        if host.len() != rows * cols {
            return Err(MvmError::invalid_state(format!(
                "host buffer has {} elements but the matrix shape is {rows}x{cols}",
                host.len()
            )));
        }
        geometry.check_matrix(rows, cols)?;
        Ok(Self {
            host,
            rows,
            cols,
            geometry,
            device: None,
            scale: Scale::UNIT,
            quantizer: Quantizer::new(),
            dequantizer: Dequantizer::new(),
            liveness: Liveness::new(TensorKind::Matrix),
        })
    }

    /// Wrap a caller-owned, read-only row-major buffer.
    pub fn from_slice(
        data: &'a [T],
        rows: usize,
        cols: usize,
        geometry: TileGeometry,
    ) -> Result<Self> {
        Self::build(HostBuffer::Borrowed(data), rows, cols, geometry)
    }

    /// Wrap a caller-owned buffer that [`transfer_to_host`](Self::transfer_to_host)
    /// may write back into.
    pub fn from_slice_mut(
        data: &'a mut [T],
        rows: usize,
        cols: usize,
        geometry: TileGeometry,
    ) -> Result<Self> {
        Self::build(HostBuffer::BorrowedMut(data), rows, cols, geometry)
    }

    /// Take ownership of a row-major buffer.
    pub fn from_vec(
        data: Vec<T>,
        rows: usize,
        cols: usize,
        geometry: TileGeometry,
    ) -> Result<Self> {
        Self::build(HostBuffer::Owned(data), rows, cols, geometry)
    }

    /// Allocate a zeroed host matrix owned by the handle.
    pub fn zeros(rows: usize, cols: usize, geometry: TileGeometry) -> Result<Self> {
        geometry.check_matrix(rows, cols)?;
        Self::build(HostBuffer::zeroed(rows * cols)?, rows, cols, geometry)
    }

    /// Switch to parallel (de)quantization at `threshold` host elements.
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.quantizer = Quantizer::with_parallel_threshold(threshold);
        self.dequantizer = Dequantizer::with_parallel_threshold(threshold);
        self
    }

    /// Quantize (or copy) the host matrix into the tile-shaped device buffer.
    ///
    /// The buffer is reused when its length still matches the geometry and
    /// zeroed before each transfer. On failure the handle is left without a
    /// device buffer.
    pub fn transfer_to_device(&mut self) -> Result<Scale> {
        let stride = self.geometry.cols;
        let host = self.host.as_slice();
        let result = DeviceBuffer::prepare(&mut self.device, self.geometry.matrix_len())
            .and_then(|dst| {
                self.quantizer.quantize_strided(host, self.cols, dst.as_mut_slice(), stride)
            });
        match result {
            Ok(scale) => {
                self.scale = scale;
                Ok(scale)
            }
            Err(err) => {
                self.device = None;
                self.scale = Scale::UNIT;
                Err(err)
            }
        }
    }

    /// Dequantize (or copy) the device buffer back into the host matrix,
    /// multiplying by `scale`.
    pub fn transfer_to_host(&mut self, scale: f64) -> Result<()> {
        let id = self.liveness.id();
        let device =
            self.device.as_ref().ok_or_else(|| not_transferred(TensorKind::Matrix, id))?;
        let host = self.host.as_mut_slice()?;
        let stride = self.geometry.cols;
        self.dequantizer.dequantize_strided(device.as_slice(), stride, scale, host, self.cols)
    }

    /// Tile-shaped device values; fails before the first transfer.
    pub fn device_buffer(&self) -> Result<&[Q]> {
        self.device
            .as_ref()
            .map(DeviceBuffer::as_slice)
            .ok_or_else(|| not_transferred(TensorKind::Matrix, self.liveness.id()))
    }

    pub fn device_view(&self) -> Result<DeviceView<'_>> {
        self.device
            .as_ref()
            .map(DeviceBuffer::view)
            .ok_or_else(|| not_transferred(TensorKind::Matrix, self.liveness.id()))
    }

    pub fn is_on_device(&self) -> bool {
        self.device.is_some()
    }

    /// Raw scale factor from the last transfer (1.0 before any transfer).
    pub fn scale_factor(&self) -> f64 {
        self.scale.magnitude
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn host(&self) -> &[T] {
        self.host.as_slice()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn owns_host_buffer(&self) -> bool {
        self.host.is_owned()
    }

    pub fn id(&self) -> u64 {
        self.liveness.id()
    }

    /// Liveness token recorded by tile contexts.
    pub fn token(&self) -> TensorToken {
        self.liveness.token()
    }
}

impl<T: Element, Q: Element> fmt::Display for AnalogMatrix<'_, T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "AnalogMatrix<{} -> {}> #{} {}x{} on {} tile, scale {}, owns host: {}",
            T::DTYPE,
            Q::DTYPE,
            self.id(),
            self.rows,
            self.cols,
            self.geometry,
            self.scale,
            self.owns_host_buffer()
        )?;
        writeln!(f, "host:")?;
        write_rows(f, self.host.as_slice(), self.cols)?;
        match &self.device {
            Some(device) => {
                writeln!(f, "device:")?;
                write_rows(f, device.as_slice(), self.geometry.cols)
            }
            None => writeln!(f, "device: <not transferred>"),
        }
    }
}

/// A host vector bound to one tile's input or output port.
pub struct AnalogVector<'a, T: Element, Q: Element = T> {
    host: HostBuffer<'a, T>,
    geometry: TileGeometry,
    device: Option<DeviceBuffer<Q>>,
    scale: Scale,
    quantizer: Quantizer,
    dequantizer: Dequantizer,
    liveness: Liveness,
}

impl<'a, T: Element, Q: Element> AnalogVector<'a, T, Q> {
    fn build(host: HostBuffer<'a, T>, geometry: TileGeometry) -> Result<Self> {
        geometry.check_vector(host.len())?;
        Ok(Self {
            host,
            geometry,
            device: None,
            scale: Scale::UNIT,
            quantizer: Quantizer::new(),
            dequantizer: Dequantizer::new(),
            liveness: Liveness::new(TensorKind::Vector),
        })
    }

    /// Wrap a caller-owned, read-only buffer.
    pub fn from_slice(data: &'a [T], geometry: TileGeometry) -> Result<Self> {
        Self::build(HostBuffer::Borrowed(data), geometry)
    }

    /// Wrap a caller-owned buffer that results can be written back into.
    pub fn from_slice_mut(data: &'a mut [T], geometry: TileGeometry) -> Result<Self> {
        Self::build(HostBuffer::BorrowedMut(data), geometry)
    }

    pub fn from_vec(data: Vec<T>, geometry: TileGeometry) -> Result<Self> {
        Self::build(HostBuffer::Owned(data), geometry)
    }

    /// Allocate a zeroed host vector owned by the handle.
    pub fn zeros(len: usize, geometry: TileGeometry) -> Result<Self> {
        geometry.check_vector(len)?;
        Self::build(HostBuffer::zeroed(len)?, geometry)
    }

    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.quantizer = Quantizer::with_parallel_threshold(threshold);
        self.dequantizer = Dequantizer::with_parallel_threshold(threshold);
        self
    }

    /// Quantize (or copy) the host vector into the device buffer.
    pub fn transfer_to_device(&mut self) -> Result<Scale> {
        let result = DeviceBuffer::prepare(&mut self.device, self.geometry.vector_len())
            .and_then(|dst| self.quantizer.quantize_into(self.host.as_slice(), dst.as_mut_slice()));
        match result {
            Ok(scale) => {
                self.scale = scale;
                Ok(scale)
            }
            Err(err) => {
                self.device = None;
                self.scale = Scale::UNIT;
                Err(err)
            }
        }
    }

    /// Dequantize (or copy) the device buffer into the host vector,
    /// multiplying by `scale`.
    pub fn transfer_to_host(&mut self, scale: f64) -> Result<()> {
        let id = self.liveness.id();
        let device = self.device.as_ref().ok_or_else(|| not_transferred(TensorKind::Vector, id))?;
        let host = self.host.as_mut_slice()?;
        self.dequantizer.dequantize_into(device.as_slice(), scale, host)
    }

    /// Let the device fill a fresh device buffer, write the recovered values
    /// back to the host, then adopt the buffer with `scale`.
    ///
    /// The transfer is checked before `fill` runs. Nothing on the handle
    /// changes if any step fails.
    pub(crate) fn receive_from_device<F>(&mut self, scale: Scale, fill: F) -> Result<()>
    where
        F: FnOnce(DeviceViewMut<'_>) -> Result<()>,
    {
        if !self.host.is_writable() {
            return Err(MvmError::invalid_state(format!(
                "vector#{} is borrowed read-only and cannot receive tile output",
                self.id()
            )));
        }
        Dequantizer::check_transfer::<Q, T>(scale.step())?;
        let mut staged = DeviceBuffer::<Q>::zeroed(self.geometry.vector_len())?;
        fill(staged.view_mut())?;
        let host = self.host.as_mut_slice()?;
        self.dequantizer.dequantize_into(staged.as_slice(), scale.step(), host)?;
        self.device = Some(staged);
        self.scale = scale;
        Ok(())
    }

    pub fn device_buffer(&self) -> Result<&[Q]> {
        self.device
            .as_ref()
            .map(DeviceBuffer::as_slice)
            .ok_or_else(|| not_transferred(TensorKind::Vector, self.liveness.id()))
    }

    pub fn device_view(&self) -> Result<DeviceView<'_>> {
        self.device
            .as_ref()
            .map(DeviceBuffer::view)
            .ok_or_else(|| not_transferred(TensorKind::Vector, self.liveness.id()))
    }

    pub fn is_on_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale.magnitude
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn host(&self) -> &[T] {
        self.host.as_slice()
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn owns_host_buffer(&self) -> bool {
        self.host.is_owned()
    }

    pub fn is_host_writable(&self) -> bool {
        self.host.is_writable()
    }

    pub fn id(&self) -> u64 {
        self.liveness.id()
    }

    pub fn token(&self) -> TensorToken {
        self.liveness.token()
    }
}

impl<T: Element, Q: Element> fmt::Display for AnalogVector<'_, T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "AnalogVector<{} -> {}> #{} len {} on {} tile, scale {}, owns host: {}",
            T::DTYPE,
            Q::DTYPE,
            self.id(),
            self.len(),
            self.geometry,
            self.scale,
            self.owns_host_buffer()
        )?;
        write!(f, "host:   ")?;
        write_row(f, self.host.as_slice())?;
        match &self.device {
            Some(device) => {
                write!(f, "device: ")?;
                write_row(f, device.as_slice())
            }
            None => writeln!(f, "device: <not transferred>"),
        }
    }
}

fn write_row<V: fmt::Display>(f: &mut fmt::Formatter<'_>, row: &[V]) -> fmt::Result {
    f.write_str("[")?;
    for (i, v) in row.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{v}")?;
    }
    writeln!(f, "]")
}

fn write_rows<V: fmt::Display>(f: &mut fmt::Formatter<'_>, data: &[V], cols: usize) -> fmt::Result {
    if cols == 0 {
        return writeln!(f, "  []");
    }
    for row in data.chunks(cols) {
        f.write_str("  ")?;
        write_row(f, row)?;
    }
    Ok(())
}
