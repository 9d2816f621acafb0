//! A tile context paired with the device it drives.

use crate::context::TileContext;
use crate::device::TileDevice;
use crate::ops;
use crate::simulator::SimulatedAccelerator;
use crate::tensor::{AnalogMatrix, AnalogVector};
use mvm_common::{AcceleratorConfig, Element, Result, Scale, TileGeometry, TileId};
use tracing::info;

/// Bundles a [`TileContext`] with a [`TileDevice`] and the configuration
/// both were built from.
pub struct MvmSession<D: TileDevice = SimulatedAccelerator> {
    config: AcceleratorConfig,
    context: TileContext,
    device: D,
}

impl MvmSession<SimulatedAccelerator> {
    /// Session backed by the software accelerator.
    pub fn simulated(config: AcceleratorConfig) -> Result<Self> {
        let device = SimulatedAccelerator::new(config.num_tiles, config.geometry());
        Self::new(config, device)
    }
}

impl<D: TileDevice> MvmSession<D> {
    pub fn new(config: AcceleratorConfig, device: D) -> Result<Self> {
        let context = TileContext::from_config(&config)?;
        info!(
            device = device.name(),
            tiles = config.num_tiles,
            geometry = %config.geometry(),
            "mvm session ready"
        );
        Ok(Self { config, context, device })
    }

    pub fn config(&self) -> &AcceleratorConfig {
        &self.config
    }

    pub fn context(&self) -> &TileContext {
        &self.context
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn geometry(&self) -> TileGeometry {
        self.context.geometry()
    }

    /// Read-only matrix handle over `data` for this session's tiles.
    pub fn matrix<'a, T: Element, Q: Element>(
        &self,
        data: &'a [T],
        rows: usize,
        cols: usize,
    ) -> Result<AnalogMatrix<'a, T, Q>> {
        Ok(AnalogMatrix::from_slice(data, rows, cols, self.geometry())?
            .with_parallel_threshold(self.config.parallel_threshold))
    }

    /// Read-only input vector handle over `data`.
    pub fn vector<'a, T: Element, Q: Element>(
        &self,
        data: &'a [T],
    ) -> Result<AnalogVector<'a, T, Q>> {
        Ok(AnalogVector::from_slice(data, self.geometry())?
            .with_parallel_threshold(self.config.parallel_threshold))
    }

    /// Owned, zeroed vector of `len` elements to store tile output into.
    pub fn output_vector<T: Element, Q: Element>(
        &self,
        len: usize,
    ) -> Result<AnalogVector<'static, T, Q>> {
        Ok(AnalogVector::zeros(len, self.geometry())?
            .with_parallel_threshold(self.config.parallel_threshold))
    }

    pub fn set_matrix<T: Element, Q: Element>(
        &self,
        matrix: &mut AnalogMatrix<'_, T, Q>,
        tile_id: TileId,
    ) -> Result<Scale> {
        ops::mvm_set_matrix(&self.context, &self.device, matrix, tile_id)
    }

    pub fn load_vector<T: Element, Q: Element>(
        &self,
        vector: &mut AnalogVector<'_, T, Q>,
        tile_id: TileId,
    ) -> Result<Scale> {
        ops::mvm_load_vector(&self.context, &self.device, vector, tile_id)
    }

    pub fn compute(&self, tile_id: TileId) -> Result<Scale> {
        ops::mvm_compute(&self.context, &self.device, tile_id)
    }

    pub fn store_vector<T: Element, Q: Element>(
        &self,
        out: &mut AnalogVector<'_, T, Q>,
        tile_id: TileId,
    ) -> Result<Scale> {
        ops::mvm_store_vector(&self.context, &self.device, out, tile_id)
    }

    pub fn move_vector(&self, src: TileId, dst: TileId) -> Result<Scale> {
        ops::mvm_move_vector(&self.context, &self.device, src, dst)
    }

    /// Set, load, compute, and store on one tile.
    pub fn run<T: Element, Q: Element, O: Element>(
        &self,
        matrix: &mut AnalogMatrix<'_, T, Q>,
        vector: &mut AnalogVector<'_, T, Q>,
        out: &mut AnalogVector<'_, T, O>,
        tile_id: TileId,
    ) -> Result<Scale> {
        self.set_matrix(matrix, tile_id)?;
        self.load_vector(vector, tile_id)?;
        self.compute(tile_id)?;
        self.store_vector(out, tile_id)
    }
}
