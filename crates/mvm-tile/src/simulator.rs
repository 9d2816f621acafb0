//! Software accelerator implementing [`TileDevice`].
//!
//! Each tile keeps its programmed matrix, its input vector, and its last
//! output as `f64` values. The product is accumulated in `f64` and written
//! back into the caller's device element type with saturation.

use crate::device::{DeviceStatus, TileDevice, status};
use mvm_common::{DeviceView, DeviceViewMut, TileGeometry, TileId};
use std::sync::{Mutex, MutexGuard};
use tracing::{trace, warn};

type Outcome = std::result::Result<(), DeviceStatus>;

#[derive(Debug, Default, Clone)]
struct SimTile {
    matrix: Option<Vec<f64>>,
    input: Option<Vec<f64>>,
    output: Option<Vec<f64>>,
}

/// Reference MVM accelerator running on the host.
#[derive(Debug)]
pub struct SimulatedAccelerator {
    geometry: TileGeometry,
    tiles: Vec<Mutex<SimTile>>,
}

impl SimulatedAccelerator {
    pub fn new(num_tiles: u32, geometry: TileGeometry) -> Self {
        Self { geometry, tiles: (0..num_tiles).map(|_| Mutex::default()).collect() }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn num_tiles(&self) -> u32 {
        self.tiles.len() as u32
    }

    /// Raw (unscaled) output of the last compute on `tile_id`.
    pub fn raw_output(&self, tile_id: TileId) -> Option<Vec<f64>> {
        self.tile(tile_id).ok()?.output.clone()
    }

    fn tile(&self, tile_id: TileId) -> std::result::Result<MutexGuard<'_, SimTile>, DeviceStatus> {
        let slot = self.tiles.get(tile_id as usize).ok_or(status::BAD_TILE)?;
        Ok(slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn multiply(&self, matrix: &[f64], input: &[f64]) -> Vec<f64> {
        matrix
            .chunks(self.geometry.cols)
            .map(|row| row.iter().zip(input).map(|(m, v)| m * v).sum())
            .collect()
    }

    fn try_set_matrix(
        &self,
        tile_id: TileId,
        matrix: DeviceView<'_>,
        geometry: TileGeometry,
    ) -> Outcome {
        if geometry != self.geometry || matrix.len() != self.geometry.matrix_len() {
            return Err(status::SHAPE_MISMATCH);
        }
        let mut tile = self.tile(tile_id)?;
        tile.matrix = Some(matrix.to_f64_vec());
        tile.output = None;
        trace!(tile_id, dtype = %matrix.dtype(), "simulator programmed matrix");
        Ok(())
    }

    fn try_load_vector(&self, tile_id: TileId, vector: DeviceView<'_>) -> Outcome {
        if vector.len() != self.geometry.vector_len() {
            return Err(status::SHAPE_MISMATCH);
        }
        let mut tile = self.tile(tile_id)?;
        tile.input = Some(vector.to_f64_vec());
        tile.output = None;
        Ok(())
    }

    fn try_compute(&self, tile_id: TileId) -> Outcome {
        let mut tile = self.tile(tile_id)?;
        let (Some(matrix), Some(input)) = (&tile.matrix, &tile.input) else {
            return Err(status::NOT_READY);
        };
        let output = self.multiply(matrix, input);
        trace!(tile_id, ?output, "simulator computed");
        tile.output = Some(output);
        Ok(())
    }

    fn try_store_vector(&self, tile_id: TileId, mut out: DeviceViewMut<'_>) -> Outcome {
        let tile = self.tile(tile_id)?;
        let output = tile.output.as_ref().ok_or(status::NOT_READY)?;
        if output.len() > out.len() {
            return Err(status::SHAPE_MISMATCH);
        }
        if !out.can_hold(output) {
            warn!(tile_id, dtype = %out.dtype(), "tile output overflows the output element type");
            return Err(status::OVERFLOW);
        }
        out.write_f64(output);
        Ok(())
    }

    fn try_move_vector(&self, src: TileId, dst: TileId) -> Outcome {
        let mut input = self.tile(src)?.output.clone().ok_or(status::NOT_READY)?;
        let width = self.geometry.vector_len();
        if input.len() > width {
            return Err(status::SHAPE_MISMATCH);
        }
        input.resize(width, 0.0);
        let mut tile = self.tile(dst)?;
        tile.input = Some(input);
        tile.output = None;
        Ok(())
    }
}

fn status_of(outcome: Outcome) -> DeviceStatus {
    outcome.err().unwrap_or(status::OK)
}

impl TileDevice for SimulatedAccelerator {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn set_matrix(
        &self,
        tile_id: TileId,
        matrix: DeviceView<'_>,
        geometry: TileGeometry,
    ) -> DeviceStatus {
        status_of(self.try_set_matrix(tile_id, matrix, geometry))
    }

    fn load_vector(&self, tile_id: TileId, vector: DeviceView<'_>) -> DeviceStatus {
        status_of(self.try_load_vector(tile_id, vector))
    }

    fn compute(&self, tile_id: TileId) -> DeviceStatus {
        status_of(self.try_compute(tile_id))
    }

    fn store_vector(&self, tile_id: TileId, out: DeviceViewMut<'_>) -> DeviceStatus {
        status_of(self.try_store_vector(tile_id, out))
    }

    fn move_vector(&self, src: TileId, dst: TileId) -> DeviceStatus {
        status_of(self.try_move_vector(src, dst))
    }
}
