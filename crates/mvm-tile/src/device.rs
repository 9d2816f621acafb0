//! Device trigger abstraction.
//!
//! Every tile operation ends by issuing an opaque trigger to the accelerator,
//! which answers with a 16-bit status word. Implementations decide how the
//! trigger reaches hardware; the tile runtime only interprets the status.

use mvm_common::{DeviceView, DeviceViewMut, MvmError, Result, TileGeometry, TileId};
use std::sync::Mutex;
use tracing::warn;

/// Status word returned by a device trigger. Zero means success.
pub type DeviceStatus = u16;

/// Status codes produced by [`crate::SimulatedAccelerator`].
pub mod status {
    use super::DeviceStatus;

    pub const OK: DeviceStatus = 0;
    /// Tile id outside the device's tile table.
    pub const BAD_TILE: DeviceStatus = 1;
    /// The tile has no matrix, input, or output for this operation.
    pub const NOT_READY: DeviceStatus = 2;
    /// A buffer does not match the tile geometry.
    pub const SHAPE_MISMATCH: DeviceStatus = 3;
    /// An output value does not fit the destination element type.
    pub const OVERFLOW: DeviceStatus = 4;
}

/// Injected accelerator trigger.
///
/// Each method corresponds to one tile instruction. Buffers are passed as
/// typed views of the handle's device buffer; the trigger must not retain
/// them past the call.
pub trait TileDevice: Send + Sync {
    fn name(&self) -> &'static str;

    /// Program `tile_id` with a tile-shaped, row-major matrix.
    fn set_matrix(
        &self,
        tile_id: TileId,
        matrix: DeviceView<'_>,
        geometry: TileGeometry,
    ) -> DeviceStatus;

    /// Load an input vector into `tile_id`.
    fn load_vector(&self, tile_id: TileId, vector: DeviceView<'_>) -> DeviceStatus;

    /// Run the matrix-vector product on `tile_id`.
    fn compute(&self, tile_id: TileId) -> DeviceStatus;

    /// Copy the output of `tile_id` into `out`.
    fn store_vector(&self, tile_id: TileId, out: DeviceViewMut<'_>) -> DeviceStatus;

    /// Route the output of `src` to the input of `dst`.
    fn move_vector(&self, src: TileId, dst: TileId) -> DeviceStatus;
}

impl<D: TileDevice + ?Sized> TileDevice for &D {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn set_matrix(
        &self,
        tile_id: TileId,
        matrix: DeviceView<'_>,
        geometry: TileGeometry,
    ) -> DeviceStatus {
        (**self).set_matrix(tile_id, matrix, geometry)
    }

    fn load_vector(&self, tile_id: TileId, vector: DeviceView<'_>) -> DeviceStatus {
        (**self).load_vector(tile_id, vector)
    }

    fn compute(&self, tile_id: TileId) -> DeviceStatus {
        (**self).compute(tile_id)
    }

    fn store_vector(&self, tile_id: TileId, out: DeviceViewMut<'_>) -> DeviceStatus {
        (**self).store_vector(tile_id, out)
    }

    fn move_vector(&self, src: TileId, dst: TileId) -> DeviceStatus {
        (**self).move_vector(src, dst)
    }
}

/// Map a trigger status to `Ok` or [`MvmError::DeviceFault`].
pub fn check_status(operation: &'static str, tile_id: TileId, status: DeviceStatus) -> Result<()> {
    if status == status::OK {
        return Ok(());
    }
    warn!(operation, tile_id, status, "device reported a fault");
    Err(MvmError::DeviceFault { operation, tile_id, status })
}

/// One trigger observed by a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    SetMatrix { tile_id: TileId, len: usize },
    LoadVector { tile_id: TileId, len: usize },
    Compute { tile_id: TileId },
    StoreVector { tile_id: TileId, len: usize },
    MoveVector { src: TileId, dst: TileId },
}

/// Test double that records every trigger and answers with scripted
/// statuses (then [`status::OK`] once the script runs out).
#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Mutex<Vec<DeviceCall>>,
    script: Mutex<Vec<DeviceStatus>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next triggers with `statuses`, in order.
    pub fn with_statuses(statuses: impl IntoIterator<Item = DeviceStatus>) -> Self {
        let mut script: Vec<_> = statuses.into_iter().collect();
        script.reverse();
        Self { calls: Mutex::default(), script: Mutex::new(script) }
    }

    /// Triggers seen so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn answer(&self, call: DeviceCall) -> DeviceStatus {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(call);
        let mut script = self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        script.pop().unwrap_or(status::OK)
    }
}

impl TileDevice for RecordingDevice {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_matrix(
        &self,
        tile_id: TileId,
        matrix: DeviceView<'_>,
        _geometry: TileGeometry,
    ) -> DeviceStatus {
        self.answer(DeviceCall::SetMatrix { tile_id, len: matrix.len() })
    }

    fn load_vector(&self, tile_id: TileId, vector: DeviceView<'_>) -> DeviceStatus {
        self.answer(DeviceCall::LoadVector { tile_id, len: vector.len() })
    }

    fn compute(&self, tile_id: TileId) -> DeviceStatus {
        self.answer(DeviceCall::Compute { tile_id })
    }

    fn store_vector(&self, tile_id: TileId, out: DeviceViewMut<'_>) -> DeviceStatus {
        self.answer(DeviceCall::StoreVector { tile_id, len: out.len() })
    }

    fn move_vector(&self, src: TileId, dst: TileId) -> DeviceStatus {
        self.answer(DeviceCall::MoveVector { src, dst })
    }
}
