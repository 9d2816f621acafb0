//! The five tile operations.
//!
//! Each operation validates the request against the context, performs the
//! host-side transfer, issues the device trigger, and only then records the
//! new tile state. A nonzero trigger status becomes
//! [`MvmError::DeviceFault`](mvm_common::MvmError::DeviceFault) and leaves
//! the context as it was.

use crate::context::TileContext;
use crate::device::{TileDevice, check_status};
use crate::tensor::{AnalogMatrix, AnalogVector};
use mvm_common::{Element, MvmError, Result, Scale, TileId};

/// Quantize `matrix`, program it into `tile_id`, and record its scale.
pub fn mvm_set_matrix<T: Element, Q: Element>(
    ctx: &TileContext,
    device: &dyn TileDevice,
    matrix: &mut AnalogMatrix<'_, T, Q>,
    tile_id: TileId,
) -> Result<Scale> {
    ctx.check_tile(tile_id)?;
    ctx.check_geometry(matrix.geometry())?;
    let scale = matrix.transfer_to_device()?;
    let token = matrix.token();
    let geometry = ctx.geometry();
    ctx.set_matrix_with(tile_id, token, scale, || {
        let status = device.set_matrix(tile_id, matrix.device_view()?, geometry);
        check_status("set_matrix", tile_id, status)
    })?;
    Ok(scale)
}

/// Quantize `vector`, load it as the input of `tile_id`, and record its
/// scale.
pub fn mvm_load_vector<T: Element, Q: Element>(
    ctx: &TileContext,
    device: &dyn TileDevice,
    vector: &mut AnalogVector<'_, T, Q>,
    tile_id: TileId,
) -> Result<Scale> {
    ctx.check_tile(tile_id)?;
    ctx.check_geometry(vector.geometry())?;
    let scale = vector.transfer_to_device()?;
    let token = vector.token();
    ctx.load_vector_with(tile_id, token, scale, || {
        let status = device.load_vector(tile_id, vector.device_view()?);
        check_status("load_vector", tile_id, status)
    })?;
    Ok(scale)
}

/// Run the MVM on `tile_id` and return the composed output scale.
pub fn mvm_compute(ctx: &TileContext, device: &dyn TileDevice, tile_id: TileId) -> Result<Scale> {
    ctx.compute_with(tile_id, || check_status("compute", tile_id, device.compute(tile_id)))
}

/// Store the output of `tile_id` into `out` and dequantize it to the host
/// with the tile's output scale, which is returned.
pub fn mvm_store_vector<T: Element, Q: Element>(
    ctx: &TileContext,
    device: &dyn TileDevice,
    out: &mut AnalogVector<'_, T, Q>,
    tile_id: TileId,
) -> Result<Scale> {
    ctx.check_tile(tile_id)?;
    ctx.check_geometry(out.geometry())?;
    if !out.is_host_writable() {
        return Err(MvmError::invalid_state(format!(
            "vector#{} is borrowed read-only and cannot receive tile output",
            out.id()
        )));
    }
    let token = out.token();
    ctx.store_vector_with(tile_id, token, |scale| {
        out.receive_from_device(scale, |view| {
            check_status("store_vector", tile_id, device.store_vector(tile_id, view))
        })
    })
}

/// Route the output of `src` to the input of `dst` without leaving the
/// device. The destination input inherits the source output scale.
pub fn mvm_move_vector(
    ctx: &TileContext,
    device: &dyn TileDevice,
    src: TileId,
    dst: TileId,
) -> Result<Scale> {
    ctx.move_vector_with(src, dst, || {
        check_status("move_vector", src, device.move_vector(src, dst))
    })
}
