//! Per-tile scale bookkeeping.
//!
//! A [`TileContext`] tracks, for every tile, which matrix and input vector
//! were loaded, their scales, and the composed output scale once a compute
//! has been issued. It never owns tensor memory: it keeps liveness tokens
//! and refuses to compute with a handle that has since been dropped.
//!
//! Each tile slot sits behind its own mutex so independent tiles can be
//! driven from different threads. Two-tile operations lock in ascending id
//! order.

use crate::token::TensorToken;
use mvm_common::{AcceleratorConfig, MvmError, Result, Scale, TileGeometry, TileId};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Default chain depth above which a warning is logged.
pub const DEFAULT_CHAIN_DEPTH_WARNING: usize = 4;

/// Lifecycle state of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    Empty,
    MatrixSet,
    VectorLoaded,
    /// Matrix and input vector are both present.
    Ready,
    Computed,
    Stored,
}

impl TileState {
    /// Whether an output scale is available.
    pub fn has_output(self) -> bool {
        matches!(self, Self::Computed | Self::Stored)
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::MatrixSet => "matrix-set",
            Self::VectorLoaded => "vector-loaded",
            Self::Ready => "ready",
            Self::Computed => "computed",
            Self::Stored => "stored",
        };
        f.pad(s)
    }
}

/// Where a tile's current input vector came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorSource {
    /// Loaded from a host vector handle.
    Host(TensorToken),
    /// Routed from another tile's output, `depth` MVMs deep.
    Moved { from: TileId, depth: usize },
}

impl VectorSource {
    /// Number of MVMs the input value has already passed through.
    pub fn depth(&self) -> usize {
        match self {
            Self::Host(_) => 0,
            Self::Moved { depth, .. } => *depth,
        }
    }
}

impl fmt::Display for VectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(token) => write!(f, "{token}"),
            Self::Moved { from, .. } => write!(f, "tile {from} output"),
        }
    }
}

/// Point-in-time copy of one tile's bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSnapshot {
    pub tile_id: TileId,
    pub state: TileState,
    pub matrix: Option<TensorToken>,
    pub matrix_scale: Option<Scale>,
    pub vector: Option<VectorSource>,
    pub vector_scale: Option<Scale>,
    pub output_scale: Option<Scale>,
    pub stored: Option<TensorToken>,
    /// MVMs the current output has passed through (0 without output).
    pub chain_depth: usize,
}

#[derive(Debug, Default)]
struct TileSlot {
    matrix: Option<(TensorToken, Scale)>,
    vector: Option<(VectorSource, Scale)>,
    output: Option<(Scale, usize)>,
    stored: Option<TensorToken>,
}

impl TileSlot {
    fn state(&self) -> TileState {
        match (&self.matrix, &self.vector, &self.output, &self.stored) {
            (_, _, Some(_), Some(_)) => TileState::Stored,
            (_, _, Some(_), None) => TileState::Computed,
            (Some(_), Some(_), None, _) => TileState::Ready,
            (Some(_), None, None, _) => TileState::MatrixSet,
            (None, Some(_), None, _) => TileState::VectorLoaded,
            (None, None, None, _) => TileState::Empty,
        }
    }

    fn clear_output(&mut self) {
        self.output = None;
        self.stored = None;
    }

    fn output_scale(&self, tile_id: TileId, operation: &str) -> Result<(Scale, usize)> {
        self.output.ok_or_else(|| {
            MvmError::invalid_state(format!(
                "{operation} on tile {tile_id} requires a computed output (state: {})",
                self.state()
            ))
        })
    }

    fn snapshot(&self, tile_id: TileId) -> TileSnapshot {
        TileSnapshot {
            tile_id,
            state: self.state(),
            matrix: self.matrix.as_ref().map(|(t, _)| t.clone()),
            matrix_scale: self.matrix.as_ref().map(|(_, s)| *s),
            vector: self.vector.as_ref().map(|(v, _)| v.clone()),
            vector_scale: self.vector.as_ref().map(|(_, s)| *s),
            output_scale: self.output.map(|(s, _)| s),
            stored: self.stored.clone(),
            chain_depth: self.output.map_or(0, |(_, d)| d),
        }
    }
}

/// Scale bookkeeping for a fixed set of tiles.
#[derive(Debug)]
pub struct TileContext {
    slots: Vec<Mutex<TileSlot>>,
    geometry: TileGeometry,
    chain_depth_warning: usize,
}

impl TileContext {
    /// Create a context for `num_tiles` tiles of the given geometry.
    pub fn new(num_tiles: u32, geometry: TileGeometry) -> Result<Self> {
        if num_tiles == 0 {
            return Err(MvmError::invalid_state("a tile context needs at least one tile"));
        }
        Ok(Self {
            slots: (0..num_tiles).map(|_| Mutex::default()).collect(),
            geometry,
            chain_depth_warning: DEFAULT_CHAIN_DEPTH_WARNING,
        })
    }

    /// Create a context from a validated accelerator configuration.
    pub fn from_config(config: &AcceleratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.num_tiles, config.geometry())?
            .with_chain_depth_warning(config.chain_depth_warning))
    }

    #[must_use]
    pub fn with_chain_depth_warning(mut self, depth: usize) -> Self {
        self.chain_depth_warning = depth;
        self
    }

    pub fn num_tiles(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn chain_depth_warning(&self) -> usize {
        self.chain_depth_warning
    }

    /// Fail with `InvalidState` unless `tile_id` names a tile.
    pub fn check_tile(&self, tile_id: TileId) -> Result<()> {
        if (tile_id as usize) < self.slots.len() {
            Ok(())
        } else {
            Err(MvmError::invalid_state(format!(
                "tile id {tile_id} out of range for a context with {} tiles",
                self.slots.len()
            )))
        }
    }

    /// Fail with `InvalidState` unless a handle was built for this
    /// context's tile geometry.
    pub fn check_geometry(&self, geometry: TileGeometry) -> Result<()> {
        if geometry == self.geometry {
            Ok(())
        } else {
            Err(MvmError::invalid_state(format!(
                "handle geometry {geometry} does not match tile geometry {}",
                self.geometry
            )))
        }
    }

    fn lock(&self, tile_id: TileId) -> Result<MutexGuard<'_, TileSlot>> {
        self.check_tile(tile_id)?;
        let slot = &self.slots[tile_id as usize];
        Ok(slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    // ── Operations ──────────────────────────────────────────────────────────
    //
    // Each `*_with` variant validates under the slot lock, runs `issue`
    // (the device trigger), and records the new state only if `issue`
    // succeeds. The plain variants are bookkeeping only.

    /// Record `matrix` (with its `scale`) as the weights of `tile_id`.
    pub fn set_matrix(&self, tile_id: TileId, matrix: TensorToken, scale: Scale) -> Result<()> {
        self.set_matrix_with(tile_id, matrix, scale, || Ok(()))
    }

    pub(crate) fn set_matrix_with<F>(
        &self,
        tile_id: TileId,
        matrix: TensorToken,
        scale: Scale,
        issue: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut slot = self.lock(tile_id)?;
        issue()?;
        slot.clear_output();
        debug!(tile_id, matrix = %matrix, %scale, "set matrix");
        slot.matrix = Some((matrix, scale));
        Ok(())
    }

    /// Record a host `vector` (with its `scale`) as the input of `tile_id`.
    pub fn load_vector(&self, tile_id: TileId, vector: TensorToken, scale: Scale) -> Result<()> {
        self.load_vector_with(tile_id, vector, scale, || Ok(()))
    }

    pub(crate) fn load_vector_with<F>(
        &self,
        tile_id: TileId,
        vector: TensorToken,
        scale: Scale,
        issue: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut slot = self.lock(tile_id)?;
        issue()?;
        slot.clear_output();
        debug!(tile_id, vector = %vector, %scale, "load vector");
        slot.vector = Some((VectorSource::Host(vector), scale));
        Ok(())
    }

    /// Derive the output scale of `tile_id` as `matrix_scale * vector_scale`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the matrix or the input vector is missing, or if a
    /// handle they were loaded from has been dropped. No output is recorded
    /// in that case.
    pub fn compute(&self, tile_id: TileId) -> Result<Scale> {
        self.compute_with(tile_id, || Ok(()))
    }

    pub(crate) fn compute_with<F>(&self, tile_id: TileId, issue: F) -> Result<Scale>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut slot = self.lock(tile_id)?;
        let state = slot.state();
        let (Some((matrix, matrix_scale)), Some((vector, vector_scale))) =
            (&slot.matrix, &slot.vector)
        else {
            return Err(MvmError::invalid_state(format!(
                "compute on tile {tile_id} requires both a matrix and an input vector \
                 (state: {state})"
            )));
        };
        if !matrix.is_alive() {
            return Err(MvmError::invalid_state(format!(
                "compute on tile {tile_id}: {matrix} was dropped while still loaded"
            )));
        }
        if let VectorSource::Host(token) = vector {
            if !token.is_alive() {
                return Err(MvmError::invalid_state(format!(
                    "compute on tile {tile_id}: {token} was dropped while still loaded"
                )));
            }
        }
        let output_scale = matrix_scale.compose(*vector_scale);
        let depth = vector.depth() + 1;

        issue()?;

        if depth > self.chain_depth_warning {
            warn!(
                tile_id,
                depth,
                limit = self.chain_depth_warning,
                output_scale = %output_scale,
                "chain depth exceeds warning threshold; scale compounds without renormalisation"
            );
        }
        debug!(tile_id, %output_scale, depth, "compute");
        slot.output = Some((output_scale, depth));
        slot.stored = None;
        Ok(output_scale)
    }

    /// Mark the output of `tile_id` as stored into `out` and return the
    /// scale the caller passes to `transfer_to_host` (as `Scale::step()`).
    pub fn store_vector(&self, tile_id: TileId, out: TensorToken) -> Result<Scale> {
        self.store_vector_with(tile_id, out, |_| Ok(()))
    }

    pub(crate) fn store_vector_with<F>(
        &self,
        tile_id: TileId,
        out: TensorToken,
        issue: F,
    ) -> Result<Scale>
    where
        F: FnOnce(Scale) -> Result<()>,
    {
        let mut slot = self.lock(tile_id)?;
        let (scale, _) = slot.output_scale(tile_id, "store_vector")?;
        issue(scale)?;
        debug!(tile_id, out = %out, %scale, "store vector");
        slot.stored = Some(out);
        Ok(scale)
    }

    /// Route the output of `src` to the input of `dst`, carrying its scale:
    /// `vector_scale[dst] = output_scale[src]`.
    pub fn move_vector(&self, src: TileId, dst: TileId) -> Result<Scale> {
        self.move_vector_with(src, dst, || Ok(()))
    }

    pub(crate) fn move_vector_with<F>(&self, src: TileId, dst: TileId, issue: F) -> Result<Scale>
    where
        F: FnOnce() -> Result<()>,
    {
        self.check_tile(src)?;
        self.check_tile(dst)?;

        if src == dst {
            let mut slot = self.lock(src)?;
            let (scale, depth) = slot.output_scale(src, "move_vector")?;
            issue()?;
            slot.clear_output();
            slot.vector = Some((VectorSource::Moved { from: src, depth }, scale));
            debug!(src, dst, %scale, depth, "move vector");
            return Ok(scale);
        }

        // ascending id order
        let (src_slot, mut dst_slot) = if src < dst {
            let a = self.lock(src)?;
            let b = self.lock(dst)?;
            (a, b)
        } else {
            let b = self.lock(dst)?;
            let a = self.lock(src)?;
            (a, b)
        };
        let (scale, depth) = src_slot.output_scale(src, "move_vector")?;
        issue()?;
        dst_slot.clear_output();
        dst_slot.vector = Some((VectorSource::Moved { from: src, depth }, scale));
        debug!(src, dst, %scale, depth, "move vector");
        Ok(scale)
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub fn snapshot(&self, tile_id: TileId) -> Result<TileSnapshot> {
        Ok(self.lock(tile_id)?.snapshot(tile_id))
    }

    pub fn tile_state(&self, tile_id: TileId) -> Result<TileState> {
        Ok(self.lock(tile_id)?.state())
    }

    pub fn matrix_scale(&self, tile_id: TileId) -> Result<Option<Scale>> {
        Ok(self.lock(tile_id)?.matrix.as_ref().map(|(_, s)| *s))
    }

    pub fn vector_scale(&self, tile_id: TileId) -> Result<Option<Scale>> {
        Ok(self.lock(tile_id)?.vector.as_ref().map(|(_, s)| *s))
    }

    /// Output scale of the last compute, `None` until one has been issued.
    pub fn output_scale(&self, tile_id: TileId) -> Result<Option<Scale>> {
        Ok(self.lock(tile_id)?.output.map(|(s, _)| s))
    }

    pub fn chain_depth(&self, tile_id: TileId) -> Result<usize> {
        Ok(self.lock(tile_id)?.output.map_or(0, |(_, d)| d))
    }

    /// Forget everything recorded for `tile_id`.
    pub fn reset_tile(&self, tile_id: TileId) -> Result<()> {
        *self.lock(tile_id)? = TileSlot::default();
        debug!(tile_id, "reset tile");
        Ok(())
    }

    /// Forget everything recorded for every tile.
    pub fn reset(&self) {
        for slot in &self.slots {
            *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = TileSlot::default();
        }
    }
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for TileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TileContext: {} tiles of {}", self.slots.len(), self.geometry)?;
        for (id, slot) in self.slots.iter().enumerate() {
            let snap =
                slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).snapshot(id as TileId);
            writeln!(
                f,
                "  tile {id:>3} {:<13} matrix {} scale {} | vector {} scale {} \
                 | output {} depth {}",
                snap.state,
                opt(snap.matrix),
                opt(snap.matrix_scale),
                opt(snap.vector),
                opt(snap.vector_scale),
                opt(snap.output_scale),
                snap.chain_depth,
            )?;
        }
        Ok(())
    }
}
