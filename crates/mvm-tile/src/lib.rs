//! Tile runtime for analog MVM accelerators
//!
//! This crate drives fixed-geometry accelerator tiles from host tensors:
//! - [`AnalogMatrix`] / [`AnalogVector`]: handles owning the tile-shaped
//!   device representation of a host tensor
//! - [`TileContext`]: per-tile scale bookkeeping across chained operations
//! - [`TileDevice`]: the injected device trigger, with
//!   [`SimulatedAccelerator`] as a software implementation
//! - [`mvm_set_matrix`], [`mvm_load_vector`], [`mvm_compute`],
//!   [`mvm_store_vector`], [`mvm_move_vector`]: the tile operations
//! - [`MvmSession`]: a context and device bundled together

pub mod buffer;
pub mod context;
pub mod device;
#[cfg(feature = "candle")]
pub mod interop;
pub mod ops;
pub mod session;
pub mod simulator;
pub mod tensor;
pub mod token;

pub use buffer::{DeviceBuffer, HostBuffer};
pub use context::{TileContext, TileSnapshot, TileState, VectorSource};
pub use device::{DeviceCall, DeviceStatus, RecordingDevice, TileDevice, check_status};
pub use ops::{mvm_compute, mvm_load_vector, mvm_move_vector, mvm_set_matrix, mvm_store_vector};
pub use session::MvmSession;
pub use simulator::SimulatedAccelerator;
pub use tensor::{AnalogMatrix, AnalogVector};
pub use token::{TensorKind, TensorToken};

pub use mvm_common::{AcceleratorConfig, Element, MvmError, Result, Scale, TileGeometry, TileId};
