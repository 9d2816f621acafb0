//! Common types, traits, and utilities for the analog MVM bridge
//!
//! This crate provides the foundational types shared by the quantization
//! engine and the tile runtime: the error taxonomy, the numeric element
//! abstraction with typed device views, tile geometry, scale records, and the
//! accelerator configuration.

pub mod alloc;
pub mod config;
pub mod error;
pub mod types;

pub use alloc::try_zeroed;
pub use config::{AcceleratorConfig, ConfigError};
pub use error::{MvmError, Result};
pub use types::{DType, DeviceView, DeviceViewMut, Element, Scale, TileGeometry, TileId};
