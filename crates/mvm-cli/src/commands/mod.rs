//! Subcommand implementations.

pub mod chain;
pub mod config;
pub mod demo;
pub mod info;

pub use chain::ChainCommand;
pub use config::ConfigAction;
pub use demo::DemoCommand;
