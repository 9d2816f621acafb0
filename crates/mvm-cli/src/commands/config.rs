//! `mvm config` subcommands.

use crate::output::OutputConfig;
use anyhow::{Context, Result};
use clap::Subcommand;
use mvm_common::AcceleratorConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mvm.toml";

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show which configuration file is used
    Path,
}

#[derive(Debug, Serialize)]
struct PathReport {
    path: PathBuf,
    exists: bool,
}

/// Configuration file the CLI reads: `--config` if given, otherwise
/// `mvm.toml` in the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf)
}

impl ConfigAction {
    pub fn execute(
        &self,
        config: &AcceleratorConfig,
        path: &Path,
        output: &OutputConfig,
    ) -> Result<()> {
        match self {
            Self::Show => {
                let rendered = config.to_toml().context("failed to serialize configuration")?;
                output.emit_result(config, |_| print!("{rendered}"))
            }
            Self::Path => {
                let report = PathReport { path: path.to_path_buf(), exists: path.is_file() };
                output.emit_result(&report, |r| {
                    if r.exists {
                        println!("{}", r.path.display());
                    } else {
                        println!("{} (not found, using defaults)", r.path.display());
                    }
                })
            }
        }
    }
}
