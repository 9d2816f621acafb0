//! Output rendering for CLI commands.
//!
//! `--format json` writes one pretty-printed JSON document to stdout; text
//! mode hands the value to a closure that prints it for humans. Logs always
//! go to stderr so JSON output stays parseable.

use clap::ValueEnum;
use mvm_common::Scale;
use serde::Serialize;
use std::io::Write;

/// Result format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

impl OutputConfig {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Emit a final result value. In JSON mode it is serialized to stdout;
    /// in text mode `text_fn` renders it.
    pub fn emit_result<T: Serialize>(
        &self,
        value: &T,
        text_fn: impl FnOnce(&T),
    ) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value)?;
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{json}")?;
            }
            OutputFormat::Text => text_fn(value),
        }
        Ok(())
    }
}

/// Serializable view of a [`Scale`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleReport {
    pub magnitude: f64,
    pub levels: f64,
    pub step: f64,
}

impl From<Scale> for ScaleReport {
    fn from(scale: Scale) -> Self {
        Self { magnitude: scale.magnitude, levels: scale.levels, step: scale.step() }
    }
}

impl std::fmt::Display for ScaleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (levels {}, step {:.6e})", self.magnitude, self.levels, self.step)
    }
}
