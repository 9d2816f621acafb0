//! Single-tile matrix-vector product against the simulated accelerator.

use crate::output::{OutputConfig, ScaleReport};
use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use mvm_common::AcceleratorConfig;
use mvm_tile::{MvmSession, TileDevice, TileId};
use serde::Serialize;
use tracing::info;

/// Quantize a constant matrix and vector onto one tile, compute, and store
#[derive(Debug, Parser)]
pub struct DemoCommand {
    /// Matrix rows
    #[arg(long, default_value_t = 3)]
    pub rows: usize,

    /// Matrix columns (also the input vector length)
    #[arg(long, default_value_t = 4)]
    pub cols: usize,

    /// Value of every matrix element
    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    pub matrix_value: f32,

    /// Value of every input vector element
    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    pub vector_value: f32,

    /// Tile to run on
    #[arg(long, default_value_t = 0)]
    pub tile: TileId,
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub device: String,
    pub geometry: String,
    pub tile: TileId,
    pub matrix_scale: ScaleReport,
    pub vector_scale: ScaleReport,
    pub output_scale: ScaleReport,
    pub raw_output: Vec<i32>,
    pub output: Vec<f32>,
}

impl DemoCommand {
    pub fn execute(&self, config: &AcceleratorConfig, output: &OutputConfig) -> Result<()> {
        let session = MvmSession::simulated(config.clone())
            .context("failed to start simulated session")?;
        let matrix_data = vec![self.matrix_value; self.rows * self.cols];
        let vector_data = vec![self.vector_value; self.cols];

        let mut matrix = session
            .matrix::<f32, i8>(&matrix_data, self.rows, self.cols)
            .context("failed to build matrix handle")?;
        let mut vector = session
            .vector::<f32, i8>(&vector_data)
            .context("failed to build vector handle")?;
        let mut out = session
            .output_vector::<f32, i32>(self.rows)
            .context("failed to build output handle")?;

        let matrix_scale = session.set_matrix(&mut matrix, self.tile).context("set_matrix failed")?;
        let vector_scale =
            session.load_vector(&mut vector, self.tile).context("load_vector failed")?;
        let output_scale = session.compute(self.tile).context("compute failed")?;
        session.store_vector(&mut out, self.tile).context("store_vector failed")?;
        info!(tile = self.tile, %output_scale, "demo complete");

        let report = DemoReport {
            device: session.device().name().to_string(),
            geometry: session.geometry().to_string(),
            tile: self.tile,
            matrix_scale: matrix_scale.into(),
            vector_scale: vector_scale.into(),
            output_scale: output_scale.into(),
            raw_output: out.device_buffer()?[..self.rows].to_vec(),
            output: out.host().to_vec(),
        };

        output.emit_result(&report, |r| {
            println!("{}", style("Analog MVM demo").bold().cyan());
            println!();
            println!("{matrix}");
            println!("{vector}");
            println!("{out}");
            println!("{}", style("Scales:").bold());
            println!("  matrix:  {}", r.matrix_scale);
            println!("  vector:  {}", r.vector_scale);
            println!("  output:  {}", r.output_scale);
            println!();
            println!("{}", session.context());
            println!("{} {:?}", style("Result:").bold().green(), r.output);
        })
    }
}
