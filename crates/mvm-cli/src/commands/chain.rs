//! Multi-tile chain: each tile's output is routed into the next tile's input
//! on the device, and only the last tile is stored to the host.

use crate::output::{OutputConfig, ScaleReport};
use anyhow::{Context, Result, ensure};
use clap::Parser;
use console::style;
use mvm_common::AcceleratorConfig;
use mvm_tile::{AnalogMatrix, MvmSession, TileDevice, TileId};
use serde::Serialize;
use tracing::{debug, info};

/// Chain matrix-vector products across tiles with move_vector
#[derive(Debug, Parser)]
pub struct ChainCommand {
    /// Number of tiles in the chain
    #[arg(long, default_value_t = 2)]
    pub stages: u32,

    /// Rows of every stage matrix (and columns of every stage after the first)
    #[arg(long, default_value_t = 3)]
    pub rows: usize,

    /// Columns of the first stage matrix (also the input vector length)
    #[arg(long, default_value_t = 4)]
    pub cols: usize,

    /// Value of every element of the first stage matrix
    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    pub matrix_value: f32,

    /// Value of every element of the later stage matrices
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub stage_value: f32,

    /// Value of every input vector element
    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    pub vector_value: f32,
}

#[derive(Debug, Serialize)]
pub struct StageReport {
    pub tile: TileId,
    pub matrix_scale: ScaleReport,
    pub input_scale: ScaleReport,
    pub output_scale: ScaleReport,
    pub depth: usize,
}

#[derive(Debug, Serialize)]
pub struct ChainReport {
    pub device: String,
    pub geometry: String,
    pub stages: Vec<StageReport>,
    pub output: Vec<f32>,
}

impl ChainCommand {
    pub fn execute(&self, config: &AcceleratorConfig, output: &OutputConfig) -> Result<()> {
        ensure!(self.stages >= 1, "a chain needs at least one stage");
        let mut config = config.clone();
        if config.num_tiles < self.stages {
            info!(from = config.num_tiles, to = self.stages, "raising tile count to fit the chain");
            config.num_tiles = self.stages;
        }
        let session = MvmSession::simulated(config).context("failed to start simulated session")?;

        let first_data = vec![self.matrix_value; self.rows * self.cols];
        let stage_data = vec![self.stage_value; self.rows * self.rows];
        let vector_data = vec![self.vector_value; self.cols];

        let mut matrices: Vec<AnalogMatrix<'_, f32, i8>> = Vec::with_capacity(self.stages as usize);
        matrices.push(
            session
                .matrix(&first_data, self.rows, self.cols)
                .context("failed to build stage 0 matrix")?,
        );
        for stage in 1..self.stages {
            matrices.push(
                session
                    .matrix(&stage_data, self.rows, self.rows)
                    .with_context(|| format!("failed to build stage {stage} matrix"))?,
            );
        }
        let mut vector = session
            .vector::<f32, i8>(&vector_data)
            .context("failed to build vector handle")?;
        let mut out = session
            .output_vector::<f32, i64>(self.rows)
            .context("failed to build output handle")?;

        let mut stages = Vec::with_capacity(matrices.len());
        for (tile, matrix) in (0..).zip(matrices.iter_mut()) {
            let matrix_scale = session
                .set_matrix(matrix, tile)
                .with_context(|| format!("set_matrix on tile {tile} failed"))?;
            let input_scale = if tile == 0 {
                session.load_vector(&mut vector, tile).context("load_vector failed")?
            } else {
                session
                    .move_vector(tile - 1, tile)
                    .with_context(|| format!("move_vector {} -> {tile} failed", tile - 1))?
            };
            let output_scale =
                session.compute(tile).with_context(|| format!("compute on tile {tile} failed"))?;
            let depth = session.context().chain_depth(tile)?;
            debug!(tile, %output_scale, depth, "stage complete");
            stages.push(StageReport {
                tile,
                matrix_scale: matrix_scale.into(),
                input_scale: input_scale.into(),
                output_scale: output_scale.into(),
                depth,
            });
        }
        let last = self.stages - 1;
        session
            .store_vector(&mut out, last)
            .with_context(|| format!("store_vector on tile {last} failed"))?;

        let report = ChainReport {
            device: session.device().name().to_string(),
            geometry: session.geometry().to_string(),
            stages,
            output: out.host().to_vec(),
        };

        output.emit_result(&report, |r| {
            println!("{}", style("Analog MVM chain").bold().cyan());
            println!();
            for stage in &r.stages {
                println!(
                    "  tile {} depth {}: matrix {} x input {} = output {}",
                    stage.tile,
                    stage.depth,
                    stage.matrix_scale.magnitude,
                    stage.input_scale.magnitude,
                    stage.output_scale
                );
            }
            println!();
            println!("{}", session.context());
            println!("{} {:?}", style("Result:").bold().green(), r.output);
        })
    }
}
