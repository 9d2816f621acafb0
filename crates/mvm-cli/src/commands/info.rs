//! `mvm info`: build and accelerator information.

use crate::output::OutputConfig;
use anyhow::Result;
use console::style;
use mvm_common::{AcceleratorConfig, DType};
use serde::Serialize;

const DTYPES: [DType; 8] = [
    DType::I8,
    DType::I16,
    DType::I32,
    DType::I64,
    DType::F16,
    DType::BF16,
    DType::F32,
    DType::F64,
];

#[derive(Debug, Serialize)]
struct InfoReport {
    version: &'static str,
    os: &'static str,
    arch: &'static str,
    cpu_threads: usize,
    device: &'static str,
    tiles: u32,
    geometry: String,
    parallel_threshold: usize,
    chain_depth_warning: usize,
    element_types: Vec<String>,
    candle_interop: bool,
}

pub fn execute(config: &AcceleratorConfig, output: &OutputConfig) -> Result<()> {
    let report = InfoReport {
        version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        cpu_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        device: "simulated",
        tiles: config.num_tiles,
        geometry: config.geometry().to_string(),
        parallel_threshold: config.parallel_threshold,
        chain_depth_warning: config.chain_depth_warning,
        element_types: DTYPES.iter().map(ToString::to_string).collect(),
        candle_interop: cfg!(feature = "candle"),
    };

    output.emit_result(&report, |r| {
        println!("{}", style("Analog MVM System Information").bold().cyan());
        println!();
        println!("{}", style("Version:").bold());
        println!("  mvm: {}", r.version);
        println!();
        println!("{}", style("System:").bold());
        println!("  OS: {}", r.os);
        println!("  Architecture: {}", r.arch);
        println!("  CPU threads: {}", r.cpu_threads);
        println!();
        println!("{}", style("Accelerator:").bold());
        println!("  Device: {}", r.device);
        println!("  Tiles: {} of {}", r.tiles, r.geometry);
        println!("  Parallel threshold: {} elements", r.parallel_threshold);
        println!("  Chain depth warning: {}", r.chain_depth_warning);
        println!();
        println!("{}", style("Element types:").bold());
        println!("  {}", r.element_types.join(", "));
        let candle = if r.candle_interop {
            style("✓ Enabled").green()
        } else {
            style("✗ Disabled").red()
        };
        println!("  Candle interop: {candle}");
    })
}
