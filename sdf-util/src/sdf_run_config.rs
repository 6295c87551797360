use crate::sdf_loss_functions::SdfLoss;

use candle_core::Device;
use clap::ValueEnum;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum SdfOptimizer {
    Adam,
    Momentum,
}

impl std::fmt::Display for SdfOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SdfOptimizer::Adam => "adam",
            SdfOptimizer::Momentum => "momentum",
        };
        write!(f, "{}", name)
    }
}

/// One immutable record constructed from the CLI at startup and passed
/// explicitly to `run`; never mutated afterwards.
#[derive(Debug)]
pub struct RunConfig {
    pub train_path: PathBuf,
    pub validation_path: PathBuf,
    pub pc_h5_file: Option<PathBuf>,
    pub model_path: PathBuf,
    pub logs_path: PathBuf,
    pub batch_size: usize,
    pub epoch_start: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub optimizer: SdfOptimizer,
    pub train: bool,
    pub warm_start: bool,
    pub alpha: f32,
    pub loss_function: SdfLoss,
    pub sdf_count: usize,
    pub device: Device,
    pub verbose: bool,
}
