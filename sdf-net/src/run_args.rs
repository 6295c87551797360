use sdf_util::candle_core;
use sdf_util::sdf_fc_model::*;
use sdf_util::sdf_loss_functions::SdfLoss;
use sdf_util::sdf_model_traits::SdfModelFactory;
use sdf_util::sdf_pointconv_deep_model::*;
use sdf_util::sdf_pointconv_model::*;
use sdf_util::sdf_run_config::{RunConfig, SdfOptimizer};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "snake_case")]
pub enum ModelKind {
    Fc,
    FcNoBn,
    FcNoBnDropout,
    FcSmall,
    FcSmallNoBn,
    Pointconv,
    PointconvDeep,
    PointconvDeepBn,
}

impl ModelKind {
    /// each key maps to exactly one architecture constructor
    pub fn factory(&self) -> SdfModelFactory {
        match self {
            ModelKind::Fc => fc_model,
            ModelKind::FcNoBn => fc_no_bn_model,
            ModelKind::FcNoBnDropout => fc_no_bn_dropout_model,
            ModelKind::FcSmall => fc_small_model,
            ModelKind::FcSmallNoBn => fc_small_no_bn_model,
            ModelKind::Pointconv => pointconv_model,
            ModelKind::PointconvDeep => pointconv_deep_model,
            ModelKind::PointconvDeepBn => pointconv_deep_bn_model,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Run SDF model",
    long_about = "Train and evaluate signed-distance-function regression\n\
		  models over point clouds.\n\
		  Training and validation folders hold one `.h5` file per\n\
		  example (`cloud`, `query`, `sdf`, `voxel` datasets)."
)]
pub struct RunArgs {
    #[arg(
        long = "learning_rate",
        default_value_t = 1e-5,
        help = "Initial learning rate"
    )]
    pub learning_rate: f32,

    #[arg(
        long,
        value_enum,
        default_value = "adam",
        help = "Optimizer to use [adam, momentum]"
    )]
    pub optimizer: SdfOptimizer,

    #[arg(
        long = "model_func",
        value_enum,
        required = true,
        help = "Model architecture to build",
        long_help = "Model architecture to build.\n\
		     Fully-connected variants: fc, fc_no_bn, fc_no_bn_dropout,\n\
		     fc_small, fc_small_no_bn.\n\
		     Point convolution variants: pointconv, pointconv_deep,\n\
		     pointconv_deep_bn."
    )]
    pub model_func: ModelKind,

    #[arg(
        long = "model_name",
        required = true,
        value_parser = clap::builder::NonEmptyStringValueParser::new(),
        help = "Model name for logging/saving"
    )]
    pub model_name: String,

    #[arg(
        long = "warm_start",
        default_value_t = false,
        help = "Continue training from the saved model of the given name"
    )]
    pub warm_start: bool,

    #[arg(long = "batch_size", default_value_t = 16, help = "Batch size to run")]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1000, help = "Epochs to run")]
    pub epochs: usize,

    #[arg(
        long = "epoch_start",
        default_value_t = 0,
        help = "If continuing a run, the epoch number to start at"
    )]
    pub epoch_start: usize,

    #[arg(
        long,
        default_value_t = false,
        conflicts_with = "testing",
        help = "If training this run"
    )]
    pub training: bool,

    #[arg(long, default_value_t = false, help = "If testing this run")]
    pub testing: bool,

    #[arg(
        long = "train_path",
        required = true,
        help = "Path to the training folder"
    )]
    pub train_path: PathBuf,

    #[arg(
        long = "validation_path",
        required = true,
        help = "Path to the validation folder"
    )]
    pub validation_path: PathBuf,

    #[arg(
        long = "pc_h5_file",
        help = "Path to a point cloud h5 bank; overrides per-example clouds"
    )]
    pub pc_h5_file: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 0.5,
        help = "Alpha for the loss tradeoff between voxel and SDF terms"
    )]
    pub alpha: f32,

    #[arg(
        long = "loss_function",
        value_enum,
        default_value = "mse",
        help = "Loss function to use"
    )]
    pub loss_function: SdfLoss,

    #[arg(
        long,
        default_value_t = false,
        help = "Extract a voxel grid from the saved model instead of training"
    )]
    pub voxelize: bool,

    #[arg(
        long = "sdf_count",
        default_value_t = 64,
        help = "Number of SDF points to run together for each example",
        long_help = "Number of SDF points to run together for each example.\n\
		     Points are randomly down sampled to this count."
    )]
    pub sdf_count: usize,

    #[arg(
        long,
        value_enum,
        default_value = "cpu",
        help = "Candle device to use for computation"
    )]
    pub device: ComputeDevice,

    #[arg(
        long = "device_no",
        default_value_t = 0,
        help = "For cuda or metal, choose a specific device"
    )]
    pub device_no: usize,

    #[arg(long, short, default_value_t = false, help = "Verbosity")]
    pub verbose: bool,
}

impl RunArgs {
    pub fn device(&self) -> anyhow::Result<candle_core::Device> {
        Ok(match self.device {
            ComputeDevice::Metal => candle_core::Device::new_metal(self.device_no)?,
            ComputeDevice::Cuda => candle_core::Device::new_cuda(self.device_no)?,
            _ => candle_core::Device::Cpu,
        })
    }

    /// the full immutable configuration handed to `run`
    pub fn to_run_config(
        &self,
        model_path: PathBuf,
        logs_path: PathBuf,
    ) -> anyhow::Result<RunConfig> {
        Ok(RunConfig {
            train_path: self.train_path.clone(),
            validation_path: self.validation_path.clone(),
            pc_h5_file: self.pc_h5_file.clone(),
            model_path,
            logs_path,
            batch_size: self.batch_size,
            epoch_start: self.epoch_start,
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            optimizer: self.optimizer,
            train: self.training || !self.testing,
            warm_start: self.warm_start,
            alpha: self.alpha,
            loss_function: self.loss_function,
            sdf_count: self.sdf_count,
            device: self.device()?,
            verbose: self.verbose,
        })
    }
}

/// folder holding the running binary; save/load/log paths are resolved
/// against it rather than the caller's working directory
pub fn program_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// create `model/<name>` and `logs/<name>`; existing folders are fine
pub fn prepare_run_dirs(base_dir: &Path, model_name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let model_path = base_dir.join("model").join(model_name);
    std::fs::create_dir_all(&model_path)
        .with_context(|| format!("creating model folder {:?}", model_path))?;

    let logs_path = base_dir.join("logs").join(model_name);
    std::fs::create_dir_all(&logs_path)
        .with_context(|| format!("creating logs folder {:?}", logs_path))?;

    Ok((model_path, logs_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "sdf-net",
            "--model_func",
            "pointconv",
            "--model_name",
            "test1",
            "--train_path",
            "./a",
            "--validation_path",
            "./b",
        ]
    }

    #[test]
    fn defaults_match_contract() {
        let args = RunArgs::try_parse_from(base_args()).unwrap();

        assert_eq!(args.learning_rate, 1e-5);
        assert_eq!(args.optimizer, SdfOptimizer::Adam);
        assert_eq!(args.model_func, ModelKind::Pointconv);
        assert_eq!(args.model_name, "test1");
        assert_eq!(args.batch_size, 16);
        assert_eq!(args.epochs, 1000);
        assert_eq!(args.epoch_start, 0);
        assert_eq!(args.alpha, 0.5);
        assert_eq!(args.loss_function, SdfLoss::Mse);
        assert_eq!(args.sdf_count, 64);
        assert!(args.pc_h5_file.is_none());
        assert!(!args.warm_start && !args.testing && !args.voxelize);
    }

    #[test]
    fn missing_required_flags_fail() {
        assert!(RunArgs::try_parse_from(["sdf-net"]).is_err());
        assert!(RunArgs::try_parse_from([
            "sdf-net",
            "--model_func",
            "fc",
            "--model_name",
            "m",
            "--train_path",
            "./a",
        ])
        .is_err());
    }

    #[test]
    fn unknown_model_func_rejected_at_parse() {
        let mut argv = base_args();
        argv[2] = "not_a_model";
        assert!(RunArgs::try_parse_from(argv).is_err());
    }

    #[test]
    fn empty_model_name_rejected() {
        let mut argv = base_args();
        argv[4] = "";
        assert!(RunArgs::try_parse_from(argv).is_err());
    }

    #[test]
    fn training_testing_switch() {
        let args = RunArgs::try_parse_from(base_args()).unwrap();
        assert!(!args.testing);

        let mut argv = base_args();
        argv.push("--training");
        let args = RunArgs::try_parse_from(argv).unwrap();
        assert!(!args.testing);

        let mut argv = base_args();
        argv.push("--testing");
        let args = RunArgs::try_parse_from(argv).unwrap();
        assert!(args.testing);

        let mut argv = base_args();
        argv.push("--training");
        argv.push("--testing");
        assert!(RunArgs::try_parse_from(argv).is_err());
    }

    #[test]
    fn eight_model_keys_resolve_to_distinct_factories() {
        let keys = [
            "fc",
            "fc_no_bn",
            "fc_no_bn_dropout",
            "fc_small",
            "fc_small_no_bn",
            "pointconv",
            "pointconv_deep",
            "pointconv_deep_bn",
        ];

        let mut seen = std::collections::HashSet::new();
        for key in keys {
            let kind = ModelKind::from_str(key, true).unwrap();
            seen.insert(kind.factory() as usize);
        }
        assert_eq!(seen.len(), keys.len());
    }

    #[test]
    fn config_mapping_from_flags() {
        let mut argv = base_args();
        argv.extend(["--testing", "--warm_start", "--batch_size", "4"]);
        let args = RunArgs::try_parse_from(argv).unwrap();

        let config = args
            .to_run_config(PathBuf::from("model/test1"), PathBuf::from("logs/test1"))
            .unwrap();
        assert!(!config.train);
        assert!(config.warm_start);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.model_path, PathBuf::from("model/test1"));
        assert_eq!(config.logs_path, PathBuf::from("logs/test1"));
    }

    #[test]
    fn run_dirs_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();

        let (model_path, logs_path) = prepare_run_dirs(tmp.path(), "toy").unwrap();
        assert!(model_path.is_dir());
        assert!(logs_path.is_dir());

        let (again_model, again_logs) = prepare_run_dirs(tmp.path(), "toy").unwrap();
        assert_eq!(model_path, again_model);
        assert_eq!(logs_path, again_logs);
    }
}
