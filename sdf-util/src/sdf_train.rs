use crate::sdf_data_loader::*;
use crate::sdf_dataset::*;
use crate::sdf_loss_functions::*;
use crate::sdf_model_traits::*;
use crate::sdf_run_config::*;

use anyhow::Context;
use candle_core::{DType, Tensor};
use candle_nn::{AdamW, Optimizer, SGD};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// clouds are resampled to this many points before batching
pub const DEFAULT_CLOUD_POINTS: usize = 256;

const TRAIN_SCORES_FILE: &str = "train_scores.tsv";
const TEST_SCORES_FILE: &str = "test_scores.tsv";
const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Train or evaluate an SDF model.
///
/// * `get_model` - architecture constructor selected by the CLI
/// * `config` - the full immutable run configuration
pub fn run(get_model: SdfModelFactory, config: &RunConfig) -> anyhow::Result<()> {
    let bank = match config.pc_h5_file.as_deref() {
        Some(path) => Some(PointCloudBank::open(path)?),
        None => None,
    };

    info!("scanning training data {:?}", config.train_path);
    let train_examples = SdfDirectory::open(&config.train_path)?.load_examples(bank.as_ref())?;

    info!("scanning validation data {:?}", config.validation_path);
    let valid_examples =
        SdfDirectory::open(&config.validation_path)?.load_examples(bank.as_ref())?;

    let dim_voxel = train_examples[0].voxel_v.len();
    for example in train_examples.iter().chain(valid_examples.iter()) {
        if example.voxel_v.len() != dim_voxel {
            anyhow::bail!("inconsistent voxel grid size in example {}", example.name);
        }
    }
    let voxel_resolution = cube_resolution(dim_voxel)?;

    info!(
        "{} training / {} validation examples, voxel grid {}^3",
        train_examples.len(),
        valid_examples.len(),
        voxel_resolution
    );

    let model_args = SdfModelArgs { voxel_resolution };
    let mut parameters = candle_nn::VarMap::new();
    let param_builder =
        candle_nn::VarBuilder::from_varmap(&parameters, DType::F32, &config.device);
    let model = get_model(&model_args, param_builder)?;

    let weight_file = config.model_path.join(MODEL_WEIGHT_FILE);
    if config.warm_start || !config.train {
        info!("loading weights from {:?}", weight_file);
        parameters
            .load(&weight_file)
            .with_context(|| format!("loading {:?}", weight_file))?;
    }

    if config.train {
        train_model(
            model.as_ref(),
            &parameters,
            config,
            &train_examples,
            &valid_examples,
        )
    } else {
        let (valid_sdf, valid_voxel) = validation_pass(model.as_ref(), config, &valid_examples)?;
        info!(
            "test scores: sdf {:.6} voxel {:.6}",
            valid_sdf, valid_voxel
        );

        let path = config.logs_path.join(TEST_SCORES_FILE);
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(&path).with_context(|| format!("creating {:?}", path))?,
        );
        writeln!(out, "valid_sdf\tvalid_voxel")?;
        writeln!(out, "{}\t{}", valid_sdf, valid_voxel)?;
        Ok(())
    }
}

///////////////////////
// training routines //
///////////////////////

struct TrainScores {
    train_loss: Vec<f32>,
    valid_sdf: Vec<f32>,
    valid_voxel: Vec<f32>,
}

impl TrainScores {
    fn new() -> Self {
        Self {
            train_loss: vec![],
            valid_sdf: vec![],
            valid_voxel: vec![],
        }
    }

    fn to_tsv(&self, path: &Path, epoch_start: usize) -> anyhow::Result<()> {
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {:?}", path))?,
        );
        writeln!(out, "epoch\ttrain_loss\tvalid_sdf\tvalid_voxel")?;
        for (j, ((train, sdf), voxel)) in self
            .train_loss
            .iter()
            .zip(self.valid_sdf.iter())
            .zip(self.valid_voxel.iter())
            .enumerate()
        {
            writeln!(out, "{}\t{}\t{}\t{}", epoch_start + j + 1, train, sdf, voxel)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct RunSummary {
    epochs: usize,
    epoch_start: usize,
    batch_size: usize,
    learning_rate: f32,
    optimizer: String,
    loss_function: String,
    alpha: f32,
    sdf_count: usize,
    num_train_examples: usize,
    num_validation_examples: usize,
    best_validation_loss: f32,
}

enum Optim {
    Adam(AdamW),
    Momentum(SGD),
}

impl Optim {
    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Optim::Adam(opt) => opt.backward_step(loss),
            Optim::Momentum(opt) => opt.backward_step(loss),
        }
    }
}

fn train_model(
    model: &dyn SdfModuleT,
    parameters: &candle_nn::VarMap,
    config: &RunConfig,
    train_examples: &[SdfExample],
    valid_examples: &[SdfExample],
) -> anyhow::Result<()> {
    let mut optim = match config.optimizer {
        SdfOptimizer::Adam => Optim::Adam(AdamW::new_lr(
            parameters.all_vars(),
            config.learning_rate as f64,
        )?),
        SdfOptimizer::Momentum => Optim::Momentum(SGD::new(
            parameters.all_vars(),
            config.learning_rate as f64,
        )?),
    };

    let total_epochs = config.epochs.saturating_sub(config.epoch_start);
    let pb = ProgressBar::new(total_epochs as u64);

    if config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut scores = TrainScores::new();
    let mut best_valid = f32::INFINITY;
    let weight_file = config.model_path.join(MODEL_WEIGHT_FILE);

    info!("Start training...");

    for epoch in config.epoch_start..config.epochs {
        // rebuilding the loader re-jitters query subsets each epoch
        let mut data_loader = InMemorySdfData::from(InMemorySdfArgs {
            examples: train_examples,
            sdf_count: config.sdf_count,
            cloud_points: DEFAULT_CLOUD_POINTS,
        })?;
        data_loader.shuffle_minibatch(config.batch_size)?;

        let mut loss_tot = 0f32;
        for b in 0..data_loader.num_minibatch() {
            let mb = data_loader.minibatch_data(b, &config.device)?;
            let pred = model.forward_t(&mb.cloud_np3, &mb.query_nq3, true)?;

            let sdf_term = config.loss_function.eval(&mb.sdf_nq, &pred.sdf_nq)?;
            let voxel_term = occupancy_loss(&pred.voxel_logit_nv, &mb.voxel_nv)?;
            let loss = blended_loss(&voxel_term, &sdf_term, config.alpha as f64)?.mean_all()?;

            optim.backward_step(&loss)?;
            loss_tot += loss.to_scalar::<f32>()?;
        }
        let train_loss = loss_tot / data_loader.num_minibatch() as f32;

        let (valid_sdf, valid_voxel) = validation_pass(model, config, valid_examples)?;

        scores.train_loss.push(train_loss);
        scores.valid_sdf.push(valid_sdf);
        scores.valid_voxel.push(valid_voxel);

        let valid_total = config.alpha * valid_voxel + (1.0 - config.alpha) * valid_sdf;
        if valid_total < best_valid {
            best_valid = valid_total;
            parameters
                .save(&weight_file)
                .with_context(|| format!("saving {:?}", weight_file))?;
        }

        pb.inc(1);
        if config.verbose {
            info!(
                "[{}] train: {:.6} valid sdf: {:.6} valid voxel: {:.6}",
                epoch + 1,
                train_loss,
                valid_sdf,
                valid_voxel
            );
        }
    }
    pb.finish_and_clear();

    scores.to_tsv(
        &config.logs_path.join(TRAIN_SCORES_FILE),
        config.epoch_start,
    )?;

    let summary = RunSummary {
        epochs: config.epochs,
        epoch_start: config.epoch_start,
        batch_size: config.batch_size,
        learning_rate: config.learning_rate,
        optimizer: config.optimizer.to_string(),
        loss_function: config.loss_function.to_string(),
        alpha: config.alpha,
        sdf_count: config.sdf_count,
        num_train_examples: train_examples.len(),
        num_validation_examples: valid_examples.len(),
        best_validation_loss: best_valid,
    };
    let summary_path = config.logs_path.join(RUN_SUMMARY_FILE);
    let out = std::fs::File::create(&summary_path)
        .with_context(|| format!("creating {:?}", summary_path))?;
    serde_json::to_writer_pretty(out, &summary)?;

    info!("done model training");
    Ok(())
}

fn validation_pass(
    model: &dyn SdfModuleT,
    config: &RunConfig,
    valid_examples: &[SdfExample],
) -> anyhow::Result<(f32, f32)> {
    let mut data_loader = InMemorySdfData::from(InMemorySdfArgs {
        examples: valid_examples,
        sdf_count: config.sdf_count,
        cloud_points: DEFAULT_CLOUD_POINTS,
    })?;
    data_loader.chunk_minibatch(config.batch_size)?;

    let mut sdf_tot = 0f32;
    let mut voxel_tot = 0f32;
    let nbatch = data_loader.num_minibatch();

    for b in 0..nbatch {
        let mb = data_loader.minibatch_data(b, &config.device)?;
        let pred = model.forward_t(&mb.cloud_np3, &mb.query_nq3, false)?;

        sdf_tot += config
            .loss_function
            .eval(&mb.sdf_nq, &pred.sdf_nq)?
            .mean_all()?
            .to_scalar::<f32>()?;
        voxel_tot += occupancy_loss(&pred.voxel_logit_nv, &mb.voxel_nv)?
            .mean_all()?
            .to_scalar::<f32>()?;
    }

    Ok((sdf_tot / nbatch as f32, voxel_tot / nbatch as f32))
}

/// grid side length of a flattened cube, or an error if not a cube
pub fn cube_resolution(dim_voxel: usize) -> anyhow::Result<usize> {
    let resolution = (dim_voxel as f64).cbrt().round() as usize;
    if resolution.pow(3) != dim_voxel {
        anyhow::bail!("voxel length {} is not a cubic grid", dim_voxel);
    }
    Ok(resolution)
}
