use crate::sdf_dataset::*;
use crate::sdf_loss_functions::SdfLoss;
use crate::sdf_model_traits::*;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use indicatif::ProgressBar;
use log::info;
use std::path::Path;

/// side length of the extracted grid spanning [-0.5, 0.5]^3
pub const VOXEL_GRID_RESOLUTION: usize = 32;

/// query points evaluated per forward pass
const GRID_CHUNK: usize = 4096;

/// Evaluate a trained model's SDF over a regular grid and write the
/// thresholded occupancy alongside the raw distances.
///
/// * `get_model` - architecture constructor selected by the CLI
/// * `model_path` - folder holding `model.safetensors` and `input_cloud.h5`
/// * `loss_function` - loss the model was trained with
pub fn extract_voxel(
    get_model: SdfModelFactory,
    model_path: &Path,
    loss_function: SdfLoss,
) -> anyhow::Result<()> {
    let device = Device::Cpu;
    let mut parameters = candle_nn::VarMap::new();
    let param_builder = candle_nn::VarBuilder::from_varmap(&parameters, DType::F32, &device);
    let model = get_model(&SdfModelArgs::default(), param_builder)?;

    let weight_file = model_path.join(MODEL_WEIGHT_FILE);
    if !weight_file.exists() {
        anyhow::bail!("no trained weights at {:?}", weight_file);
    }
    parameters
        .load(&weight_file)
        .with_context(|| format!("loading {:?}", weight_file))?;

    info!(
        "extracting voxel grid from {:?} (trained with {} loss)",
        weight_file, loss_function
    );

    let cloud = read_cloud(&model_path.join(INPUT_CLOUD_FILE))?;
    let npoints = cloud.nrows();
    let cloud_1p3 = Tensor::from_vec(
        cloud.iter().copied().collect::<Vec<f32>>(),
        (1, npoints, 3),
        &device,
    )?;

    let resolution = VOXEL_GRID_RESOLUTION;
    let coordinates = grid_coordinates(resolution);
    let total = resolution * resolution * resolution;

    let nchunks = (total + GRID_CHUNK - 1) / GRID_CHUNK;
    let pb = ProgressBar::new(nchunks as u64);

    let mut sdf_values = Vec::with_capacity(total);
    for chunk in coordinates.chunks(GRID_CHUNK * 3) {
        let nquery = chunk.len() / 3;
        let query_1q3 = Tensor::from_vec(chunk.to_vec(), (1, nquery, 3), &device)?;
        let pred = model.forward_t(&cloud_1p3, &query_1q3, false)?;
        sdf_values.extend(pred.sdf_nq.reshape(nquery)?.to_vec1::<f32>()?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let occupancy: Vec<u8> = sdf_values.iter().map(|&sdf| (sdf <= 0.0) as u8).collect();
    let noccupied = occupancy.iter().filter(|&&cell| cell == 1).count();

    let out_file = model_path.join(VOXEL_GRID_FILE);
    write_voxel_grid(&out_file, &sdf_values, &occupancy, resolution)?;

    info!("wrote {:?} ({} / {} occupied)", out_file, noccupied, total);
    Ok(())
}

/// cell-center coordinates of a `resolution`^3 grid over [-0.5, 0.5]^3,
/// x fastest
pub fn grid_coordinates(resolution: usize) -> Vec<f32> {
    let step = 1.0 / resolution as f32;
    let center = |i: usize| -0.5 + step * (i as f32 + 0.5);

    let mut out = Vec::with_capacity(resolution * resolution * resolution * 3);
    for k in 0..resolution {
        for j in 0..resolution {
            for i in 0..resolution {
                out.push(center(i));
                out.push(center(j));
                out.push(center(k));
            }
        }
    }
    out
}
