#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

/// Output of one forward pass: signed distances for each query point and
/// occupancy logits over the auxiliary voxel grid.
pub struct SdfPrediction {
    pub sdf_nq: Tensor,
    pub voxel_logit_nv: Tensor,
}

pub trait SdfModuleT {
    /// Evaluate signed distances at query coordinates, conditioned on a
    /// point cloud
    ///
    /// # Arguments
    /// * `cloud_np3` - conditioning point cloud (n x p x 3)
    /// * `query_nq3` - query coordinates (n x q x 3)
    /// * `train` - whether to use dropout/batchnorm or not
    ///
    /// # Returns `SdfPrediction`
    /// * `sdf_nq` - signed distances (n x q)
    /// * `voxel_logit_nv` - occupancy logits (n x v)
    fn forward_t(
        &self,
        cloud_np3: &Tensor,
        query_nq3: &Tensor,
        train: bool,
    ) -> Result<SdfPrediction>;

    fn dim_latent(&self) -> usize;

    /// number of cells in the auxiliary occupancy grid
    fn dim_voxel(&self) -> usize;
}

/// Knobs shared by every architecture constructor.
pub struct SdfModelArgs {
    pub voxel_resolution: usize,
}

impl Default for SdfModelArgs {
    fn default() -> Self {
        Self {
            voxel_resolution: 16,
        }
    }
}

/// Architecture constructors are interchangeable values selected by name in
/// the CLI layer.
pub type SdfModelFactory = fn(&SdfModelArgs, VarBuilder) -> Result<Box<dyn SdfModuleT>>;
