#![allow(dead_code)]

use crate::sdf_aux_layers::*;
use crate::sdf_model_traits::*;

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

///////////////////////////////////////////
// Fully-connected SDF regression models //
///////////////////////////////////////////

/// Per-point feed-forward lift, max-pooled into a global latent code; the
/// code is concatenated with each query coordinate and pushed through a
/// feed-forward SDF head. A linear head maps the same code to coarse
/// occupancy logits for the blended training objective.
pub struct FcSdfModel {
    dim_latent: usize,
    dim_voxel: usize,
    point_mlp: FeedForward,
    sdf_head: FeedForward,
    voxel_head: Linear,
}

pub struct FcSdfArgs<'a> {
    pub point_dims: &'a [usize],
    pub head_hidden: &'a [usize],
    pub batch_norm: bool,
    pub dropout: Option<f32>,
    pub voxel_resolution: usize,
}

impl FcSdfModel {
    /// Will create a new fully-connected SDF model with these variables:
    /// * `points.fc.{j}.*` (and `points.bn.{j}.*` with batch norm)
    /// * `sdf_head.fc.{j}.*`
    /// * `voxel.weight`, `voxel.bias`
    pub fn new(args: FcSdfArgs, vb: VarBuilder) -> Result<Self> {
        let dim_latent = args.point_dims[args.point_dims.len() - 1];
        let dim_voxel = args.voxel_resolution.pow(3);

        let point_mlp = feed_forward(
            FeedForwardArgs {
                dims: args.point_dims,
                batch_norm: args.batch_norm,
                dropout: None,
            },
            vb.pp("points"),
        )?;

        let mut head_dims = vec![dim_latent + 3];
        head_dims.extend_from_slice(args.head_hidden);
        head_dims.push(1);

        let sdf_head = feed_forward(
            FeedForwardArgs {
                dims: &head_dims,
                batch_norm: args.batch_norm,
                dropout: args.dropout,
            },
            vb.pp("sdf_head"),
        )?;

        let voxel_head = linear(dim_latent, dim_voxel, vb.pp("voxel"))?;

        Ok(Self {
            dim_latent,
            dim_voxel,
            point_mlp,
            sdf_head,
            voxel_head,
        })
    }

    /// max-pool per-point features into one latent code per cloud
    fn encode(&self, cloud_np3: &Tensor, train: bool) -> Result<Tensor> {
        let (n, p, _) = cloud_np3.dims3()?;
        let h = self
            .point_mlp
            .forward_t(&cloud_np3.reshape((n * p, 3))?, train)?;
        h.reshape((n, p, self.dim_latent))?.max(1)
    }
}

impl SdfModuleT for FcSdfModel {
    fn forward_t(
        &self,
        cloud_np3: &Tensor,
        query_nq3: &Tensor,
        train: bool,
    ) -> Result<SdfPrediction> {
        let (n, q, _) = query_nq3.dims3()?;
        let k = self.dim_latent;

        let z_nk = self.encode(cloud_np3, train)?;

        let z_nqk = z_nk.unsqueeze(1)?.expand((n, q, k))?.contiguous()?;
        let zq = Tensor::cat(&[&z_nqk, query_nq3], 2)?.reshape((n * q, k + 3))?;
        let sdf_nq = self.sdf_head.forward_t(&zq, train)?.reshape((n, q))?;

        let voxel_logit_nv = self.voxel_head.forward(&z_nk)?;

        Ok(SdfPrediction {
            sdf_nq,
            voxel_logit_nv,
        })
    }

    fn dim_latent(&self) -> usize {
        self.dim_latent
    }

    fn dim_voxel(&self) -> usize {
        self.dim_voxel
    }
}

///////////////////////////////////
// named architecture factories  //
///////////////////////////////////

pub fn fc_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(FcSdfModel::new(
        FcSdfArgs {
            point_dims: &[3, 64, 128, 256],
            head_hidden: &[256, 128],
            batch_norm: true,
            dropout: None,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}

pub fn fc_no_bn_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(FcSdfModel::new(
        FcSdfArgs {
            point_dims: &[3, 64, 128, 256],
            head_hidden: &[256, 128],
            batch_norm: false,
            dropout: None,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}

pub fn fc_no_bn_dropout_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(FcSdfModel::new(
        FcSdfArgs {
            point_dims: &[3, 64, 128, 256],
            head_hidden: &[256, 128],
            batch_norm: false,
            dropout: Some(0.2),
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}

pub fn fc_small_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(FcSdfModel::new(
        FcSdfArgs {
            point_dims: &[3, 64, 128],
            head_hidden: &[64],
            batch_norm: true,
            dropout: None,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}

pub fn fc_small_no_bn_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(FcSdfModel::new(
        FcSdfArgs {
            point_dims: &[3, 64, 128],
            head_hidden: &[64],
            batch_norm: false,
            dropout: None,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}
