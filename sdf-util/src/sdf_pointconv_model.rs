#![allow(dead_code)]

use crate::sdf_aux_layers::*;
use crate::sdf_model_traits::*;

use candle_core::{Result, Tensor};
use candle_nn::{linear, ops, Linear, Module, VarBuilder};

/////////////////////////////////////////
// Density-weighted point convolutions //
/////////////////////////////////////////

/// Continuous convolution over an unordered point set: per-neighbor weights
/// come from a small network on relative offsets, and contributions are
/// normalized by a distance-kernel density estimate.
pub struct PointConvLayer {
    weight_net: FeedForward,
    project: Linear,
    bandwidth: f64,
}

impl PointConvLayer {
    /// Will create a new point convolution layer with these variables:
    /// * `weight.fc.{j}.*`
    /// * `project.weight`, `project.bias`
    pub fn new(
        c_in: usize,
        c_hidden: usize,
        c_out: usize,
        bandwidth: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight_net = feed_forward(
            FeedForwardArgs {
                dims: &[3, c_hidden, c_in],
                batch_norm: false,
                dropout: None,
            },
            vb.pp("weight"),
        )?;
        let project = linear(c_in, c_out, vb.pp("project"))?;

        Ok(Self {
            weight_net,
            project,
            bandwidth,
        })
    }

    /// * `cloud_np3` - support points (n x p x 3)
    /// * `feat_npc` - features attached to the support points (n x p x c)
    /// * `query_nq3` - output locations (n x q x 3)
    ///
    /// # Returns convolved features at the query locations (n x q x c_out)
    pub fn forward_t(
        &self,
        cloud_np3: &Tensor,
        feat_npc: &Tensor,
        query_nq3: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let rel_nqp3 = cloud_np3
            .unsqueeze(1)?
            .broadcast_sub(&query_nq3.unsqueeze(2)?)?;

        let w_nqpc = self.weight_net.forward_t(&rel_nqp3, train)?;

        let d2_nqp = rel_nqp3.powf(2.)?.sum(3)?;
        let kernel_nqp = ops::softmax(&(d2_nqp * (-1.0 / self.bandwidth))?, 2)?;

        let mixed = w_nqpc
            .broadcast_mul(&feat_npc.unsqueeze(1)?)?
            .broadcast_mul(&kernel_nqp.unsqueeze(3)?)?;

        self.project.forward(&mixed.sum(2)?)?.relu()
    }
}

/// SDF regression through point convolutions: a per-point feature lift,
/// optional self-convolutions at the cloud points, then one convolution
/// evaluated at the query locations feeding the SDF head. The cloud-resident
/// features are max-pooled for the occupancy head.
pub struct PointConvSdfModel {
    dim_latent: usize,
    dim_voxel: usize,
    feature_mlp: FeedForward,
    self_layers: Vec<PointConvLayer>,
    query_layer: PointConvLayer,
    sdf_head: FeedForward,
    voxel_head: Linear,
}

pub struct PointConvSdfArgs<'a> {
    pub feature_dims: &'a [usize],
    pub self_channels: &'a [usize],
    pub conv_hidden: usize,
    pub conv_out: usize,
    pub head_hidden: &'a [usize],
    pub batch_norm: bool,
    pub bandwidth: f64,
    pub voxel_resolution: usize,
}

impl PointConvSdfModel {
    pub fn new(args: PointConvSdfArgs, vb: VarBuilder) -> Result<Self> {
        let feature_mlp = feed_forward(
            FeedForwardArgs {
                dims: args.feature_dims,
                batch_norm: args.batch_norm,
                dropout: None,
            },
            vb.pp("features"),
        )?;

        let mut c = args.feature_dims[args.feature_dims.len() - 1];
        let mut self_layers = Vec::new();
        for (j, &c_out) in args.self_channels.iter().enumerate() {
            self_layers.push(PointConvLayer::new(
                c,
                args.conv_hidden,
                c_out,
                args.bandwidth,
                vb.pp(format!("conv.{}", j)),
            )?);
            c = c_out;
        }

        let query_layer = PointConvLayer::new(
            c,
            args.conv_hidden,
            args.conv_out,
            args.bandwidth,
            vb.pp("conv.query"),
        )?;

        let dim_latent = c;
        let dim_voxel = args.voxel_resolution.pow(3);

        let mut head_dims = vec![args.conv_out + 3];
        head_dims.extend_from_slice(args.head_hidden);
        head_dims.push(1);

        let sdf_head = feed_forward(
            FeedForwardArgs {
                dims: &head_dims,
                batch_norm: args.batch_norm,
                dropout: None,
            },
            vb.pp("sdf_head"),
        )?;

        let voxel_head = linear(dim_latent, dim_voxel, vb.pp("voxel"))?;

        Ok(Self {
            dim_latent,
            dim_voxel,
            feature_mlp,
            self_layers,
            query_layer,
            sdf_head,
            voxel_head,
        })
    }
}

impl SdfModuleT for PointConvSdfModel {
    fn forward_t(
        &self,
        cloud_np3: &Tensor,
        query_nq3: &Tensor,
        train: bool,
    ) -> Result<SdfPrediction> {
        let (n, p, _) = cloud_np3.dims3()?;
        let (_, q, _) = query_nq3.dims3()?;

        let mut feat_npc = self
            .feature_mlp
            .forward_t(&cloud_np3.reshape((n * p, 3))?, train)?
            .reshape((n, p, ()))?;

        for layer in self.self_layers.iter() {
            feat_npc = layer.forward_t(cloud_np3, &feat_npc, cloud_np3, train)?;
        }

        let g_nqc = self
            .query_layer
            .forward_t(cloud_np3, &feat_npc, query_nq3, train)?;

        let gq = Tensor::cat(&[&g_nqc, query_nq3], 2)?;
        let (_, _, c3) = gq.dims3()?;
        let sdf_nq = self
            .sdf_head
            .forward_t(&gq.reshape((n * q, c3))?, train)?
            .reshape((n, q))?;

        let z_nk = feat_npc.max(1)?;
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

pub fn pointconv_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(PointConvSdfModel::new(
        PointConvSdfArgs {
            feature_dims: &[3, 32, 64],
            self_channels: &[],
            conv_hidden: 16,
            conv_out: 64,
            head_hidden: &[128, 64],
            batch_norm: false,
            bandwidth: 0.1,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}
