#![allow(dead_code)]

use crate::sdf_model_traits::*;
use crate::sdf_pointconv_model::*;

use candle_core::Result;
use candle_nn::VarBuilder;

/// Deep variant: wider feature lift and two self-convolutions at the cloud
/// points before the query convolution.
pub fn pointconv_deep_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(PointConvSdfModel::new(
        PointConvSdfArgs {
            feature_dims: &[3, 64, 128],
            self_channels: &[128, 128],
            conv_hidden: 32,
            conv_out: 128,
            head_hidden: &[256, 128, 64],
            batch_norm: false,
            bandwidth: 0.1,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}

/// Deep variant with batch-normalized feature lift and SDF head.
pub fn pointconv_deep_bn_model(args: &SdfModelArgs, vb: VarBuilder) -> Result<Box<dyn SdfModuleT>> {
    Ok(Box::new(PointConvSdfModel::new(
        PointConvSdfArgs {
            feature_dims: &[3, 64, 128],
            self_channels: &[128, 128],
            conv_hidden: 32,
            conv_out: 128,
            head_hidden: &[256, 128, 64],
            batch_norm: true,
            bandwidth: 0.1,
            voxel_resolution: args.voxel_resolution,
        },
        vb,
    )?))
}
