use sdf_util::sdf_fc_model::*;
use sdf_util::sdf_loss_functions::*;
use sdf_util::sdf_model_traits::*;
use sdf_util::sdf_pointconv_deep_model::*;
use sdf_util::sdf_pointconv_model::*;
use sdf_util::sdf_voxel::grid_coordinates;

use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};

fn toy_inputs(n: usize, p: usize, q: usize) -> candle_core::Result<(Tensor, Tensor)> {
    let dev = Device::Cpu;
    let cloud = Tensor::randn(0f32, 1f32, (n, p, 3), &dev)?;
    let query = Tensor::randn(0f32, 1f32, (n, q, 3), &dev)?;
    Ok((cloud, query))
}

fn check_factory(factory: SdfModelFactory) -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let varmap = candle_nn::VarMap::new();
    let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &dev);

    let args = SdfModelArgs {
        voxel_resolution: 4,
    };
    let model = factory(&args, vb)?;
    assert_eq!(model.dim_voxel(), 64);

    let (n, p, q) = (2, 16, 5);
    let (cloud, query) = toy_inputs(n, p, q)?;

    for train in [true, false] {
        let pred = model.forward_t(&cloud, &query, train)?;
        assert_eq!(pred.sdf_nq.dims(), &[n, q]);
        assert_eq!(pred.voxel_logit_nv.dims(), &[n, model.dim_voxel()]);
    }
    Ok(())
}

#[test]
fn fc_models_forward() -> anyhow::Result<()> {
    let factories = [
        fc_model as SdfModelFactory,
        fc_no_bn_model,
        fc_no_bn_dropout_model,
        fc_small_model,
        fc_small_no_bn_model,
    ];
    for factory in factories {
        check_factory(factory)?;
    }
    Ok(())
}

#[test]
fn pointconv_models_forward() -> anyhow::Result<()> {
    let factories = [
        pointconv_model as SdfModelFactory,
        pointconv_deep_model,
        pointconv_deep_bn_model,
    ];
    for factory in factories {
        check_factory(factory)?;
    }
    Ok(())
}

#[test]
fn sdf_losses_behave() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::from_vec(vec![0f32, 1., -1., 2.], (2, 2), &dev)?;

    let zero = mse_loss(&x, &x)?.sum_all()?.to_scalar::<f32>()?;
    assert_relative_eq!(zero, 0.0, epsilon = 1e-6);

    let hat = (x.clone() + 0.5)?;

    for value in mse_loss(&x, &hat)?.to_vec1::<f32>()? {
        assert_relative_eq!(value, 0.25, epsilon = 1e-5);
    }
    for value in l1_loss(&x, &hat)?.to_vec1::<f32>()? {
        assert_relative_eq!(value, 0.5, epsilon = 1e-5);
    }
    // quadratic regime of the huber loss
    for value in huber_loss(&x, &hat, 1.0)?.to_vec1::<f32>()? {
        assert_relative_eq!(value, 0.125, epsilon = 1e-5);
    }

    // far outside the quadratic regime the huber loss is linear
    let far = (x.clone() + 10.0)?;
    for value in huber_loss(&x, &far, 1.0)?.to_vec1::<f32>()? {
        assert_relative_eq!(value, 9.5, epsilon = 1e-4);
    }
    Ok(())
}

#[test]
fn occupancy_loss_at_zero_logit() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let logit = Tensor::zeros((1, 4), DType::F32, &dev)?;
    let label = Tensor::zeros((1, 4), DType::F32, &dev)?;

    let loss = occupancy_loss(&logit, &label)?.to_vec1::<f32>()?;
    assert_relative_eq!(loss[0], std::f32::consts::LN_2, epsilon = 1e-5);
    Ok(())
}

#[test]
fn blended_loss_interpolates() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let voxel = Tensor::from_vec(vec![1f32, 1.], (2,), &dev)?;
    let sdf = Tensor::from_vec(vec![3f32, 3.], (2,), &dev)?;

    let blended = blended_loss(&voxel, &sdf, 0.5)?.to_vec1::<f32>()?;
    assert_relative_eq!(blended[0], 2.0, epsilon = 1e-6);

    let voxel_only = blended_loss(&voxel, &sdf, 1.0)?.to_vec1::<f32>()?;
    assert_relative_eq!(voxel_only[0], 1.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn grid_coordinates_cover_unit_cube() {
    let resolution = 4;
    let coordinates = grid_coordinates(resolution);
    assert_eq!(coordinates.len(), resolution * resolution * resolution * 3);

    for &coordinate in coordinates.iter() {
        assert!(coordinate > -0.5 && coordinate < 0.5);
    }

    // first cell center sits half a step inside the lower corner
    assert_relative_eq!(coordinates[0], -0.375, epsilon = 1e-6);
    assert_relative_eq!(coordinates[1], -0.375, epsilon = 1e-6);
    assert_relative_eq!(coordinates[2], -0.375, epsilon = 1e-6);
}
