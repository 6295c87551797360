use sdf_util::sdf_data_loader::*;
use sdf_util::sdf_dataset::*;
use sdf_util::sdf_train::cube_resolution;

use candle_core::Device;
use ndarray::{Array1, Array2};
use tempfile::tempdir;

fn toy_example(name: &str, p: usize, q: usize, v: usize) -> SdfExample {
    SdfExample {
        name: name.to_string(),
        cloud_p3: Array2::from_shape_fn((p, 3), |(i, j)| (i * 3 + j) as f32 * 0.01),
        query_q3: Array2::from_shape_fn((q, 3), |(i, j)| (i + j) as f32 * 0.1),
        sdf_q: Array1::from_shape_fn(q, |i| i as f32 * 0.05 - 0.1),
        voxel_v: Array1::from_shape_fn(v, |i| (i % 2) as f32),
    }
}

#[test]
fn example_files_round_trip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let example = toy_example("obj1", 10, 6, 8);

    let path = dir.path().join("obj1.h5");
    write_example(&path, &example)?;

    let back = load_example(&path, None)?;
    assert_eq!(back.name, "obj1");
    assert_eq!(back.cloud_p3, example.cloud_p3);
    assert_eq!(back.query_q3, example.query_q3);
    assert_eq!(back.sdf_q, example.sdf_q);
    assert_eq!(back.voxel_v, example.voxel_v);
    Ok(())
}

#[test]
fn directory_scan_finds_all_examples() -> anyhow::Result<()> {
    let dir = tempdir()?;
    for name in ["a", "b", "c"] {
        let path = dir.path().join(format!("{}.h5", name));
        write_example(&path, &toy_example(name, 8, 4, 8))?;
    }

    let scanned = SdfDirectory::open(dir.path())?;
    assert_eq!(scanned.len(), 3);

    let examples = scanned.load_examples(None)?;
    assert_eq!(examples.len(), 3);
    assert_eq!(examples[0].cloud_p3.nrows(), 8);
    Ok(())
}

#[test]
fn empty_directory_is_an_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    assert!(SdfDirectory::open(dir.path()).is_err());
    Ok(())
}

#[test]
fn bank_overrides_example_clouds() -> anyhow::Result<()> {
    let data_dir = tempdir()?;
    let bank_dir = tempdir()?;

    for name in ["a", "b"] {
        let path = data_dir.path().join(format!("{}.h5", name));
        write_example(&path, &toy_example(name, 8, 4, 8))?;
    }

    let bank_clouds: Vec<(String, Array2<f32>)> = ["a", "b"]
        .iter()
        .map(|name| {
            (
                name.to_string(),
                Array2::from_shape_fn((5, 3), |(i, j)| (i + j) as f32),
            )
        })
        .collect();
    let bank_path = bank_dir.path().join("bank.h5");
    write_cloud_bank(&bank_path, &bank_clouds)?;

    let bank = PointCloudBank::open(&bank_path)?;
    assert_eq!(bank.len(), 2);

    let examples = SdfDirectory::open(data_dir.path())?.load_examples(Some(&bank))?;
    for example in examples {
        assert_eq!(example.cloud_p3.nrows(), 5);
        assert_eq!(example.query_q3.nrows(), 4);
    }
    Ok(())
}

#[test]
fn resampling_hits_requested_counts() {
    let example = toy_example("x", 10, 6, 8);

    // downsample and pad-by-repeat
    assert_eq!(resample_rows(&example.cloud_p3, 4).dim(), (4, 3));
    assert_eq!(resample_rows(&example.cloud_p3, 25).dim(), (25, 3));

    let (query, sdf) = subsample_queries(&example, 3);
    assert_eq!(query.dim(), (3, 3));
    assert_eq!(sdf.len(), 3);
}

#[test]
fn loader_minibatch_shapes() -> anyhow::Result<()> {
    let examples: Vec<SdfExample> = (0..7)
        .map(|i| toy_example(&format!("e{}", i), 12, 9, 27))
        .collect();

    let mut loader = InMemorySdfData::from(InMemorySdfArgs {
        examples: &examples,
        sdf_count: 4,
        cloud_points: 6,
    })?;
    assert_eq!(loader.num_examples(), 7);
    assert_eq!(loader.dim_voxel()?, 27);

    loader.shuffle_minibatch(2)?;
    assert_eq!(loader.num_minibatch(), 4);

    let mb = loader.minibatch_data(0, &Device::Cpu)?;
    assert_eq!(mb.cloud_np3.dims(), &[2, 6, 3]);
    assert_eq!(mb.query_nq3.dims(), &[2, 4, 3]);
    assert_eq!(mb.sdf_nq.dims(), &[2, 4]);
    assert_eq!(mb.voxel_nv.dims(), &[2, 27]);
    Ok(())
}

#[test]
fn chunked_minibatches_cover_every_example_once() -> anyhow::Result<()> {
    let examples: Vec<SdfExample> = (0..7)
        .map(|i| toy_example(&format!("e{}", i), 12, 9, 27))
        .collect();

    let mut loader = InMemorySdfData::from(InMemorySdfArgs {
        examples: &examples,
        sdf_count: 4,
        cloud_points: 6,
    })?;
    loader.chunk_minibatch(2)?;
    assert_eq!(loader.num_minibatch(), 4);

    let total: usize = (0..loader.num_minibatch())
        .map(|b| {
            loader
                .minibatch_data(b, &Device::Cpu)
                .map(|mb| mb.cloud_np3.dims()[0])
                .unwrap_or(0)
        })
        .sum();
    assert_eq!(total, 7);
    Ok(())
}

#[test]
fn unshuffled_loader_refuses_minibatch() -> anyhow::Result<()> {
    let examples = vec![toy_example("only", 4, 4, 8)];
    let loader = InMemorySdfData::from(InMemorySdfArgs {
        examples: &examples,
        sdf_count: 2,
        cloud_points: 4,
    })?;
    assert!(loader.minibatch_data(0, &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn voxel_grid_round_trip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("voxel_grid.h5");

    let sdf: Vec<f32> = (0..27).map(|i| i as f32 * 0.1 - 1.0).collect();
    let occupancy: Vec<u8> = sdf.iter().map(|&s| (s <= 0.0) as u8).collect();
    write_voxel_grid(&path, &sdf, &occupancy, 3)?;

    let grid = read_voxel_grid(&path)?;
    assert_eq!(grid.resolution, 3);
    assert_eq!(grid.sdf.len(), 27);
    assert_eq!(grid.occupancy, occupancy);
    Ok(())
}

#[test]
fn cube_resolution_accepts_only_cubes() {
    assert_eq!(cube_resolution(27).unwrap(), 3);
    assert_eq!(cube_resolution(4096).unwrap(), 16);
    assert!(cube_resolution(10).is_err());
}
