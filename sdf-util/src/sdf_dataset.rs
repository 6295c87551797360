use anyhow::Context;
use hdf5::filters::blosc_set_nthreads;
use indicatif::ParallelProgressIterator;
use log::info;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MODEL_WEIGHT_FILE: &str = "model.safetensors";
pub const INPUT_CLOUD_FILE: &str = "input_cloud.h5";
pub const VOXEL_GRID_FILE: &str = "voxel_grid.h5";

const COMPRESSION_LEVEL: u8 = 3;
const MAX_CHUNK_SIZE: usize = 4096;

/// One training example read from an HDF5 file:
///
/// ```text
///     <name>.h5
///     ├── cloud (p x 3, conditioning point cloud)
///     ├── query (q x 3, SDF query coordinates)
///     ├── sdf   (q, signed distances at the queries)
///     └── voxel (v, flattened occupancy grid in {0, 1})
/// ```
pub struct SdfExample {
    pub name: String,
    pub cloud_p3: Array2<f32>,
    pub query_q3: Array2<f32>,
    pub sdf_q: Array1<f32>,
    pub voxel_v: Array1<f32>,
}

/// A folder of `*.h5` example files.
pub struct SdfDirectory {
    files: Vec<PathBuf>,
}

impl SdfDirectory {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading data folder {:?}", dir))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "h5").unwrap_or(false))
            .collect();
        files.sort();

        if files.is_empty() {
            anyhow::bail!("no .h5 example files under {:?}", dir);
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Load every example, taking clouds from the `bank` when provided.
    pub fn load_examples(&self, bank: Option<&PointCloudBank>) -> anyhow::Result<Vec<SdfExample>> {
        let njobs = self.files.len() as u64;
        self.files
            .par_iter()
            .progress_count(njobs)
            .map(|path| load_example(path, bank))
            .collect::<anyhow::Result<Vec<_>>>()
    }
}

pub fn load_example(path: &Path, bank: Option<&PointCloudBank>) -> anyhow::Result<SdfExample> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();

    let file = hdf5::File::open(path).with_context(|| format!("opening example {:?}", path))?;

    let cloud_p3 = match bank.and_then(|bank| bank.cloud(&name)) {
        Some(cloud) => cloud,
        None => file.dataset("cloud")?.read_2d::<f32>()?,
    };
    let query_q3 = file.dataset("query")?.read_2d::<f32>()?;
    let sdf_q = file.dataset("sdf")?.read_1d::<f32>()?;
    let voxel_v = file.dataset("voxel")?.read_1d::<f32>()?;

    if cloud_p3.nrows() == 0 || cloud_p3.ncols() != 3 {
        anyhow::bail!("bad cloud shape in {:?}", path);
    }
    if query_q3.nrows() == 0 || query_q3.ncols() != 3 || query_q3.nrows() != sdf_q.len() {
        anyhow::bail!("query/sdf mismatch in {:?}", path);
    }

    Ok(SdfExample {
        name,
        cloud_p3,
        query_q3,
        sdf_q,
        voxel_v,
    })
}

pub fn write_example(path: &Path, example: &SdfExample) -> anyhow::Result<()> {
    let file = hdf5::File::create(path)?;
    file.new_dataset::<f32>()
        .shape(example.cloud_p3.dim())
        .create("cloud")?
        .write(&example.cloud_p3)?;
    file.new_dataset::<f32>()
        .shape(example.query_q3.dim())
        .create("query")?
        .write(&example.query_q3)?;
    file.new_dataset::<f32>()
        .shape(example.sdf_q.len())
        .create("sdf")?
        .write(&example.sdf_q)?;
    file.new_dataset::<f32>()
        .shape(example.voxel_v.len())
        .create("voxel")?
        .write(&example.voxel_v)?;
    file.flush()?;
    Ok(())
}

/// Optional override bank (`--pc_h5_file`): one dataset per example name,
/// loaded eagerly so that example files can be visited in parallel.
pub struct PointCloudBank {
    clouds: HashMap<String, Array2<f32>>,
}

impl PointCloudBank {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file =
            hdf5::File::open(path).with_context(|| format!("opening point cloud bank {:?}", path))?;

        let mut clouds = HashMap::new();
        for name in file.member_names()? {
            let cloud = file.dataset(&name)?.read_2d::<f32>()?;
            clouds.insert(name, cloud);
        }

        info!("point cloud bank: {} clouds", clouds.len());
        Ok(Self { clouds })
    }

    pub fn cloud(&self, name: &str) -> Option<Array2<f32>> {
        self.clouds.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }
}

pub fn read_cloud(path: &Path) -> anyhow::Result<Array2<f32>> {
    let file = hdf5::File::open(path).with_context(|| format!("opening point cloud {:?}", path))?;
    Ok(file.dataset("cloud")?.read_2d::<f32>()?)
}

pub fn write_cloud(path: &Path, cloud_p3: &Array2<f32>) -> anyhow::Result<()> {
    let file = hdf5::File::create(path)?;
    file.new_dataset::<f32>()
        .shape(cloud_p3.dim())
        .create("cloud")?
        .write(cloud_p3)?;
    file.flush()?;
    Ok(())
}

pub fn write_cloud_bank(path: &Path, clouds: &[(String, Array2<f32>)]) -> anyhow::Result<()> {
    let file = hdf5::File::create(path)?;
    for (name, cloud) in clouds {
        file.new_dataset::<f32>()
            .shape(cloud.dim())
            .create(name.as_str())?
            .write(cloud)?;
    }
    file.flush()?;
    Ok(())
}

pub struct VoxelGrid {
    pub sdf: Vec<f32>,
    pub occupancy: Vec<u8>,
    pub resolution: usize,
}

pub fn write_voxel_grid(
    path: &Path,
    sdf_v: &[f32],
    occupancy_v: &[u8],
    resolution: usize,
) -> anyhow::Result<()> {
    {
        let num_threads = num_cpus::get(); // Gets the number of logical CPUs
        blosc_set_nthreads(num_threads as u8); // Set the number of threads for Blosc
    }

    let file = hdf5::File::create(path)?;
    let chunk_size = sdf_v.len().clamp(1, MAX_CHUNK_SIZE);

    file.new_dataset::<f32>()
        .shape(sdf_v.len())
        .chunk([chunk_size])
        .blosc_blosclz(COMPRESSION_LEVEL, true)
        .create("sdf")?
        .write(sdf_v)?;

    file.new_dataset::<u8>()
        .shape(occupancy_v.len())
        .chunk([chunk_size])
        .blosc_blosclz(COMPRESSION_LEVEL, true)
        .create("occupancy")?
        .write(occupancy_v)?;

    file.new_dataset::<u32>()
        .shape(1)
        .create("resolution")?
        .write(&[resolution as u32])?;

    file.flush()?;
    Ok(())
}

pub fn read_voxel_grid(path: &Path) -> anyhow::Result<VoxelGrid> {
    let file = hdf5::File::open(path).with_context(|| format!("opening voxel grid {:?}", path))?;
    let sdf = file.dataset("sdf")?.read_1d::<f32>()?.to_vec();
    let occupancy = file.dataset("occupancy")?.read_1d::<u8>()?.to_vec();
    let resolution = file.dataset("resolution")?.read_1d::<u32>()?.to_vec();

    Ok(VoxelGrid {
        sdf,
        occupancy,
        resolution: resolution.first().copied().unwrap_or(0) as usize,
    })
}

/// Randomly downsample rows to exactly `count`, repeating rows when the
/// input has fewer than `count`.
pub fn resample_rows(x_rc: &Array2<f32>, count: usize) -> Array2<f32> {
    let mut rng = rand::rng();
    let nrows = x_rc.nrows();
    let mut index: Vec<usize> = (0..nrows).collect();
    index.shuffle(&mut rng);

    let mut out = Array2::zeros((count, x_rc.ncols()));
    for j in 0..count {
        out.row_mut(j).assign(&x_rc.row(index[j % nrows]));
    }
    out
}

/// Randomly downsample query/SDF pairs to exactly `count` rows.
pub fn subsample_queries(example: &SdfExample, count: usize) -> (Array2<f32>, Array1<f32>) {
    let mut rng = rand::rng();
    let nqueries = example.query_q3.nrows();
    let mut index: Vec<usize> = (0..nqueries).collect();
    index.shuffle(&mut rng);

    let mut query = Array2::zeros((count, 3));
    let mut sdf = Array1::zeros(count);
    for j in 0..count {
        let i = index[j % nqueries];
        query.row_mut(j).assign(&example.query_q3.row(i));
        sdf[j] = example.sdf_q[i];
    }
    (query, sdf)
}
