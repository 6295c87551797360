#![allow(dead_code)]

use crate::sdf_dataset::*;

use candle_core::{Device, Tensor};
use rand::prelude::SliceRandom;
use rayon::prelude::*;

pub struct MinibatchData {
    pub cloud_np3: Tensor,
    pub query_nq3: Tensor,
    pub sdf_nq: Tensor,
    pub voxel_nv: Tensor,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData>;

    fn num_minibatch(&self) -> usize;

    fn num_examples(&self) -> usize;

    /// random minibatches resampled with replacement
    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;

    /// deterministic minibatches covering each example exactly once
    fn chunk_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// In-memory loader over loaded examples. Clouds are resampled to a fixed
/// point count and queries downsampled to `sdf_count` at construction time,
/// so rebuilding the loader re-jitters the query sets.
///
pub struct InMemorySdfData {
    cloud_data: Vec<Tensor>,
    query_data: Vec<Tensor>,
    sdf_data: Vec<Tensor>,
    voxel_data: Vec<Tensor>,

    shuffled_cloud: Option<Vec<Tensor>>,
    shuffled_query: Option<Vec<Tensor>>,
    shuffled_sdf: Option<Vec<Tensor>>,
    shuffled_voxel: Option<Vec<Tensor>>,

    minibatches: Minibatches,
}

pub struct InMemorySdfArgs<'a> {
    pub examples: &'a [SdfExample],
    pub sdf_count: usize,
    pub cloud_points: usize,
}

impl InMemorySdfData {
    pub fn from(args: InMemorySdfArgs) -> anyhow::Result<Self> {
        if args.examples.is_empty() {
            anyhow::bail!("no examples to load");
        }

        let dev = Device::Cpu;
        let nn = args.examples.len();

        let mut cloud_data = Vec::with_capacity(nn);
        let mut query_data = Vec::with_capacity(nn);
        let mut sdf_data = Vec::with_capacity(nn);
        let mut voxel_data = Vec::with_capacity(nn);

        for example in args.examples.iter() {
            let cloud = resample_rows(&example.cloud_p3, args.cloud_points);
            let (query, sdf) = subsample_queries(example, args.sdf_count);

            cloud_data.push(Tensor::from_vec(
                cloud.iter().copied().collect::<Vec<f32>>(),
                (1, args.cloud_points, 3),
                &dev,
            )?);
            query_data.push(Tensor::from_vec(
                query.iter().copied().collect::<Vec<f32>>(),
                (1, args.sdf_count, 3),
                &dev,
            )?);
            sdf_data.push(Tensor::from_vec(sdf.to_vec(), (1, args.sdf_count), &dev)?);
            voxel_data.push(Tensor::from_vec(
                example.voxel_v.to_vec(),
                (1, example.voxel_v.len()),
                &dev,
            )?);
        }

        let rows = (0..nn).collect();

        Ok(InMemorySdfData {
            cloud_data,
            query_data,
            sdf_data,
            voxel_data,
            shuffled_cloud: None,
            shuffled_query: None,
            shuffled_sdf: None,
            shuffled_voxel: None,
            minibatches: Minibatches {
                samples: rows,
                chunks: vec![],
            },
        })
    }

    pub fn dim_voxel(&self) -> anyhow::Result<usize> {
        let (_, v) = self.voxel_data[0].dims2()?;
        Ok(v)
    }

    /// preload minibatch tensors for the current chunk partition
    fn preload(&mut self) -> anyhow::Result<()> {
        self.shuffled_cloud = Some(gather_chunks(&self.minibatches, &self.cloud_data)?);
        self.shuffled_query = Some(gather_chunks(&self.minibatches, &self.query_data)?);
        self.shuffled_sdf = Some(gather_chunks(&self.minibatches, &self.sdf_data)?);
        self.shuffled_voxel = Some(gather_chunks(&self.minibatches, &self.voxel_data)?);
        Ok(())
    }
}

impl DataLoader for InMemorySdfData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData> {
        match (
            &self.shuffled_cloud,
            &self.shuffled_query,
            &self.shuffled_sdf,
            &self.shuffled_voxel,
        ) {
            (Some(cloud), Some(query), Some(sdf), Some(voxel)) => {
                if batch_idx >= cloud.len() {
                    return Err(anyhow::anyhow!(
                        "invalid index = {} vs. total # = {}",
                        batch_idx,
                        cloud.len()
                    ));
                }
                Ok(MinibatchData {
                    cloud_np3: cloud[batch_idx].to_device(target_device)?,
                    query_nq3: query[batch_idx].to_device(target_device)?,
                    sdf_nq: sdf[batch_idx].to_device(target_device)?,
                    voxel_nv: voxel[batch_idx].to_device(target_device)?,
                })
            }
            _ => Err(anyhow::anyhow!("need to shuffle data")),
        }
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn num_examples(&self) -> usize {
        self.cloud_data.len()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.shuffle_minibatch(batch_size);
        self.preload()
    }

    fn chunk_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.sequential_minibatch(batch_size);
        self.preload()
    }
}

fn gather_chunks(minibatches: &Minibatches, data: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
    minibatches
        .chunks
        .iter()
        .map(|samples| {
            let chunk: Vec<Tensor> = samples.iter().map(|&i| data[i].clone()).collect();
            Ok(Tensor::cat(&chunk, 0)?)
        })
        .collect()
}

///
/// A helper `struct` for shuffling and creating minibatch indexes; after
/// `shuffle_minibatch` or `sequential_minibatch` is called, `chunks`
/// partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn shuffle_minibatch(&mut self, batch_size: usize) {
        use rand_distr::{Distribution, Uniform};

        let batch_size = batch_size.max(1);

        let mut rng = rand::rng();
        self.samples.shuffle(&mut rng);
        let nbatch = (self.size() + batch_size) / batch_size;
        let ntot = nbatch * batch_size;

        let unif = Uniform::new(0, self.size()).expect("unif [0 .. size)");

        let indexes = (0..ntot)
            .into_par_iter()
            .map_init(rand::rng, |rng, _| unif.sample(rng))
            .collect::<Vec<usize>>();

        self.chunks = (0..nbatch)
            .map(|b| {
                let lb = b * batch_size;
                let ub = (b + 1) * batch_size;
                (lb..ub).map(|i| indexes[i]).collect()
            })
            .collect::<Vec<Vec<usize>>>();
    }

    pub fn sequential_minibatch(&mut self, batch_size: usize) {
        let batch_size = batch_size.max(1);
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}
