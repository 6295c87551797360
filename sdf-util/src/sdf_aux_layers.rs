#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{
    batch_norm, linear, Activation, BatchNorm, Dropout, Linear, Module, ModuleT, VarBuilder,
};

/// build a stack of alternating `Linear`, normalization, and activation
/// layers; the final layer stays linear
pub struct FeedForward {
    dim_in: usize,
    dim_out: usize,
    layers: Vec<Linear>,
    norms: Vec<Option<BatchNorm>>,
    activations: Vec<Option<Activation>>,
    dropout: Option<Dropout>,
}

impl FeedForward {
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = input.clone();
        for (j, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if let Some(norm) = &self.norms[j] {
                x = norm.forward_t(&x, train)?;
            }
            if let Some(activation) = &self.activations[j] {
                x = activation.forward(&x)?;
                if let Some(dropout) = &self.dropout {
                    x = dropout.forward(&x, train)?;
                }
            }
        }
        Ok(x)
    }

    pub fn dim_in(&self) -> usize {
        self.dim_in
    }

    pub fn dim_out(&self) -> usize {
        self.dim_out
    }
}

pub struct FeedForwardArgs<'a> {
    pub dims: &'a [usize],
    pub batch_norm: bool,
    pub dropout: Option<f32>,
}

/// Build a feed-forward stack from consecutive layer widths with these
/// variables:
/// * `fc.{j}.weight`, `fc.{j}.bias`
/// * `bn.{j}.*` when batch normalization is requested
pub fn feed_forward(args: FeedForwardArgs, vb: VarBuilder) -> Result<FeedForward> {
    debug_assert!(args.dims.len() >= 2);

    let mut layers = Vec::new();
    let mut norms = Vec::new();
    let mut activations = Vec::new();

    for j in 0..(args.dims.len() - 1) {
        let (d_in, d_out) = (args.dims[j], args.dims[j + 1]);
        let is_last = j + 2 == args.dims.len();

        layers.push(linear(d_in, d_out, vb.pp(format!("fc.{}", j)))?);

        if args.batch_norm && !is_last {
            norms.push(Some(batch_norm(d_out, 1e-5, vb.pp(format!("bn.{}", j)))?));
        } else {
            norms.push(None);
        }

        activations.push(if is_last {
            None
        } else {
            Some(Activation::Relu)
        });
    }

    Ok(FeedForward {
        dim_in: args.dims[0],
        dim_out: args.dims[args.dims.len() - 1],
        layers,
        norms,
        activations,
        dropout: args.dropout.map(Dropout::new),
    })
}
