#![allow(dead_code)]

use candle_core::{Result, Tensor};
use clap::ValueEnum;

/// Mean squared error per sample
///
/// loss(i) = mean_q [ x(i,q) - xhat(i,q) ]^2
///
/// * `x_nq` - target values
/// * `hat_nq` - predicted values
pub fn mse_loss(x_nq: &Tensor, hat_nq: &Tensor) -> Result<Tensor> {
    x_nq.sub(hat_nq)?.powf(2.)?.mean(x_nq.rank() - 1)
}

/// Mean absolute error per sample
pub fn l1_loss(x_nq: &Tensor, hat_nq: &Tensor) -> Result<Tensor> {
    x_nq.sub(hat_nq)?.abs()?.mean(x_nq.rank() - 1)
}

/// Huber loss per sample
///
/// |d| <= delta : 0.5 d^2, otherwise delta (|d| - 0.5 delta)
pub fn huber_loss(x_nq: &Tensor, hat_nq: &Tensor, delta: f64) -> Result<Tensor> {
    let d = x_nq.sub(hat_nq)?;
    let abs_d = d.abs()?;
    let quad = (d.powf(2.)? * 0.5)?;
    let lin = ((abs_d.clone() - 0.5 * delta)? * delta)?;
    abs_d.le(delta)?.where_cond(&quad, &lin)?.mean(d.rank() - 1)
}

/// Sigmoid cross-entropy over occupancy logits, stable form
///
/// loss(i) = mean_v [ relu(l) - l t + log(1 + exp(-|l|)) ]
///
/// * `logit_nv` - occupancy logits
/// * `label_nv` - occupancy labels in {0, 1}
pub fn occupancy_loss(logit_nv: &Tensor, label_nv: &Tensor) -> Result<Tensor> {
    let pos = logit_nv.relu()?;
    let log_term = (logit_nv.abs()?.neg()?.exp()? + 1.0)?.log()?;
    (pos - logit_nv.mul(label_nv)?)?
        .add(&log_term)?
        .mean(logit_nv.rank() - 1)
}

/// alpha-blended objective: occupancy vs. signed-distance regression
pub fn blended_loss(voxel_n: &Tensor, sdf_n: &Tensor, alpha: f64) -> Result<Tensor> {
    let voxel_term = (voxel_n * alpha)?;
    let sdf_term = (sdf_n * (1.0 - alpha))?;
    voxel_term + sdf_term
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum SdfLoss {
    Mse,
    L1,
    Huber,
}

impl SdfLoss {
    pub fn eval(&self, x_nq: &Tensor, hat_nq: &Tensor) -> Result<Tensor> {
        match self {
            SdfLoss::Mse => mse_loss(x_nq, hat_nq),
            SdfLoss::L1 => l1_loss(x_nq, hat_nq),
            SdfLoss::Huber => huber_loss(x_nq, hat_nq, 1.0),
        }
    }
}

impl std::fmt::Display for SdfLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SdfLoss::Mse => "mse",
            SdfLoss::L1 => "l1",
            SdfLoss::Huber => "huber",
        };
        write!(f, "{}", name)
    }
}
