pub mod sdf_aux_layers;
pub mod sdf_data_loader;
pub mod sdf_dataset;
pub mod sdf_fc_model;
pub mod sdf_loss_functions;
pub mod sdf_model_traits;
pub mod sdf_pointconv_deep_model;
pub mod sdf_pointconv_model;
pub mod sdf_run_config;
pub mod sdf_train;
pub mod sdf_voxel;

pub use candle_core;
pub use candle_nn;
