mod run_args;

use crate::run_args::*;

use clap::Parser;
use log::info;
use sdf_util::sdf_train::run;
use sdf_util::sdf_voxel::extract_voxel;

fn main() -> anyhow::Result<()> {
    let args = RunArgs::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    // Save/load/log paths are anchored to the binary's own location.
    let base_dir = program_dir();
    let (model_path, logs_path) = prepare_run_dirs(&base_dir, &args.model_name)?;

    let get_model = args.model_func.factory();

    if args.voxelize {
        extract_voxel(get_model, &model_path, args.loss_function)?;
    } else {
        let config = args.to_run_config(model_path, logs_path)?;
        run(get_model, &config)?;
    }

    info!("Done");
    Ok(())
}
