// ----------------------------------- CLI -----------------------------------
use clap::Parser;

use mbir::utils::parse_triplet;
use mbir::weights::WeightType;

#[derive(Parser, Debug, Clone)]
#[command(name = "vcd", about = "Cone-beam reconstruction by Vectorized Coordinate Descent")]
pub struct Cli {
    /// TOML configuration file; the flags below override its solver settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of VCD iterations to perform
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Sinogram shape as views,rows,channels (used when no config file is given)
    #[arg(short, long, value_parser = parse_triplet::<usize>, default_value = "32,32,64")]
    pub sinogram_shape: (usize, usize, usize),

    /// Source-to-detector distance in ALU; 4x the channel count by default
    #[arg(long)]
    pub source_detector_dist: Option<f32>,

    /// Source-to-iso distance in ALU; half the source-detector distance by default
    #[arg(long)]
    pub source_iso_dist: Option<f32>,

    /// Weighting scheme for the data term
    #[arg(short, long, value_enum)]
    pub weight_type: Option<WeightType>,

    /// Clamp the reconstruction to non-negative values
    #[arg(long)]
    pub positivity: bool,

    /// Directory for raw output images
    #[arg(short, long, default_value = "data/out/vcd")]
    pub out_dir: PathBuf,

    /// Maximum number of rayon threads
    #[arg(short = 'j', long, default_value = "4")]
    pub num_threads: usize,
}

// --------------------------------------------------------------------------------

use std::fs::create_dir_all;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use mbir::config::vcd::{read_config_file, Config};
use mbir::io;
use mbir::phantom::gen_modified_shepp_logan;
use mbir::projector::forward_project;
use mbir::utils::timing::Progress;
use mbir::vcd;
use mbir::weights::gen_weights;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => config_from_flags(&args),
    };
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(weight_type) = args.weight_type {
        config.weight_type = weight_type;
    }
    if args.positivity {
        config.positivity = true;
    }

    // Set the maximum number of threads used by rayon for parallel iteration
    match rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global() {
        Err(e) => println!("{}", e),
        Ok(_) => println!("Using up to {} threads.", args.num_threads),
    }

    let model = config.build_model()?;
    let (views, det_rows, det_channels) = model.sinogram_shape().as_tuple();
    let (rows, cols, slices) = model.recon_shape().as_tuple();
    println!("Sinogram {views} x {det_rows} x {det_channels}, recon {rows} x {cols} x {slices}");

    let mut timer = Progress::new();

    timer.start("Generating phantom");
    let phantom = gen_modified_shepp_logan(model.recon_shape());
    timer.done();

    timer.start("Forward projecting phantom");
    let sinogram = forward_project(&model, &phantom)?;
    timer.done();

    timer.start("Generating weights");
    let peak = sinogram.iter().cloned().fold(f32::MIN, f32::max).max(1.0);
    let weights = gen_weights(&sinogram.mapv(|y| y / peak), config.weight_type);
    timer.done();

    create_dir_all(&args.out_dir)?;
    io::raw::write(phantom.iter().copied(), &args.out_dir.join("phantom.raw"))?;
    io::raw::write(sinogram.iter().copied(), &args.out_dir.join("sinogram.raw"))?;

    let options = config.vcd_options();
    let bar = ProgressBar::new(options.iterations as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} iteration {pos}/{len} {msg}")?);

    let (recon, rmse_history) =
        vcd::recon(&model, &sinogram, Some(&weights), &options, |status| {
            bar.set_message(format!("rmse {:9.3e}", status.rmse));
            bar.inc(1);
        })?;
    bar.finish();

    timer.done_with_message("Reconstruction finished");
    if let (Some(first), Some(last)) = (rmse_history.first(), rmse_history.last()) {
        println!("RMSE {first:9.3e} -> {last:9.3e} over {} iterations", rmse_history.len());
    }

    let recon_path = args.out_dir.join("recon.raw");
    io::raw::write(recon.iter().copied(), &recon_path)?;
    println!("Wrote {}", recon_path.display());

    Ok(())
}

fn config_from_flags(args: &Cli) -> Config {
    let (_, _, channels) = args.sinogram_shape;
    let source_detector_dist = args.source_detector_dist.unwrap_or(4.0 * channels as f32);
    let source_iso_dist = args.source_iso_dist.unwrap_or(source_detector_dist / 2.0);
    Config {
        iterations: 10,
        granularity: vec![1, 2, 8, 64],
        sinogram_shape: args.sinogram_shape,
        recon_shape: None,
        source_detector_dist,
        source_iso_dist,
        angles: None,
        delta_voxel: None,
        det_channel_offset: 0.0,
        det_row_offset: 0.0,
        det_rotation: 0.0,
        recon_slice_offset: 0.0,
        weight_type: WeightType::TransmissionRoot,
        positivity: false,
    }
}
