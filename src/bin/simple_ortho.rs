use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use simple_ortho::camera_model::{CameraModel, GenericModel};
use simple_ortho::config::Config;
use simple_ortho::io::{
    object_from_json, object_to_json, ortho_filename, read_dem, read_pose_file,
    read_source_image, write_ortho, PoseTable,
};
use simple_ortho::ortho::OrthoRectifier;
use simple_ortho::pose::Pose;
use simple_ortho::{Error, Result};

/// Orthorectify images with a known camera model and DEM.
#[derive(Parser)]
#[command(version, about, author)]
struct SimpleOrthoCli {
    /// source image file(s) or glob patterns, followed by the DEM file and the
    /// camera position and orientation file
    #[arg(num_args = 0.., value_name = "SRC_IM_FILE... DEM_FILE POS_ORI_FILE")]
    files: Vec<String>,

    /// write ortho image(s) to this directory (default: the source directory)
    #[arg(short, long)]
    ortho_dir: Option<PathBuf>,

    /// read the configuration from this JSON file
    #[arg(short, long)]
    read_conf: Option<PathBuf>,

    /// write the configuration to this JSON file and exit
    #[arg(short, long)]
    write_conf: Option<PathBuf>,

    /// logging level: 1=DEBUG, 2=INFO, 3=WARNING, 4=ERROR
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=4))]
    verbosity: u8,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        1 => "debug",
        2 => "info",
        3 => "warn",
        _ => "error",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn expand_sources(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if Path::new(pattern).exists() {
            paths.push(PathBuf::from(pattern));
            continue;
        }
        let matched: Vec<PathBuf> = glob(pattern)?.filter_map(|p| p.ok()).collect();
        if matched.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "source image {} does not exist",
                pattern
            )));
        }
        paths.extend(matched);
    }
    Ok(paths)
}

fn process_one(
    src_path: &Path,
    config: &Config,
    dem: &Arc<simple_ortho::dem::Dem>,
    poses: &PoseTable,
    ortho_dir: Option<&Path>,
    camera: &mut Option<GenericModel>,
) -> Result<()> {
    let start = Instant::now();
    let record = poses.get_for_path(src_path)?;
    let pose = Pose::new(record.position, record.opk_deg)?;
    let src = read_source_image(src_path, None)?;
    let im_size = (src.width() as u32, src.height() as u32);

    let model = match camera.take() {
        Some(c) if (c.intrinsics().width, c.intrinsics().height) == im_size => c,
        _ => {
            log::debug!("creating {} camera for {}x{}", config.camera.camera_type, im_size.0, im_size.1);
            config.camera.build(im_size, config.ortho.undistort)?
        }
    };
    let rectifier =
        OrthoRectifier::new(model.clone(), pose, Arc::clone(dem), config.ortho.clone())?;
    *camera = Some(model);

    let output = rectifier.process(&src)?;
    let dir = ortho_dir
        .map(Path::to_path_buf)
        .or_else(|| src_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let now = Instant::now();
    write_ortho(ortho_filename(src_path, dir), &output)?;
    log::debug!("write in {:.3}s", now.elapsed().as_secs_f64());
    log::info!(
        "orthorectified {} in {:.3}s",
        src_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run(cli: SimpleOrthoCli) -> Result<usize> {
    let config: Config = match &cli.read_conf {
        Some(path) => object_from_json(path)?,
        None => Config::default(),
    };
    config.ortho.validate()?;

    if let Some(path) = &cli.write_conf {
        object_to_json(path, &config)?;
        log::info!("wrote configuration to {}", path.display());
        return Ok(0);
    }

    if cli.files.len() < 3 {
        return Err(Error::InvalidConfig(
            "expected at least one source image, a DEM file and a pose file".to_string(),
        ));
    }
    let (sources, rest) = cli.files.split_at(cli.files.len() - 2);
    let (dem_file, pos_ori_file) = (Path::new(&rest[0]), Path::new(&rest[1]));
    for (what, path) in [("DEM", dem_file), ("camera position and orientation", pos_ori_file)] {
        if !path.exists() {
            return Err(Error::InvalidConfig(format!(
                "{} file {} does not exist",
                what,
                path.display()
            )));
        }
    }
    if let Some(dir) = &cli.ortho_dir {
        if !dir.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "ortho directory {} does not exist",
                dir.display()
            )));
        }
    }
    let sources = expand_sources(sources)?;
    let dem = Arc::new(read_dem(dem_file, config.ortho.dem_band)?);
    let poses = read_pose_file(pos_ori_file)?;
    log::info!(
        "processing {} image(s) with {} pose record(s)",
        sources.len(),
        poses.len()
    );

    let bar = ProgressBar::new(sources.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}") {
        bar.set_style(style);
    }
    let mut camera = None;
    let mut failed = 0;
    for src_path in &sources {
        bar.set_message(src_path.display().to_string());
        if let Err(e) = process_one(
            src_path,
            &config,
            &dem,
            &poses,
            cli.ortho_dir.as_deref(),
            &mut camera,
        ) {
            log::error!("{}: {}", src_path.display(), e);
            failed += 1;
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(failed)
}

fn main() -> ExitCode {
    let cli = SimpleOrthoCli::parse();
    init_logger(cli.verbosity);
    match run(cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            log::error!("{} image(s) failed", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
