use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use npy_volume::{
    InputSource, Processor, RenderSettings, RenderingPipeline, SurfaceTarget, Viewer, WGPU,
};

/// Render a .npy volume to PNG.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Local .npy file
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    file: Option<PathBuf>,

    /// URL of a .npy file
    #[arg(long)]
    url: Option<String>,

    /// Output image
    #[arg(short, long, default_value = "volume.png")]
    output: PathBuf,

    #[arg(long, default_value_t = 512)]
    width: u32,

    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Initial sample distance, overrides the config file
    #[arg(long)]
    sample_distance: Option<f32>,

    /// Further sample distances to re-render with, one image each
    #[arg(long, value_delimiter = ',')]
    sweep: Vec<f32>,

    /// Ray-cast on the GPU
    #[arg(long)]
    gpu: bool,

    /// JSON render settings
    #[arg(long)]
    config: Option<PathBuf>,
}

fn sweep_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("volume");
    let extension = output
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("png");
    output.with_file_name(format!("{stem}-{index}.{extension}"))
}

fn save_frame(viewer: &Viewer, path: &Path) -> Result<()> {
    let Some(frame) = viewer.session().and_then(|session| session.frame()) else {
        bail!("no frame has been rendered");
    };
    frame
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => RenderSettings::from_json_file(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?,
        None => RenderSettings::default(),
    };
    if let Some(distance) = args.sample_distance {
        settings.sample_distance = distance;
    }

    let processor = if args.gpu {
        Processor::GPU(WGPU::request().await?)
    } else {
        Processor::CPU
    };
    let pipeline = RenderingPipeline::new(settings, processor);
    let mut viewer = Viewer::new(pipeline, SurfaceTarget::new(args.width, args.height));

    let source = match (args.file, args.url) {
        (Some(path), _) => InputSource::File(path),
        (None, Some(url)) => InputSource::Url(url),
        (None, None) => bail!("either --file or --url is required"),
    };
    viewer
        .load(&source)
        .await
        .with_context(|| format!("failed to load {source:?}"))?;
    save_frame(&viewer, &args.output)?;

    for (index, distance) in args.sweep.iter().enumerate() {
        viewer.set_sample_distance(*distance)?;
        save_frame(&viewer, &sweep_path(&args.output, index + 1))?;
    }

    viewer.close();
    Ok(())
}
