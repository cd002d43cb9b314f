use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use quad2spine::{ConvertOptions, ProgressSink, QuadDocument, ResourcePool};
use tracing_subscriber::EnvFilter;

mod slicer;

use slicer::FsImageSlicer;

const IMAGES_DIR: &str = "images";

#[derive(Parser, Debug)]
#[command(name = "quad2spine", version)]
struct Cli {
    /// Log more (repeat for trace output). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a quad document to Spine JSON plus sliced images.
    Convert(ConvertArgs),
    /// Load and link a quad document and print a summary.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input quad JSON. Textures are read from `{stem}.{tex}.png` next to it.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output directory; defaults to the input's directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Multiply all quad coordinates and textures by this factor (>= 1).
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Repeat looping animations up to the longest bone track.
    #[arg(long = "loop", default_value_t = false)]
    looping: bool,

    /// Pretty-print the output JSON.
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Use the perspective transform for matrix-mix timelines.
    #[arg(long, default_value_t = false)]
    perspective_mix: bool,

    /// Maximum concurrent copies of one layer image.
    #[arg(long, default_value_t = ResourcePool::DEFAULT_CEILING)]
    pool_ceiling: usize,

    /// Replace an existing output JSON and images directory.
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Input quad JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Convert(args) => cmd_convert(args),
        Command::Inspect(args) => cmd_inspect(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str, percent: u8) {
        tracing::info!(percent, "{message}");
    }
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read quad document '{}'", path.display()))
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let input = read_input(&args.in_path)?;
    let stem = args
        .in_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .context("input path has no file name")?;
    let out_dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => args
            .in_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir '{}'", out_dir.display()))?;

    let json_path = out_dir.join(format!("{stem}.json"));
    let images_path = out_dir.join(IMAGES_DIR);
    if !args.overwrite {
        for existing in [&json_path, &images_path] {
            anyhow::ensure!(
                !existing.exists(),
                "'{}' already exists (pass --overwrite to replace it)",
                existing.display()
            );
        }
    }

    // Everything is written under a staging directory that is removed on drop unless the
    // conversion succeeds.
    let staging = tempfile::Builder::new()
        .prefix(".quad2spine-")
        .tempdir_in(&out_dir)
        .with_context(|| format!("create staging dir in '{}'", out_dir.display()))?;
    let staged_images = staging.path().join(IMAGES_DIR);
    std::fs::create_dir_all(&staged_images)
        .with_context(|| format!("create '{}'", staged_images.display()))?;

    let options = ConvertOptions {
        scale_factor: args.scale,
        looping: args.looping,
        pretty_print: args.pretty,
        images_path: format!("./{IMAGES_DIR}/"),
        pool_ceiling: args.pool_ceiling,
        perspective_mix: args.perspective_mix,
        threads: args.threads,
    };
    let slicer = Arc::new(FsImageSlicer::new(&args.in_path, &staged_images, args.scale));
    let json = quad2spine::convert_json(&input, &options, slicer, &TracingProgress)
        .with_context(|| format!("convert '{}'", args.in_path.display()))?;

    let staged_json = staging.path().join(format!("{stem}.json"));
    std::fs::write(&staged_json, json)
        .with_context(|| format!("write '{}'", staged_json.display()))?;

    publish(&staged_images, &images_path)?;
    publish(&staged_json, &json_path)?;

    eprintln!("wrote {}", json_path.display());
    Ok(())
}

/// Moves a staged file or directory into place, replacing what is there.
fn publish(staged: &Path, target: &Path) -> anyhow::Result<()> {
    if target.is_dir() {
        std::fs::remove_dir_all(target)
            .with_context(|| format!("remove old '{}'", target.display()))?;
    } else if target.exists() {
        std::fs::remove_file(target)
            .with_context(|| format!("remove old '{}'", target.display()))?;
    }
    std::fs::rename(staged, target)
        .with_context(|| format!("move '{}' to '{}'", staged.display(), target.display()))
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let input = read_input(&args.in_path)?;
    let doc = QuadDocument::from_json_slice(&input)
        .with_context(|| format!("load '{}'", args.in_path.display()))?;

    println!(
        "keyframes: {}  animations: {}  skeletons: {}  slots: {}  hitboxes: {}",
        doc.keyframes.len(),
        doc.animations.len(),
        doc.skeletons.len(),
        doc.slots.len(),
        doc.hitboxes.len()
    );
    for (i, skeleton) in doc.skeletons.iter().enumerate() {
        let data = quad2spine::combine(&doc, i, false)
            .with_context(|| format!("combine skeleton '{}'", skeleton.name))?;
        println!(
            "{}: {} bones, {} frames{}",
            skeleton.name,
            skeleton.bones.len(),
            data.end_frame,
            if data.is_mix { ", mix" } else { "" }
        );
    }
    Ok(())
}
