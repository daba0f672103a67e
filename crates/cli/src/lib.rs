use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pano_editor_cache::{CacheConfig, ImageCache, ImageHandle};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pano-editor-cli")]
#[command(about = "Pano Editor image cache CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable image metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write the bounded preview as a PNG.
    Preview {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Longest side of the preview in pixels (overrides configuration).
        #[arg(long)]
        max_px: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a pyramid level as a PNG.
    Pyramid {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        level: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Warm the cache with the given files and print cache statistics.
    Stats {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    width: u32,
    height: u32,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    records: usize,
    memory_used: usize,
    hits: u64,
    misses: u64,
    loads: u64,
    derivations: u64,
    evictions: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Preview { file, max_px, output } => {
            run_preview(&file, max_px, output.as_deref())
        }
        Commands::Pyramid { file, level, output } => run_pyramid(&file, level, output.as_deref()),
        Commands::Stats { files } => run_stats(&files),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_image_exists(file)?;

    let cache = ImageCache::new(load_config()?);
    let image = cache.get_original(&logical_name(file)).context("failed to load image")?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        width: image.width(),
        height: image.height(),
        bytes: image.memory_size(),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn run_preview(file: &Path, max_px: Option<u32>, output: Option<&Path>) -> Result<()> {
    ensure_image_exists(file)?;

    let mut config = load_config()?;
    if let Some(px) = max_px {
        config = config.with_preview_max_px(px);
    }

    let cache = ImageCache::new(config);
    let preview = cache.get_preview(&logical_name(file)).context("failed to derive preview")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_output(file, "preview"));
    save_png(&preview, &output)?;

    println!("{}", output.display());

    Ok(())
}

fn run_pyramid(file: &Path, level: u32, output: Option<&Path>) -> Result<()> {
    ensure_image_exists(file)?;

    let cache = ImageCache::new(load_config()?);
    let image = cache
        .get_pyramid_level(&logical_name(file), level)
        .with_context(|| format!("failed to derive pyramid level {level}"))?;

    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_output(file, &format!("pyr{level}")));
    save_png(&image, &output)?;

    println!("{}", output.display());

    Ok(())
}

fn run_stats(files: &[PathBuf]) -> Result<()> {
    let cache = ImageCache::new(load_config()?);

    // Warm the cache the way the editor would: original plus preview.
    for file in files {
        ensure_image_exists(file)?;
        let name = logical_name(file);
        cache.get_original(&name).with_context(|| format!("failed to load {}", file.display()))?;
        cache.get_preview(&name).with_context(|| format!("failed to derive preview for {}", file.display()))?;
    }

    let stats = cache.stats();
    let payload = StatsOutput {
        records: stats.records,
        memory_used: stats.memory_used,
        hits: stats.hits,
        misses: stats.misses,
        loads: stats.loads,
        derivations: stats.derivations,
        evictions: stats.evictions,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn load_config() -> Result<CacheConfig> {
    let path = CacheConfig::default_config_file();
    if path.exists() {
        CacheConfig::from_file(&path)
            .with_context(|| format!("failed to read configuration {}", path.display()))
    } else {
        CacheConfig::from_env().context("invalid cache configuration in environment")
    }
}

fn logical_name(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

fn save_png(image: &ImageHandle, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    image
        .to_rgba()
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))
}

fn ensure_image_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_output(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("image");

    file.with_file_name(format!("{stem}-{suffix}.png"))
}
