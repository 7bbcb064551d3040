//! # Placard CLI
//!
//! Usage:
//!   placard --config layouts.json --request request.json -o card.png
//!   echo '{ ... }' | placard --config layouts.json --format jpeg -o card.jpg
//!   placard --config layouts.json --overlay 1080x1080=frame.png --request r.json
//!   placard --config layouts.json --catalog
//!   placard --example > layouts.json

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use placard::model::{ImageBytes, RenderRequest};
use placard::{AssetStoreBuilder, ErrorBody, OutputFormat, PlacardError};

/// Render layout-driven cards to PNG or JPEG.
#[derive(Parser, Debug)]
#[command(name = "placard", version, about)]
struct Cli {
    /// Layouts and sizes, as JSON.
    #[arg(long, required_unless_present = "example")]
    config: Option<PathBuf>,

    /// Render request JSON. Read from stdin when omitted.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Background image, replacing any background in the request.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Register a font file under an id. Repeatable.
    #[arg(long = "font", value_name = "ID=PATH", value_parser = parse_assignment)]
    fonts: Vec<(String, PathBuf)>,

    /// Register an overlay image for a size id. Repeatable.
    #[arg(long = "overlay", value_name = "SIZE=PATH", value_parser = parse_assignment)]
    overlays: Vec<(String, PathBuf)>,

    #[arg(long, default_value = "png", value_parser = parse_format)]
    format: OutputFormat,

    #[arg(short, long, default_value = "card.png")]
    output: PathBuf,

    /// Print the loaded layouts and their sizes as JSON and exit.
    #[arg(long)]
    catalog: bool,

    /// Print an example configuration and exit.
    #[arg(long)]
    example: bool,
}

fn parse_assignment(s: &str) -> Result<(String, PathBuf), String> {
    let (key, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PATH, got '{}'", s))?;
    if key.is_empty() || path.is_empty() {
        return Err(format!("expected KEY=PATH, got '{}'", s));
    }
    Ok((key.to_string(), PathBuf::from(path)))
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.example {
        print!("{}", include_str!("../demos/layouts.json"));
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<PlacardError>() {
                if let Ok(body) = serde_json::to_string(&ErrorBody::from(err)) {
                    eprintln!("{}", body);
                }
            }
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_ref().context("--config is required")?;
    let config = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;

    let mut builder = AssetStoreBuilder::from_json(&config)?;
    for (id, path) in &cli.fonts {
        let data = fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        builder = builder.font(id, data);
    }
    for (size, path) in &cli.overlays {
        let data =
            fs::read(path).with_context(|| format!("failed to read overlay {}", path.display()))?;
        builder = builder.overlay(size, data);
    }
    let store = builder.build()?;

    if cli.catalog {
        println!("{}", serde_json::to_string_pretty(&store.catalog())?);
        return Ok(());
    }

    let json = match &cli.request {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let mut request: RenderRequest = serde_json::from_str(&json).map_err(PlacardError::from)?;
    if let Some(path) = &cli.background {
        let data = fs::read(path)
            .with_context(|| format!("failed to read background {}", path.display()))?;
        request.background = Some(ImageBytes(data));
    }

    let started = Instant::now();
    let result = store.render(&request)?;
    for diagnostic in &result.diagnostics {
        log::warn!("{:?}", diagnostic);
    }

    let bytes = result.encode(cli.format)?;
    fs::write(&cli.output, &bytes)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    log::info!(
        "rendered {}@{} ({}x{}) in {:.1?}: {} bytes of {} written to {}",
        request.layout,
        request.size,
        result.width,
        result.height,
        started.elapsed(),
        bytes.len(),
        cli.format.content_type(),
        cli.output.display()
    );
    Ok(())
}
