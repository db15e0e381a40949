use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use curb_contracts::config::BASELINE_OVERRIDE_ENV;
use curb_contracts::{ActionControls, BaselineConfig, EventWriter};
use curb_engine::generators::GeneratorRegistry;
use curb_engine::normalize::normalize_upload;
use curb_engine::results::ResultStore;
use curb_engine::{CurbEngine, DryrunGenerator, OctoAiGenerator, OutputLayout};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "curb-appeal",
    version,
    about = "Reimagine the outside of a house from one photo"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate landscaping variations of an uploaded house photo.
    Generate(GenerateArgs),
    /// Write the upright version of a photo.
    Normalize(NormalizeArgs),
    /// Print the effective baseline configuration.
    Baseline(BaselineArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GeneratorChoice {
    Octoai,
    Dryrun,
}

impl GeneratorChoice {
    fn name(self) -> &'static str {
        match self {
            Self::Octoai => "octoai",
            Self::Dryrun => "dryrun",
        }
    }
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    num_images: Option<u32>,
    #[arg(long)]
    grid_width: Option<u32>,
    #[arg(long)]
    strength: Option<f64>,
    #[arg(long, default_value = "sd_images")]
    out: PathBuf,
    #[arg(long)]
    per_action_dirs: bool,
    #[arg(long)]
    save_preview: bool,
    #[arg(long, value_enum, default_value_t = GeneratorChoice::Octoai)]
    generator: GeneratorChoice,
    #[arg(long)]
    baseline: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct BaselineArgs {
    #[arg(long)]
    baseline: Option<PathBuf>,
}

fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("curb-appeal error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Normalize(args) => run_normalize(args),
        Command::Baseline(args) => run_baseline(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let baseline = load_baseline(args.baseline.as_deref())?;
    let controls = resolve_controls(&baseline, &args);

    let mut generators = GeneratorRegistry::new();
    generators.register(DryrunGenerator);
    generators.register(
        OctoAiGenerator::from_env(&baseline.engine)?
            .with_token(args.token.clone())
            .with_api_base(args.api_base.clone()),
    );
    let layout = if args.per_action_dirs {
        OutputLayout::PerAction
    } else {
        OutputLayout::Overwrite
    };
    let engine = CurbEngine::new(
        baseline,
        generators,
        ResultStore::new(&args.out, layout),
        EventWriter::from_optional(args.events.clone()),
    )
    .with_preview(args.save_preview);

    let upload = args.image.as_deref().and_then(read_upload);
    match engine.generate(args.generator.name(), upload.as_deref(), &controls) {
        Ok(outcome) => {
            println!(
                "action {} (seed {}, {} image(s))",
                outcome.action_id,
                outcome.request.seed,
                outcome.images.len()
            );
            if let Some(path) = &outcome.preview_path {
                println!("original: {}", path.display());
            }
            for group in outcome.written_groups(controls.grid_columns()) {
                let row = group
                    .items
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("{row}");
            }
            Ok(0)
        }
        Err(err) => {
            tracing::debug!(kind = err.kind().as_str(), detail = err.message(), "action failed");
            eprintln!("{}", err.user_message());
            Ok(1)
        }
    }
}

fn run_normalize(args: NormalizeArgs) -> Result<i32> {
    let bytes =
        fs::read(&args.image).with_context(|| format!("failed reading {}", args.image.display()))?;
    let normalized = normalize_upload(&bytes)?;
    normalized.save_preview(&args.out)?;
    println!(
        "{} ({}x{}, orientation {}, rotated: {})",
        args.out.display(),
        normalized.width(),
        normalized.height(),
        normalized
            .orientation
            .map(|tag| tag.to_string())
            .unwrap_or_else(|| "none".to_string()),
        normalized.rotated
    );
    Ok(0)
}

fn run_baseline(args: BaselineArgs) -> Result<i32> {
    let baseline = load_baseline(args.baseline.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&baseline)?);
    Ok(0)
}

fn load_baseline(explicit: Option<&Path>) -> Result<BaselineConfig> {
    let overlay = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(BASELINE_OVERRIDE_ENV).map(PathBuf::from))
        .filter(|path| !path.as_os_str().is_empty());
    BaselineConfig::load(overlay.as_deref())
}

fn resolve_controls(baseline: &BaselineConfig, args: &GenerateArgs) -> ActionControls {
    let defaults = ActionControls::defaults(&baseline.controls);
    ActionControls {
        num_images: args.num_images.unwrap_or(defaults.num_images),
        grid_width: args.grid_width.unwrap_or(defaults.grid_width),
        strength: args.strength.unwrap_or(defaults.strength),
    }
}

/// An unreadable path counts as no upload at all.
fn read_upload(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read upload");
            None
        }
    }
}
