use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faceverify_core::{
    CommandEngine, Interpretation, PipelineError, RawUpload, SessionStats, Verdict, Verifier,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::Config;

const EXIT_MATCH: u8 = 0;
const EXIT_NO_MATCH: u8 = 1;
const EXIT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "faceverify", about = "Check whether two photos show the same person")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two photos
    Verify {
        /// Photo of the first person
        first: PathBuf,
        /// Photo of the second person
        second: PathBuf,
        /// Print a JSON object instead of text
        #[arg(long)]
        json: bool,
    },
    /// Normalize one photo and report what would be sent to the engine
    Inspect {
        image: PathBuf,
    },
    /// Compare every pair in a manifest ("FIRST SECOND" per line, # for comments)
    Batch {
        manifest: PathBuf,
        /// Print one JSON object per pair plus a summary object
        #[arg(long)]
        json: bool,
    },
}

type SharedVerifier = Arc<Verifier<CommandEngine>>;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let engine = CommandEngine::from_command_line(&config.engine.command)
        .context("engine command is empty")?;
    let verifier: SharedVerifier = Arc::new(Verifier::new(engine, &config.pipeline));
    let timeout = Duration::from_secs(config.verify_timeout_secs.max(1));

    tracing::debug!(
        engine = %config.engine.command,
        max_size_mb = config.pipeline.max_size_mb,
        max_dimension = config.pipeline.max_dimension,
        temp_dir = %config.pipeline.temp_dir().display(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Verify { first, second, json } => {
            let (first, second) = (
                read_upload(&verifier, &first)?,
                read_upload(&verifier, &second)?,
            );
            let result = run_attempt(&verifier, first, second, timeout).await;
            render::result(&result, None, json);
            Ok(ExitCode::from(exit_status(&result)))
        }
        Commands::Inspect { image } => inspect(&verifier, &image),
        Commands::Batch { manifest, json } => {
            let text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read manifest {}", manifest.display()))?;
            let pairs = parse_manifest(&text)?;

            let mut stats = SessionStats::default();
            for (line, first, second) in pairs {
                let (first, second) = (
                    read_upload(&verifier, &first)?,
                    read_upload(&verifier, &second)?,
                );
                let result = run_attempt(&verifier, first, second, timeout).await;
                stats.record(&result);
                render::result(&result, Some(&line.to_string()), json);
            }
            render::session(&stats, json);

            Ok(if stats.failures > 0 {
                ExitCode::from(EXIT_FAILED)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

/// Run one attempt on the blocking pool and stop waiting after `timeout`.
///
/// A timed-out attempt keeps running until the engine returns and then
/// releases its own temp files; the runtime waits for it on shutdown.
async fn run_attempt(
    verifier: &SharedVerifier,
    first: RawUpload,
    second: RawUpload,
    timeout: Duration,
) -> Result<Interpretation, PipelineError> {
    let verifier = Arc::clone(verifier);
    let task = tokio::task::spawn_blocking(move || verifier.verify(&first, &second));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PipelineError::CriticalFailure {
            message: format!("verification task failed: {join_err}"),
        }),
        Err(_) => Err(PipelineError::CriticalFailure {
            message: format!("no engine answer within {}s", timeout.as_secs()),
        }),
    }
}

fn inspect(verifier: &SharedVerifier, path: &Path) -> Result<ExitCode> {
    let upload = read_upload(verifier, path)?;
    match verifier.normalizer().normalize(&upload) {
        Ok(image) => {
            println!("{}", path.display());
            println!("  source:      {}x{}", image.source_width, image.source_height);
            println!("  orientation: {}", image.orientation);
            let alpha = if image.flattened_alpha {
                "flattened onto white"
            } else {
                "none"
            };
            println!("  alpha:       {alpha}");
            println!("  canonical:   {}x{} RGB", image.width(), image.height());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::warn!(error = %err, file = %path.display(), "normalization failed");
            println!("{}: {err}", path.display());
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn read_upload(verifier: &SharedVerifier, path: &Path) -> Result<RawUpload> {
    RawUpload::from_path(path, verifier.normalizer().byte_limit()).with_context(|| format!("failed to read {}", path.display()))
}

fn exit_status(result: &Result<Interpretation, PipelineError>) -> u8 {
    match result {
        Ok(i) if i.verdict == Verdict::Match => EXIT_MATCH,
        Ok(_) => EXIT_NO_MATCH,
        Err(_) => EXIT_FAILED,
    }
}

/// Parse a batch manifest into `(line number, first, second)` triples.
fn parse_manifest(text: &str) -> Result<Vec<(usize, PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [first, second] = fields.as_slice() else {
            bail!("manifest line {}: expected two paths, got {}", idx + 1, fields.len());
        };
        pairs.push((idx + 1, PathBuf::from(*first), PathBuf::from(*second)));
    }
    Ok(pairs)
}
