//! trocr-convert - Interactive converter from TrOCR checkpoints to TFLite.
//!
//! This binary is a thin layer over `trocr-core`: it checks the Python
//! toolchain, fills in a `PipelineConfig` from flags and prompts, runs the
//! pipeline, and renders progress while it works.

mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use trocr_core::{
    check_capabilities, format_size_mb, CapabilityReport, ConvertError, ModelChoice, Pipeline,
    PipelineConfig, PipelineOutcome, PipelineStage, ProgressTracker,
};

const EXIT_FAILURE: u8 = 1;
// Conventional exit code for a SIGINT-terminated process.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "trocr-convert")]
#[command(about = "Convert TrOCR checkpoints to mobile-deployable TFLite models")]
#[command(version)]
struct Args {
    /// Model to convert (skips the interactive menu)
    #[arg(short, long, value_enum)]
    model: Option<ModelArg>,

    /// Skip all prompts and proceed with defaults
    #[arg(short, long)]
    yes: bool,

    /// Python interpreter to run the export and conversion steps with
    #[arg(long, default_value = "python3")]
    python: String,

    /// Output path for the ONNX model
    #[arg(long, default_value = "trocr_model.onnx")]
    onnx_out: PathBuf,

    /// Intermediate SavedModel directory
    #[arg(long, default_value = "trocr_tf_model")]
    saved_model_dir: PathBuf,

    /// Output path for the TFLite model
    #[arg(long, default_value = "trocr_model.tflite")]
    tflite_out: PathBuf,

    /// Cache directory for downloaded checkpoints (defaults to the user cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    BaseHandwritten,
    BasePrinted,
    SmallHandwritten,
}

impl From<ModelArg> for ModelChoice {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::BaseHandwritten => ModelChoice::BaseHandwritten,
            ModelArg::BasePrinted => ModelChoice::BasePrinted,
            ModelArg::SmallHandwritten => ModelChoice::SmallHandwritten,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    // Toolchain gate: nothing is asked and nothing is downloaded when the
    // Python side cannot run the pipeline.
    match check_capabilities(&args.python).await {
        Ok(report) if report.all_present() => {}
        Ok(report) => {
            eprintln!("Missing required Python packages:");
            for capability in &report.missing {
                eprintln!("  - {capability}");
            }
            eprintln!("Install them with: {}", report.install_hint());
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_failure_hint(&e);
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    }

    // Model selection: flag wins, otherwise menu (or default with --yes).
    let model = match args.model {
        Some(arg) => arg.into(),
        None if args.yes => ModelChoice::default(),
        None => prompt::select_model()?,
    };

    println!("Selected model: {}", model.repo_id());
    if !args.yes && !prompt::confirm_continue()? {
        println!("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }

    let config = PipelineConfig {
        model,
        python: args.python,
        onnx_path: args.onnx_out,
        saved_model_dir: args.saved_model_dir,
        tflite_path: args.tflite_out,
        cache_dir: args.cache_dir,
    };

    let pipeline = Pipeline::new(config)?;

    let cancel_token = pipeline.cancel_token();
    ctrlc::set_handler(move || {
        cancel_token.cancel();
    })?;

    let render_task = tokio::spawn(render_progress(pipeline.progress()));
    let result = pipeline.run().await;
    render_task.abort();

    match result {
        Ok(outcome) => {
            report_outcome(&outcome);
            Ok(ExitCode::SUCCESS)
        }
        Err(ConvertError::Cancelled) => {
            eprintln!("Interrupted.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_failure_hint(&e);
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

/// Poll the shared tracker and print coarse progress transitions.
async fn render_progress(progress: Arc<ProgressTracker>) {
    let mut last_stage = PipelineStage::Idle;
    let mut last_file: Option<String> = None;
    let mut last_message: Option<String> = None;
    let mut interval = tokio::time::interval(Duration::from_millis(250));

    loop {
        interval.tick().await;
        let snapshot = progress.snapshot();

        if snapshot.stage != last_stage {
            println!("==> {}", snapshot.stage.label());
            last_stage = snapshot.stage;
            last_file = None;
        }

        if snapshot.stage == PipelineStage::Downloading && snapshot.current_file != last_file {
            if let Some(file) = &snapshot.current_file {
                match snapshot.total_bytes {
                    Some(total) => println!("    {} ({} MB)", file, format_size_mb(total)),
                    None => println!("    {file}"),
                }
            }
            last_file = snapshot.current_file.clone();
        }

        if snapshot.message != last_message {
            if let Some(message) = &snapshot.message {
                debug!("{}: {}", snapshot.stage.label(), message);
            }
            last_message = snapshot.message.clone();
        }
    }
}

fn report_outcome(outcome: &PipelineOutcome) {
    println!(
        "ONNX model: {} ({} MB)",
        outcome.onnx.path.display(),
        format_size_mb(outcome.onnx.size_bytes)
    );

    match &outcome.mobile {
        Some(mobile) => {
            println!(
                "TFLite model: {} ({} MB, via {})",
                mobile.path.display(),
                format_size_mb(mobile.size_bytes),
                mobile.backend
            );
        }
        None => {
            println!("TFLite conversion did not complete; the ONNX model was kept.");
            println!("Install onnx-tf and re-run to retry the mobile-format step:");
            println!("  pip install onnx-tf");
        }
    }
}

fn print_failure_hint(error: &ConvertError) {
    match error {
        ConvertError::MissingCapabilities { missing } => {
            let report = CapabilityReport {
                missing: missing.clone(),
            };
            eprintln!("Install the missing packages with: {}", report.install_hint());
        }
        ConvertError::PythonNotFound { exe } => {
            eprintln!("No usable interpreter at '{exe}'; pass one with --python.");
        }
        ConvertError::ExportFailed { .. } => {
            eprintln!("The encoder-decoder export path is fragile; upgrading torch and");
            eprintln!("transformers often resolves unsupported-operator failures.");
        }
        ConvertError::Network { .. } | ConvertError::DownloadFailed { .. } => {
            eprintln!("Check the network connection and re-run; completed downloads are cached.");
        }
        _ => {}
    }
}
