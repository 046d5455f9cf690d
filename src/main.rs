//! OCR Lab - document type classification from scanned images
//!
//! Preprocesses an image, extracts its text through OCR and predicts the
//! document type with a confidence score.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ocr_lab::classify::{Classifier, Explanation};
use ocr_lab::config::{self, AppConfig, PreprocessingConfig};
use ocr_lab::pipeline::{Pipeline, PipelineReport};
use ocr_lab::storage;
use ocr_lab::vision::OcrBackend;

/// OCR Lab - classify document images
#[derive(Parser, Debug)]
#[command(name = "ocr-lab", version)]
#[command(about = "Extract text from document images and classify the document type")]
struct Args {
    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Lexicon file (.toml or .json) overriding the configured one
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify text given as an argument, a file, or on stdin
    Classify(TextInput),
    /// Show the per-type keyword scores behind a classification
    Explain(TextInput),
    /// Run images through preprocessing, OCR and classification
    Process {
        /// Images to process
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Text source to use instead of the configured one
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Skip image preprocessing
        #[arg(long)]
        no_preprocess: bool,
    },
    /// List the document types of the active lexicon
    Lexicon {
        /// Print the whole lexicon as TOML
        #[arg(long)]
        dump: bool,
    },
}

#[derive(clap::Args, Debug)]
struct TextInput {
    /// Text to classify; read from stdin when neither this nor --file is given
    text: Option<String>,

    /// Read the text from a file
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Tesseract,
    Sidecar,
}

impl From<BackendArg> for OcrBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Tesseract => OcrBackend::Tesseract,
            BackendArg::Sidecar => OcrBackend::Sidecar,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for --json
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_or_create_config(args.config.as_deref())?;
    if let Some(path) = &args.lexicon {
        config.classifier.lexicon_path = Some(path.clone());
    } else if config.classifier.lexicon_path.is_none() {
        config.classifier.lexicon_path = storage::user_lexicon_path();
    }

    if let Command::Process {
        backend,
        no_preprocess,
        ..
    } = &args.command
    {
        if let Some(backend) = backend {
            config.ocr.backend = (*backend).into();
        }
        if *no_preprocess {
            config.preprocessing = PreprocessingConfig::disabled();
        }
    }

    // A broken lexicon is fatal before any input is read
    let pipeline = Pipeline::from_config(&config)?;
    let classifier = pipeline.classifier();

    match args.command {
        Command::Classify(input) => {
            let text = read_text(&input)?;
            let result = classifier.classify(&text);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{} ({}%)", result.label, result.confidence_percent());
            }
        }
        Command::Explain(input) => {
            let text = read_text(&input)?;
            let explanation = classifier.explain(&text);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&explanation)?);
            } else {
                print_explanation(&explanation);
            }
        }
        Command::Process { images, .. } => {
            process_images(&pipeline, &images, args.json)?;
        }
        Command::Lexicon { dump } => {
            if dump {
                print!("{}", classifier.lexicon().to_toml_string()?);
            } else {
                print_lexicon(classifier);
            }
        }
    }

    Ok(())
}

/// Load configuration from `--config`, the per-user file, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_path) = storage::default_config_path() {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring invalid configuration {:?}: {:#}", config_path, e),
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Text from the argument, a file, or stdin
fn read_text(input: &TextInput) -> Result<String> {
    if let Some(text) = &input.text {
        return Ok(text.clone());
    }

    let bytes = match &input.file {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?,
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn process_images(pipeline: &Pipeline, images: &[PathBuf], json: bool) -> Result<()> {
    let mut reports = Vec::with_capacity(images.len());
    let mut failures = 0usize;

    for image in images {
        match pipeline.run(image) {
            Ok(report) => {
                if !json {
                    print_report(&report);
                }
                reports.push(report);
            }
            Err(e) => {
                error!("{:#}", e);
                failures += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images failed", failures, images.len());
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!(
        "{} ({}x{}, {})",
        report.image.display(),
        report.width,
        report.height,
        report.text_source
    );

    println!("  Preprocessing:");
    for step in &report.preprocessing {
        let status = if step.applied { "done" } else { "skipped" };
        println!(
            "    {:<14} {:<8} {:>7.2} ms  {}",
            step.step.to_string(),
            status,
            step.duration_ms,
            step.detail
        );
    }

    println!("  Extracted text:");
    if report.extracted_text.trim().is_empty() {
        println!("    (none)");
    } else {
        for line in report.extracted_text.lines() {
            println!("    {}", line);
        }
    }

    println!("  Prediction: {} ({}%)", report.result.label, report.confidence_percent);

    let budget_note = if report.over_budget { " (over budget)" } else { "" };
    println!("  Time: {} ms{}", report.timings.total_ms, budget_note);
}

fn print_explanation(explanation: &Explanation) {
    println!("Words: {}", explanation.word_count);
    for score in &explanation.scores {
        let matched: Vec<String> = score
            .matched
            .iter()
            .map(|hit| format!("{} x{}", hit.keyword, hit.count))
            .collect();
        println!(
            "  {:<16} hits {:>3}  score {:>7.2}  {}",
            score.document_type,
            score.hits,
            score.weighted_score,
            matched.join(", ")
        );
    }
    if explanation.tied {
        println!("Top score is tied; using the fallback label");
    }
    println!(
        "Prediction: {} ({}%)",
        explanation.result.label,
        explanation.result.confidence_percent()
    );
}

fn print_lexicon(classifier: &Classifier) {
    let lexicon = classifier.lexicon();
    println!("Fallback: {}", lexicon.fallback());
    for entry in lexicon.entries() {
        println!(
            "  {:<16} weight {:>4.2}  {} keywords",
            entry.document_type,
            entry.weight,
            entry.keywords.len()
        );
    }
    println!("Confidence steepness: {}", classifier.curve().steepness());
}
