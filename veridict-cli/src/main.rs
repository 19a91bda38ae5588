//! Veridict CLI — command-line front end for the fact-checking pipeline.
//!
//! Takes a claim, question, or article (inline or from a file), runs the
//! five-stage pipeline, and prints a human-readable verdict; the full
//! assessment and run state can be written out as JSON.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use veridict_core::brain::{LlmClient, LlmTransport, OpenAiCompatTransport};
use veridict_core::prompts::{TASK_KEYS, TemplateLibrary};
use veridict_core::web::{HttpFetcher, SerperSearch};
use veridict_core::{OverallAssessment, PipelineConfig, PipelineDriver, ResearchState};

/// Veridict: evidence-backed claim verification
#[derive(Parser, Debug)]
#[command(name = "veridict", version, about, long_about = None)]
struct Cli {
    /// Claim, question, or article text to verify
    input: Option<String>,

    /// Read the input from a file instead
    #[arg(short, long, conflicts_with = "input")]
    file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the full assessment as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Persist the run state (claims, evidence, queries) to this path
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "veridict", "veridict")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "veridict.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let input = match (&cli.input, &cli.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading input file {}", path.display()))?,
        (None, None) => anyhow::bail!("provide input text or --file <PATH>"),
    };

    let config_path = cli
        .config
        .clone()
        .or_else(|| PipelineConfig::default_path().filter(|p| p.exists()));
    let config = PipelineConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    let mut templates = TemplateLibrary::with_defaults();
    if let Some(dir) = &config.llm.template_dir {
        let loaded = templates
            .load_overrides(dir)
            .with_context(|| format!("loading template overrides from {}", dir.display()))?;
        tracing::info!(loaded, dir = %dir.display(), "Loaded template overrides");
    }

    let openai = OpenAiCompatTransport::new(
        "openai",
        config.llm.base_url.clone(),
        std::env::var("OPENAI_API_KEY").ok(),
    );
    if !openai.has_credentials() {
        anyhow::bail!("OPENAI_API_KEY is not set");
    }
    let serper_key =
        std::env::var("SERPER_API_KEY").context("SERPER_API_KEY is not set")?;

    let llm = Arc::new(LlmClient::new(
        Arc::new(templates),
        vec![Arc::new(openai)],
        config.llm.clone(),
    ));
    llm.check_templates(TASK_KEYS)
        .map_err(|e| anyhow::anyhow!("Template check failed: {e}"))?;

    let driver = PipelineDriver::new(
        llm,
        Arc::new(SerperSearch::new(serper_key, 8)),
        Arc::new(HttpFetcher::new()),
        config,
    );

    let (assessment, state) = driver.run(&input).await?;

    if !cli.quiet {
        print_assessment(&assessment, &state);
    }
    if let Some(path) = &cli.output {
        std::fs::write(path, serde_json::to_string_pretty(&assessment)?)
            .with_context(|| format!("writing assessment to {}", path.display()))?;
        eprintln!("Assessment written to {}", path.display());
    }
    if let Some(path) = &cli.save_state {
        state
            .save(path)
            .with_context(|| format!("saving run state to {}", path.display()))?;
        eprintln!("Run state written to {}", path.display());
    }

    Ok(())
}

fn print_assessment(assessment: &OverallAssessment, state: &ResearchState) {
    println!();
    println!("{}", assessment.narrative.headline);
    println!(
        "Verdict: {:?} ({:.0}% true, confidence {:.2})",
        assessment.label, assessment.truth_percentage, assessment.confidence
    );
    println!();
    println!("{}", assessment.narrative.evidence_summary);

    if assessment.multi_boundary {
        println!();
        println!("Evidence split across {} frames:", assessment.boundaries.len());
        for boundary in &assessment.boundaries {
            println!(
                "  - {} ({} evidence items)",
                boundary.name, boundary.evidence_count
            );
        }
    }

    println!();
    println!("Claims:");
    for verdict in &assessment.verdicts {
        let contested = if verdict.contested { " [contested]" } else { "" };
        println!(
            "  {} {:?} {:.0}% (confidence {:.2}){}",
            verdict.claim_id,
            verdict.label,
            verdict.truth_percentage,
            verdict.confidence,
            contested
        );
    }

    if !assessment.narrative.key_findings.is_empty() {
        println!();
        println!("Key findings:");
        for finding in &assessment.narrative.key_findings {
            println!("  - {finding}");
        }
    }

    if !state.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &state.warnings {
            println!("  [{:?}] {}", warning.severity, warning.message);
        }
    }

    println!();
    if assessment.gates.passed {
        println!(
            "Quality gates passed ({} of {} verdicts publishable).",
            assessment.gates.gate4.publishable,
            assessment.verdicts.len()
        );
    } else {
        println!("Quality gates FAILED; treat this assessment as unreliable.");
    }
    println!("{}", assessment.narrative.limitations);
}
