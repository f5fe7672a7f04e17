//! APC Insight - threshold alerting with retrieval-augmented explanations
//!
//! # Usage
//!
//! ```bash
//! # Enrich every violation of the configured APC into the JSON report
//! apc-insight enrich
//!
//! # List violations only (no network)
//! apc-insight violations
//!
//! # Export the normalized gain map
//! apc-insight gains --out reports/gains.json
//!
//! # Ask an ad-hoc question against the search index
//! apc-insight ask "Why is the bin level above maximum?"
//! ```
//!
//! # Environment Variables
//!
//! - `APC_INSIGHT_CONFIG`: Path to a TOML config file
//! - `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_KEY`: Search index access
//! - `OPENAI_API_KEY`: OpenAI completions
//! - `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_KEY`, `AZURE_OPENAI_DEPLOYMENT`:
//!   Azure OpenAI completions
//! - `RUST_LOG`: Logging level (default: info)
//!
//! A `.env` file in the working directory is loaded first.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use apc_insight::acquisition::{gain_map_records, load_and_filter_with, load_gain_map};
use apc_insight::config::{AppConfig, LlmProvider, SearchProvider, Secrets};
use apc_insight::context::{AzureSearchRetriever, ContextRetriever, LocalRetriever};
use apc_insight::detection::detect_violations;
use apc_insight::llm::{ChatCompletionsBackend, CompletionBackend, Provider};
use apc_insight::pipeline::{AnswerSettings, Enricher, RagAnswerer, ReportWriter};
use apc_insight::types::{GainMapEntry, ViolationRecord};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "apc-insight")]
#[command(
    about = "Threshold-violation alerting with retrieval-augmented explanations for APC telemetry"
)]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides APC_INSIGHT_CONFIG and ./apc_insight.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Detect violations and write the enriched alert report
    Enrich {
        /// Start the report from an empty array (default)
        #[arg(long, overrides_with = "no_reset")]
        reset: bool,
        /// Append to the existing report instead of resetting it
        #[arg(long, overrides_with = "reset")]
        no_reset: bool,
        /// Violations processed at once
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Print the violation messages without contacting any backend
    Violations,

    /// Write the normalized gain map as JSON
    Gains {
        /// Output file
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },

    /// Answer one question from the search index
    Ask {
        /// Question text
        question: String,
    },
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) => AppConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display()))?,
        None => AppConfig::load(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn build_retriever(config: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn ContextRetriever>> {
    match config.search.provider {
        SearchProvider::Azure => {
            if config.search.endpoint.is_empty() {
                bail!("search.endpoint is not set (config file or AZURE_SEARCH_ENDPOINT)");
            }
            let key = secrets
                .search_key
                .as_deref()
                .context("AZURE_SEARCH_KEY is not set")?;
            let retriever = AzureSearchRetriever::new(
                &config.search.endpoint,
                &config.search.index_name,
                key,
                &config.search.api_version,
                config.search.timeout(),
            )?;
            info!(index = retriever.index_name(), "Search: Azure Cognitive Search");
            Ok(Arc::new(retriever))
        }
        SearchProvider::Local => {
            let retriever = LocalRetriever::load_dir(&config.search.documents_dir)?;
            info!(
                dir = %config.search.documents_dir.display(),
                fragments = retriever.len(),
                "Search: local documents"
            );
            Ok(Arc::new(retriever))
        }
    }
}

fn build_generator(config: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn CompletionBackend>> {
    let llm = &config.llm;
    let (provider, key) = match llm.provider {
        LlmProvider::OpenAi => (
            Provider::OpenAi {
                base_url: llm.base_url.clone(),
                model: llm.model.clone(),
            },
            secrets.openai_key.as_deref().context("OPENAI_API_KEY is not set")?,
        ),
        LlmProvider::Azure => {
            if llm.azure_endpoint.is_empty() || llm.azure_deployment.is_empty() {
                bail!(
                    "llm.azure_endpoint and llm.azure_deployment must be set \
                     (config file or AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_DEPLOYMENT)"
                );
            }
            (
                Provider::Azure {
                    endpoint: llm.azure_endpoint.clone(),
                    deployment: llm.azure_deployment.clone(),
                    api_version: llm.azure_api_version.clone(),
                },
                secrets
                    .azure_openai_key
                    .as_deref()
                    .context("AZURE_OPENAI_KEY is not set")?,
            )
        }
    };
    let backend = ChatCompletionsBackend::new(provider, key, llm.timeout())?;
    info!(backend = backend.backend_name(), url = %backend.url(), "Completions backend ready");
    Ok(Arc::new(backend))
}

fn build_answerer(config: &AppConfig, system_prompt: String) -> Result<RagAnswerer> {
    let secrets = Secrets::from_env();
    let retriever = build_retriever(config, &secrets)?;
    let generator = build_generator(config, &secrets)?;
    Ok(RagAnswerer::new(
        retriever,
        generator,
        system_prompt,
        AnswerSettings::from_config(config),
    ))
}

fn read_system_prompt(config: &AppConfig) -> Result<String> {
    let path = &config.run.system_prompt_path;
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

/// Telemetry, gain map and violations for the configured APC.
fn load_inputs(config: &AppConfig) -> Result<(Vec<ViolationRecord>, Vec<GainMapEntry>)> {
    let rows = load_and_filter_with(&config.run.telemetry_path, &config.run.apc, &config.telemetry)
        .context("Loading stage failed: telemetry")?;
    let gains = load_gain_map(
        &config.run.gain_map_path,
        &config.gain_map.subsystem_filter,
        &config.gain_map.gain_type_filter,
    )
    .context("Loading stage failed: gain map")?;
    let violations = detect_violations(&rows);
    info!(
        apc = %config.run.apc,
        rows = rows.len(),
        violations = violations.len(),
        gain_entries = gains.len(),
        "Inputs loaded"
    );
    Ok((violations, gains))
}

async fn run_enrich(config: &AppConfig, reset: bool) -> Result<()> {
    let (violations, gains) = load_inputs(config)?;
    let system_prompt = read_system_prompt(config).context("Loading stage failed")?;
    let answerer = build_answerer(config, system_prompt)
        .context("Enrichment stage failed: backend setup")?;
    let report = ReportWriter::create(&config.run.report_path, reset)
        .context("Enrichment stage failed: opening report")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, finishing in-flight violations...");
            shutdown_token.cancel();
        }
    });

    let enricher =
        Enricher::new(answerer, config.enrichment.clone()).with_cancellation(cancel_token);
    let summary = enricher
        .run(&violations, &gains, report)
        .await
        .with_context(|| {
            format!(
                "Enrichment stage failed; report {} holds every alert completed before the failure",
                config.run.report_path.display()
            )
        })?;

    info!(
        written = summary.written(),
        failed = summary.failed,
        report = %config.run.report_path.display(),
        "Enriched alerts saved"
    );
    Ok(())
}

fn run_violations(config: &AppConfig) -> Result<()> {
    let (violations, _) = load_inputs(config)?;
    for violation in &violations {
        println!("{}", violation.message);
    }
    Ok(())
}

fn run_gains(config: &AppConfig, out: &Path) -> Result<()> {
    let gains = load_gain_map(
        &config.run.gain_map_path,
        &config.gain_map.subsystem_filter,
        &config.gain_map.gain_type_filter,
    )
    .context("Loading stage failed: gain map")?;

    let json = serde_json::to_string_pretty(&gain_map_records(&gains))?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, json).with_context(|| format!("Failed to write {}", out.display()))?;
    info!(entries = gains.len(), out = %out.display(), "Gain map exported");
    Ok(())
}

async fn run_ask(config: &AppConfig, question: &str) -> Result<()> {
    let system_prompt = read_system_prompt(config)?;
    let answerer = build_answerer(config, system_prompt)?;
    let answer = answerer.answer(question).await?;
    println!("{answer}");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_logging(args.log_json);

    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        SubCommand::Enrich {
            reset: _,
            no_reset,
            concurrency,
        } => {
            if let Some(n) = concurrency {
                config.enrichment.concurrency = n;
            }
            config.validate()?;
            run_enrich(&config, !no_reset).await
        }
        SubCommand::Violations => run_violations(&config),
        SubCommand::Gains { out } => run_gains(&config, &out),
        SubCommand::Ask { question } => run_ask(&config, &question).await,
    }
}
