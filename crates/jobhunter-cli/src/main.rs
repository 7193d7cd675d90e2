mod sinks;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobhunter_client::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use jobhunter_client::{LlmSettings, build_chains};
use jobhunter_core::models::{ProviderMethod, RunResult};
use jobhunter_core::{HuntConfig, Pipeline, PipelineSettings, TracingReporter};

use crate::sinks::{OutputFormat, OutputSink};

#[derive(Parser)]
#[command(name = "jobhunter", version, about = "Multi-source job posting aggregator")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "JOBHUNTER_CONFIG", default_value = "jobhunter.json", global = true)]
    config: PathBuf,

    #[command(flatten)]
    overrides: Overrides,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that replace values from the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Search keyword (repeatable; replaces the configured keywords)
    #[arg(short, long = "keyword", global = true)]
    keywords: Vec<String>,

    /// Target location (repeatable; replaces the configured locations)
    #[arg(short, long = "location", global = true)]
    locations: Vec<String>,

    /// Recency window in hours
    #[arg(long, global = true)]
    window_hours: Option<u64>,

    /// Per-provider timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Maximum number of sources fetched concurrently
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut HuntConfig) {
        if !self.keywords.is_empty() {
            config.keywords = self.keywords.iter().cloned().collect();
        }
        if !self.locations.is_empty() {
            config.locations = self.locations.iter().cloned().collect();
        }
        if let Some(hours) = self.window_hours {
            config.recency_window_hours = hours;
        }
        if let Some(secs) = self.timeout_secs {
            config.per_provider_timeout_seconds = secs;
        }
        if let Some(n) = self.concurrency {
            config.max_concurrent_sources = n;
        }
    }
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// API key for LLM extraction providers
    #[arg(long, env = "JOBHUNTER_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "JOBHUNTER_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Model used when a provider does not name one
    #[arg(long, env = "JOBHUNTER_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,
}

impl From<LlmArgs> for LlmSettings {
    fn from(args: LlmArgs) -> Self {
        Self {
            api_key: args.api_key.filter(|k| !k.trim().is_empty()),
            base_url: args.base_url,
            default_model: args.model,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and deliver job postings once
    Run {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write results to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the configuration and list each source's fallback chain
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays clean for results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobhunter=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = HuntConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config file: {}", cli.config.display()))?;
    cli.overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run { format, output } => {
            cmd_run(&config, cli.llm.into(), OutputSink::new(format, output)).await?;
        }
        Commands::Validate => cmd_validate(&config),
    }

    Ok(())
}

async fn cmd_run(config: &HuntConfig, llm: LlmSettings, sink: OutputSink) -> Result<()> {
    let chains = build_chains(config, &llm)
        .await
        .context("Failed to build sources")?;

    let settings = PipelineSettings {
        criteria: config.criteria(),
        filter: config.filter_config(),
        per_provider_timeout: config.per_provider_timeout(),
        max_concurrent_sources: config.max_concurrent_sources,
    };
    let pipeline = Pipeline::new(chains, settings, sink, TracingReporter);

    let result = tokio::select! {
        result = pipeline.run() => result.context("Run failed")?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    };

    eprint!("{}", status_report(&result));
    Ok(())
}

fn cmd_validate(config: &HuntConfig) {
    println!("Configuration OK: {} source(s)\n", config.sources.len());
    for source in &config.sources {
        let mut methods: Vec<ProviderMethod> =
            source.providers.iter().map(|p| p.method()).collect();
        methods.sort_by_key(ProviderMethod::priority);
        let chain: Vec<&str> = methods.iter().map(ProviderMethod::as_str).collect();
        println!("  {:<20} {}", source.id.trim(), chain.join(" -> "));
    }
}

/// Per-source outcome table, one line per source.
fn status_report(result: &RunResult) -> String {
    let mut out = format!(
        "\nRun {} finished: {} job(s) from {} source(s)\n",
        result.run_id,
        result.jobs.len(),
        result.source_status.len()
    );
    for (source, status) in &result.source_status {
        let line = match (&status.method_used, &status.error) {
            (Some(method), _) => format!(
                "  [OK]     {:<20} via {} ({} record(s), {} skipped)",
                source.as_str(),
                method,
                status.record_count,
                status.skipped_count
            ),
            (None, Some(error)) => format!("  [FAILED] {:<20} {}", source.as_str(), error),
            (None, None) => format!("  [FAILED] {:<20} no providers ran", source.as_str()),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}
