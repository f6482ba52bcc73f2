use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use research_aggregator::config::{default_config_path, find_config_file, load_config};
use research_aggregator::models::{DownloadStatus, SearchFilters};
use research_aggregator::ui::{self, Spinner, Status};
use research_aggregator::AppContext;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Aggregator - search many sources at once and fetch papers
#[derive(Parser, Debug)]
#[command(name = "research-aggregator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search web, preprint, citation and Q&A sources at once, and fetch papers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error log output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show recognized environment variables
    #[arg(long)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Table on a terminal, JSON otherwise
    Auto,
    Table,
    Json,
}

impl OutputFormat {
    fn is_table(self) -> bool {
        match self {
            OutputFormat::Auto => ui::is_terminal(),
            OutputFormat::Table => true,
            OutputFormat::Json => false,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search one or more sources
    #[command(alias = "s")]
    Search {
        /// Search query string
        query: String,

        /// Source to query (repeatable; configured defaults when omitted)
        #[arg(long, short)]
        source: Vec<String>,

        /// Time range: a year form (2020, 2018-2022, 2010-, -2015) or day/week/month/year
        #[arg(long)]
        time_range: Option<String>,

        /// Skip relevance filtering
        #[arg(long)]
        no_semantic: bool,

        /// Minimum relevance score (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },

    /// Schedule a background download
    #[command(alias = "dl")]
    Download {
        /// Artifact id (e.g. 2301.00001 or arxiv:2301.00001)
        artifact_id: String,

        #[arg(long, default_value = "")]
        title: String,

        /// Wait for the download to finish
        #[arg(long)]
        wait: bool,

        /// Seconds to wait with --wait
        #[arg(long, default_value_t = 300)]
        wait_timeout: u64,
    },

    /// Download inline and print the local path
    Fetch { artifact_id: String },

    /// Show one download record
    Status { record_id: i64 },

    /// List download records, newest first
    Downloads,

    /// Show or clear the search history
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Delete every history entry
        #[arg(long)]
        clear: bool,
    },

    /// Download, extract and analyze a paper with the oracle
    Analyze {
        artifact_id: String,

        #[arg(long, default_value = "")]
        title: String,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or write the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show mirror health
    Mirrors {
        /// Forget the cached choice and probe again
        #[arg(long)]
        refresh: bool,
    },

    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove expired search and analysis entries
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write the effective configuration to a file
    Init {
        /// Destination (defaults to the user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn print_env_vars() {
    println!("Research Aggregator - Environment Variables");
    println!();
    println!("Oracle:");
    println!("  DEEPSEEK_API_KEY            API key when analysis.provider = deepseek (default)");
    println!("  ZHIPU_API_KEY               API key when analysis.provider = zhipu");
    println!();
    println!("Sources:");
    println!("  SEMANTIC_SCHOLAR_API_KEY    Optional key for higher Semantic Scholar limits");
    println!();
    println!("Proxy:");
    println!("  HTTPS_PROXY / HTTP_PROXY    Proxy applied to every outbound request");
    println!();
    println!("Configuration overrides (section__key):");
    println!("  RESEARCH_AGGREGATOR_SEARCH__TIMEOUT_SECONDS");
    println!("  RESEARCH_AGGREGATOR_DOWNLOADS__DIRECTORY");
    println!("  RESEARCH_AGGREGATOR_ANALYSIS__PROVIDER");
    println!();
    println!("Logging:");
    println!("  RUST_LOG                    Log filter (overrides -v/-q)");
}

fn init_tracing(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("research_aggregator={}", level)));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        return Ok(());
    }

    init_tracing(&cli);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "research-aggregator",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    if let Commands::Config { action } = &command {
        match action {
            ConfigAction::Show => print!("{}", config.to_toml_redacted()?),
            ConfigAction::Init { path, force } => {
                let target = path
                    .clone()
                    .or_else(default_config_path)
                    .context("no config directory on this platform; pass a path")?;
                if target.exists() && !force {
                    anyhow::bail!("{} exists; use --force to overwrite", target.display());
                }
                config.save(&target)?;
                ui::print_status(Status::Success, &format!("Wrote {}", target.display()));
            }
        }
        return Ok(());
    }

    let ctx = AppContext::build(config)
        .await
        .context("initializing services")?;
    let table = cli.output.is_table();

    match command {
        Commands::Search {
            query,
            source,
            time_range,
            no_semantic,
            threshold,
        } => {
            let mut filters = SearchFilters::new();
            filters.time_range = time_range;
            if no_semantic {
                filters.semantic_filter = Some(false);
            }
            filters.relevance_threshold = threshold;

            let spinner = table.then(|| Spinner::new(&format!("Searching for \"{}\"", query)));
            let started = Instant::now();
            let outcome = ctx.search.search(&query, &source, &filters).await?;
            if let Some(spinner) = spinner {
                spinner.finish();
            }

            if table {
                ui::print_search_header(&query, outcome.total, started.elapsed());
                ui::print_source_statuses(&outcome.sources_status);
                for (source, error) in &outcome.source_errors {
                    ui::print_status(Status::Warning, &format!("{}: {}", source, error));
                }
                if !outcome.results.is_empty() {
                    println!("{}", ui::results_table(&outcome.results));
                }
            } else {
                print_json(&outcome)?;
            }
        }

        Commands::Download {
            artifact_id,
            title,
            wait,
            wait_timeout,
        } => {
            let ticket = ctx.downloads.schedule_download(&artifact_id, &title).await?;
            if !wait {
                if table {
                    ui::print_status(
                        Status::Download,
                        &format!("Record {} is {}", ticket.record_id, ticket.status),
                    );
                } else {
                    print_json(&ticket)?;
                }
                return Ok(());
            }

            let spinner = table.then(|| Spinner::new(&format!("Downloading {}", artifact_id)));
            let record = ctx
                .downloads
                .wait_for(ticket.record_id, Duration::from_secs(wait_timeout))
                .await?
                .context("download record disappeared")?;

            if let Some(spinner) = spinner {
                match record.status {
                    DownloadStatus::Completed => spinner.finish_with_success(&format!(
                        "{} ({})",
                        record.local_path.as_deref().unwrap_or_default(),
                        ui::format_file_size(record.file_size)
                    )),
                    DownloadStatus::Failed => {
                        spinner.finish_with_error("Download failed on every mirror")
                    }
                    _ => spinner.finish_with_error(&format!(
                        "Still {} after {}s ({}%)",
                        record.status, wait_timeout, record.progress
                    )),
                }
            } else {
                print_json(&record)?;
            }
        }

        Commands::Fetch { artifact_id } => {
            let spinner = table.then(|| Spinner::new(&format!("Fetching {}", artifact_id)));
            let path = ctx.downloads.get_or_download(&artifact_id).await?;
            match (path, spinner) {
                (Some(path), Some(spinner)) => {
                    spinner.finish_with_success(&path.display().to_string())
                }
                (Some(path), None) => print_json(&serde_json::json!({ "path": path }))?,
                (None, Some(spinner)) => {
                    spinner.finish_with_error("Download failed on every mirror");
                    std::process::exit(1);
                }
                (None, None) => {
                    print_json(&serde_json::json!({ "path": null }))?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Status { record_id } => {
            match ctx.downloads.get_download_status(record_id).await? {
                Some(record) if table => println!("{}", ui::downloads_table(&[record])),
                Some(record) => print_json(&record)?,
                None => anyhow::bail!("No download record with id {}", record_id),
            }
        }

        Commands::Downloads => {
            let records = ctx.downloads.list_downloads().await?;
            if table {
                if records.is_empty() {
                    ui::print_status(Status::Info, "No downloads yet");
                } else {
                    println!("{}", ui::downloads_table(&records));
                }
            } else {
                print_json(&records)?;
            }
        }

        Commands::History { limit, clear } => {
            if clear {
                let removed = ctx.search.clear_history().await?;
                ui::print_status(Status::Success, &format!("Removed {} history entries", removed));
                return Ok(());
            }
            let entries = ctx.search.history(limit).await?;
            if table {
                println!("{}", ui::history_table(&entries));
            } else {
                print_json(&entries)?;
            }
        }

        Commands::Analyze { artifact_id, title } => {
            if !ctx.oracle_available() {
                anyhow::bail!(
                    "Analysis needs an oracle: {}",
                    ctx.oracle_status.as_deref().unwrap_or("not configured")
                );
            }
            let spinner = table.then(|| Spinner::new(&format!("Analyzing {}", artifact_id)));
            let result = ctx.analysis.analyze_paper_full(&artifact_id, &title).await;
            if let Some(spinner) = &spinner {
                spinner.finish();
            }
            let analysis = result?;

            if table {
                for (heading, body) in [
                    ("Summary", &analysis.abstract_summary),
                    ("Method", &analysis.method),
                    ("Innovation", &analysis.innovation),
                    ("Results", &analysis.results),
                    ("Conclusion", &analysis.conclusion),
                ] {
                    ui::print_section(heading);
                    println!("{}", body);
                }
            } else {
                print_json(&analysis)?;
            }
        }

        Commands::Cache {
            action: CacheAction::Cleanup,
        } => {
            let cleanup = ctx.search.cleanup_caches().await?;
            if table {
                ui::print_status(
                    Status::Success,
                    &format!(
                        "Removed {} search and {} analysis entries",
                        cleanup.search_entries, cleanup.analysis_entries
                    ),
                );
            } else {
                print_json(&cleanup)?;
            }
        }

        Commands::Mirrors { refresh } => {
            if refresh {
                ctx.downloads.clear_mirror_cache().await;
            }
            let probes = ctx.downloads.probe_mirrors().await;
            let best = ctx.downloads.best_mirror().await;

            if table {
                for probe in &probes {
                    let latency = probe
                        .latency
                        .map(|l| format!("{} ms", l.as_millis()).green().to_string())
                        .unwrap_or_else(|| "unreachable".red().to_string());
                    let marker = if best.as_deref() == Some(probe.mirror.as_str()) {
                        "★"
                    } else {
                        " "
                    };
                    println!("{} {:<40} {}", marker.yellow(), probe.mirror, latency);
                }
            } else {
                let rows: Vec<_> = probes
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "mirror": p.mirror,
                            "latency_ms": p.latency.map(|l| l.as_millis() as u64),
                        })
                    })
                    .collect();
                print_json(&serde_json::json!({ "best": best, "mirrors": rows }))?;
            }
        }

        Commands::Completions { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}
