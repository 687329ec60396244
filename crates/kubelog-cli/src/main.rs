use anyhow::Result;
use clap::Parser;
use kubelog_core::{Config, LogCache, TimeRange};
use kubelog_ingestion::{DirectoryWatcher, FileSetManager};
use kubelog_output::{MemoryLogCache, OutputFormat, StdoutWriter};
use kubelog_pipeline::IngestionPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// kubelog - container log tailing agent
#[derive(Parser, Debug)]
#[command(name = "kubelog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the log files (overrides config)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Output format for query results: pretty, json, or raw (overrides config)
    #[arg(short, long)]
    format: Option<String>,

    /// Print cached entries matching this filter on shutdown (overrides config)
    #[arg(short, long)]
    query: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn log_level(config: &Config, verbose: bool) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    match config.general.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        let config = Config::default();
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(directory) = args.directory {
        config.watch.directory = directory;
    }
    if let Some(query) = args.query {
        config.output.query = Some(query);
    }

    FmtSubscriber::builder()
        .with_max_level(log_level(&config, args.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    info!(instance = %config.general.instance_name, "Starting kubelog");

    // Cache and ingestion pipeline
    let cache = Arc::new(MemoryLogCache::new(config.cache.max_entries));
    let pipeline = Arc::new(IngestionPipeline::new(
        config.pipeline.queue_capacity,
        cache.clone(),
    ));
    pipeline.start().await;

    // File tailing
    let manager = FileSetManager::new(config.tail.clone(), Arc::clone(&pipeline));
    let watcher = DirectoryWatcher::new(config.watch.clone())?;
    let cancel = CancellationToken::new();
    let mut watch_task = tokio::spawn(watcher.run(manager, cancel.clone()));

    let watch_result = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            cancel.cancel();
            (&mut watch_task).await?
        }
        result = &mut watch_task => result?,
    };
    match watch_result {
        Ok(manager) => info!(tracked = manager.tracked_count(), "Watcher finished"),
        Err(e) => warn!(error = %e, "Watcher exited with an error"),
    }
    pipeline.shutdown().await;

    let stats = pipeline.stats();
    info!(
        accepted = stats.accepted,
        refused = stats.refused,
        delivered = stats.delivered,
        "Ingestion complete"
    );

    if let Some(ref query) = config.output.query {
        let format = args.format.as_deref().unwrap_or(&config.output.format);
        let entries = cache.query(query, config.output.max_results, TimeRange::all());
        let mut writer = StdoutWriter::with_format(OutputFormat::parse(format));
        writer.write_all(&entries).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_overrides() {
        let args = Args::parse_from([
            "kubelog",
            "--directory",
            "/tmp/logs",
            "--query",
            "error",
            "--format",
            "json",
            "-v",
        ]);
        assert_eq!(args.directory, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(args.query.as_deref(), Some("error"));
        assert_eq!(args.format.as_deref(), Some("json"));
        assert!(args.verbose);
    }

    #[test]
    fn test_log_level_from_config() {
        let mut config = Config::default();
        assert_eq!(log_level(&config, false), Level::WARN);
        assert_eq!(log_level(&config, true), Level::DEBUG);
        config.general.log_level = "INFO".to_string();
        assert_eq!(log_level(&config, false), Level::INFO);
    }
}
