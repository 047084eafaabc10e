use anyhow::Result;
use camfleet::{
    DefaultSourceFactory, FleetConfig, FleetManager, HttpBackendClient, HttpDetector,
};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "camfleet")]
#[command(about = "Multi-camera person detection service")]
#[command(version)]
#[command(long_about = "Pulls the camera list from a backend, runs one acquisition thread and \
one detection task per camera, deduplicates person detections with track and position \
cooldowns, and keeps each camera's online/offline status current on the backend.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camfleet.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the fleet")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - load cameras but don't start pipelines
    #[arg(long, help = "Load and list admitted cameras without starting any pipeline")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = match FleetConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load configuration from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Keep the guard alive so buffered file output is flushed on exit
    let log_guard = init_logging(&args, config.logging.file.as_deref())?;

    info!("Starting camfleet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    info!("Backend: {}", config.backend.base_url);
    info!("Detector: {}", config.detector.endpoint);
    if config.backend.api_key.is_empty() {
        warn!("No backend API key configured");
    }

    let backend = Arc::new(HttpBackendClient::new(&config.backend));
    let detector = Arc::new(HttpDetector::new(&config.detector));
    let sources = Arc::new(DefaultSourceFactory);

    let mut fleet = FleetManager::new(config, backend, detector, sources);

    match fleet.load_cameras().await {
        Ok(0) => {
            error!("No cameras to process");
            std::process::exit(1);
        }
        Ok(count) => info!("{} cameras admitted", count),
        Err(e) => {
            error!("Failed to load cameras: {}", e);
            std::process::exit(1);
        }
    }

    if args.dry_run {
        for pipeline in fleet.pipelines() {
            let record = pipeline.record();
            println!(
                "{}\t{}\t{}\t{}",
                record.id,
                record.name,
                if record.declared_status.is_empty() { "unknown" } else { &record.declared_status },
                record.source_uri
            );
        }
        println!("✓ Dry run completed - {} cameras admitted", fleet.camera_count());
        return Ok(());
    }

    fleet.start_all().await.map_err(|e| {
        error!("Failed to start fleet: {}", e);
        e
    })?;

    let exit_code = fleet.run().await.map_err(|e| {
        error!("Fleet error during execution: {}", e);
        e
    })?;

    info!("camfleet exited with code: {}", exit_code);
    drop(log_guard);

    std::process::exit(exit_code);
}

fn init_logging(args: &Args, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camfleet={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Optional plain-text copy of the log in a file
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camfleet configuration file");
    println!("# Every key can be overridden with CAMFLEET_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", toml::to_string_pretty(&FleetConfig::default())?);
    Ok(())
}
