use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use device_webcam_core::{
    CommandRequest, CommandValue, ProtocolDriver, Reading, ServiceConfig, WebcamDriver,
    DEFAULT_CONFIG_PATH, FRAME_RESOURCE,
};
use device_webcam_redisedge::{Connector, MemoryConnector};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "device-webcam";
const DEVICE_NAME: &str = "Webcam";
const PEOPLE_RESOURCE: &str = "Hoomans";
const DOGS_RESOURCE: &str = "Doggos";

#[derive(Parser, Debug)]
#[command(name = SERVICE_NAME, author, version, about = "Webcam device service backed by RedisEdge", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server implementation to talk to
    #[arg(long, value_enum, default_value_t = Backend::Redis, global = true)]
    backend: Backend,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// A RedisEdge server at the configured URL
    Redis,
    /// An in-process server with the required modules loaded (dry run)
    Memory,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify server modules and provision the model and script, then exit
    Check,
    /// Initialize, perform a single read and print the values
    Read(ReadArgs),
    /// Initialize and poll readings until interrupted
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
struct ReadArgs {
    /// Also request people and dog counts
    #[arg(long)]
    detections: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Seconds between readings
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
    /// Request frames only, without detections
    #[arg(long)]
    frames_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(cli.config.as_deref())?;
    info!(service = SERVICE_NAME, version = env!("CARGO_PKG_VERSION"), "starting");

    match cli.backend {
        Backend::Redis => {
            let driver = WebcamDriver::new(config).context("failed to create webcam driver")?;
            run_command(driver, cli.command).await
        }
        Backend::Memory => {
            run_command(memory_driver(config), cli.command).await
        }
    }
}

/// Dry-run driver: the in-process server already holds the model and script.
fn memory_driver(config: ServiceConfig) -> WebcamDriver<MemoryConnector> {
    let connector = MemoryConnector::preloaded(&config.redisedge);
    WebcamDriver::with_connector(config, connector)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => ServiceConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            ServiceConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => {
            warn!("no configuration file found at {DEFAULT_CONFIG_PATH}; using defaults");
            ServiceConfig::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run_command<C: Connector>(driver: WebcamDriver<C>, command: Command) -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    driver
        .initialize(tx)
        .await
        .context("driver initialization failed")?;

    let outcome = match command {
        Command::Check => {
            info!("RedisEdge modules verified and resources provisioned");
            Ok(())
        }
        Command::Read(args) => read_once(&driver, args.detections).await,
        Command::Run(args) => run_loop(&driver, rx, args).await,
    };

    driver.stop(false).await.context("failed to stop driver")?;
    outcome
}

fn read_requests(detections: bool) -> Vec<CommandRequest> {
    let mut requests = vec![CommandRequest::new(FRAME_RESOURCE)];
    if detections {
        requests.push(CommandRequest::new(PEOPLE_RESOURCE));
        requests.push(CommandRequest::new(DOGS_RESOURCE));
    }
    requests
}

async fn read_once<C: Connector>(driver: &WebcamDriver<C>, detections: bool) -> Result<()> {
    let values = driver
        .handle_read_commands(DEVICE_NAME, &HashMap::new(), &read_requests(detections))
        .await
        .context("read failed")?;

    for value in &values {
        println!("{}", describe(value));
    }
    Ok(())
}

async fn run_loop<C: Connector>(
    driver: &WebcamDriver<C>,
    mut readings: mpsc::Receiver<device_webcam_core::AsyncValues>,
    args: RunArgs,
) -> Result<()> {
    let requests = read_requests(!args.frames_only);
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupt received; shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(err) = driver.push_reading(DEVICE_NAME, &requests).await {
                    warn!("reading failed: {err}");
                }
            }
            Some(pushed) = readings.recv() => {
                for value in &pushed.command_values {
                    info!(device = %pushed.device_name, "{}", describe(value));
                }
            }
        }
    }
}

fn describe(value: &CommandValue) -> serde_json::Value {
    let reading = match &value.reading {
        Reading::Binary { media_type, data } => json!({ "media_type": media_type, "bytes": data.len() }),
        Reading::Uint64(count) => json!(count),
        Reading::Bool(flag) => json!(flag),
    };
    json!({
        "resource": value.device_resource_name,
        "origin": value.origin,
        "type": value.reading.type_name(),
        "value": reading,
    })
}
