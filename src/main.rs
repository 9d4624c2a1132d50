use bytes::Bytes;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{error, info, warn};

use gateway_pipeline::commands;
use gateway_pipeline::config::{self, Config};
use gateway_pipeline::error::Result;
use gateway_pipeline::gateway::Gateway;
use gateway_pipeline::logging;
use gateway_pipeline::plugin::PluginRegistry;
use gateway_pipeline::random;

#[derive(Parser, Debug)]
#[command(name = "gateway-pipeline")]
#[command(about = "Programmable traffic gateway pipeline engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Build all pipelines and run until interrupted (default)
    Run,
    /// Validate configuration and plugin settings
    Check {
        /// Also build, prepare and close every pipeline
        #[arg(long)]
        build: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        print: bool,
    },
    /// Push one HTTP request through a pipeline
    Send {
        /// Target pipeline name
        #[arg(short, long)]
        pipeline: String,

        /// Request path
        #[arg(long, default_value = "/")]
        path: String,

        /// Request body; read from stdin when omitted
        #[arg(short, long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.debug, args.log_json);

    let config = load_config(args.config.as_deref())?;
    let registry = PluginRegistry::with_builtins();

    match args.command.unwrap_or(Command::Run) {
        Command::Check { build, print } => {
            commands::run_config_check(&config, &registry, build)?;
            if print {
                println!("{}", commands::render_config(&config)?);
            }
            Ok(())
        }
        Command::Send {
            pipeline,
            path,
            body,
        } => {
            random::init(config.random.seed)?;
            let body = match body {
                Some(body) => Bytes::from(body),
                None => Bytes::from(std::io::read_to_string(std::io::stdin())?),
            };

            let gateway = Gateway::from_config(&config, registry)?;
            let result = commands::run_send(&gateway, &pipeline, &path, body).await;
            gateway.shutdown();
            result.map(|_| ())
        }
        Command::Run => {
            random::init(config.random.seed)?;
            run(config, registry, args.config).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(path).map_err(|e| {
                error!("Failed to load configuration from {}: {}", path.display(), e);
                e
            })
        }
        None => {
            info!("Loading configuration from default locations");
            config::load_from_env_or_file().map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })
        }
    }
}

async fn run(config: Config, registry: PluginRegistry, path: Option<PathBuf>) -> Result<()> {
    info!("Starting gateway pipeline engine");
    let gateway = Gateway::from_config(&config, registry)?;
    info!(pipelines = ?gateway.pipeline_names(), "Gateway ready");

    loop {
        match wait_for_signal().await {
            Signal::Reload => {
                let Some(path) = path.as_deref() else {
                    warn!("Reload requested but no --config file was given");
                    continue;
                };
                match config::load_from_path(path).and_then(|config| gateway.reload(&config)) {
                    Ok(()) => info!(pipelines = ?gateway.pipeline_names(), "Configuration reloaded"),
                    Err(e) => error!("Reload failed, keeping current pipelines: {}", e),
                }
            }
            Signal::Shutdown => break,
        }
    }

    match serde_json::to_string(&gateway.stats()) {
        Ok(stats) => info!(stats = %stats, "Final pipeline statistics"),
        Err(e) => warn!("Failed to serialise pipeline statistics: {}", e),
    }
    gateway.shutdown();
    info!("Graceful shutdown completed");
    Ok(())
}

enum Signal {
    Reload,
    Shutdown,
}

async fn wait_for_signal() -> Signal {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let (terminate, hangup) = {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let terminate = async {
            match unix_signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        let hangup = async {
            match unix_signal(SignalKind::hangup()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        (terminate, hangup)
    };

    #[cfg(not(unix))]
    let (terminate, hangup) = (
        std::future::pending::<()>(),
        std::future::pending::<()>(),
    );

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
            Signal::Shutdown
        },
        _ = terminate => {
            info!("Received terminate signal");
            Signal::Shutdown
        },
        _ = hangup => {
            info!("Received hangup signal");
            Signal::Reload
        },
    }
}
