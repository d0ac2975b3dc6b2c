use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use moneronet_operator::{
    load_config, load_manifests, render_yaml, run, ConfigFormat, OperatorConfig, StopWhen,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "moneronet-operator",
    version,
    about = "Converges Monero node fleets described by custom resources"
)]
struct Cli {
    /// Log output format; filtering follows RUST_LOG.
    #[arg(long, value_enum, env = "MONERONET_LOG_FORMAT", default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the objects a manifest would converge to, without touching any store.
    DryRun {
        /// Manifest file or directory (YAML or JSON, multi-document).
        #[arg(long)]
        file: PathBuf,
    },
    /// Seed an in-memory cluster with manifests and run every control loop.
    Run {
        /// Path to configuration file (TOML or YAML). Defaults apply when omitted.
        #[arg(long, env = "MONERONET_CONFIG")]
        config: Option<PathBuf>,
        /// Explicit configuration format override.
        #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
        config_format: ConfigFormat,
        /// Manifest file or directory to seed the store with.
        #[arg(long)]
        manifests: Option<PathBuf>,
        /// Override the worker count per controller.
        #[arg(long, env = "MONERONET_WORKERS")]
        workers: Option<usize>,
        /// Restrict every control loop to one namespace.
        #[arg(long, env = "MONERONET_NAMESPACE")]
        namespace: Option<String>,
        /// Stop once every queue has been idle for this long instead of waiting for ctrl-c.
        #[arg(long)]
        exit_when_idle: bool,
        #[arg(long, default_value_t = 500)]
        settle_ms: u64,
    },
}

fn init_tracing(format: LogFormat) {
    // stdout carries the rendered objects.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::DryRun { file } => {
            let mut objects = Vec::new();
            for mut manifest in load_manifests(&file)? {
                manifest.apply_defaults();
                let key = manifest.key();
                objects.extend(
                    manifest
                        .preview()
                        .with_context(|| format!("assembling {key}"))?,
                );
            }
            write_stdout(&render_yaml(&objects)?)?;
        }
        Command::Run {
            config,
            config_format,
            manifests,
            workers,
            namespace,
            exit_when_idle,
            settle_ms,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path, config_format)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => OperatorConfig::default(),
            };
            if let Some(workers) = workers {
                config.operator.workers = workers;
            }
            if namespace.is_some() {
                config.operator.namespace = namespace;
            }
            config.validate()?;

            let manifests = match manifests {
                Some(path) => load_manifests(&path)?,
                None => Vec::new(),
            };
            info!(
                manifests = manifests.len(),
                workers = config.operator.workers,
                "starting operator"
            );
            let stop = if exit_when_idle {
                StopWhen::Idle(Duration::from_millis(settle_ms))
            } else {
                StopWhen::Interrupted
            };
            let objects = run(&config, &manifests, stop).await?;
            write_stdout(&render_yaml(&objects)?)?;
        }
    }
    Ok(())
}

fn write_stdout(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
