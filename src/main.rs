//! revcaps - operator tool for the capability layer.
//!
//! Generates keys, mints and inspects capability URLs offline, and runs a
//! smoke-test cap endpoint.

use anyhow::{Context, bail};
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use clap::{Parser, Subcommand, ValueEnum};
use revcaps::caps::{CapServer, HandlerRegistry, KeyMaterial, require_method};
use revcaps::config::{self, Config, LogFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Handler key of the built-in smoke-test capability.
const PROBE_KEY: &str = "probe";

#[derive(Debug, Parser)]
#[command(name = "revcaps", version, about = "Capability URL tooling for the review server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a fresh hex-encoded key file.
    Keygen {
        /// Where to write the key.
        path: PathBuf,
        /// Key size in bits.
        #[arg(long, value_enum, default_value_t = KeyBits::Aes256)]
        bits: KeyBits,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Mint a capability URL with the configured key.
    Grant {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Handler key.
        key: String,
        /// Value handed to the handler.
        value: String,
        /// Expire the capability after this many seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Open a capability URL (or path) and print its envelope.
    Inspect {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Full URL or path beginning with the base path.
        url: String,
    },
    /// Serve the cap endpoint with the built-in probe handler.
    Serve {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Supported key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyBits {
    #[value(name = "128")]
    Aes128,
    #[value(name = "256")]
    Aes256,
}

impl KeyBits {
    fn bytes(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen { path, bits, force } => {
            revcaps::telemetry::init_tracing(LogFormat::Pretty);
            keygen(&path, bits, force)
        }
        Command::Grant {
            config,
            key,
            value,
            ttl,
        } => {
            revcaps::telemetry::init_tracing(LogFormat::Pretty);
            let server = load_server(&config, HandlerRegistry::builder().build())?;
            let url = match ttl {
                Some(secs) => server.grant_for(&key, &value, Duration::from_secs(secs))?,
                None => server.grant(&key, &value)?,
            };
            println!("{url}");
            Ok(())
        }
        Command::Inspect { config, url } => {
            revcaps::telemetry::init_tracing(LogFormat::Pretty);
            let server = load_server(&config, HandlerRegistry::builder().build())?;
            inspect(&server, &url)
        }
        Command::Serve { config } => serve(&config).await,
    }
}

fn keygen(path: &Path, bits: KeyBits, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let key = KeyMaterial::generate(bits.bytes())?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "{}", key.to_hex())?;

    info!(path = %path.display(), bits = key.len() * 8, "Wrote key file");
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to load config");
        e
    })?;
    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!("{}", e);
        }
        bail!("configuration has {} error(s)", errors.len());
    }
    Ok(config)
}

fn load_server(path: &Path, registry: HandlerRegistry) -> anyhow::Result<CapServer> {
    let config = load_config(path)?;
    Ok(CapServer::from_config(&config.caps, registry)?)
}

fn inspect(server: &CapServer, url: &str) -> anyhow::Result<()> {
    let envelope = server
        .open_url(url)
        .with_context(|| format!("opening {url} under {}", server.base_path()))?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if envelope.is_expired_at(chrono::Utc::now().timestamp()) {
        println!("(expired)");
    }
    if !server.registry().contains(&envelope.key) {
        info!(key = %envelope.key, "Key is not handled by this tool; handlers live in the application");
    }
    Ok(())
}

async fn probe(value: String, _request: Request) -> Response {
    (StatusCode::OK, value).into_response()
}

async fn serve(path: &Path) -> anyhow::Result<()> {
    // Parse before validating so the subscriber honors log_format.
    let format = Config::load(path)
        .map(|c| c.server.log_format)
        .unwrap_or_default();
    revcaps::telemetry::init_tracing(format);

    let config = load_config(path)?;
    info!(listen = %config.server.listen, "Starting revcaps");

    let mut registry = HandlerRegistry::builder();
    registry.register(PROBE_KEY, require_method(Method::GET, probe))?;
    let server = Arc::new(CapServer::from_config(&config.caps, registry.build())?);

    if config.server.metrics {
        revcaps::metrics::init();
        info!("Metrics initialized");
    } else {
        info!("Metrics disabled");
    }

    let app = revcaps::http::router(server, config.server.metrics);
    revcaps::http::run_http_server(config.server.listen, app).await?;
    Ok(())
}
