//! ephemera: share a file once over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ephemera::config::{Config, IgnoredEnv, LogFormat};
use ephemera::relay::Relay;
use ephemera::storage::BlobStore;
use ephemera::{constants, http, logging};

#[derive(Parser, Debug)]
#[command(name = "ephemera", version)]
#[command(about = "Upload a file, get a link that works exactly once")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on [env: HOST]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on [env: PORT]
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding uploads [env: UPLOAD_PATH]
    #[arg(long, value_name = "DIR")]
    upload_path: Option<PathBuf>,

    /// Upload ceiling in bytes [env: MAX_UPLOAD_SIZE]
    #[arg(long, value_name = "BYTES")]
    max_upload_size: Option<u64>,

    /// Minutes before an undownloaded file is deleted [env: DELETION_DELAY]
    #[arg(long, value_name = "MINUTES")]
    deletion_delay: Option<u64>,

    /// Delete files left over from a previous run [env: SWEEP_ORPHANS]
    #[arg(long)]
    sweep_orphans: bool,

    /// Log output format [env: LOG_FORMAT]
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn load_config(&self) -> Result<(Config, Vec<IgnoredEnv>)> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::default(),
        };
        let ignored = config.apply_env();

        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.upload_path {
            config.upload_path.clone_from(path);
        }
        if let Some(size) = self.max_upload_size {
            config.max_upload_size = size;
        }
        if let Some(delay) = self.deletion_delay {
            config.deletion_delay = delay;
        }
        if self.sweep_orphans {
            config.sweep_orphans = true;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok((config, ignored))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, ignored) = cli.load_config()?;
    logging::init(config.log_format);

    for IgnoredEnv { key, value } in &ignored {
        warn!(key, value = %value, "Ignoring unparseable environment value");
    }

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let store = BlobStore::file(&config.upload_path).with_context(|| {
        format!(
            "Failed to prepare upload directory: {}",
            config.upload_path.display()
        )
    })?;
    let relay = Relay::new(store, config.relay_config());

    if config.sweep_orphans {
        relay
            .sweep_orphans()
            .await
            .context("Failed to sweep upload directory")?;
    } else {
        match relay.orphan_count().await {
            Ok(0) => {},
            Ok(count) => warn!(
                count,
                path = %config.upload_path.display(),
                "Files from a previous run will never be deleted; start with --sweep-orphans to remove them"
            ),
            Err(e) => warn!(error = %e, "Could not scan upload directory for leftovers"),
        }
    }

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        upload_path = %config.upload_path.display(),
        max_upload_size = config.max_upload_size,
        deletion_delay_minutes = config.deletion_delay,
        "Server started at {addr}"
    );
    info!(
        "Use this command to upload files: 'curl -F \"{}=@<file_path>\" http://{addr}{}'",
        constants::UPLOAD_FIELD,
        constants::SHARE_ROUTE
    );

    http::serve(listener, relay, http::shutdown_signal()).await
}
