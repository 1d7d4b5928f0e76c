//! the `serve` subcommand - runs the query server.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use gatewarden_store::{DirectorySeed, MemStore};
use gatewarden_types::Config;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// default config file search paths (in order of priority).
const CONFIG_SEARCH_PATHS: &[&str] = &[
    "/etc/gatewarden/config.toml",
    "./gatewarden.toml",
    "./config.toml",
];

/// run the gatewarden query server
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// path to config file (toml format)
    #[arg(short, long, env = "GATEWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// path to a directory seed file (json) loaded at startup
    #[arg(long, env = "GATEWARDEN_DIRECTORY_FILE")]
    directory_file: Option<PathBuf>,

    /// address to listen on
    #[arg(long, env = "GATEWARDEN_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// log filter (tracing env-filter syntax)
    #[arg(long, env = "GATEWARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// rebuild debounce window in milliseconds
    #[arg(long, env = "GATEWARDEN_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,
}

impl ServeCommand {
    /// find and load config file, returning none if no config file is found.
    fn load_config_file(config_path: Option<&PathBuf>) -> Result<Option<Config>> {
        // if explicit path provided, it must exist
        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {:?}", path))?;
            return Ok(Some(config));
        }

        // search default paths
        for path_str in CONFIG_SEARCH_PATHS {
            let path = PathBuf::from(path_str);
            if path.exists() {
                debug!("Found config file at {:?}", path);
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file: {:?}", path))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("failed to parse config file: {:?}", path))?;
                return Ok(Some(config));
            }
        }

        Ok(None)
    }

    /// convert cli arguments into a config struct, merging with config
    /// file if present.
    ///
    /// priority order: defaults -> config file -> cli flags
    fn into_config(self) -> Result<(Config, Option<PathBuf>)> {
        let mut config = match Self::load_config_file(self.config.as_ref())? {
            Some(file_config) => {
                info!("Loaded configuration from file");
                file_config
            }
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        };

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.rebuild.debounce_ms = debounce_ms;
        }

        Ok((config, self.directory_file))
    }

    /// run the serve command
    pub async fn run(self) -> Result<()> {
        // initialize logging before anything can fail (cli flag wins
        // over config, which is loaded below)
        let log_level = self
            .log_level
            .clone()
            .unwrap_or_else(|| "info".to_string());
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&log_level))
            .context("invalid log filter")?;
        tracing_subscriber::fmt().with_env_filter(filter).init();

        info!("Starting gatewarden...");

        let (config, directory_file) = self.into_config()?;
        info!("Listen address: {}", config.listen_addr);
        info!(
            "Rebuild debounce: {}ms, cold wait: {}ms",
            config.rebuild.debounce_ms, config.rebuild.cold_wait_ms
        );

        let store = MemStore::new();
        match &directory_file {
            Some(path) => {
                info!("Loading directory seed from {:?}", path);
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read directory file: {:?}", path))?;
                let seed: DirectorySeed = serde_json::from_str(&content)
                    .context("failed to parse directory file")?;
                info!(
                    "Seeding directory: {} users, {} assets, {} nodes, {} grants",
                    seed.users.len(),
                    seed.assets.len(),
                    seed.nodes.len(),
                    seed.grants.len()
                );
                store.apply_seed(seed);
            }
            None => {
                warn!("No directory file provided, starting with an empty directory");
            }
        }

        let listen_addr = config.listen_addr.clone();
        let app = crate::create_app(store, config);

        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        info!("Listening on {}", listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// resolves when sigint or sigterm arrives.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}
