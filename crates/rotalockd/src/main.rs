// # rotalockd - Rotation Lock Settings Daemon
//
// The rotalockd daemon is a THIN integration layer: it reads configuration
// from environment variables, initializes the runtime, builds the settings
// store, and hands everything to rotalock-core. All settings logic lives in
// the library.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Defaults
// - `ROTALOCK_DEFAULTS`: Comma-separated `state:policy` entries, e.g.
//   `0:1,1:2` (state 0 locked, state 1 unlocked). Empty or unset disables
//   the feature.
//
// ### Settings Store
// - `ROTALOCK_STORE_TYPE`: Type of settings store (file, memory)
// - `ROTALOCK_STORE_PATH`: Path to the settings file (for file store)
//
// ### Scope
// - `ROTALOCK_USER`: User scope for reads and writes (default 0)
//
// ### Logging
// - `ROTALOCK_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export ROTALOCK_DEFAULTS=0:1,1:2,2:2
// export ROTALOCK_STORE_TYPE=file
// export ROTALOCK_STORE_PATH=/var/lib/rotalock/settings.json
//
// rotalockd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use rotalock_core::{SettingsManager, StaticDefaults, StoreBackendConfig};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum RotalockExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<RotalockExitCode> for ExitCode {
    fn from(code: RotalockExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    defaults: Vec<String>,
    store_type: String,
    store_path: Option<String>,
    user: u32,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            defaults: env::var("ROTALOCK_DEFAULTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            store_type: env::var("ROTALOCK_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("ROTALOCK_STORE_PATH").ok(),
            user: env::var("ROTALOCK_USER")
                .ok()
                .map(|s| {
                    s.parse::<u32>()
                        .map_err(|_| anyhow::anyhow!("ROTALOCK_USER must be an integer, got '{}'", s))
                })
                .transpose()?
                .unwrap_or(0),
            log_level: env::var("ROTALOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Validate store type
        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "ROTALOCK_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        // Validate store path for file store
        if self.store_type == "file" {
            if let Some(ref path) = self.store_path {
                if path.is_empty() {
                    anyhow::bail!(
                        "ROTALOCK_STORE_PATH cannot be empty when ROTALOCK_STORE_TYPE=file"
                    );
                }
            } else {
                anyhow::bail!(
                    "ROTALOCK_STORE_PATH is required when ROTALOCK_STORE_TYPE=file. \
                    Set it via: export ROTALOCK_STORE_PATH=/var/lib/rotalock/settings.json"
                );
            }
        }

        // Each default entry must at least have the key:value shape; integer
        // validation stays with the library, which skips bad entries
        for entry in &self.defaults {
            if !entry.contains(':') {
                anyhow::bail!(
                    "ROTALOCK_DEFAULTS entry '{}' is not a state:policy pair. \
                    Example: export ROTALOCK_DEFAULTS=0:1,1:2",
                    entry
                );
            }
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ROTALOCK_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// The store backend selection for the library
    fn store_backend(&self) -> StoreBackendConfig {
        match self.store_type.as_str() {
            "memory" => StoreBackendConfig::Memory,
            _ => StoreBackendConfig::File {
                path: self.store_path.clone().unwrap_or_default(),
            },
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RotalockExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return RotalockExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RotalockExitCode::ConfigError.into();
    }

    info!("Starting rotalockd daemon");
    info!("Configuration loaded: {} default entry(ies)", config.defaults.len());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RotalockExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            RotalockExitCode::RuntimeError
        } else {
            RotalockExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let store = rotalock_core::store::from_config(&config.store_backend()).await?;
    let defaults = StaticDefaults::new(config.defaults.clone());

    if !SettingsManager::is_feature_enabled(&defaults) {
        warn!("No rotation lock defaults configured; every device state reads as ignored");
    }

    let mut manager = SettingsManager::new(store, &defaults, config.user).await;
    info!(
        "Settings manager initialized: {} governed state(s) for user {}",
        manager.settings().len(),
        config.user
    );

    // The manager's run loop handles SIGINT itself; SIGTERM is handled here
    // so systemd stops are clean too
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;

        tokio::select! {
            result = manager.run() => result?,
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    manager.run().await?;

    info!("Daemon stopped");
    Ok(())
}
