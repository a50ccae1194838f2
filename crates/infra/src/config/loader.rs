//! Configuration loader
//!
//! Loads gateway configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is checked with [`Config::validate`].
//!
//! ## Environment Variables
//! - `WARROOM_META_APP_ID`: App id (required)
//! - `WARROOM_META_APP_SECRET`: App secret (required)
//! - `WARROOM_META_REDIRECT_URI`: OAuth redirect URI (required)
//! - `WARROOM_META_API_VERSION`: Graph API version without the `v`
//! - `WARROOM_META_SCOPES`: Comma-separated OAuth scopes
//! - `WARROOM_GRAPH_HOST`: Graph API host, mostly for tests
//! - `WARROOM_RATE_LIMIT_CAPACITY`: Calls allowed per window
//! - `WARROOM_RATE_LIMIT_WINDOW_MS`: Rate limit window in milliseconds
//! - `WARROOM_HTTP_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `WARROOM_TOKEN_REFRESH_ENABLED`: Background token refresh (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./warroom.{toml,json}` or `./config.{toml,json}` (current directory)
//! 2. `../warroom.{toml,json}` or `../config.{toml,json}` (parent directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use warroom_domain::{Config, GraphConfig, GraphError, OAuthConfig, Result};

const FILE_STEMS: [&str; 2] = ["warroom", "config"];
const FILE_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `GraphError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The three credential variables are required; everything else falls back
/// to the defaults.
///
/// # Errors
/// Returns `GraphError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config {
        oauth: OAuthConfig {
            app_id: env_var("WARROOM_META_APP_ID")?,
            app_secret: env_var("WARROOM_META_APP_SECRET")?,
            redirect_uri: env_var("WARROOM_META_REDIRECT_URI")?,
            ..OAuthConfig::default()
        },
        ..Config::default()
    };

    if let Some(scopes) = env_opt("WARROOM_META_SCOPES") {
        config.oauth.scopes = scopes
            .split(',')
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect();
    }

    let defaults = GraphConfig::default();
    config.graph = GraphConfig {
        api_version: env_opt("WARROOM_META_API_VERSION").unwrap_or(defaults.api_version),
        graph_host: env_opt("WARROOM_GRAPH_HOST").unwrap_or(defaults.graph_host),
        dialog_host: defaults.dialog_host,
    };

    if let Some(capacity) = env_parse("WARROOM_RATE_LIMIT_CAPACITY")? {
        config.rate_limit.capacity = capacity;
    }
    if let Some(window_ms) = env_parse("WARROOM_RATE_LIMIT_WINDOW_MS")? {
        config.rate_limit.window_ms = window_ms;
    }
    if let Some(timeout_secs) = env_parse("WARROOM_HTTP_TIMEOUT_SECS")? {
        config.http.timeout_secs = timeout_secs;
    }
    config.token_refresh.enabled =
        env_bool("WARROOM_TOKEN_REFRESH_ENABLED", config.token_refresh.enabled);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `GraphError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(GraphError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            GraphError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| GraphError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| GraphError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| GraphError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(GraphError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| {
            FILE_STEMS.iter().flat_map(move |stem| {
                FILE_EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}")))
            })
        })
        .find(|path| path.exists())
}

/// Get required environment variable
///
/// Blank values count as missing.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        GraphError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an optional numeric environment variable
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| GraphError::Config(format!("Invalid {key} '{raw}': {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
