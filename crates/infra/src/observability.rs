//! Tracing subscriber setup
//!
//! The filter comes from `RUST_LOG` and defaults to `info`. The output format
//! comes from `WARROOM_LOG_FORMAT` (`pretty`, `json` or `compact`).

use std::str::FromStr;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use warroom_domain::{GraphError, Result};

const LOG_FORMAT_VAR: &str = "WARROOM_LOG_FORMAT";

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    /// Read `WARROOM_LOG_FORMAT`, falling back to [`LogFormat::Pretty`]
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR).ok().and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(GraphError::Config(format!("Unknown log format '{other}'"))),
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns `GraphError::Config` if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(true)).try_init()
        }
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    installed.map_err(|err| GraphError::Config(format!("Failed to install tracing: {err}")))
}

/// [`init_tracing`] for tests and embedders that may already have a subscriber
pub fn try_init_tracing(format: LogFormat) {
    let _ = init_tracing(format);
}
