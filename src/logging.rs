//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout carries only progress output.

use std::fmt;
use std::io;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt as layer;
use tracing_subscriber::prelude::*;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "flotilla=info,warn";

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Human,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Json => "json",
        })
    }
}

/// Error returned for an unknown log format name.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown log format '{0}'")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(UnknownLogFormat(value.to_owned())),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// Respects `RUST_LOG`. A second call leaves the first subscriber in place,
/// which keeps repeated initialisation in tests harmless.
pub fn init(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match format {
        LogFormat::Human => {
            let subscriber = layer::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(subscriber)
                .try_init()
        }
        LogFormat::Json => {
            let subscriber = layer::layer()
                .json()
                .with_writer(io::stderr)
                .with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(subscriber)
                .try_init()
        }
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
