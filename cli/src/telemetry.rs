//! Tracing / logging initialisation.

use electrumrpc_core::LogLevel;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when no level is given on the command line.
pub const LOG_ENV: &str = "ELECTRUMRPC_LOG";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Level from `--log-level`; wins over [`LOG_ENV`].
    pub level: Option<LogLevel>,
}

impl LogConfig {
    /// Filter directive: the explicit level, else `env` (a level name or a
    /// full `EnvFilter` directive), else `info`.
    fn directive(&self, env: Option<String>) -> String {
        if let Some(level) = self.level {
            return level.directive().to_owned();
        }
        match env {
            Some(value) if !value.trim().is_empty() => match value.parse::<LogLevel>() {
                Ok(level) => level.directive().to_owned(),
                Err(_) => value,
            },
            _ => LogLevel::default().directive().to_owned(),
        }
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let directive = config.directive(std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
