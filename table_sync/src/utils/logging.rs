//! Logging utilities for TableSync
//!
//! This module installs the global tracing subscriber from configuration.

use std::fs::File;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging based on configuration
///
/// Without a `[logging]` section nothing is installed.
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let config = match config {
        Some(cfg) => cfg,
        None => return Ok(()),
    };

    let directive = format!("table_sync={}", parse_level(&config.level))
        .parse::<Directive>()
        .map_err(|e| Error::ConfigError(format!("Invalid log level {}: {}", config.level, e)))?;
    let env_filter = EnvFilter::from_default_env().add_directive(directive);
    let json = config.format.eq_ignore_ascii_case("json");

    let installed = if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(file_path)?;
        let builder = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(file)
            .with_ansi(false);

        if json {
            tracing::subscriber::set_global_default(builder.json().finish())
        } else {
            tracing::subscriber::set_global_default(builder.finish())
        }
    } else if config.stdout {
        let builder = fmt::Subscriber::builder().with_env_filter(env_filter);

        if json {
            tracing::subscriber::set_global_default(builder.json().finish())
        } else {
            tracing::subscriber::set_global_default(builder.finish())
        }
    } else {
        return Ok(());
    };

    installed.map_err(|e| Error::ConfigError(format!("Failed to install logger: {}", e)))
}
