use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber for the node
///
/// `RUST_LOG` takes precedence over `config.level`. Events go to stdout, or
/// to `file_path` opened in append mode, as JSON or pretty text.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level));

    let writer = match &config.file_path {
        Some(path) => BoxMakeWriter::new(Arc::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(std::io::stdout),
    };

    // Exactly one of the two is installed
    let (json, pretty) = if config.format == "json" {
        let layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_line_number(true)
            .with_writer(writer);
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_line_number(true)
            .with_file(false)
            .with_writer(writer);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()?;

    Ok(())
}

/// Filter enabling `level` and above for every target
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

fn open_log_file(path: &str) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_level_aliases_filter_globally() {
        for (name, expected) in [
            ("warning", LevelFilter::WARN),
            ("WARN", LevelFilter::WARN),
            ("info", LevelFilter::INFO),
            ("error", LevelFilter::ERROR),
        ] {
            let filter = level_filter(parse_log_level(name).unwrap());
            assert_eq!(filter.max_level_hint(), Some(expected), "{name}");
        }
    }

    #[test]
    fn test_init_rejects_invalid_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
