//! Logging Configuration

use tracing_subscriber::EnvFilter;

const LOG_LEVEL_ENV: &str = "POWERTOOLS_LOG_LEVEL";

fn fallback_level(is_debug: bool) -> log::LevelFilter {
    if is_debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

fn resolve_default_level(is_debug: bool) -> log::LevelFilter {
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(val) => parse_log_level(&val).unwrap_or_else(|| {
            eprintln!(
                "Warning: Invalid {} '{}', falling back to default",
                LOG_LEVEL_ENV, val
            );
            fallback_level(is_debug)
        }),
        Err(_) => fallback_level(is_debug),
    }
}

pub fn parse_log_level(value: &str) -> Option<log::LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(log::LevelFilter::Trace),
        "debug" => Some(log::LevelFilter::Debug),
        "info" => Some(log::LevelFilter::Info),
        "warn" => Some(log::LevelFilter::Warn),
        "error" => Some(log::LevelFilter::Error),
        "off" => Some(log::LevelFilter::Off),
        _ => None,
    }
}

pub fn level_to_str(level: log::LevelFilter) -> &'static str {
    match level {
        log::LevelFilter::Trace => "trace",
        log::LevelFilter::Debug => "debug",
        log::LevelFilter::Info => "info",
        log::LevelFilter::Warn => "warn",
        log::LevelFilter::Error => "error",
        log::LevelFilter::Off => "off",
    }
}

/// Installs the stderr subscriber. `log` records from the core are bridged
/// into it.
pub fn init_logging(is_debug: bool) -> log::LevelFilter {
    let level = resolve_default_level(is_debug);
    let result = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level_to_str(level)))
        .with_target(is_debug)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        eprintln!("Warning: Failed to install logger: {}", e);
    }
    level
}
