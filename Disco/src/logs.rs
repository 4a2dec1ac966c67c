//! Logging setup: reloadable level filter plus an optional console layer.

use anyhow::{anyhow, Result};
use discoconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt, Registry,
};

/// Handle on the live level filter.
#[derive(Clone)]
pub struct LogControl {
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogControl {
    /// Changes the maximum level at runtime.
    pub fn set_level(&self, level: &str) -> Result<LevelFilter> {
        let filter = string_to_level(level)
            .map(LevelFilter::from_level)
            .ok_or_else(|| {
                anyhow!("invalid log level {level:?}, expected one of ERROR, WARN, INFO, DEBUG, TRACE")
            })?;
        self.reload_handle.reload(filter)?;
        Ok(filter)
    }

    pub fn level(&self) -> Option<LevelFilter> {
        self.reload_handle.clone_current()
    }
}

/// Installs the global subscriber from `host.logger.*`.
///
/// `override_level` wins over the configured minimum level. Console output
/// goes to stderr so that stdout stays free for the command console.
pub fn init_logging(config: &Config, override_level: Option<&str>) -> LogControl {
    let configured = match override_level {
        Some(level) => level.to_string(),
        None => config
            .get_log_min_level()
            .unwrap_or_else(|_| "INFO".to_string()),
    };
    let level = string_to_level(&configured)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let (filter, reload_handle) = reload::Layer::new(level);
    let subscriber = Registry::default().with(filter);

    if config.get_log_enable_console().unwrap_or(true) {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }

    LogControl { reload_handle }
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}
