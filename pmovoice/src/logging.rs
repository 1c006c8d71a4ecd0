//! Initialisation du logging à partir de la configuration

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use pmoconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::error::Result;

/// Poignée sur le filtre de niveau global, modifiable à chaud
#[derive(Clone)]
pub struct LogHandle {
    max_level: Arc<RwLock<LevelFilter>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogHandle {
    pub fn max_level(&self) -> LevelFilter {
        *self
            .max_level
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_max_level(&self, level: Level) -> Result<()> {
        let filter = LevelFilter::from_level(level);
        self.reload_handle
            .reload(filter)
            .map_err(|e| anyhow!("Failed to reload log level filter: {e}"))?;
        *self
            .max_level
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;
        tracing::info!("log level set to {filter}");
        Ok(())
    }
}

pub(crate) fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installe le subscriber global.
///
/// The level comes from `host.logger.min_level` (TRACE when missing or
/// unknown) and console output from `host.logger.enable_console`. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: &Config) -> Result<LogHandle> {
    let log_level = match config.get_log_min_level() {
        Ok(l) => match string_to_level(&l) {
            Some(lev) => LevelFilter::from_level(lev),
            None => LevelFilter::TRACE,
        },
        Err(_) => LevelFilter::TRACE,
    };

    let (filter, reload_handle) = reload::Layer::new(log_level);

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    let console = enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    Registry::default()
        .with(filter)
        .with(console)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(LogHandle {
        max_level: Arc::new(RwLock::new(log_level)),
        reload_handle,
    })
}
