//! Logging initialisation via tracing-subscriber.
//!
//! Call [`build_filter`] and then [`init`] once at startup, after runtime
//! settings are resolved. `init` installs the primary stderr formatter plus an
//! optional tee layer (the topic logger).
//!
//! [`FallbackLogger`] is a separate dispatcher that writes to stderr only. It
//! is handed to components that must report problems with the tee itself,
//! so those reports never loop back into the tee.

use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, dispatcher};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt as tfmt};

use crate::error::AppError;

/// A type-erased layer stacked on the global registry.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the global level filter.
///
/// `level` accepts standard level strings: `"error"`, `"warn"`, `"info"`,
/// `"debug"`, `"trace"`.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
pub fn build_filter(level: &str, prefer_level: bool) -> Result<EnvFilter, AppError> {
    if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => Ok(filter),
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            }),
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    }
}

/// Install the global tracing subscriber: stderr formatter, optional tee.
pub fn init(filter: EnvFilter, tee: Option<BoxedLayer>) -> Result<(), AppError> {
    let mut layers: Vec<BoxedLayer> = vec![tfmt::layer().with_writer(std::io::stderr).boxed()];
    if let Some(tee) = tee {
        layers.push(tee);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. Useful for validating config before initialising.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

// ── Fallback logger ───────────────────────────────────────────────────────────

/// Logger that bypasses the global subscriber (and therefore any tee).
///
/// Cheap to clone; all clones share the same dispatcher.
#[derive(Clone)]
pub struct FallbackLogger {
    dispatch: Dispatch,
}

impl FallbackLogger {
    /// A plain stderr formatter filtered at `max_level`.
    pub fn stderr(max_level: LevelFilter) -> Self {
        let subscriber = tfmt()
            .with_writer(std::io::stderr)
            .with_max_level(max_level)
            .finish();
        Self::from_dispatch(Dispatch::new(subscriber))
    }

    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn error(&self, message: &str) {
        dispatcher::with_default(&self.dispatch, || tracing::error!("{message}"));
    }

    pub fn warn(&self, message: &str) {
        dispatcher::with_default(&self.dispatch, || tracing::warn!("{message}"));
    }
}

impl fmt::Debug for FallbackLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackLogger").finish_non_exhaustive()
    }
}
