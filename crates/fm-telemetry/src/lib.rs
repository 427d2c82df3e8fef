//! # FreightMesh Telemetry
//!
//! Structured logging setup shared by every mesh service. Containers get
//! JSON lines a log shipper can parse; development gets pretty console
//! output. Level filtering follows `RUST_LOG` conventions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fm_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_telemetry(&config).expect("telemetry init");
//!
//!     // Application code logs through `tracing` from here on
//! }
//! ```

mod config;

pub use config::TelemetryConfig;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter `{0}`")]
    Filter(String),
}

/// Install the global subscriber described by `config`.
///
/// Calling this twice is a no-op: the second call leaves the installed
/// subscriber in place, which keeps test binaries and embedded runtimes
/// from fighting over the global slot.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    if !config.console_output {
        let _ = tracing_subscriber::registry().with(env_filter).try_init();
        return Ok(());
    }

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init();
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    }

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "telemetry initialized"
    );
    Ok(())
}
