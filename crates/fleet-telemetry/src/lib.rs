//! # Fleet Telemetry
//!
//! Structured logging for the Fleetnet controller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleet_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FLEET_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `FLEET_JSON_LOGS` | `false` | Emit JSON lines instead of human output |
//! | `FLEET_SERVICE_NAME` | `fleetnet` | Service name recorded on startup |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter directive could not be parsed
    #[error("Invalid log filter {directive:?}: {reason}")]
    Filter {
        /// Directive that failed to parse
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber was already installed
    #[error("Failed to install subscriber: {0}")]
    Subscriber(String),
}

/// Span covering work on one network.
///
/// # Example
///
/// ```rust,ignore
/// let _span = fleet_telemetry::network_span!("bootstrap", network_uuid = %uuid).entered();
/// ```
#[macro_export]
macro_rules! network_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

/// Log an event about a single node with the standard `node_id` field.
#[macro_export]
macro_rules! log_node_event {
    ($level:ident, $msg:expr, $node_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            node_id = %$node_id,
            $($($field)*,)?
            $msg
        )
    };
}
