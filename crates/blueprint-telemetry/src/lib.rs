//! # Blueprint Telemetry
//!
//! Logging bootstrap shared by every binary and test harness that hosts a
//! `BlueprintContainer`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use blueprint_telemetry::{init_logging, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//!     // Container and modules log through `tracing` from here on
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `blueprint` | Service name attached to log lines |
//! | `BLUEPRINT_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `BLUEPRINT_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `BLUEPRINT_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

// Re-exported for the span macros below.
#[doc(hidden)]
pub use tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Create an info-level span carrying module context.
///
/// # Example
///
/// ```rust,ignore
/// use blueprint_telemetry::module_span;
///
/// let span = module_span!("module_lifecycle", module_id = %id, phase = "start");
/// ```
#[macro_export]
macro_rules! module_span {
    ($name:expr, $($field:tt)*) => {
        $crate::tracing::info_span!($name, $($field)*)
    };
}
