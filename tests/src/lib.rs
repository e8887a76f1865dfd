//! # Blueprint Test Suite
//!
//! Cross-crate scenarios that exercise the event bus and the container
//! together through real modules.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── fixtures.rs       # Publisher / subscriber / recording modules
//! │   └── integration/
//! │       ├── wiring.rs     # Event delivery between modules
//! │       └── lifecycle.rs  # Start/stop ordering, failures, disposal
//! └── benches/
//!     └── event_bus_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p blueprint-tests
//! cargo test -p blueprint-tests integration::lifecycle::
//!
//! # Benchmarks
//! cargo bench -p blueprint-tests
//! ```

pub mod fixtures;
pub mod integration;

use blueprint_telemetry::{init_logging, TelemetryConfig};
use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install a quiet subscriber once per test binary.
///
/// Set `BLUEPRINT_CONSOLE_OUTPUT=true` to see the container's logs.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let config = TelemetryConfig {
            console_output: std::env::var("BLUEPRINT_CONSOLE_OUTPUT").is_ok_and(|v| v == "true"),
            ..TelemetryConfig::for_tests()
        };
        // Another harness may already have installed one.
        let _ = init_logging(&config);
    });
}
