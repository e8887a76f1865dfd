//! # Container Configuration
//!
//! Identity, bus settings and dependency-cycle policy of a
//! [`BlueprintContainer`](super::BlueprintContainer).

use blueprint_bus::BusConfig;
use std::env;
use std::str::FromStr;

/// What to do when module dependencies form a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Refuse to load the module that closes the cycle.
    #[default]
    Reject,
    /// Load it anyway and log a warning. Cyclic modules start in registration
    /// order after every other module.
    Warn,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown cycle policy `{other}`")),
        }
    }
}

/// Container configuration.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Identifier passed to modules through the execution context.
    pub blueprint_id: String,
    /// Event bus configuration.
    pub bus: BusConfig,
    /// Dependency-cycle handling.
    pub cycle_policy: CyclePolicy,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            blueprint_id: uuid::Uuid::new_v4().to_string(),
            bus: BusConfig::default(),
            cycle_policy: CyclePolicy::default(),
        }
    }
}

impl ContainerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BLUEPRINT_ID`: Container id (default: random UUID)
    /// - `BLUEPRINT_CYCLE_POLICY`: `reject` or `warn` (default: reject)
    /// - `BLUEPRINT_HISTORY_CAPACITY`, `BLUEPRINT_HANDLER_TIMEOUT_MS`: see [`BusConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            blueprint_id: env::var("BLUEPRINT_ID").unwrap_or(defaults.blueprint_id),
            bus: BusConfig::from_env(),
            cycle_policy: env::var("BLUEPRINT_CYCLE_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cycle_policy),
        }
    }

    /// Use a fixed container id.
    pub fn with_blueprint_id(mut self, id: impl Into<String>) -> Self {
        self.blueprint_id = id.into();
        self
    }

    /// Set the cycle policy.
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Set the bus configuration.
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }
}
