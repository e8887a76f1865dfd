//! Event types emitted by the container itself.
//!
//! Modules subscribe to these with the same `on`/`once` calls they use for
//! each other's events.

/// Emitted before any module is started. Payload: `{ blueprintId, moduleCount }`.
pub const CONTAINER_STARTING: &str = "CONTAINER_STARTING";

/// Emitted once every module reached `READY`. Payload: `{ blueprintId, moduleCount }`.
pub const CONTAINER_STARTED: &str = "CONTAINER_STARTED";

/// Emitted before modules are stopped. Payload: `{ blueprintId, moduleCount }`.
pub const CONTAINER_STOPPING: &str = "CONTAINER_STOPPING";

/// Emitted after every module was asked to stop. Payload: `{ blueprintId, moduleCount }`.
pub const CONTAINER_STOPPED: &str = "CONTAINER_STOPPED";

/// A module finished `init`. Payload: `{ moduleId }`.
pub const MODULE_LOADED: &str = "MODULE_LOADED";

/// A module's `init` failed. Payload: `{ moduleId, error }`.
pub const MODULE_LOAD_FAILED: &str = "MODULE_LOAD_FAILED";

/// A module was disposed and removed. Payload: `{ moduleId }`.
pub const MODULE_UNLOADED: &str = "MODULE_UNLOADED";
