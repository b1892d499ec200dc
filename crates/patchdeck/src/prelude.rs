//! Prelude module for convenient imports
//!
//! ```ignore
//! use patchdeck::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Session types: `Registry`, `PatchConfig`, `CatalogLoader`
//! - Components: `Window`, `ToggleComponent`, `ComponentState`, `Ui`
//! - Memory traits and backends
//! - Error handling: `Error`, `Result`

// Session
pub use crate::catalog::CatalogLoader;
pub use crate::config::PatchConfig;
pub use crate::registry::Registry;

// Error handling
pub use crate::error::{Error, Result};

// Components
pub use crate::component::{Component, ComponentState, ToggleComponent, ToggleOutcome, Ui, Window};

// Persistence and version gates
pub use crate::preferences::{JsonPreferences, MemoryPreferences, Preferences};
pub use crate::version::{AnyVersion, GameVersion, VersionCheck};

// Memory
pub use crate::engine::PatchEngine;
pub use crate::memory::{
    ImageMemory, LoadedModules, ModuleProvider, ProcessMemory, ReadMemory, WriteMemory,
};
