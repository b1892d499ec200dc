//! # patchdeck
//!
//! Declarative runtime patching of loaded modules.
//!
//! This crate provides:
//! - Byte pattern parsing and scanning
//! - Checked reads and protected writes for the current process
//! - Catalog loading: JSON windows of toggles backed by opcodes
//! - Toggle state machine with persisted preferences
//! - A registry that owns every component and the patch engine
//!
//! ## Example
//!
//! ```ignore
//! use patchdeck::prelude::*;
//!
//! let config = PatchConfig::load("patchdeck.toml")?;
//! let mut prefs = JsonPreferences::load(&config.preferences)?.autosave(true);
//!
//! // SAFETY: catalogs only target module code of this process.
//! let mut registry = unsafe { Registry::attach(&config, &prefs)? };
//! registry.toggle("noclip", &mut prefs);
//! ```

pub mod catalog;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod hex;
pub mod memory;
pub mod opcode;
pub mod pattern;
pub mod preferences;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod version;

pub use catalog::{CatalogLoader, ItemDef, OpcodeDef, TextDef, ToggleDef, WindowDef};
pub use component::{
    Component, ComponentState, TextComponent, ToggleComponent, ToggleOutcome, TogglePolicy, Ui,
    UNSUPPORTED_TOOLTIP, Window,
};
pub use config::{PatchConfig, PatchConfigBuilder};
pub use engine::{ApplyReport, PatchEngine};
pub use error::{Error, Result};
pub use memory::{
    ImageMemory, ImageMemoryBuilder, LoadedModules, ModuleInfo, ModuleProvider, ModuleTable,
    ProcessMemory, ReadMemory, WriteMemory,
};
pub use opcode::{Opcode, OpcodeAddress};
pub use pattern::{BytePattern, scan_module};
pub use preferences::{JsonPreferences, MemoryPreferences, Preferences, toggle_key};
pub use registry::{Registry, RegistrySummary};
pub use resolver::{AddressResolver, MatchPolicy};
pub use version::{AnyVersion, GameVersion, VersionCheck};
