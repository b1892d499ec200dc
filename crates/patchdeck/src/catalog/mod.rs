//! Catalog files: one JSON document per window.
//!
//! A catalog declares a window title and its items. Toggle items carry the
//! opcodes to patch, either at a fixed offset or located by byte pattern.
//! See [`CatalogLoader`] for how definitions become components.

mod descriptor;
mod loader;

pub use descriptor::{ItemDef, OpcodeDef, TextDef, ToggleDef, WindowDef};
pub use loader::CatalogLoader;
