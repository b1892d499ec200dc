//! Check command implementation.
//!
//! Loads every catalog against the given images, exactly as a host would at
//! startup, and prints the resulting state of each component.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use patchdeck::{
    CatalogLoader, Component, ComponentState, ImageMemory, MemoryPreferences, PatchConfig,
    PatchEngine, Preferences, Registry,
};

use super::image::{LibImage, load_images};

/// Map the images and load the configured catalogs against them.
pub fn load_registry<S>(
    config: &PatchConfig,
    image: &Path,
    libs: &[LibImage],
    prefs: &S,
) -> Result<Registry<ImageMemory>>
where
    S: Preferences + ?Sized,
{
    let memory = load_images(image, libs)?;
    let modules = memory.module_table();
    let version = config.version_check();
    let loader = CatalogLoader::from_config(&modules, version.as_ref(), config);

    let mut registry = Registry::new(PatchEngine::new(memory));
    registry
        .load(&loader, &config.catalog_dir, prefs)
        .with_context(|| format!("failed to load catalogs from {}", config.catalog_dir.display()))?;
    Ok(registry)
}

/// Run the check command
pub fn run(config: &PatchConfig, image: &Path, libs: &[LibImage]) -> Result<()> {
    let registry = load_registry(config, image, libs, &MemoryPreferences::new())?;

    for window in registry.windows() {
        println!("{}", window.title().bold());
        for component in window.components() {
            match component {
                Component::Text(text) => println!("    {}", text.text().dimmed()),
                Component::Toggle(toggle) => {
                    let state = match toggle.state() {
                        ComponentState::Unsupported => {
                            format!("{:<11}", toggle.state()).red().to_string()
                        }
                        state => format!("{:<11}", state).green().to_string(),
                    };
                    let cheat = if toggle.is_cheat() { " [cheat]" } else { "" };
                    println!(
                        "  {} {} ({}, {} opcode(s)){}",
                        state,
                        toggle.name(),
                        toggle.id(),
                        toggle.opcodes().len(),
                        cheat.yellow()
                    );
                }
            }
        }
        println!();
    }

    let summary = registry.summary();
    if summary.unsupported > 0 {
        println!("{}", summary.yellow());
    } else {
        println!("{}", summary.green());
    }
    Ok(())
}
