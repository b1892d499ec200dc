//! Scan command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use patchdeck::hex::format_hex_bytes;
use patchdeck::{BytePattern, ModuleProvider, ReadMemory, scan_module};

use super::image::{IMAGE_BASE, load_images};

/// Run the scan command
pub fn run(image: &Path, pattern: &str, limit: usize) -> Result<()> {
    let pattern = BytePattern::parse(pattern).context("invalid pattern")?;
    let memory = load_images(image, &[])?;
    let module = memory
        .module_table()
        .module(None)
        .context("image was not mapped")?;

    println!(
        "Scanning {} ({} bytes) for {}",
        module.name,
        module.size,
        pattern.bold()
    );

    let matches = scan_module(&memory, &module, &pattern)?;
    if matches.is_empty() {
        println!("{}", "No matches".yellow());
        return Ok(());
    }

    for address in matches.iter().take(limit) {
        let bytes = memory.read_bytes(*address, pattern.len())?;
        println!(
            "  {}  {}",
            format!("0x{:X}", address - IMAGE_BASE).green(),
            format_hex_bytes(&bytes).dimmed()
        );
    }

    if matches.len() > limit {
        println!("  ... and {} more", matches.len() - limit);
    }
    println!("{} match(es)", matches.len());
    Ok(())
}
