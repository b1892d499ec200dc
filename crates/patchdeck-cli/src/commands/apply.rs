//! Apply command implementation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use patchdeck::{MemoryPreferences, PatchConfig, ToggleOutcome};
use tracing::info;

use super::check::load_registry;
use super::image::LibImage;

/// Run the apply command
pub fn run(
    config: &PatchConfig,
    image: &Path,
    libs: &[LibImage],
    enable: &[String],
    output: &Path,
) -> Result<()> {
    let mut prefs = MemoryPreferences::new();
    let mut registry = load_registry(config, image, libs, &prefs)?;

    let mut failed = Vec::new();
    for id in enable {
        // A repeated id would toggle the feature back off
        if registry.is_enabled(id) {
            println!("{} {} (already enabled)", "kept".green(), id);
            continue;
        }
        match registry.toggle(id, &mut prefs) {
            Some(ToggleOutcome::Applied { .. }) => println!("{} {}", "enabled".green(), id),
            Some(ToggleOutcome::Rejected) => {
                println!("{} {} (unsupported)", "skipped".red(), id);
                failed.push(id.as_str());
            }
            Some(ToggleOutcome::Failed { .. }) => {
                println!("{} {} (write failed)", "failed".red(), id);
                failed.push(id.as_str());
            }
            None => {
                println!("{} {} (no such toggle)", "skipped".red(), id);
                failed.push(id.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!("could not enable: {}", failed.join(", "));
    }

    let memory = registry.into_engine().into_inner();
    let bytes = memory
        .image_bytes(None)
        .context("primary image is not mapped")?;
    fs::write(output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!("Wrote patched image to {}", output.display());
    println!("Wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_repeated_enable_keeps_patch() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("game.exe");
        fs::write(&image, [0x90, 0x74, 0x05, 0x90]).unwrap();

        let catalogs = dir.path().join("hacks");
        fs::create_dir(&catalogs).unwrap();
        fs::write(
            catalogs.join("player.json"),
            r#"{ "title": "Player", "items": [
                { "type": "toggle", "title": "Jump", "id": "jump",
                  "opcodes": [ { "addr": "0x1", "on": "EB 05", "off": "74 05" } ] } ] }"#,
        )
        .unwrap();

        let config = PatchConfig::builder().catalog_dir(&catalogs).build();
        let output = dir.path().join("patched.exe");
        let enable = ["jump".to_string(), "jump".to_string()];
        run(&config, &image, &[], &enable, &output).unwrap();

        assert_eq!(fs::read(&output).unwrap(), [0x90, 0xEB, 0x05, 0x90]);
    }

    #[test]
    fn test_unknown_id_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("game.exe");
        fs::write(&image, [0x90]).unwrap();
        let catalogs = dir.path().join("hacks");
        fs::create_dir(&catalogs).unwrap();

        let config = PatchConfig::builder().catalog_dir(&catalogs).build();
        let output = dir.path().join("patched.exe");
        assert!(run(&config, &image, &[], &["missing".to_string()], &output).is_err());
        assert!(!output.exists());
    }
}
