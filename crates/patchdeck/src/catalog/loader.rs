use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::descriptor::{ItemDef, OpcodeDef, TextDef, ToggleDef, WindowDef};
use crate::component::{Component, TextComponent, ToggleComponent, TogglePolicy, Window};
use crate::config::PatchConfig;
use crate::engine::PatchEngine;
use crate::error::{Error, Result};
use crate::hex::{parse_hex_address, parse_hex_bytes, parse_wildcard_bytes};
use crate::memory::{ModuleProvider, ReadMemory, WriteMemory};
use crate::opcode::{Opcode, OpcodeAddress};
use crate::pattern::BytePattern;
use crate::resolver::{AddressResolver, MatchPolicy, display_library};
use crate::version::VersionCheck;

/// Builds windows from catalog definitions.
///
/// Resolution and verification problems never abort a load: the affected
/// toggle is marked unsupported. A malformed catalog file is logged and
/// skipped without affecting its siblings.
pub struct CatalogLoader<'a, P: ?Sized, V: ?Sized> {
    modules: &'a P,
    version: &'a V,
    match_policy: MatchPolicy,
    toggle_policy: TogglePolicy,
    extension: String,
}

impl<'a, P, V> CatalogLoader<'a, P, V>
where
    P: ModuleProvider + ?Sized,
    V: VersionCheck + ?Sized,
{
    pub fn new(modules: &'a P, version: &'a V) -> Self {
        Self {
            modules,
            version,
            match_policy: MatchPolicy::default(),
            toggle_policy: TogglePolicy::default(),
            extension: "json".to_string(),
        }
    }

    /// Loader using the policies and file extension from `config`.
    pub fn from_config(modules: &'a P, version: &'a V, config: &PatchConfig) -> Self {
        Self::new(modules, version)
            .with_match_policy(config.match_policy)
            .with_toggle_policy(config.toggle_policy)
            .with_extension(&config.extension)
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn with_toggle_policy(mut self, policy: TogglePolicy) -> Self {
        self.toggle_policy = policy;
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Catalog files in `dir`, sorted by file name.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if entry.file_type()?.is_file() && matches_extension {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load every catalog in `dir`, one window per file.
    ///
    /// Fails only if the directory itself cannot be read.
    pub fn load_dir<M>(&self, dir: &Path, engine: &PatchEngine<M>) -> Result<Vec<Window>>
    where
        M: ReadMemory + WriteMemory,
    {
        let files = self.discover(dir).inspect_err(|e| {
            error!("Failed to read catalog directory {}: {}", dir.display(), e);
        })?;

        let mut windows = Vec::with_capacity(files.len());
        for path in files {
            match self.load_file(&path, engine) {
                Ok(window) => windows.push(window),
                Err(e) => error!("Skipping catalog {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} catalog window(s) from {}",
            windows.len(),
            dir.display()
        );
        Ok(windows)
    }

    pub fn load_file<M>(&self, path: &Path, engine: &PatchEngine<M>) -> Result<Window>
    where
        M: ReadMemory + WriteMemory,
    {
        let content = fs::read_to_string(path)?;
        self.load_str(&path.display().to_string(), &content, engine)
    }

    pub fn load_str<M>(&self, source_name: &str, content: &str, engine: &PatchEngine<M>) -> Result<Window>
    where
        M: ReadMemory + WriteMemory,
    {
        let def: WindowDef = serde_json::from_str(content).map_err(|e| Error::DefinitionParse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        check_definition(source_name, &def)?;
        Ok(self.build_window(def, engine))
    }

    /// Build a window, dropping items whose version constraint does not hold.
    pub fn build_window<M>(&self, def: WindowDef, engine: &PatchEngine<M>) -> Window
    where
        M: ReadMemory + WriteMemory,
    {
        let mut components = Vec::with_capacity(def.items.len());
        for item in def.items {
            if !self.version_allows(item.version()) {
                continue;
            }
            match item {
                ItemDef::Text(text) => components.push(self.build_text(text)),
                ItemDef::Toggle(toggle) => components.push(self.build_toggle(toggle, engine).into()),
                ItemDef::Unknown => debug!("Skipping unsupported item in {}", def.title),
            }
        }

        Window::new(def.title, components)
    }

    fn build_text(&self, def: TextDef) -> Component {
        TextComponent::new(def.text).into()
    }

    pub fn build_toggle<M>(&self, def: ToggleDef, engine: &PatchEngine<M>) -> ToggleComponent
    where
        M: ReadMemory + WriteMemory,
    {
        let resolver =
            AddressResolver::new(self.modules, engine.memory()).with_policy(self.match_policy);

        let mut opcodes = Vec::new();
        let mut warn_flag = false;

        for opcode_def in &def.opcodes {
            if !self.version_allows(opcode_def.version()) {
                continue;
            }

            let built = match decode_opcode(opcode_def)
                .and_then(|source| self.build_opcodes(source, &resolver))
            {
                Ok(built) => built,
                Err(e) => {
                    warn!(
                        "{}: opcode in {} unavailable: {}",
                        def.title,
                        display_library(opcode_def.lib()),
                        e
                    );
                    warn_flag = true;
                    continue;
                }
            };

            for opcode in built {
                if let Err(e) = engine.check_original(&opcode) {
                    warn!("{}: {}", def.title, e);
                    warn_flag = true;
                }
                opcodes.push(opcode);
            }
        }

        if opcodes.is_empty() {
            warn!("No opcodes found for: {}", def.title);
            warn_flag = true;
        }
        if warn_flag {
            warn!("{} has invalid opcodes!", def.title);
        }

        ToggleComponent::new(def.title, def.id, opcodes)
            .with_description(def.description.unwrap_or_default())
            .with_cheat(def.cheat)
            .with_warning(warn_flag)
            .with_policy(self.toggle_policy)
    }

    fn build_opcodes<R>(
        &self,
        source: OpcodeSource<'_>,
        resolver: &AddressResolver<'_, P, R>,
    ) -> Result<Vec<Opcode>>
    where
        R: ReadMemory + ?Sized,
    {
        match source {
            OpcodeSource::Static(opcode) => Ok(vec![opcode.resolve(resolver)?]),
            OpcodeSource::Pattern {
                pattern,
                template,
                lib,
            } => {
                let addresses = resolver.resolve_pattern(lib, &pattern)?;
                addresses
                    .into_iter()
                    .map(|address| {
                        let original = resolver.memory().read_bytes(address, pattern.len())?;
                        let patched = apply_template(&original, &template);
                        Opcode::new(OpcodeAddress::Absolute(address), lib, original, patched)
                    })
                    .collect()
            }
        }
    }

    fn version_allows(&self, constraint: Option<&str>) -> bool {
        constraint.is_none_or(|c| self.version.satisfies(c))
    }
}

/// An opcode definition with its hex decoded, not yet located.
enum OpcodeSource<'d> {
    Static(Opcode),
    Pattern {
        pattern: BytePattern,
        template: Vec<Option<u8>>,
        lib: Option<&'d str>,
    },
}

fn decode_opcode(def: &OpcodeDef) -> Result<OpcodeSource<'_>> {
    match def {
        OpcodeDef::Static {
            addr, on, off, lib, ..
        } => {
            let offset = parse_hex_address(addr)?;
            let original = parse_hex_bytes(off)?;
            let patched = parse_hex_bytes(on)?;
            let opcode = Opcode::at_offset(lib.as_deref(), offset, original, patched)?;
            Ok(OpcodeSource::Static(opcode))
        }
        OpcodeDef::Pattern {
            pattern, mask, lib, ..
        } => {
            let pattern = BytePattern::parse(pattern)?;
            let template = parse_wildcard_bytes(mask)?;
            if template.len() != pattern.len() {
                return Err(Error::InvalidPattern(format!(
                    "replacement template has {} bytes, pattern has {}",
                    template.len(),
                    pattern.len()
                )));
            }
            Ok(OpcodeSource::Pattern {
                pattern,
                template,
                lib: lib.as_deref(),
            })
        }
    }
}

/// Decode every opcode of every toggle, version gated or not.
///
/// Malformed hex rejects the whole source; only lookups against live memory
/// may mark a toggle unsupported.
fn check_definition(source_name: &str, def: &WindowDef) -> Result<()> {
    let toggles = def.items.iter().filter_map(|item| match item {
        ItemDef::Toggle(toggle) => Some(toggle),
        _ => None,
    });
    for toggle in toggles {
        for opcode in &toggle.opcodes {
            decode_opcode(opcode).map_err(|e| Error::DefinitionParse {
                source_name: source_name.to_string(),
                message: format!("toggle {}: {}", toggle.id, e),
            })?;
        }
    }
    Ok(())
}

/// Overlay template bytes on the live bytes; `None` keeps the live byte.
fn apply_template(original: &[u8], template: &[Option<u8>]) -> Vec<u8> {
    original
        .iter()
        .zip(template)
        .map(|(live, replacement)| replacement.unwrap_or(*live))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentState;
    use crate::memory::{ImageMemory, ModuleTable};
    use crate::version::{AnyVersion, GameVersion};

    const BASE: u64 = 0x40_0000;
    const LIB_BASE: u64 = 0x1000_0000;

    fn engine() -> (PatchEngine<ImageMemory>, ModuleTable) {
        let mut main = vec![0u8; 0x100];
        main[0x10..0x12].copy_from_slice(&[0x74, 0x05]);
        main[0x40..0x46].copy_from_slice(&[0x0F, 0x84, 0x12, 0x34, 0x00, 0x00]);
        let mut lib = vec![0xCCu8; 0x80];
        lib[0x20..0x23].copy_from_slice(&[0x8B, 0x45, 0x08]);
        let memory = ImageMemory::builder()
            .main_module("game.exe", BASE, main)
            .module("libcocos2d.dll", LIB_BASE, lib)
            .build();
        let table = memory.module_table();
        (PatchEngine::new(memory), table)
    }

    fn toggle(json: &str) -> ToggleDef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_static_opcode_resolves_and_verifies() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Jump", "id": "jump",
                    "opcodes": [{"addr": "0x10", "on": "EB 05", "off": "74 05"}]}"#,
            ),
            &engine,
        );
        assert_eq!(component.state(), ComponentState::Disabled);
        assert_eq!(component.opcodes()[0].absolute_address().unwrap(), BASE + 0x10);
    }

    #[test]
    fn test_verification_mismatch_marks_unsupported() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Jump", "id": "jump",
                    "opcodes": [
                        {"addr": "0x10", "on": "EB 05", "off": "74 05"},
                        {"addr": "0x20", "on": "90", "off": "C3"}
                    ]}"#,
            ),
            &engine,
        );
        assert_eq!(component.state(), ComponentState::Unsupported);
        assert_eq!(component.opcodes().len(), 2);
    }

    #[test]
    fn test_missing_library_marks_unsupported() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Audio", "id": "audio",
                    "opcodes": [{"addr": "0x10", "on": "90", "off": "00", "lib": "fmod.dll"}]}"#,
            ),
            &engine,
        );
        assert!(component.has_warning());
        assert!(component.opcodes().is_empty());
    }

    #[test]
    fn test_pattern_opcode_uses_replacement_template() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Branch", "id": "branch",
                    "opcodes": [{"pattern": "0F 84 ?? ?? 00 00", "mask": "90 E9 ?? ?? ?? ??"}]}"#,
            ),
            &engine,
        );
        assert_eq!(component.state(), ComponentState::Disabled);
        let opcode = &component.opcodes()[0];
        assert_eq!(opcode.absolute_address().unwrap(), BASE + 0x40);
        assert_eq!(opcode.original(), [0x0F, 0x84, 0x12, 0x34, 0x00, 0x00]);
        assert_eq!(opcode.patched(), [0x90, 0xE9, 0x12, 0x34, 0x00, 0x00]);
    }

    #[test]
    fn test_pattern_in_library() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Scale", "id": "scale",
                    "opcodes": [{"pattern": "8B 45 ??", "mask": "?? ?? 10", "lib": "libcocos2d.dll"}]}"#,
            ),
            &engine,
        );
        let opcode = &component.opcodes()[0];
        assert_eq!(opcode.absolute_address().unwrap(), LIB_BASE + 0x20);
        assert_eq!(opcode.library(), Some("libcocos2d.dll"));
        assert_eq!(opcode.patched(), [0x8B, 0x45, 0x10]);
    }

    #[test]
    fn test_pattern_not_found_marks_unsupported() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Gone", "id": "gone",
                    "opcodes": [{"pattern": "E8 ?? ?? ?? ??", "mask": "90 90 90 90 90"}]}"#,
            ),
            &engine,
        );
        assert_eq!(component.state(), ComponentState::Unsupported);
    }

    #[test]
    fn test_template_length_mismatch_marks_unsupported() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Short", "id": "short",
                    "opcodes": [{"pattern": "74 05", "mask": "EB"}]}"#,
            ),
            &engine,
        );
        assert!(component.has_warning());
    }

    #[test]
    fn test_version_gated_opcodes() {
        let (engine, table) = engine();
        let version = GameVersion::parse("2.204");
        let loader = CatalogLoader::new(&table, &version);
        let component = loader.build_toggle(
            toggle(
                r#"{"title": "Jump", "id": "jump",
                    "opcodes": [
                        {"addr": "0x10", "on": "EB 05", "off": "74 05", "version": "2.204"},
                        {"addr": "0x80", "on": "EB 05", "off": "74 05", "version": "2.113"}
                    ]}"#,
            ),
            &engine,
        );
        assert_eq!(component.state(), ComponentState::Disabled);
        assert_eq!(component.opcodes().len(), 1);
        assert_eq!(component.opcodes()[0].absolute_address().unwrap(), BASE + 0x10);
    }

    #[test]
    fn test_version_gated_items_with_same_id() {
        let (engine, table) = engine();
        let version = GameVersion::parse("2.204");
        let loader = CatalogLoader::new(&table, &version);
        let window = loader
            .load_str(
                "player.json",
                r#"{"title": "Player", "items": [
                    {"type": "toggle", "title": "Jump (old)", "id": "jump", "version": "2.113",
                     "opcodes": [{"addr": "0x80", "on": "EB 05", "off": "74 05"}]},
                    {"type": "toggle", "title": "Jump", "id": "jump", "version": ">=2.200",
                     "opcodes": [{"addr": "0x10", "on": "EB 05", "off": "74 05"}]},
                    {"type": "text", "text": "Legacy only", "version": "<2.0"}
                ]}"#,
                &engine,
            )
            .unwrap();

        assert_eq!(window.components().len(), 1);
        let jump = window.toggles().next().unwrap();
        assert_eq!(jump.name(), "Jump");
        assert_eq!(jump.state(), ComponentState::Disabled);
    }

    #[test]
    fn test_malformed_definition_is_parse_error() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        let err = loader.load_str("broken.json", "{ title: ", &engine).unwrap_err();
        assert!(matches!(err, Error::DefinitionParse { ref source_name, .. } if source_name == "broken.json"));
    }

    #[test]
    fn test_bad_hex_rejects_definition() {
        let (engine, table) = engine();
        let loader = CatalogLoader::new(&table, &AnyVersion);
        for opcode in [
            r#"{"addr": "0xZZ", "on": "90", "off": "74"}"#,
            r#"{"addr": "0x10", "on": "7G", "off": "74"}"#,
            r#"{"addr": "0x10", "on": "EB 05", "off": "74"}"#,
            r#"{"pattern": "0F QQ", "mask": "90 90"}"#,
            r#"{"pattern": "0F 84", "mask": "90 XX"}"#,
        ] {
            let content = format!(
                r#"{{"title": "T", "items": [
                    {{"type": "toggle", "title": "Bad", "id": "bad", "opcodes": [{}]}}
                ]}}"#,
                opcode
            );
            let err = loader.load_str("bad.json", &content, &engine).unwrap_err();
            assert!(
                matches!(err, Error::DefinitionParse { ref message, .. } if message.contains("bad")),
                "{opcode}: {err}"
            );
        }
    }

    #[test]
    fn test_bad_hex_in_gated_out_opcode_still_rejected() {
        let (engine, table) = engine();
        let version = GameVersion::parse("2.204");
        let loader = CatalogLoader::new(&table, &version);
        let err = loader
            .load_str(
                "gated.json",
                r#"{"title": "T", "items": [
                    {"type": "toggle", "title": "Jump", "id": "jump", "opcodes": [
                        {"addr": "0x10", "on": "EB 05", "off": "74 05"},
                        {"addr": "0x10", "on": "7G", "off": "74", "version": "2.113"}
                    ]}
                ]}"#,
                &engine,
            )
            .unwrap_err();
        assert!(matches!(err, Error::DefinitionParse { .. }));
    }

    #[test]
    fn test_apply_template() {
        assert_eq!(
            apply_template(&[1, 2, 3], &[None, Some(9), None]),
            vec![1, 9, 3]
        );
    }
}
