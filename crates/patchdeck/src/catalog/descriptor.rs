use serde::{Deserialize, Serialize};

/// One catalog file: a window and its items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDef {
    pub title: String,
    #[serde(default)]
    pub items: Vec<ItemDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemDef {
    Text(TextDef),
    Toggle(ToggleDef),
    /// Item types this loader does not know (e.g. `embedded`)
    #[serde(other)]
    Unknown,
}

impl ItemDef {
    pub fn version(&self) -> Option<&str> {
        match self {
            ItemDef::Text(text) => text.version.as_deref(),
            ItemDef::Toggle(toggle) => toggle.version.as_deref(),
            ItemDef::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDef {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleDef {
    pub title: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub cheat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub opcodes: Vec<OpcodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpcodeDef {
    /// Located by signature. `mask` is a replacement template laid out like
    /// `pattern`: hex bytes are written, `??` keeps the live byte.
    Pattern {
        pattern: String,
        mask: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lib: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Fixed offset with explicit patched (`on`) and original (`off`) bytes.
    Static {
        addr: String,
        on: String,
        off: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lib: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl OpcodeDef {
    pub fn version(&self) -> Option<&str> {
        match self {
            OpcodeDef::Pattern { version, .. } | OpcodeDef::Static { version, .. } => {
                version.as_deref()
            }
        }
    }

    pub fn lib(&self) -> Option<&str> {
        match self {
            OpcodeDef::Pattern { lib, .. } | OpcodeDef::Static { lib, .. } => lib.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_definition() {
        let json = r#"{
            "title": "Player",
            "items": [
                { "type": "text", "text": "Movement" },
                { "type": "toggle", "title": "Noclip", "id": "noclip", "cheat": true,
                  "opcodes": [
                    { "addr": "0x2E8F01", "on": "E9 79", "off": "0F 84", "lib": "libgame.so" },
                    { "pattern": "0F 84 ??", "mask": "90 E9 ??", "version": ">=2.2" }
                  ] },
                { "type": "embedded", "name": "Speedhack" }
            ]
        }"#;

        let window: WindowDef = serde_json::from_str(json).unwrap();
        assert_eq!(window.title, "Player");
        assert_eq!(window.items.len(), 3);
        assert!(matches!(window.items[2], ItemDef::Unknown));

        let ItemDef::Toggle(toggle) = &window.items[1] else {
            panic!("expected toggle");
        };
        assert!(toggle.cheat);
        assert_eq!(toggle.description, None);
        assert!(matches!(toggle.opcodes[0], OpcodeDef::Static { .. }));
        assert_eq!(toggle.opcodes[0].lib(), Some("libgame.so"));
        assert!(matches!(toggle.opcodes[1], OpcodeDef::Pattern { .. }));
        assert_eq!(toggle.opcodes[1].version(), Some(">=2.2"));
    }

    #[test]
    fn test_opcode_missing_fields_is_error() {
        let json = r#"{ "addr": "0x10", "on": "90" }"#;
        assert!(serde_json::from_str::<OpcodeDef>(json).is_err());
    }

    #[test]
    fn test_missing_title_is_error() {
        assert!(serde_json::from_str::<WindowDef>(r#"{ "items": [] }"#).is_err());
    }
}
