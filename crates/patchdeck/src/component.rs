//! User-facing components: toggles backed by opcodes, and plain text.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::engine::{ApplyReport, PatchEngine};
use crate::memory::{ReadMemory, WriteMemory};
use crate::opcode::Opcode;
use crate::preferences::{Preferences, toggle_key};

/// Tooltip shown on toggles that cannot be used.
pub const UNSUPPORTED_TOOLTIP: &str =
    "Your game version is not supported, or you have conflicting mods.";

/// Render collaborator. Called once per frame for each component.
pub trait Ui {
    fn begin_window(&mut self, _title: &str) {}
    fn end_window(&mut self) {}
    fn text(&mut self, text: &str);
    /// Draw a checkbox and return whether it was pressed this frame.
    fn checkbox(&mut self, label: &str, checked: bool, enabled: bool, tooltip: Option<&str>)
    -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ComponentState {
    /// Opcodes failed resolution or verification; stays this way until restart
    Unsupported,
    Disabled,
    Enabled,
}

/// Which enabled flag is persisted after a toggle whose writes failed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TogglePolicy {
    /// Keep and persist the requested state
    #[default]
    Requested,
    /// Return to the previous state and persist that
    Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Component is unsupported; nothing was written or persisted
    Rejected,
    Applied { enabled: bool },
    /// Writes failed and were rolled back; `enabled` is the state now persisted
    Failed { enabled: bool },
}

#[derive(Debug, Clone)]
pub struct ToggleComponent {
    id: String,
    name: String,
    description: String,
    opcodes: Vec<Opcode>,
    has_warning: bool,
    enabled: bool,
    is_cheat: bool,
    policy: TogglePolicy,
}

impl ToggleComponent {
    pub fn new(name: impl Into<String>, id: impl Into<String>, opcodes: Vec<Opcode>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            opcodes,
            has_warning: false,
            enabled: false,
            is_cheat: false,
            policy: TogglePolicy::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cheat(mut self, is_cheat: bool) -> Self {
        self.is_cheat = is_cheat;
        self
    }

    pub fn with_warning(mut self, has_warning: bool) -> Self {
        self.has_warning = has_warning;
        self
    }

    pub fn with_policy(mut self, policy: TogglePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn has_warning(&self) -> bool {
        self.has_warning
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_cheat(&self) -> bool {
        self.is_cheat
    }

    pub fn state(&self) -> ComponentState {
        if self.has_warning {
            ComponentState::Unsupported
        } else if self.enabled {
            ComponentState::Enabled
        } else {
            ComponentState::Disabled
        }
    }

    pub fn preference_key(&self) -> String {
        toggle_key(&self.id)
    }

    /// Load the persisted flag and, if set, apply the opcodes.
    ///
    /// Application is best effort: opcodes that did apply stay applied even
    /// if others fail. Unsupported components never touch memory.
    pub fn init<M, P>(&mut self, engine: &mut PatchEngine<M>, prefs: &P) -> Option<ApplyReport>
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
    {
        self.enabled = prefs.get_bool(&self.preference_key(), false);
        if !self.enabled || self.has_warning {
            return None;
        }

        let report = engine.apply_each(&self.opcodes, true);
        if report.is_success() {
            debug!("Enabled {} on startup", self.id);
        } else {
            warn!(
                "{} only partially applied on startup ({} of {} opcodes)",
                self.name,
                report.applied,
                self.opcodes.len()
            );
        }
        Some(report)
    }

    /// Flip the enabled state, write the opcodes and persist the flag.
    pub fn toggle<M, P>(&mut self, engine: &mut PatchEngine<M>, prefs: &mut P) -> ToggleOutcome
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
    {
        if self.has_warning {
            debug!("Ignoring toggle of unsupported component {}", self.id);
            return ToggleOutcome::Rejected;
        }

        self.enabled = !self.enabled;
        let report = engine.apply_all(&self.opcodes, self.enabled);

        let outcome = if report.is_success() {
            info!("{} {}", self.name, if self.enabled { "enabled" } else { "disabled" });
            ToggleOutcome::Applied {
                enabled: self.enabled,
            }
        } else {
            if self.policy == TogglePolicy::Outcome {
                self.enabled = !self.enabled;
            }
            warn!(
                "Failed to toggle {}; keeping enabled={}",
                self.name, self.enabled
            );
            ToggleOutcome::Failed {
                enabled: self.enabled,
            }
        };

        prefs.set_bool(&self.preference_key(), self.enabled);
        outcome
    }

    /// Write the original bytes back without touching preferences.
    pub fn revert<M>(&mut self, engine: &mut PatchEngine<M>) -> Option<ApplyReport>
    where
        M: ReadMemory + WriteMemory,
    {
        if !self.enabled || self.has_warning {
            return None;
        }
        let report = engine.apply_all(&self.opcodes, false);
        if report.is_success() {
            self.enabled = false;
        }
        Some(report)
    }

    pub fn draw<M, P, U>(
        &mut self,
        ui: &mut U,
        engine: &mut PatchEngine<M>,
        prefs: &mut P,
    ) -> Option<ToggleOutcome>
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
        U: Ui + ?Sized,
    {
        let tooltip = if self.has_warning {
            Some(UNSUPPORTED_TOOLTIP)
        } else if !self.description.is_empty() {
            Some(self.description.as_str())
        } else {
            None
        };

        let pressed = ui.checkbox(&self.name, self.enabled, !self.has_warning, tooltip);
        pressed.then(|| self.toggle(engine, prefs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextComponent {
    text: String,
}

impl TextComponent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone)]
pub enum Component {
    Text(TextComponent),
    Toggle(ToggleComponent),
}

impl Component {
    /// Display name, also the sort key inside a window.
    pub fn name(&self) -> &str {
        match self {
            Component::Text(text) => text.text(),
            Component::Toggle(toggle) => toggle.name(),
        }
    }

    pub fn as_toggle(&self) -> Option<&ToggleComponent> {
        match self {
            Component::Toggle(toggle) => Some(toggle),
            Component::Text(_) => None,
        }
    }

    pub(crate) fn as_toggle_mut(&mut self) -> Option<&mut ToggleComponent> {
        match self {
            Component::Toggle(toggle) => Some(toggle),
            Component::Text(_) => None,
        }
    }

    pub fn init<M, P>(&mut self, engine: &mut PatchEngine<M>, prefs: &P)
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
    {
        match self {
            Component::Text(_) => {}
            Component::Toggle(toggle) => {
                toggle.init(engine, prefs);
            }
        }
    }

    pub fn draw<M, P, U>(
        &mut self,
        ui: &mut U,
        engine: &mut PatchEngine<M>,
        prefs: &mut P,
    ) -> Option<ToggleOutcome>
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
        U: Ui + ?Sized,
    {
        match self {
            Component::Text(text) => {
                ui.text(text.text());
                None
            }
            Component::Toggle(toggle) => toggle.draw(ui, engine, prefs),
        }
    }
}

impl From<TextComponent> for Component {
    fn from(text: TextComponent) -> Self {
        Component::Text(text)
    }
}

impl From<ToggleComponent> for Component {
    fn from(toggle: ToggleComponent) -> Self {
        Component::Toggle(toggle)
    }
}

/// A titled group of components, sorted by name ignoring case.
#[derive(Debug, Clone)]
pub struct Window {
    title: String,
    components: Vec<Component>,
}

impl Window {
    pub fn new(title: impl Into<String>, mut components: Vec<Component>) -> Self {
        components.sort_by_cached_key(|c| c.name().to_lowercase());
        Self {
            title: title.into(),
            components,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    pub fn toggles(&self) -> impl Iterator<Item = &ToggleComponent> {
        self.components.iter().filter_map(Component::as_toggle)
    }

    pub fn init<M, P>(&mut self, engine: &mut PatchEngine<M>, prefs: &P)
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
    {
        for component in &mut self.components {
            component.init(engine, prefs);
        }
    }

    pub fn draw<M, P, U>(&mut self, ui: &mut U, engine: &mut PatchEngine<M>, prefs: &mut P)
    where
        M: ReadMemory + WriteMemory,
        P: Preferences + ?Sized,
        U: Ui + ?Sized,
    {
        ui.begin_window(&self.title);
        for component in &mut self.components {
            component.draw(ui, engine, prefs);
        }
        ui.end_window();
    }
}
