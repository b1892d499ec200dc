//! Owner of every loaded window and of the patch engine.

use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::catalog::CatalogLoader;
use crate::component::{Component, ComponentState, ToggleComponent, ToggleOutcome, Ui, Window};
use crate::config::PatchConfig;
use crate::engine::PatchEngine;
use crate::error::Result;
use crate::memory::{LoadedModules, ModuleProvider, ProcessMemory, ReadMemory, WriteMemory};
use crate::preferences::Preferences;
use crate::version::VersionCheck;

/// Component counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub windows: usize,
    pub texts: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub unsupported: usize,
}

impl RegistrySummary {
    pub fn toggles(&self) -> usize {
        self.enabled + self.disabled + self.unsupported
    }
}

impl fmt::Display for RegistrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} window(s), {} toggle(s): {} enabled, {} disabled, {} unsupported",
            self.windows,
            self.toggles(),
            self.enabled,
            self.disabled,
            self.unsupported
        )
    }
}

/// Windows in load order plus the engine that patches them.
///
/// Dropping a registry leaves memory as it is. Call [`Registry::disable_all`]
/// first to restore the original bytes.
#[derive(Debug)]
pub struct Registry<M> {
    engine: PatchEngine<M>,
    windows: Vec<Window>,
}

impl Registry<ProcessMemory> {
    /// Load the configured catalogs against the current process.
    ///
    /// # Safety
    ///
    /// Same contract as [`ProcessMemory::new`]: the caller accepts that
    /// catalog opcodes rewrite code of the running process.
    pub unsafe fn attach<S>(config: &PatchConfig, prefs: &S) -> Result<Self>
    where
        S: Preferences + ?Sized,
    {
        let modules = LoadedModules::current()?;
        // SAFETY: forwarded to the caller.
        let memory = unsafe { ProcessMemory::new() };
        let version = config.version_check();
        let loader = CatalogLoader::from_config(&modules, version.as_ref(), config);

        let mut registry = Self::new(PatchEngine::new(memory));
        registry.load(&loader, &config.catalog_dir, prefs)?;
        Ok(registry)
    }
}

impl<M> Registry<M>
where
    M: ReadMemory + WriteMemory,
{
    pub fn new(engine: PatchEngine<M>) -> Self {
        Self {
            engine,
            windows: Vec::new(),
        }
    }

    /// Load every catalog in `dir` and initialize its components from `prefs`.
    ///
    /// Returns the number of windows added.
    pub fn load<P, V, S>(
        &mut self,
        loader: &CatalogLoader<'_, P, V>,
        dir: &Path,
        prefs: &S,
    ) -> Result<usize>
    where
        P: ModuleProvider + ?Sized,
        V: VersionCheck + ?Sized,
        S: Preferences + ?Sized,
    {
        let windows = loader.load_dir(dir, &self.engine)?;
        let count = windows.len();
        for window in windows {
            self.add_window(window, prefs);
        }
        info!("{}", self.summary());
        Ok(count)
    }

    /// Initialize `window` and take ownership of it.
    pub fn add_window<S>(&mut self, mut window: Window, prefs: &S)
    where
        S: Preferences + ?Sized,
    {
        window.init(&mut self.engine, prefs);
        self.windows.push(window);
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.windows.iter().flat_map(|w| w.components())
    }

    pub fn toggles(&self) -> impl Iterator<Item = &ToggleComponent> {
        self.windows.iter().flat_map(|w| w.toggles())
    }

    /// First toggle with `id`, in window order.
    pub fn find_toggle(&self, id: &str) -> Option<&ToggleComponent> {
        self.toggles().find(|t| t.id() == id)
    }

    /// Toggle the component with `id`; `None` if there is none.
    pub fn toggle<S>(&mut self, id: &str, prefs: &mut S) -> Option<ToggleOutcome>
    where
        S: Preferences + ?Sized,
    {
        // Split borrow: the engine and the windows are disjoint fields.
        let Self { engine, windows } = self;
        let toggle = windows
            .iter_mut()
            .flat_map(|w| w.components_mut().iter_mut())
            .filter_map(Component::as_toggle_mut)
            .find(|t| t.id() == id);

        match toggle {
            Some(toggle) => Some(toggle.toggle(engine, prefs)),
            None => {
                warn!("No toggle with id {}", id);
                None
            }
        }
    }

    pub fn draw<U, S>(&mut self, ui: &mut U, prefs: &mut S)
    where
        U: Ui + ?Sized,
        S: Preferences + ?Sized,
    {
        for window in &mut self.windows {
            window.draw(ui, &mut self.engine, prefs);
        }
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary {
            windows: self.windows.len(),
            ..Default::default()
        };
        for component in self.components() {
            match component {
                Component::Text(_) => summary.texts += 1,
                Component::Toggle(toggle) => match toggle.state() {
                    ComponentState::Enabled => summary.enabled += 1,
                    ComponentState::Disabled => summary.disabled += 1,
                    ComponentState::Unsupported => summary.unsupported += 1,
                },
            }
        }
        summary
    }

    /// Write the original bytes of every enabled toggle back.
    ///
    /// Preferences are left alone, so the next load re-applies the same
    /// toggles. Returns the number of toggles that could not be reverted.
    pub fn disable_all(&mut self) -> usize {
        let Self { engine, windows } = self;
        let mut failed = 0;
        for window in windows.iter_mut() {
            for toggle in window
                .components_mut()
                .iter_mut()
                .filter_map(Component::as_toggle_mut)
            {
                if let Some(report) = toggle.revert(engine)
                    && !report.is_success()
                {
                    warn!("Failed to revert {}", toggle.name());
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Revert everything, drop all windows and load `dir` again.
    ///
    /// Use after the host reloaded a module: resolved addresses are not
    /// tracked across module reloads.
    pub fn reload<P, V, S>(
        &mut self,
        loader: &CatalogLoader<'_, P, V>,
        dir: &Path,
        prefs: &S,
    ) -> Result<usize>
    where
        P: ModuleProvider + ?Sized,
        V: VersionCheck + ?Sized,
        S: Preferences + ?Sized,
    {
        let failed = self.disable_all();
        if failed > 0 {
            warn!("{} toggle(s) could not be reverted before reload", failed);
        }
        self.windows.clear();
        self.load(loader, dir, prefs)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.find_toggle(id).is_some_and(ToggleComponent::is_enabled)
    }

    pub fn engine(&self) -> &PatchEngine<M> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PatchEngine<M> {
        &mut self.engine
    }

    pub fn into_engine(self) -> PatchEngine<M> {
        self.engine
    }
}
