use std::path::Path;

use tracing::debug;

use super::{ModuleInfo, ModuleProvider, normalize_module_name};

/// A fixed list of modules, one of which may be the primary module.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: Vec<ModuleInfo>,
    main: Option<usize>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_main(mut self, module: ModuleInfo) -> Self {
        self.main = Some(self.modules.len());
        self.modules.push(module);
        self
    }

    pub fn with_module(mut self, module: ModuleInfo) -> Self {
        self.modules.push(module);
        self
    }

    pub fn main(&self) -> Option<&ModuleInfo> {
        self.main.map(|index| &self.modules[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Find by exact name or by file name, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .or_else(|| {
                self.modules.iter().find(|m| {
                    file_name(&m.name).is_some_and(|file| file.eq_ignore_ascii_case(name))
                })
            })
    }
}

impl ModuleProvider for ModuleTable {
    fn module(&self, name: Option<&str>) -> Option<ModuleInfo> {
        match normalize_module_name(name) {
            None => self.main().cloned(),
            Some(name) => self.find(name).cloned(),
        }
    }
}

fn file_name(path: &str) -> Option<&str> {
    Path::new(path).file_name().and_then(|f| f.to_str())
}

/// Modules loaded into the current process.
#[derive(Debug, Clone, Default)]
pub struct LoadedModules {
    #[cfg(not(target_os = "windows"))]
    table: ModuleTable,
}

#[cfg(target_os = "windows")]
mod platform {
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::ProcessStatus::{GetModuleInformation, MODULEINFO};
    use windows::Win32::System::Threading::GetCurrentProcess;
    use windows::core::PCWSTR;

    use super::ModuleInfo;

    pub(super) fn query(name: Option<&str>) -> Option<ModuleInfo> {
        let wide: Option<Vec<u16>> =
            name.map(|n| n.encode_utf16().chain(std::iter::once(0)).collect());
        let name_ptr = wide
            .as_ref()
            .map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr()));

        // SAFETY: name_ptr is null or a NUL-terminated UTF-16 string that outlives the call
        let handle = unsafe { GetModuleHandleW(name_ptr) }.ok()?;

        let mut info = MODULEINFO::default();
        // SAFETY: info is a valid MODULEINFO and cb matches its size
        unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                handle,
                &mut info,
                std::mem::size_of::<MODULEINFO>() as u32,
            )
        }
        .ok()?;

        Some(ModuleInfo::new(
            name.unwrap_or("<main>"),
            info.lpBaseOfDll as u64,
            info.SizeOfImage as u64,
        ))
    }
}

impl LoadedModules {
    /// Snapshot the modules of the current process.
    #[cfg(target_os = "linux")]
    pub fn current() -> crate::error::Result<Self> {
        let maps = std::fs::read_to_string("/proc/self/maps")?;
        let exe = std::env::current_exe()?;
        let table = parse_proc_maps(&maps, exe.to_str());
        debug!("Found {} mapped modules", table.len());
        Ok(Self { table })
    }

    #[cfg(target_os = "windows")]
    pub fn current() -> crate::error::Result<Self> {
        debug!("Module lookups go through GetModuleHandleW");
        Ok(Self::default())
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    pub fn current() -> crate::error::Result<Self> {
        debug!("Module enumeration is not available on this platform");
        Ok(Self::default())
    }
}

impl ModuleProvider for LoadedModules {
    #[cfg(target_os = "windows")]
    fn module(&self, name: Option<&str>) -> Option<ModuleInfo> {
        platform::query(normalize_module_name(name))
    }

    #[cfg(not(target_os = "windows"))]
    fn module(&self, name: Option<&str>) -> Option<ModuleInfo> {
        self.table.module(name)
    }
}

/// Group `/proc/<pid>/maps` lines by backing file.
///
/// Each file becomes one module spanning its lowest to highest mapping.
/// Anonymous and pseudo mappings (`[heap]`, `[stack]`, ...) are ignored.
pub(crate) fn parse_proc_maps(maps: &str, main_path: Option<&str>) -> ModuleTable {
    let mut spans: Vec<(String, u64, u64)> = Vec::new();

    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let Some(range) = fields.next() else { continue };
        // perms, offset, dev, inode
        let path: String = fields.skip(4).collect::<Vec<_>>().join(" ");
        if path.is_empty() || path.starts_with('[') {
            continue;
        }
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
        ) else {
            continue;
        };

        match spans.iter_mut().find(|(p, _, _)| *p == path) {
            Some(span) => {
                span.1 = span.1.min(start);
                span.2 = span.2.max(end);
            }
            None => spans.push((path, start, end)),
        }
    }

    let mut table = ModuleTable::new();
    for (path, start, end) in spans {
        let module = ModuleInfo::new(path, start, end - start);
        if main_path == Some(module.name.as_str()) {
            table = table.with_main(module);
        } else {
            table = table.with_module(module);
        }
    }
    table
}
