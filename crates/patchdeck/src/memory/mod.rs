//! Memory access layer.
//!
//! The engine talks to memory only through these traits:
//!
//! - [`ReadMemory`] / [`WriteMemory`]: raw byte ranges at absolute addresses
//! - [`ModuleProvider`]: base address and size of loaded modules
//!
//! [`ProcessMemory`] and [`LoadedModules`] target the current process.
//! [`ImageMemory`] holds module images in plain buffers, for offline tooling
//! and tests.

mod image;
mod module;
mod process;

pub use image::{ImageMemory, ImageMemoryBuilder};
pub use module::{LoadedModules, ModuleTable};
pub use process::ProcessMemory;

use crate::error::{Error, Result};

/// A module mapped into the target address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            base,
            size,
        }
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    /// True if `[address, address + len)` lies entirely inside the module.
    pub fn contains(&self, address: u64, len: usize) -> bool {
        address >= self.base
            && address
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.end())
    }
}

pub trait ReadMemory {
    /// Read `len` bytes at `address`. Unmapped or unreadable memory is an error.
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes(to_array(address, &bytes)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes(to_array(address, &bytes)?))
    }
}

pub trait WriteMemory {
    /// Write `bytes` at `address`.
    ///
    /// Either every byte of the range is written or none is.
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()>;
}

pub trait ModuleProvider {
    /// Look up a loaded module. `None` (or an empty name) is the primary module.
    fn module(&self, name: Option<&str>) -> Option<ModuleInfo>;
}

impl<T: ReadMemory + ?Sized> ReadMemory for &T {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, len)
    }
}

impl<T: ReadMemory + ?Sized> ReadMemory for &mut T {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, len)
    }
}

impl<T: WriteMemory + ?Sized> WriteMemory for &mut T {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(address, bytes)
    }
}

fn to_array<const N: usize>(address: u64, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::memory(address, format!("short read: {} of {} bytes", bytes.len(), N)))
}

/// Treat `Some("")` like `None`: both name the primary module.
pub(crate) fn normalize_module_name(name: Option<&str>) -> Option<&str> {
    name.map(str::trim).filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_contains() {
        let module = ModuleInfo::new("game.exe", 0x1000, 0x100);
        assert!(module.contains(0x1000, 0x100));
        assert!(module.contains(0x10FF, 1));
        assert!(!module.contains(0x10FF, 2));
        assert!(!module.contains(0xFFF, 1));
        assert!(!module.contains(u64::MAX, 2));
    }

    #[test]
    fn test_module_end_at_top_of_address_space() {
        let module = ModuleInfo::new("high.dll", u64::MAX - 0xF, 0x100);
        assert_eq!(module.end(), u64::MAX);
        assert!(module.contains(u64::MAX - 0xF, 0xF));
        assert!(!module.contains(u64::MAX - 0xF, 0x10));
    }

    #[test]
    fn test_read_integers() {
        let memory = ImageMemory::builder()
            .main_module(
                "game.exe",
                0x1000,
                vec![0x78, 0x56, 0x34, 0x12, 0xEF, 0xCD, 0xAB, 0x90],
            )
            .build();
        assert_eq!(memory.read_u8(0x1000).unwrap(), 0x78);
        assert_eq!(memory.read_u32(0x1000).unwrap(), 0x12345678);
        assert_eq!(memory.read_u64(0x1000).unwrap(), 0x90ABCDEF12345678);
        assert!(memory.read_u64(0x1001).is_err());
    }

    #[test]
    fn test_normalize_module_name() {
        assert_eq!(normalize_module_name(None), None);
        assert_eq!(normalize_module_name(Some("")), None);
        assert_eq!(normalize_module_name(Some(" ")), None);
        assert_eq!(normalize_module_name(Some("libc.so")), Some("libc.so"));
    }
}
