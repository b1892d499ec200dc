use std::ops::Range;

use super::{ModuleInfo, ModuleTable, ReadMemory, WriteMemory};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct MappedImage {
    info: ModuleInfo,
    bytes: Vec<u8>,
}

/// Module images held in ordinary buffers at chosen virtual base addresses.
///
/// Reads and writes must stay within a single image. Ranges marked read-only
/// reject writes, the same way a page whose protection cannot be lifted would.
#[derive(Debug, Clone, Default)]
pub struct ImageMemory {
    images: Vec<MappedImage>,
    main: Option<usize>,
    read_only: Vec<Range<u64>>,
    write_count: usize,
}

impl ImageMemory {
    pub fn builder() -> ImageMemoryBuilder {
        ImageMemoryBuilder::default()
    }

    pub fn module_table(&self) -> ModuleTable {
        let mut table = ModuleTable::new();
        for (index, image) in self.images.iter().enumerate() {
            if Some(index) == self.main {
                table = table.with_main(image.info.clone());
            } else {
                table = table.with_module(image.info.clone());
            }
        }
        table
    }

    /// Current bytes of an image, `None` meaning the primary module.
    pub fn image_bytes(&self, name: Option<&str>) -> Option<&[u8]> {
        let index = match super::normalize_module_name(name) {
            None => self.main?,
            Some(name) => self
                .images
                .iter()
                .position(|image| image.info.name.eq_ignore_ascii_case(name))?,
        };
        Some(&self.images[index].bytes)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    fn locate(&self, address: u64, len: usize) -> Result<(usize, usize)> {
        self.images
            .iter()
            .enumerate()
            .find(|(_, image)| image.info.contains(address, len))
            .map(|(index, image)| (index, (address - image.info.base) as usize))
            .ok_or_else(|| {
                Error::memory(address, format!("{} byte(s) not mapped by any image", len))
            })
    }
}

impl ReadMemory for ImageMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let (index, offset) = self.locate(address, len)?;
        Ok(self.images[index].bytes[offset..offset + len].to_vec())
    }
}

impl WriteMemory for ImageMemory {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let (index, offset) = self.locate(address, bytes.len())?;
        let end = address + bytes.len() as u64;
        if let Some(range) = self
            .read_only
            .iter()
            .find(|range| range.start < end && address < range.end)
        {
            return Err(Error::memory(
                address,
                format!(
                    "protection change refused for {:#x}..{:#x}",
                    range.start, range.end
                ),
            ));
        }

        self.images[index].bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.write_count += 1;
        Ok(())
    }
}

/// Builder for [`ImageMemory`]
#[derive(Debug, Clone, Default)]
pub struct ImageMemoryBuilder {
    memory: ImageMemory,
}

impl ImageMemoryBuilder {
    /// Map the primary module image
    pub fn main_module(mut self, name: impl Into<String>, base: u64, bytes: Vec<u8>) -> Self {
        self.memory.main = Some(self.memory.images.len());
        self.push(name.into(), base, bytes);
        self
    }

    /// Map an additional module image
    pub fn module(mut self, name: impl Into<String>, base: u64, bytes: Vec<u8>) -> Self {
        self.push(name.into(), base, bytes);
        self
    }

    /// Refuse writes touching `[address, address + len)`
    pub fn read_only(mut self, address: u64, len: u64) -> Self {
        self.memory.read_only.push(address..address.saturating_add(len));
        self
    }

    pub fn build(self) -> ImageMemory {
        self.memory
    }

    fn push(&mut self, name: String, base: u64, bytes: Vec<u8>) {
        let info = ModuleInfo::new(name, base, bytes.len() as u64);
        self.memory.images.push(MappedImage { info, bytes });
    }
}
