//! Mapping module image files into an [`ImageMemory`].

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use patchdeck::ImageMemory;
use tracing::debug;

/// Base address of the primary image
pub const IMAGE_BASE: u64 = 0x1_4000_0000;

/// Additional images start on this alignment after the previous one
const IMAGE_ALIGN: u64 = 0x1000_0000;

/// `--lib NAME=FILE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibImage {
    pub name: String,
    pub path: PathBuf,
}

impl FromStr for LibImage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=FILE, got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() || path.trim().is_empty() {
            return Err(format!("expected NAME=FILE, got '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Display name of an image file.
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image {} is empty", path.display());
    }
    Ok(bytes)
}

fn next_base(base: u64, len: usize) -> u64 {
    let end = base + len as u64;
    end.div_ceil(IMAGE_ALIGN) * IMAGE_ALIGN
}

/// Map `main` at [`IMAGE_BASE`] and each library after it.
pub fn load_images(main: &Path, libs: &[LibImage]) -> Result<ImageMemory> {
    let bytes = read_image(main)?;
    let mut base = next_base(IMAGE_BASE, bytes.len());
    debug!("Mapped {} at {:#x}", main.display(), IMAGE_BASE);
    let mut builder = ImageMemory::builder().main_module(image_name(main), IMAGE_BASE, bytes);

    for lib in libs {
        let bytes = read_image(&lib.path)?;
        let len = bytes.len();
        debug!("Mapped {} ({}) at {:#x}", lib.name, lib.path.display(), base);
        builder = builder.module(lib.name.clone(), base, bytes);
        base = next_base(base, len);
    }

    Ok(builder.build())
}
