use tracing::debug;

use super::BytePattern;
use crate::error::{Error, Result};
use crate::memory::{ModuleInfo, ReadMemory};

/// Bytes read per call while scanning a module (1MB)
pub const SCAN_CHUNK_SIZE: usize = 1024 * 1024;

/// Scan a module's image for `pattern`, returning absolute addresses in ascending order.
///
/// An empty result is not an error: it usually means the signature moved or
/// changed in this build of the target.
pub fn scan_module<R: ReadMemory + ?Sized>(
    reader: &R,
    module: &ModuleInfo,
    pattern: &BytePattern,
) -> Result<Vec<u64>> {
    scan_module_chunked(reader, module, pattern, SCAN_CHUNK_SIZE)
}

/// Like [`scan_module`] with an explicit chunk size.
///
/// The last `pattern.len() - 1` bytes of each chunk are carried into the next
/// one so matches straddling a chunk boundary are still found. Reads never go
/// past `module.base + module.size`.
///
/// A chunk that cannot be read in one piece is retried page by page and the
/// unreadable pages are skipped. Fails only if no byte of the module could
/// be read.
pub fn scan_module_chunked<R: ReadMemory + ?Sized>(
    reader: &R,
    module: &ModuleInfo,
    pattern: &BytePattern,
    chunk_size: usize,
) -> Result<Vec<u64>> {
    let chunk_size = chunk_size.max(1);
    let mut scan = ChunkScan::new(pattern);
    let mut scanned: u64 = 0;
    let mut last_error = None;

    while scanned < module.size {
        let remaining = module.size - scanned;
        let read_size = remaining.min(chunk_size as u64) as usize;
        let addr = module.base + scanned;

        match reader.read_bytes(addr, read_size) {
            Ok(chunk) => scan.feed(addr, &chunk),
            Err(e) => {
                debug!(
                    "Chunk of {} at offset {:#x} is not fully readable: {}",
                    module.name, scanned, e
                );
                scan_pages(reader, &mut scan, addr, read_size);
                last_error = Some(e);
            }
        }

        scanned += read_size as u64;
    }

    if scan.bytes_read == 0
        && let Some(e) = last_error
    {
        return Err(Error::memory(
            module.base,
            format!("failed to read {}: {}", module.name, e),
        ));
    }

    let mut results = scan.results;
    results.sort_unstable();
    results.dedup();
    debug!(
        "Pattern {} matched {} time(s) in {}",
        pattern,
        results.len(),
        module.name
    );
    Ok(results)
}

/// Read `[addr, addr + len)` one page at a time, skipping unreadable pages.
fn scan_pages<R: ReadMemory + ?Sized>(reader: &R, scan: &mut ChunkScan<'_>, addr: u64, len: usize) {
    let end = addr + len as u64;
    let mut page = addr;
    while page < end {
        let page_end = ((page / SCAN_PAGE_SIZE) + 1) * SCAN_PAGE_SIZE;
        let page_len = (page_end.min(end) - page) as usize;
        match reader.read_bytes(page, page_len) {
            Ok(bytes) => scan.feed(page, &bytes),
            Err(_) => scan.skip(),
        }
        page += page_len as u64;
    }
}

/// Granularity used to step over unreadable parts of a module
const SCAN_PAGE_SIZE: u64 = 0x1000;

/// Matches over a sequence of contiguous pieces, with a carried tail.
struct ChunkScan<'p> {
    pattern: &'p BytePattern,
    tail: Vec<u8>,
    results: Vec<u64>,
    bytes_read: u64,
}

impl<'p> ChunkScan<'p> {
    fn new(pattern: &'p BytePattern) -> Self {
        Self {
            pattern,
            tail: Vec::new(),
            results: Vec::new(),
            bytes_read: 0,
        }
    }

    /// Scan `bytes` read at `addr`, which must directly follow the previous piece.
    fn feed(&mut self, addr: u64, bytes: &[u8]) {
        let mut data = Vec::with_capacity(self.tail.len() + bytes.len());
        data.extend_from_slice(&self.tail);
        data.extend_from_slice(bytes);

        let data_base = addr - self.tail.len() as u64;
        self.results.extend(self.pattern.matches(&data, data_base));
        self.bytes_read += bytes.len() as u64;

        let keep = self.pattern.len() - 1;
        if data.len() > keep {
            data.drain(..data.len() - keep);
        }
        self.tail = data;
    }

    /// A gap: nothing before it can be part of a later match.
    fn skip(&mut self) {
        self.tail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ImageMemory;

    fn image(bytes: Vec<u8>) -> (ImageMemory, ModuleInfo) {
        let memory = ImageMemory::builder()
            .main_module("game.exe", 0x40_0000, bytes)
            .build();
        let module = memory.module_table().main().cloned().unwrap();
        (memory, module)
    }

    #[test]
    fn test_scan_finds_match_across_chunk_boundary() {
        let mut bytes = vec![0u8; 64];
        bytes[14..18].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let (memory, module) = image(bytes);
        let pattern = BytePattern::parse("DE AD BE EF").unwrap();

        let found = scan_module_chunked(&memory, &module, &pattern, 16).unwrap();
        assert_eq!(found, vec![0x40_0000 + 14]);
    }

    #[test]
    fn test_scan_reports_every_match() {
        let mut bytes = vec![0u8; 40];
        bytes[3] = 0x74;
        bytes[4] = 0x05;
        bytes[30] = 0x74;
        bytes[31] = 0x10;
        let (memory, module) = image(bytes);
        let pattern = BytePattern::parse("74 ??").unwrap();

        let found = scan_module_chunked(&memory, &module, &pattern, 8).unwrap();
        assert_eq!(found, vec![0x40_0003, 0x40_001E]);
    }

    #[test]
    fn test_scan_without_match_is_empty() {
        let (memory, module) = image(vec![0xCC; 128]);
        let pattern = BytePattern::parse("90 90").unwrap();
        assert!(scan_module(&memory, &module, &pattern).unwrap().is_empty());
    }

    #[test]
    fn test_scan_never_reads_past_module() {
        // Module claims fewer bytes than the image holds; the match sits past the end
        let mut bytes = vec![0u8; 32];
        bytes[28..32].copy_from_slice(&[1, 2, 3, 4]);
        let (memory, mut module) = image(bytes);
        module.size = 24;
        let pattern = BytePattern::parse("01 02 03 04").unwrap();

        assert!(scan_module_chunked(&memory, &module, &pattern, 10).unwrap().is_empty());
    }

    #[test]
    fn test_scan_skips_unmapped_gap() {
        // Two images with an unmapped page between them, scanned as one module
        let mut low = vec![0u8; 0x1000];
        low[0xFFE..].copy_from_slice(&[0xDE, 0xAD]);
        let mut high = vec![0u8; 0x1000];
        high[..2].copy_from_slice(&[0xBE, 0xEF]);
        high[0x10..0x14].copy_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
        let memory = ImageMemory::builder()
            .main_module("libgame.so", 0x40_0000, low)
            .module("libgame.so.rest", 0x40_2000, high)
            .build();
        let module = ModuleInfo::new("libgame.so", 0x40_0000, 0x3000);

        let found = scan_module(&memory, &module, &BytePattern::parse("CA FE BA BE").unwrap());
        assert_eq!(found.unwrap(), vec![0x40_2010]);

        let found =
            scan_module_chunked(&memory, &module, &BytePattern::parse("CA FE ?? BE").unwrap(), 0x1000);
        assert_eq!(found.unwrap(), vec![0x40_2010]);

        // Bytes on either side of the gap never join into a match
        let split = BytePattern::parse("DE AD BE EF").unwrap();
        assert!(scan_module(&memory, &module, &split).unwrap().is_empty());
    }

    #[test]
    fn test_scan_finds_match_before_gap() {
        let mut low = vec![0u8; 0x1000];
        low[0x10..0x14].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let memory = ImageMemory::builder()
            .main_module("libgame.so", 0x40_0000, low)
            .build();
        let module = ModuleInfo::new("libgame.so", 0x40_0000, 0x2000);

        let found = scan_module(&memory, &module, &BytePattern::parse("DE AD BE EF").unwrap());
        assert_eq!(found.unwrap(), vec![0x40_0010]);
    }

    #[test]
    fn test_scan_unreadable_module_errors() {
        let (memory, _) = image(vec![0u8; 16]);
        let bogus = ModuleInfo::new("ghost.dll", 0x9000_0000, 0x100);
        let pattern = BytePattern::parse("00").unwrap();
        let err = scan_module(&memory, &bogus, &pattern).unwrap_err();
        assert!(err.is_memory_access());
    }
}
