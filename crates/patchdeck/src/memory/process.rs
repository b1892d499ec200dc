use std::ptr;

use region::Protection;

use super::{ReadMemory, WriteMemory};
use crate::error::{Error, Result};

/// Direct access to the memory of the current process.
///
/// Reads check the page map first, so an unmapped or unreadable address is
/// reported as an error instead of faulting. Writes lift the page protection
/// for the target range, copy, and restore the previous protection.
#[derive(Debug)]
pub struct ProcessMemory {
    _private: (),
}

impl ProcessMemory {
    /// # Safety
    ///
    /// Every address later passed to [`WriteMemory::write_bytes`] must point
    /// at memory that Rust code does not hold references into (module code
    /// and data of the host, not live Rust objects), and no other thread may
    /// be executing or accessing the bytes being written.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

/// Walk the page map for `[address, address + len)` and require every page
/// to be committed, unguarded and, if `readable`, readable.
fn check_range(address: u64, len: usize, readable: bool) -> Result<()> {
    let start = usize::try_from(address)
        .map_err(|_| Error::memory(address, "address exceeds pointer width"))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| Error::memory(address, "range overflows address space"))?;

    let regions = region::query_range(start as *const u8, len)
        .map_err(|e| Error::memory(address, e.to_string()))?;

    let mut covered = start;
    for region in regions {
        let region = region.map_err(|e| Error::memory(address, e.to_string()))?;
        let range = region.as_range();
        if range.start > covered {
            return Err(Error::memory(
                covered as u64,
                "range crosses an unmapped gap",
            ));
        }
        if region.is_guarded() || !region.is_committed() {
            return Err(Error::memory(range.start as u64, "page is guarded or uncommitted"));
        }
        if readable && !region.is_readable() {
            return Err(Error::memory(range.start as u64, "page is not readable"));
        }
        covered = covered.max(range.end);
        if covered >= end {
            return Ok(());
        }
    }

    Err(Error::memory(covered as u64, "range extends past mapped memory"))
}

impl ReadMemory for ProcessMemory {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        check_range(address, len, true)?;

        let mut buffer = vec![0u8; len];
        // SAFETY: every page of the source range is mapped and readable
        unsafe {
            ptr::copy_nonoverlapping(address as usize as *const u8, buffer.as_mut_ptr(), len);
        }
        Ok(buffer)
    }
}

impl WriteMemory for ProcessMemory {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        check_range(address, bytes.len(), false)?;

        let target = address as usize as *mut u8;
        // The guard restores the original protection of every touched page on drop.
        // SAFETY: the range is mapped; the constructor contract covers aliasing
        let _guard = unsafe {
            region::protect_with_handle(target, bytes.len(), Protection::READ_WRITE_EXECUTE)
        }
        .map_err(|e| Error::memory(address, format!("failed to unprotect: {}", e)))?;

        // SAFETY: the range is mapped and now writable
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
        }
        Ok(())
    }
}
