//! The patch unit: one contiguous range of original and replacement bytes.

use crate::error::{Error, Result};
use crate::memory::{ModuleProvider, ReadMemory, normalize_module_name};
use crate::resolver::AddressResolver;

/// Where an opcode lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeAddress {
    /// Resolved runtime address
    Absolute(u64),
    /// Offset from the base of the opcode's library, not yet resolved
    Offset(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    address: OpcodeAddress,
    library: Option<String>,
    original: Vec<u8>,
    patched: Vec<u8>,
}

impl Opcode {
    /// `original` and `patched` must be non-empty and of equal length.
    pub fn new(
        address: OpcodeAddress,
        library: Option<&str>,
        original: Vec<u8>,
        patched: Vec<u8>,
    ) -> Result<Self> {
        if original.len() != patched.len() {
            return Err(Error::OpcodeLengthMismatch {
                original: original.len(),
                patched: patched.len(),
            });
        }
        if original.is_empty() {
            return Err(Error::EmptyOpcode);
        }

        Ok(Self {
            address,
            library: normalize_module_name(library).map(str::to_string),
            original,
            patched,
        })
    }

    /// Opcode at a resolved address.
    pub fn at(address: u64, original: Vec<u8>, patched: Vec<u8>) -> Result<Self> {
        Self::new(OpcodeAddress::Absolute(address), None, original, patched)
    }

    /// Opcode at `offset` from the base of `library` (`None` = primary module).
    pub fn at_offset(
        library: Option<&str>,
        offset: u64,
        original: Vec<u8>,
        patched: Vec<u8>,
    ) -> Result<Self> {
        Self::new(OpcodeAddress::Offset(offset), library, original, patched)
    }

    pub fn address(&self) -> OpcodeAddress {
        self.address
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.address, OpcodeAddress::Absolute(_))
    }

    pub fn absolute_address(&self) -> Result<u64> {
        match self.address {
            OpcodeAddress::Absolute(address) => Ok(address),
            OpcodeAddress::Offset(_) => Err(Error::Unresolved),
        }
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn patched(&self) -> &[u8] {
        &self.patched
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Bytes to write for the requested state.
    pub fn bytes_for(&self, enable: bool) -> &[u8] {
        if enable { &self.patched } else { &self.original }
    }

    /// Copy of this opcode with an absolute address.
    pub fn resolve<P, R>(&self, resolver: &AddressResolver<'_, P, R>) -> Result<Self>
    where
        P: ModuleProvider + ?Sized,
        R: ReadMemory + ?Sized,
    {
        let address = match self.address {
            OpcodeAddress::Absolute(address) => address,
            OpcodeAddress::Offset(offset) => {
                resolver.resolve_static(self.library(), offset)?
            }
        };

        Ok(Self {
            address: OpcodeAddress::Absolute(address),
            ..self.clone()
        })
    }
}
