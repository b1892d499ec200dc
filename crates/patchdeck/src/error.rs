use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse definition {source_name}: {message}")]
    DefinitionParse {
        source_name: String,
        message: String,
    },

    #[error("Library not loaded: {0}")]
    LibraryNotLoaded(String),

    #[error("Pattern not found in {library}")]
    PatternNotFound { library: String },

    #[error("Pattern is ambiguous: {count} matches in {library}")]
    AmbiguousPattern { library: String, count: usize },

    #[error("Offset {offset:#x} is outside {library} (size {size:#x})")]
    OffsetOutOfModule {
        library: String,
        offset: u64,
        size: u64,
    },

    #[error("Opcode address is not resolved")]
    Unresolved,

    #[error("Original bytes mismatch at {address:#x}: expected {expected:02X?}, found {actual:02X?}")]
    VerificationMismatch {
        address: u64,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("Memory access failed at address {address:#x}: {message}")]
    MemoryAccess { address: u64, message: String },

    #[error("Opcode length mismatch: original is {original} bytes, patched is {patched} bytes")]
    OpcodeLengthMismatch { original: usize, patched: usize },

    #[error("Opcode has no bytes")]
    EmptyOpcode,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Library missing, pattern absent or ambiguous, or offset out of range
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::LibraryNotLoaded(_)
                | Error::PatternNotFound { .. }
                | Error::AmbiguousPattern { .. }
                | Error::OffsetOutOfModule { .. }
                | Error::Unresolved
        )
    }

    pub fn is_memory_access(&self) -> bool {
        matches!(self, Error::MemoryAccess { .. })
    }

    pub(crate) fn memory(address: u64, message: impl Into<String>) -> Self {
        Error::MemoryAccess {
            address,
            message: message.into(),
        }
    }
}
