//! Turn patch targets into absolute addresses.
//!
//! Two modes:
//!
//! - **Static**: `base(library) + offset`
//! - **Pattern**: scan `library` for a [`BytePattern`] and apply a [`MatchPolicy`]
//!
//! Addresses are resolved once, when a catalog is loaded. A module that is
//! unloaded and reloaded afterwards is not tracked; reload the catalogs.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{ModuleInfo, ModuleProvider, ReadMemory};
use crate::pattern::{BytePattern, scan_module};

/// What to do when a pattern matches more than once.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchPolicy {
    /// Use the lowest matching address
    #[default]
    First,
    /// Fail unless there is exactly one match
    Unique,
    /// Patch every match
    All,
}

pub struct AddressResolver<'a, P: ?Sized, R: ?Sized> {
    modules: &'a P,
    memory: &'a R,
    policy: MatchPolicy,
}

impl<'a, P, R> AddressResolver<'a, P, R>
where
    P: ModuleProvider + ?Sized,
    R: ReadMemory + ?Sized,
{
    pub fn new(modules: &'a P, memory: &'a R) -> Self {
        Self {
            modules,
            memory,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn memory(&self) -> &'a R {
        self.memory
    }

    /// Look up a module, `None` being the primary one.
    pub fn module(&self, library: Option<&str>) -> Result<ModuleInfo> {
        self.modules
            .module(library)
            .ok_or_else(|| Error::LibraryNotLoaded(display_library(library).to_string()))
    }

    pub fn resolve_static(&self, library: Option<&str>, offset: u64) -> Result<u64> {
        let module = self.module(library)?;
        if offset >= module.size {
            return Err(Error::OffsetOutOfModule {
                library: module.name,
                offset,
                size: module.size,
            });
        }
        Ok(module.base + offset)
    }

    /// Scan `library` and return the addresses selected by the match policy.
    ///
    /// Never returns an empty list: zero matches is [`Error::PatternNotFound`].
    pub fn resolve_pattern(&self, library: Option<&str>, pattern: &BytePattern) -> Result<Vec<u64>> {
        let module = self.module(library)?;
        let matches = scan_module(self.memory, &module, pattern)?;

        match (self.policy, matches.len()) {
            (_, 0) => Err(Error::PatternNotFound {
                library: module.name,
            }),
            (MatchPolicy::Unique, count) if count > 1 => Err(Error::AmbiguousPattern {
                library: module.name,
                count,
            }),
            (MatchPolicy::All, _) => Ok(matches),
            (_, count) => {
                if count > 1 {
                    debug!(
                        "Pattern {} matched {} times in {}, using {:#x}",
                        pattern, count, module.name, matches[0]
                    );
                }
                Ok(vec![matches[0]])
            }
        }
    }
}

pub(crate) fn display_library(library: Option<&str>) -> &str {
    crate::memory::normalize_module_name(library).unwrap_or("<main>")
}
