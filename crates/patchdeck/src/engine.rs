//! Apply, revert and verify opcodes.

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};
use crate::opcode::Opcode;

/// Result of applying a list of opcodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Opcodes written successfully
    pub applied: usize,
    /// Opcodes that could not be written
    pub failed: usize,
    /// Earlier writes were undone after a failure
    pub rolled_back: bool,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Owns the memory backend and performs every patch write.
///
/// All writes go through `&mut self`, so writes to the same range are serialized.
#[derive(Debug)]
pub struct PatchEngine<M> {
    memory: M,
}

impl<M> PatchEngine<M>
where
    M: ReadMemory + WriteMemory,
{
    pub fn new(memory: M) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Write the patched bytes (`enable`) or the original bytes.
    ///
    /// Failures are logged and reported as `false`.
    pub fn apply(&mut self, opcode: &Opcode, enable: bool) -> bool {
        match self.try_apply(opcode, enable) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to {} opcode: {}", verb(enable), e);
                false
            }
        }
    }

    pub fn try_apply(&mut self, opcode: &Opcode, enable: bool) -> Result<()> {
        let address = opcode.absolute_address()?;
        self.memory.write_bytes(address, opcode.bytes_for(enable))
    }

    /// True if the live bytes equal the opcode's original bytes. Never writes.
    pub fn verify(&self, opcode: &Opcode) -> bool {
        match self.check_original(opcode) {
            Ok(()) => true,
            Err(e) => {
                debug!("Verification failed: {}", e);
                false
            }
        }
    }

    /// Like [`verify`](Self::verify) but reports why the check failed.
    pub fn check_original(&self, opcode: &Opcode) -> Result<()> {
        let address = opcode.absolute_address()?;
        let actual = self.memory.read_bytes(address, opcode.len())?;
        if actual != opcode.original() {
            return Err(Error::VerificationMismatch {
                address,
                expected: opcode.original().to_vec(),
                actual,
            });
        }
        Ok(())
    }

    /// True if the live bytes equal the opcode's patched bytes.
    pub fn verify_patched(&self, opcode: &Opcode) -> bool {
        opcode
            .absolute_address()
            .and_then(|address| self.memory.read_bytes(address, opcode.len()))
            .is_ok_and(|actual| actual == opcode.patched())
    }

    /// Apply every opcode or none.
    ///
    /// The live bytes of each target are captured before writing. On the first
    /// failure, every opcode written by this call is restored to its captured
    /// bytes in reverse order.
    pub fn apply_all(&mut self, opcodes: &[Opcode], enable: bool) -> ApplyReport {
        let mut written: Vec<(u64, Vec<u8>)> = Vec::with_capacity(opcodes.len());

        for opcode in opcodes {
            match self.write_with_snapshot(opcode, enable) {
                Ok(snapshot) => written.push(snapshot),
                Err(e) => {
                    warn!(
                        "Failed to {} opcode {} of {}: {}; rolling back",
                        verb(enable),
                        written.len() + 1,
                        opcodes.len(),
                        e
                    );
                    let applied = written.len();
                    self.roll_back(written);
                    return ApplyReport {
                        applied,
                        failed: 1,
                        rolled_back: applied > 0,
                    };
                }
            }
        }

        ApplyReport {
            applied: written.len(),
            failed: 0,
            rolled_back: false,
        }
    }

    /// Apply every opcode independently, keeping whatever succeeded.
    pub fn apply_each(&mut self, opcodes: &[Opcode], enable: bool) -> ApplyReport {
        let mut report = ApplyReport::default();
        for opcode in opcodes {
            if self.apply(opcode, enable) {
                report.applied += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    fn write_with_snapshot(&mut self, opcode: &Opcode, enable: bool) -> Result<(u64, Vec<u8>)> {
        let address = opcode.absolute_address()?;
        let previous = self.memory.read_bytes(address, opcode.len())?;
        self.memory.write_bytes(address, opcode.bytes_for(enable))?;
        Ok((address, previous))
    }

    fn roll_back(&mut self, written: Vec<(u64, Vec<u8>)>) {
        for (address, previous) in written.into_iter().rev() {
            if let Err(e) = self.memory.write_bytes(address, &previous) {
                error!("Rollback failed at {:#x}: {}", address, e);
            }
        }
    }
}

fn verb(enable: bool) -> &'static str {
    if enable { "apply" } else { "revert" }
}
