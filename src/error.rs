//! Status codes and error types shared between the verifier and the interpreter.

use thiserror::Error;

/// The wire-level status code returned to the embedder, matching §6 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
#[non_exhaustive]
pub enum Status {
    /// Program terminated normally.
    Ok = 0,
    /// Decode hit an opcode the interpreter does not recognize.
    IllegalInstruction = -1,
    /// A memory access failed the region check.
    IllegalMem = -2,
    /// A branch target fell outside the text section.
    IllegalJump = -3,
    /// A `CALL` immediate did not resolve to a known helper.
    IllegalCall = -4,
    /// `text_len` was not a multiple of the instruction size.
    IllegalLen = -5,
    /// A `dst`/`src` register field was out of range.
    IllegalRegister = -6,
    /// The program did not end in `EXIT` and `NO_RETURN` was not set.
    NoReturn = -7,
    /// The branch budget was exhausted.
    OutOfBranches = -8,
    /// Division or modulo by zero.
    IllegalDiv = -9,
}

impl Status {
    /// Raw wire value of this status.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Structural faults produced only by [`crate::verifier::preflight`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VerifyError {
    /// `text_len` is not a multiple of [`crate::consts::INSN_SIZE`].
    #[error("text section length is not a multiple of the instruction size")]
    IllegalLen,
    /// An instruction referenced a register outside `0..=10`.
    #[error("instruction at byte offset {offset} references an out-of-range register")]
    IllegalRegister {
        /// Byte offset of the offending instruction within the text section.
        offset: usize,
    },
    /// A branch target landed outside the text section.
    #[error("branch at byte offset {offset} targets outside the text section")]
    IllegalJump {
        /// Byte offset of the offending branch instruction.
        offset: usize,
    },
    /// A `CALL` immediate does not name a registered helper.
    #[error("call at byte offset {offset} references unknown helper {helper}")]
    IllegalCall {
        /// Byte offset of the offending call instruction.
        offset: usize,
        /// The unresolved helper number.
        helper: u32,
    },
    /// The program does not end in `EXIT` and `NO_RETURN` is not set.
    #[error("program does not end in an EXIT instruction")]
    NoReturn,
}

impl VerifyError {
    /// Map this structural fault onto its wire [`Status`] code.
    pub const fn status(&self) -> Status {
        match self {
            Self::IllegalLen => Status::IllegalLen,
            Self::IllegalRegister { .. } => Status::IllegalRegister,
            Self::IllegalJump { .. } => Status::IllegalJump,
            Self::IllegalCall { .. } => Status::IllegalCall,
            Self::NoReturn => Status::NoReturn,
        }
    }
}

/// Dynamic faults produced only by the interpreter during `execute`/`execute_ctx`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RuntimeError {
    /// Decode encountered an opcode with no known semantics.
    #[error("illegal instruction at pc={pc}")]
    IllegalInstruction {
        /// Program counter (instruction index) at the time of the fault.
        pc: u64,
    },
    /// A memory access did not satisfy any region's bounds and flags.
    #[error("illegal memory access at addr=0x{addr:x} width={width} mode={mode:?}")]
    IllegalMem {
        /// Address the program attempted to access.
        addr: u64,
        /// Access width in bytes.
        width: u8,
        /// Requested access mode.
        mode: crate::memory::AccessMode,
    },
    /// A branch computed a target outside the text section.
    #[error("illegal jump from pc={pc} to pc={target}")]
    IllegalJump {
        /// Program counter the branch was taken from.
        pc: u64,
        /// Computed (out-of-range) target.
        target: i64,
    },
    /// A `CALL` immediate has no registered helper. Only reachable if a
    /// program bypassed preflight.
    #[error("illegal call to unresolved helper {helper}")]
    IllegalCall {
        /// The unresolved helper number.
        helper: u32,
    },
    /// Division or modulo by zero.
    #[error("division or modulo by zero at pc={pc}")]
    IllegalDiv {
        /// Program counter at the time of the fault.
        pc: u64,
    },
    /// The branch budget was exhausted.
    #[error("branch budget exhausted at pc={pc}")]
    OutOfBranches {
        /// Program counter at the time of the fault.
        pc: u64,
    },
    /// `text_len` was not a multiple of the instruction size. Only
    /// reachable if a program bypassed preflight.
    #[error("text section length is not a multiple of the instruction size")]
    IllegalLen,
    /// An instruction referenced a register outside `0..=10`. Only
    /// reachable if a program bypassed preflight.
    #[error("instruction at byte offset {offset} references an out-of-range register")]
    IllegalRegister {
        /// Byte offset of the offending instruction within the text section.
        offset: usize,
    },
    /// The program does not end in `EXIT` and `NO_RETURN` is not set. Only
    /// reachable if a program bypassed preflight.
    #[error("program does not end in an EXIT instruction")]
    NoReturn,
}

impl RuntimeError {
    /// Map this runtime fault onto its wire [`Status`] code.
    pub const fn status(&self) -> Status {
        match self {
            Self::IllegalInstruction { .. } => Status::IllegalInstruction,
            Self::IllegalMem { .. } => Status::IllegalMem,
            Self::IllegalJump { .. } => Status::IllegalJump,
            Self::IllegalCall { .. } => Status::IllegalCall,
            Self::IllegalDiv { .. } => Status::IllegalDiv,
            Self::OutOfBranches { .. } => Status::OutOfBranches,
            Self::IllegalLen => Status::IllegalLen,
            Self::IllegalRegister { .. } => Status::IllegalRegister,
            Self::NoReturn => Status::NoReturn,
        }
    }
}

/// A program bypassed `preflight` (called `execute`/`execute_ctx` directly)
/// and the structural fault it would have reported surfaces here instead,
/// carrying the same detail rather than collapsing to a generic fault.
impl From<VerifyError> for RuntimeError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::IllegalLen => Self::IllegalLen,
            VerifyError::IllegalRegister { offset } => Self::IllegalRegister { offset },
            VerifyError::IllegalJump { offset } => Self::IllegalJump {
                pc: (offset / crate::consts::INSN_SIZE) as u64,
                target: -1,
            },
            VerifyError::IllegalCall { helper, .. } => Self::IllegalCall { helper },
            VerifyError::NoReturn => Self::NoReturn,
        }
    }
}
