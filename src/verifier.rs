//! Static preflight verifier (§4.3).
//!
//! Runs a handful of structural checks over a program's text section
//! before it is ever executed. Idempotent: callers may preflight the same
//! program repeatedly, and `Vm::execute` calls it automatically if it has
//! not already run.

use tracing::debug;

use crate::consts::{INSN_SIZE, NUM_REGISTERS_WITH_FP, OP_EXIT, OP_LDDW};
use crate::container::FLAG_NO_RETURN;
use crate::error::VerifyError;
use crate::instruction::{BranchOp, Instruction, OpClass};

/// Compute the instruction-index target of a taken branch, matching the
/// runtime's `PC = PC + 1 + offset` rule (§4.4) so preflight and execution
/// agree on what counts as in-range.
fn branch_target(index: usize, offset: i16) -> i64 {
    index as i64 + 1 + offset as i64
}

/// Run every structural check over `text` and `flags`, returning the
/// decoded instructions on success.
///
/// Checks, in order (§4.3): text length, register range, `LDDW` slot
/// skipping, branch target bounds, call resolvability, trailing `EXIT`.
pub fn preflight(
    text: &[u8],
    flags: u32,
    is_known_helper: impl Fn(u32) -> bool,
) -> Result<Vec<Instruction>, VerifyError> {
    if text.len() % INSN_SIZE != 0 {
        return Err(VerifyError::IllegalLen);
    }

    let num_instructions = text.len() / INSN_SIZE;
    let mut instructions = Vec::with_capacity(num_instructions);
    for chunk in text.chunks_exact(INSN_SIZE) {
        instructions.push(Instruction::decode(chunk));
    }

    let mut i = 0;
    while i < instructions.len() {
        let insn = instructions[i];
        let offset = i * INSN_SIZE;

        if insn.dst() as usize >= NUM_REGISTERS_WITH_FP || insn.src() as usize >= NUM_REGISTERS_WITH_FP
        {
            return Err(VerifyError::IllegalRegister { offset });
        }

        if insn.is_lddw() {
            if i + 1 >= instructions.len() {
                return Err(VerifyError::IllegalLen);
            }
            i += 2;
            continue;
        }

        if insn.class() == OpClass::Branch {
            match BranchOp::from_bits(insn.op_bits()) {
                Some(BranchOp::Exit) => {}
                Some(BranchOp::Call) => {
                    let helper = insn.immediate() as u32;
                    if !is_known_helper(helper) {
                        return Err(VerifyError::IllegalCall { offset, helper });
                    }
                }
                Some(_) => {
                    let target = branch_target(i, insn.offset());
                    if target < 0 || target as usize >= num_instructions {
                        return Err(VerifyError::IllegalJump { offset });
                    }
                }
                None => return Err(VerifyError::IllegalRegister { offset }),
            }
        }

        i += 1;
    }

    let no_return = flags & FLAG_NO_RETURN != 0;
    if !no_return {
        match instructions.last() {
            Some(last) if last.opcode() == OP_EXIT => {}
            _ => return Err(VerifyError::NoReturn),
        }
    }

    debug!(num_instructions, no_return, "preflight passed");
    Ok(instructions)
}
