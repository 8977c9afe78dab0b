//! ALU32/ALU64 arithmetic (§4.4 "ALU semantics").

use crate::error::RuntimeError;
use crate::instruction::AluOp;

/// Apply `op` to `(dst, v)`, truncating to 32 bits when `is64` is `false`.
///
/// `pc` is only used to stamp [`RuntimeError::IllegalDiv`] on division or
/// modulo by zero; `op` must not be [`AluOp::End`] (handled separately by
/// the caller, since it reads its width from the instruction's immediate
/// rather than from a source operand).
pub fn apply(pc: u64, op: AluOp, is64: bool, dst: u64, v: u64) -> Result<u64, RuntimeError> {
    let result = match op {
        AluOp::Add => {
            if is64 {
                dst.wrapping_add(v)
            } else {
                (dst as u32).wrapping_add(v as u32) as u64
            }
        }
        AluOp::Sub => {
            if is64 {
                dst.wrapping_sub(v)
            } else {
                (dst as u32).wrapping_sub(v as u32) as u64
            }
        }
        AluOp::Mul => {
            if is64 {
                dst.wrapping_mul(v)
            } else {
                (dst as u32).wrapping_mul(v as u32) as u64
            }
        }
        AluOp::Div => {
            if is64 {
                if v == 0 {
                    return Err(RuntimeError::IllegalDiv { pc });
                }
                dst / v
            } else {
                let v32 = v as u32;
                if v32 == 0 {
                    return Err(RuntimeError::IllegalDiv { pc });
                }
                ((dst as u32) / v32) as u64
            }
        }
        AluOp::Or => {
            if is64 {
                dst | v
            } else {
                ((dst as u32) | (v as u32)) as u64
            }
        }
        AluOp::And => {
            if is64 {
                dst & v
            } else {
                ((dst as u32) & (v as u32)) as u64
            }
        }
        AluOp::Lsh => {
            if is64 {
                dst.wrapping_shl((v & 63) as u32)
            } else {
                ((dst as u32).wrapping_shl((v & 31) as u32)) as u64
            }
        }
        AluOp::Rsh => {
            if is64 {
                dst.wrapping_shr((v & 63) as u32)
            } else {
                ((dst as u32).wrapping_shr((v & 31) as u32)) as u64
            }
        }
        AluOp::Neg => {
            if is64 {
                dst.wrapping_neg()
            } else {
                (dst as u32).wrapping_neg() as u64
            }
        }
        AluOp::Mod => {
            if is64 {
                if v == 0 {
                    return Err(RuntimeError::IllegalDiv { pc });
                }
                dst % v
            } else {
                let v32 = v as u32;
                if v32 == 0 {
                    return Err(RuntimeError::IllegalDiv { pc });
                }
                ((dst as u32) % v32) as u64
            }
        }
        AluOp::Xor => {
            if is64 {
                dst ^ v
            } else {
                ((dst as u32) ^ (v as u32)) as u64
            }
        }
        AluOp::Mov => {
            if is64 {
                v
            } else {
                v as u32 as u64
            }
        }
        AluOp::Arsh => {
            if is64 {
                ((dst as i64).wrapping_shr((v & 63) as u32)) as u64
            } else {
                (((dst as u32) as i32).wrapping_shr((v & 31) as u32)) as u32 as u64
            }
        }
        AluOp::End => unreachable!("END is dispatched separately"),
    };

    Ok(if is64 { result } else { result as u32 as u64 })
}

/// Byte-swap `dst` to `width` bits (16, 32, or 64), the semantics of `END`.
pub fn byteswap(dst: u64, width: u32) -> Result<u64, RuntimeError> {
    match width {
        16 => Ok((dst as u16).swap_bytes() as u64),
        32 => Ok((dst as u32).swap_bytes() as u64),
        64 => Ok(dst.swap_bytes()),
        _ => Err(RuntimeError::IllegalInstruction { pc: 0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add64_wraps() {
        assert_eq!(apply(0, AluOp::Add, true, u64::MAX, 1, ).unwrap(), 0);
    }

    #[test]
    fn add32_clears_high_half() {
        let dst = 0xffff_ffff_0000_0000u64;
        assert_eq!(apply(0, AluOp::Add, false, dst, 1).unwrap(), 1);
    }

    #[test]
    fn div_by_zero_faults() {
        assert_eq!(
            apply(7, AluOp::Div, true, 10, 0).unwrap_err(),
            RuntimeError::IllegalDiv { pc: 7 }
        );
    }

    #[test]
    fn mod_by_zero_faults_32bit() {
        assert_eq!(
            apply(3, AluOp::Mod, false, 10, 0).unwrap_err(),
            RuntimeError::IllegalDiv { pc: 3 }
        );
    }

    #[test]
    fn arsh_preserves_sign_64bit() {
        let dst = (-8i64) as u64;
        assert_eq!(apply(0, AluOp::Arsh, true, dst, 1).unwrap() as i64, -4);
    }

    #[test]
    fn arsh_preserves_sign_32bit() {
        let dst = (-8i32) as u32 as u64;
        assert_eq!(apply(0, AluOp::Arsh, false, dst, 1).unwrap() as u32 as i32, -4);
    }

    #[test]
    fn lsh_amount_masked_to_width() {
        assert_eq!(apply(0, AluOp::Lsh, false, 1, 32).unwrap(), 1);
        assert_eq!(apply(0, AluOp::Lsh, true, 1, 64).unwrap(), 1);
    }

    #[test]
    fn byteswap_widths() {
        assert_eq!(byteswap(0x1122, 16).unwrap(), 0x2211);
        assert_eq!(byteswap(0x1122_3344, 32).unwrap(), 0x4433_2211);
        assert_eq!(byteswap(0x1122_3344_5566_7788, 64).unwrap(), 0x8877_6655_4433_2211);
    }
}
