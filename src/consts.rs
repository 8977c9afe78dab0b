//! VM parameters

/// Number of general-purpose registers, `R0..=R9`.
pub const NUM_REGISTERS: usize = 10;

/// Total register count including the frame pointer `R10`.
pub const NUM_REGISTERS_WITH_FP: usize = NUM_REGISTERS + 1;

/// Index of the frame pointer register.
pub const REG_FP: usize = 10;

/// Index of the register holding the argument context pointer on entry and
/// the return value on exit.
pub const REG_ARG: usize = 1;

/// Index of the return-value register.
pub const REG_RET: usize = 0;

/// Size in bytes of the VM-owned stack.
pub const STACK_SIZE: u64 = 512;

/// Size in bytes of a single instruction slot.
pub const INSN_SIZE: usize = 8;

/// Magic number identifying a program container: ASCII-adjacent "rBPF".
pub const PROGRAM_MAGIC: u32 = 0x7242_5046;

/// Size in bytes of the packed program header.
pub const HEADER_SIZE: usize = 0x1C;

/// Opcode of the `EXIT` instruction.
pub const OP_EXIT: u8 = 0x95;

/// Opcode of the 16-byte `LDDW` (load 64-bit immediate) instruction.
pub const OP_LDDW: u8 = 0x18;

/// Maximum number of memory regions tracked at once (the four default
/// regions plus caller-registered extras).
pub const MAX_REGIONS: usize = 16;
