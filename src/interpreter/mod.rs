//! The interpreter: decode, dispatch, and the `Vm` instance lifecycle
//! (§4.4).

mod alu;
mod mem_ops;

use tracing::{debug, error, trace, warn};

use crate::consts::{MAX_REGIONS, REG_ARG, REG_FP, REG_RET};
use crate::container::Program;
use crate::error::{RuntimeError, Status, VerifyError};
use crate::helpers::{self, HelperExtension, KeyValueStore};
use crate::instruction::{AluOp, BranchOp, Instruction, OpClass, Width};
use crate::memory::{AccessMode, MemoryRegion, MemoryRegionTable};
use crate::verifier;

const FLAG_SETUP_DONE: u32 = 0x01;
const FLAG_PREFLIGHT_DONE: u32 = 0x02;

/// Slots always occupied by the stack/data/rodata/arg regions, reserved out
/// of [`MAX_REGIONS`] before any caller-registered extra is counted.
const FIXED_REGIONS: usize = 4;

/// Tunable knobs for one [`Vm`] instance.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    /// Number of taken branches permitted before `OUT_OF_BRANCHES`.
    ///
    /// Grounded in the reference implementation's
    /// `FEMTO_CONTAINER_BRANCHES_ALLOWED` default of 200.
    pub branches_budget: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            branches_budget: 200,
        }
    }
}

/// One sandboxed execution instance: a parsed program, its writable data
/// section, a caller-owned stack, and whatever extra memory regions and
/// helpers the host has registered.
pub struct Vm<'a, S: KeyValueStore> {
    program: Program<'a>,
    instructions: Vec<Instruction>,
    data: Vec<u8>,
    stack: &'a mut [u8],
    extra_regions: Vec<MemoryRegion>,
    store: S,
    extensions: Option<&'a mut dyn HelperExtension>,
    config: VmConfig,
    flags: u32,
    active_regions: Option<MemoryRegionTable>,
}

impl<'a, S: KeyValueStore> Vm<'a, S> {
    /// Build a new instance over `program`, backed by `stack` and `store`.
    /// Neither `setup` nor `preflight` has run yet.
    pub fn new(program: Program<'a>, stack: &'a mut [u8], store: S, config: VmConfig) -> Self {
        Self {
            program,
            instructions: Vec::new(),
            data: Vec::new(),
            stack,
            extra_regions: Vec::new(),
            store,
            extensions: None,
            config,
            flags: 0,
            active_regions: None,
        }
    }

    /// Register a host dispatch table consulted for any `CALL` number not
    /// one of the four built-in helpers.
    pub fn with_extensions(mut self, extensions: &'a mut dyn HelperExtension) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Bind the default region set from the program header: a fresh
    /// writable copy of `data`, idempotently. Must run before `execute`;
    /// both public entry points call it automatically if needed.
    pub fn setup(&mut self) {
        if self.flags & FLAG_SETUP_DONE != 0 {
            return;
        }
        self.data = self.program.data().to_vec();
        self.flags |= FLAG_SETUP_DONE;
        debug!(data_len = self.data.len(), "vm setup complete");
    }

    /// Run the structural checks of §4.3 over the program's text section.
    /// Idempotent: a second call is a no-op returning the same result as
    /// the first, unless the underlying program has changed.
    pub fn preflight(&mut self) -> Result<(), VerifyError> {
        if self.flags & FLAG_PREFLIGHT_DONE != 0 {
            return Ok(());
        }
        let is_known = |num: u32| {
            helpers::is_known_helper(num, &|n| {
                self.extensions.as_deref().is_some_and(|e| e.is_known(n))
            })
        };
        let instructions = verifier::preflight(self.program.text(), self.program.header().flags(), is_known)?;
        self.instructions = instructions;
        self.flags |= FLAG_PREFLIGHT_DONE;
        Ok(())
    }

    /// Insert an extra region, checked before every other extra region but
    /// after the arg/ctx region (§4.2, §3 "most-recently-registered extra
    /// checked first"). Returns `false` without inserting if the table is
    /// already at [`MAX_REGIONS`] (the four default regions plus extras).
    pub fn add_region(&mut self, start: u64, len: u64, access: AccessMode) -> bool {
        if self.extra_regions.len() >= MAX_REGIONS - FIXED_REGIONS {
            warn!(max = MAX_REGIONS, "add_region: region table full");
            return false;
        }
        self.extra_regions
            .insert(0, MemoryRegion::new(start, len, access));
        true
    }

    /// Whether `[addr, addr+len)` lies within some currently active region,
    /// regardless of its access flags. Only meaningful while a `execute`/
    /// `execute_ctx` call is in progress (e.g. from within a helper);
    /// returns `false` otherwise.
    pub fn store_load_allowed(&self, addr: u64, len: u64) -> bool {
        self.active_regions
            .as_ref()
            .is_some_and(|regions| regions.contains_range(addr, len))
    }

    fn build_regions(&mut self, arg: Option<&mut [u8]>) -> (MemoryRegionTable, u64) {
        let mut regions = MemoryRegionTable::new();
        regions.push(MemoryRegion::from_slice_mut(
            self.stack,
            AccessMode::READ | AccessMode::WRITE,
        ));
        regions.push(MemoryRegion::from_slice_mut(
            &mut self.data,
            AccessMode::READ | AccessMode::WRITE,
        ));
        regions.push(MemoryRegion::from_slice(
            self.program.rodata(),
            AccessMode::READ,
        ));

        let arg_addr = match arg {
            Some(buf) => {
                let addr = buf.as_mut_ptr() as u64;
                regions.push(MemoryRegion::from_slice_mut(
                    buf,
                    AccessMode::READ | AccessMode::WRITE,
                ));
                addr
            }
            None => 0,
        };

        for region in &self.extra_regions {
            regions.push(*region);
        }

        (regions, arg_addr)
    }

    /// Execute with an empty argument region; `R1 = 0` on entry.
    pub fn execute(&mut self) -> Result<i64, RuntimeError> {
        self.run(None)
    }

    /// Execute with `ctx` bound as the argument region (read-write);
    /// `R1 = addr(ctx)` on entry.
    pub fn execute_ctx(&mut self, ctx: &mut [u8]) -> Result<i64, RuntimeError> {
        self.run(Some(ctx))
    }

    fn run(&mut self, ctx: Option<&mut [u8]>) -> Result<i64, RuntimeError> {
        self.setup();
        if self.flags & FLAG_PREFLIGHT_DONE == 0 {
            self.preflight()?;
        }

        let (regions, arg_addr) = self.build_regions(ctx);
        self.active_regions = Some(regions);

        let mut registers = [0u64; 11];
        registers[REG_ARG] = arg_addr;
        registers[REG_FP] = self.stack.as_ptr() as u64 + self.stack.len() as u64;

        let mut branches_remaining = self.config.branches_budget;
        let mut pc: usize = 0;

        debug!(num_instructions = self.instructions.len(), "execute start");

        let result = loop {
            let Some(&insn) = self.instructions.get(pc) else {
                break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
            };

            trace!(pc, opcode = insn.opcode(), "step");

            match insn.class() {
                OpClass::Ld => {
                    if !insn.is_lddw() {
                        break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                    }
                    let Some(&next) = self.instructions.get(pc + 1) else {
                        break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                    };
                    registers[insn.dst() as usize] = insn.lddw_merge(next) as u64;
                    pc += 2;
                }
                OpClass::Ldx => {
                    let Some(width) = Width::from_bits(insn.opcode()) else {
                        break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                    };
                    let addr = registers[insn.src() as usize].wrapping_add(insn.offset() as i64 as u64);
                    let checked = match self.active_region_check(addr, width.bytes(), AccessMode::READ) {
                        Ok(a) => a,
                        Err(e) => break Err(e),
                    };
                    // SAFETY: `checked` passed the active region table's
                    // bounds-and-flags check for this width.
                    registers[insn.dst() as usize] = unsafe { mem_ops::load(checked, width) };
                    pc += 1;
                }
                OpClass::St | OpClass::Stx => {
                    let Some(width) = Width::from_bits(insn.opcode()) else {
                        break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                    };
                    let addr = registers[insn.dst() as usize].wrapping_add(insn.offset() as i64 as u64);
                    let value = if insn.class() == OpClass::Stx {
                        registers[insn.src() as usize]
                    } else {
                        insn.immediate() as i64 as u64
                    };
                    let checked = match self.active_region_check(addr, width.bytes(), AccessMode::WRITE) {
                        Ok(a) => a,
                        Err(e) => break Err(e),
                    };
                    // SAFETY: `checked` passed the active region table's
                    // bounds-and-flags check for this width.
                    unsafe { mem_ops::store(checked, width, value) };
                    pc += 1;
                }
                OpClass::Alu32 | OpClass::Alu64 => {
                    let is64 = insn.class() == OpClass::Alu64;
                    let Some(op) = AluOp::from_bits(insn.op_bits()) else {
                        break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                    };
                    let dst = registers[insn.dst() as usize];

                    if op == AluOp::End {
                        match alu::byteswap(dst, insn.immediate() as u32) {
                            Ok(v) => registers[insn.dst() as usize] = v,
                            Err(_) => break Err(RuntimeError::IllegalInstruction { pc: pc as u64 }),
                        }
                    } else {
                        let v = if insn.uses_register_source() {
                            registers[insn.src() as usize]
                        } else {
                            insn.immediate() as i64 as u64
                        };
                        match alu::apply(pc as u64, op, is64, dst, v) {
                            Ok(v) => registers[insn.dst() as usize] = v,
                            Err(e) => break Err(e),
                        }
                    }
                    pc += 1;
                }
                OpClass::Branch => match BranchOp::from_bits(insn.op_bits()) {
                    Some(BranchOp::Exit) => {
                        break Ok(registers[REG_RET] as i64);
                    }
                    Some(BranchOp::Call) => {
                        let num = insn.immediate() as u32;
                        let args = [
                            registers[1], registers[2], registers[3], registers[4], registers[5],
                        ];
                        let regions = self
                            .active_regions
                            .as_ref()
                            .expect("active_regions set for the duration of run()");
                        match dispatch_helper(&mut self.store, regions, self.extensions.as_deref_mut(), num, args) {
                            Ok(v) => registers[REG_RET] = v,
                            Err(e) => break Err(e),
                        }
                        pc += 1;
                    }
                    Some(op) => {
                        let taken = if op == BranchOp::Ja {
                            true
                        } else {
                            let dst = registers[insn.dst() as usize];
                            let v = if insn.uses_register_source() {
                                registers[insn.src() as usize]
                            } else {
                                insn.immediate() as i64 as u64
                            };
                            compare(op, dst, v)
                        };

                        if taken {
                            match branches_remaining.checked_sub(1) {
                                Some(remaining) => branches_remaining = remaining,
                                None => break Err(RuntimeError::OutOfBranches { pc: pc as u64 }),
                            }
                            let target = pc as i64 + 1 + insn.offset() as i64;
                            if target < 0 || target as usize >= self.instructions.len() {
                                break Err(RuntimeError::IllegalJump { pc: pc as u64, target });
                            }
                            pc = target as usize;
                        } else {
                            pc += 1;
                        }
                    }
                    None => break Err(RuntimeError::IllegalInstruction { pc: pc as u64 }),
                },
                OpClass::Jmp32 => {
                    break Err(RuntimeError::IllegalInstruction { pc: pc as u64 });
                }
            }
        };

        self.active_regions = None;

        match &result {
            Ok(v) => debug!(result = v, status = Status::Ok.code(), "execute complete"),
            Err(e) => warn!(status = e.status().code(), "execute faulted: {e}"),
        }
        result
    }

    fn active_region_check(&self, addr: u64, width: u8, mode: AccessMode) -> Result<u64, RuntimeError> {
        self.active_regions
            .as_ref()
            .expect("active_regions set for the duration of run()")
            .check(addr, width, mode)
    }
}

fn dispatch_helper(
    store: &mut dyn KeyValueStore,
    regions: &MemoryRegionTable,
    extensions: Option<&mut dyn HelperExtension>,
    num: u32,
    args: [u64; 5],
) -> Result<u64, RuntimeError> {
    if let Some(v) = helpers::call_builtin(store, regions, num, args[0], args[1]) {
        return Ok(v);
    }
    if let Some(ext) = extensions {
        if let Some(v) = ext.call(num, args) {
            return Ok(v);
        }
    }
    error!(num, "call to unresolved helper");
    Err(RuntimeError::IllegalCall { helper: num })
}

fn compare(op: BranchOp, dst: u64, v: u64) -> bool {
    match op {
        BranchOp::JEq => dst == v,
        BranchOp::JNe => dst != v,
        BranchOp::JGt => dst > v,
        BranchOp::JGe => dst >= v,
        BranchOp::JLt => dst < v,
        BranchOp::JLe => dst <= v,
        BranchOp::JSgt => (dst as i64) > (v as i64),
        BranchOp::JSge => (dst as i64) >= (v as i64),
        BranchOp::JSlt => (dst as i64) < (v as i64),
        BranchOp::JSle => (dst as i64) <= (v as i64),
        BranchOp::JSet => dst & v != 0,
        BranchOp::Ja | BranchOp::Call | BranchOp::Exit => unreachable!("handled by caller"),
    }
}
