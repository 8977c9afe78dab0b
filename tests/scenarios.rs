//! End-to-end scenarios run against the public API.

use femtovm::{Program, RuntimeError, VecKeyValueStore, VerifyError, Vm, VmConfig};

const MAGIC: u32 = 0x7242_5046;

fn encode(opcode: u8, dst: u8, src: u8, offset: i16, imm: i32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0] = opcode;
    buf[1] = (dst & 0x0f) | ((src & 0x0f) << 4);
    buf[2..4].copy_from_slice(&offset.to_le_bytes());
    buf[4..8].copy_from_slice(&imm.to_le_bytes());
    buf
}

fn exit() -> [u8; 8] {
    encode(0x95, 0, 0, 0, 0)
}

fn build_blob(text: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    blob.extend_from_slice(&MAGIC.to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&(text.len() as u32).to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(text);
    blob
}

#[test]
fn trailing_return_check() {
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0xb7, 0, 0, 0, 42)); // MOV64 R0, 42
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);
    let program = Program::parse(&blob).unwrap();

    let mut stack = [0u8; 64];
    let mut vm = Vm::new(program, &mut stack, VecKeyValueStore::new(), VmConfig::default());
    vm.preflight().unwrap();
    assert_eq!(vm.execute().unwrap(), 42);
}

#[test]
fn preflight_rejects_out_of_range_jump() {
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0x05, 0, 0, 100, 0)); // JA +100
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);
    let program = Program::parse(&blob).unwrap();

    let mut stack = [0u8; 64];
    let mut vm = Vm::new(program, &mut stack, VecKeyValueStore::new(), VmConfig::default());
    assert!(matches!(
        vm.preflight().unwrap_err(),
        VerifyError::IllegalJump { .. }
    ));
}

#[test]
fn preflight_rejects_unknown_call() {
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0x85, 0, 0, 0, 9999)); // CALL 9999
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);
    let program = Program::parse(&blob).unwrap();

    let mut stack = [0u8; 64];
    let mut vm = Vm::new(program, &mut stack, VecKeyValueStore::new(), VmConfig::default());
    assert!(matches!(
        vm.preflight().unwrap_err(),
        VerifyError::IllegalCall { helper: 9999, .. }
    ));
}

#[test]
fn memory_check_enforcement() {
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0x71, 0, 1, 0, 0)); // LDXB R0, [R1 + 0]
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);

    let mut stack = [0u8; 64];
    let mut vm = Vm::new(
        Program::parse(&blob).unwrap(),
        &mut stack,
        VecKeyValueStore::new(),
        VmConfig::default(),
    );
    assert!(matches!(
        vm.execute().unwrap_err(),
        RuntimeError::IllegalMem { .. }
    ));

    let mut stack2 = [0u8; 64];
    let mut vm2 = Vm::new(
        Program::parse(&blob).unwrap(),
        &mut stack2,
        VecKeyValueStore::new(),
        VmConfig::default(),
    );
    let mut ctx = [0xabu8];
    assert_eq!(vm2.execute_ctx(&mut ctx).unwrap(), 0xab);
}

#[test]
fn branch_budget_limits_a_tight_loop() {
    // MOV R0, 0; loop: R0 += 1; JNE R0, 10000, -2; EXIT
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0xb7, 0, 0, 0, 0));
    text.extend_from_slice(&encode(0x07, 0, 0, 0, 1));
    text.extend_from_slice(&encode(0x55, 0, 0, -2, 10000));
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);

    let program = Program::parse(&blob).unwrap();
    let mut stack = [0u8; 64];
    let mut vm = Vm::new(
        program,
        &mut stack,
        VecKeyValueStore::new(),
        VmConfig { branches_budget: 100 },
    );
    assert!(matches!(
        vm.execute().unwrap_err(),
        RuntimeError::OutOfBranches { .. }
    ));

    let program = Program::parse(&blob).unwrap();
    let mut stack = [0u8; 64];
    let mut vm = Vm::new(
        program,
        &mut stack,
        VecKeyValueStore::new(),
        VmConfig { branches_budget: 20_000 },
    );
    assert_eq!(vm.execute().unwrap(), 10_000);
}

#[test]
fn division_by_zero_faults() {
    let mut text = Vec::new();
    text.extend_from_slice(&encode(0xb7, 0, 0, 0, 10)); // MOV R0, 10
    text.extend_from_slice(&encode(0xb7, 1, 0, 0, 0)); // MOV R1, 0
    text.extend_from_slice(&encode(0x3f, 0, 1, 0, 0)); // DIV64 R0, R1
    text.extend_from_slice(&exit());
    let blob = build_blob(&text);
    let program = Program::parse(&blob).unwrap();

    let mut stack = [0u8; 64];
    let mut vm = Vm::new(program, &mut stack, VecKeyValueStore::new(), VmConfig::default());
    assert!(matches!(
        vm.execute().unwrap_err(),
        RuntimeError::IllegalDiv { .. }
    ));
}
