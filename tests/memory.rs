//! Memory-region invariants (§8): a check succeeds iff some region covers
//! the access with matching flags, and the frame-pointer stack discipline
//! holds.

use femtovm::{AccessMode, MemoryRegion, MemoryRegionTable};

#[test]
fn check_succeeds_iff_some_region_covers_with_matching_flags() {
    let mut data = [0u8; 32];
    let rodata = [0u8; 16];

    let mut table = MemoryRegionTable::new();
    table.push(MemoryRegion::from_slice_mut(
        &mut data,
        AccessMode::READ | AccessMode::WRITE,
    ));
    table.push(MemoryRegion::from_slice(&rodata, AccessMode::READ));

    let data_ptr = data.as_ptr() as u64;
    let rodata_ptr = rodata.as_ptr() as u64;

    assert!(table.check(data_ptr, 4, AccessMode::WRITE).is_ok());
    assert!(table.check(data_ptr + 28, 4, AccessMode::WRITE).is_ok());
    assert!(table.check(data_ptr + 29, 4, AccessMode::WRITE).is_err());

    assert!(table.check(rodata_ptr, 4, AccessMode::READ).is_ok());
    assert!(table.check(rodata_ptr, 4, AccessMode::WRITE).is_err());

    assert!(table.check(0xdead_0000, 1, AccessMode::READ).is_err());
}

#[test]
fn stack_writes_outside_the_512_byte_window_fault() {
    let mut stack = [0u8; 512];
    let mut table = MemoryRegionTable::new();
    table.push(MemoryRegion::from_slice_mut(
        &mut stack,
        AccessMode::READ | AccessMode::WRITE,
    ));

    let fp = unsafe { stack.as_ptr().add(512) as u64 }; // one past the end
    assert!(table.check(fp - 8, 8, AccessMode::WRITE).is_ok()); // fp - 8: in range
    assert!(table.check(fp, 1, AccessMode::WRITE).is_err()); // fp + 0: out of range
    assert!(table.check(fp - 513, 1, AccessMode::WRITE).is_err()); // below the stack
}

#[test]
fn extra_region_with_execute_flag_denies_read_write() {
    let code = [0x90u8; 16];
    let mut table = MemoryRegionTable::new();
    table.push(MemoryRegion::from_slice(&code, AccessMode::EXEC));

    let addr = code.as_ptr() as u64;
    assert!(table.check(addr, 1, AccessMode::EXEC).is_ok());
    assert!(table.check(addr, 1, AccessMode::READ).is_err());
}
