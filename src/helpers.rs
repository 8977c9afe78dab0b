//! External call (helper) dispatch surface (§4.5).
//!
//! A helper is any host function callable from a program via `CALL imm`.
//! Four are always present, operating on a host-provided key/value store;
//! everything else is a host extension reached through the same
//! `resolve` hook.

use std::collections::HashMap;

use tracing::trace;

use crate::memory::{AccessMode, MemoryRegionTable};

/// A host-provided integer key/value store, the backing of the four
/// built-in helpers.
///
/// Grounded in `fuel-vm`'s `InterpreterStorage` trait boundary between the
/// interpreter and its concrete backing store.
pub trait KeyValueStore {
    /// Store `value` under `key`. `local` selects the per-instance
    /// namespace versus the shared/global one. Returns `true` on success.
    fn store(&mut self, local: bool, key: u32, value: u32) -> bool;

    /// Fetch the value stored under `key`, if any.
    fn fetch(&self, local: bool, key: u32) -> Option<u32>;
}

/// A simple in-memory [`KeyValueStore`], the default for tests and for
/// hosts with no persistence requirement.
#[derive(Debug, Default)]
pub struct VecKeyValueStore {
    local: HashMap<u32, u32>,
    global: HashMap<u32, u32>,
}

impl VecKeyValueStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, local: bool) -> &HashMap<u32, u32> {
        if local {
            &self.local
        } else {
            &self.global
        }
    }

    fn map_mut(&mut self, local: bool) -> &mut HashMap<u32, u32> {
        if local {
            &mut self.local
        } else {
            &mut self.global
        }
    }
}

impl KeyValueStore for VecKeyValueStore {
    fn store(&mut self, local: bool, key: u32, value: u32) -> bool {
        self.map_mut(local).insert(key, value);
        true
    }

    fn fetch(&self, local: bool, key: u32) -> Option<u32> {
        self.map(local).get(&key).copied()
    }
}

/// A host extension dispatch table, consulted after the four built-in
/// helpers for any call number they don't recognize.
pub trait HelperExtension {
    /// Attempt to service call `num` with arguments `R1..R5`, returning the
    /// value to write into `R0`. `None` means "not one of mine".
    fn call(&mut self, num: u32, args: [u64; 5]) -> Option<u64>;

    /// Whether `num` names a helper this extension provides, consulted by
    /// preflight's call-resolvability check.
    fn is_known(&self, num: u32) -> bool;
}

/// Call numbers of the four helpers every dispatcher must provide.
pub mod builtin {
    /// `store_local(key, value) -> 0 | 1`
    pub const STORE_LOCAL: u32 = 1;
    /// `store_global(key, value) -> 0 | 1`
    pub const STORE_GLOBAL: u32 = 2;
    /// `fetch_local(key, out_value: *mut u32) -> 0 | 1`
    pub const FETCH_LOCAL: u32 = 3;
    /// `fetch_global(key, out_value: *mut u32) -> 0 | 1`
    pub const FETCH_GLOBAL: u32 = 4;
}

/// Write `value` to the VM address `addr`, subject to the same
/// memory-region check any other program store would get. Returns `false`
/// if `addr` does not fall within a region granting `WRITE` for 4 bytes.
fn write_out_param(regions: &MemoryRegionTable, addr: u64, value: u32) -> bool {
    if regions.check(addr, 4, AccessMode::WRITE).is_err() {
        return false;
    }
    // SAFETY: `addr` just passed a 4-byte WRITE region check.
    unsafe { (addr as *mut u32).write_unaligned(value) };
    true
}

/// Resolve the four built-in helper numbers against `store`, returning the
/// helper's 64-bit return value written into `R0`. Returns `None` if `num`
/// is not one of the built-ins, letting the caller fall through to its own
/// host-specific table.
///
/// `fetch_local`/`fetch_global` treat `a2` as a VM address and write the
/// looked-up value through it rather than returning it in `R0`, matching
/// the host ABI's by-pointer output parameter; the region check on that
/// address is the same `WRITE` check any ordinary store instruction gets.
pub fn call_builtin(
    store: &mut dyn KeyValueStore,
    regions: &MemoryRegionTable,
    num: u32,
    a1: u64,
    a2: u64,
) -> Option<u64> {
    let key = a1 as u32;
    match num {
        builtin::STORE_LOCAL => {
            let ok = store.store(true, key, a2 as u32);
            trace!(key, ok, "store_local");
            Some(u64::from(!ok))
        }
        builtin::STORE_GLOBAL => {
            let ok = store.store(false, key, a2 as u32);
            trace!(key, ok, "store_global");
            Some(u64::from(!ok))
        }
        builtin::FETCH_LOCAL => {
            let local = true;
            let ok = store
                .fetch(local, key)
                .is_some_and(|value| write_out_param(regions, a2, value));
            trace!(key, out = a2, ok, "fetch_local");
            Some(u64::from(!ok))
        }
        builtin::FETCH_GLOBAL => {
            let local = false;
            let ok = store
                .fetch(local, key)
                .is_some_and(|value| write_out_param(regions, a2, value));
            trace!(key, out = a2, ok, "fetch_global");
            Some(u64::from(!ok))
        }
        _ => None,
    }
}

/// Whether `num` names a known helper: one of the four built-ins, or one
/// accepted by `extra` (a host's additional dispatch table, typically a
/// closure over a fixed set of call numbers).
pub fn is_known_helper(num: u32, extra: &dyn Fn(u32) -> bool) -> bool {
    matches!(
        num,
        builtin::STORE_LOCAL | builtin::STORE_GLOBAL | builtin::FETCH_LOCAL | builtin::FETCH_GLOBAL
    ) || extra(num)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_param_table(out: &mut u32) -> MemoryRegionTable {
        let mut table = MemoryRegionTable::new();
        table.push(crate::memory::MemoryRegion::from_slice_mut(
            // SAFETY: a `u32` reinterpreted as its own byte representation.
            unsafe { core::slice::from_raw_parts_mut(out as *mut u32 as *mut u8, 4) },
            AccessMode::WRITE,
        ));
        table
    }

    #[test]
    fn store_then_fetch_round_trips_per_namespace() {
        let mut store = VecKeyValueStore::new();
        let mut out = 0u32;
        let table = out_param_table(&mut out);
        let out_addr = &out as *const u32 as u64;

        assert_eq!(
            call_builtin(&mut store, &table, builtin::STORE_LOCAL, 7, 42),
            Some(0)
        );
        assert_eq!(
            call_builtin(&mut store, &table, builtin::FETCH_LOCAL, 7, out_addr),
            Some(0)
        );
        assert_eq!(out, 42);
        assert_eq!(
            call_builtin(&mut store, &table, builtin::FETCH_GLOBAL, 7, out_addr),
            Some(1)
        );
    }

    #[test]
    fn store_global_is_independent_of_local() {
        let mut store = VecKeyValueStore::new();
        let mut out = 0u32;
        let table = out_param_table(&mut out);
        let out_addr = &out as *const u32 as u64;

        call_builtin(&mut store, &table, builtin::STORE_GLOBAL, 1, 99);
        assert_eq!(
            call_builtin(&mut store, &table, builtin::FETCH_GLOBAL, 1, out_addr),
            Some(0)
        );
        assert_eq!(out, 99);
        assert_eq!(
            call_builtin(&mut store, &table, builtin::FETCH_LOCAL, 1, out_addr),
            Some(1)
        );
    }

    #[test]
    fn fetch_rejects_an_out_pointer_outside_any_writable_region() {
        let mut store = VecKeyValueStore::new();
        store.store(true, 1, 7);
        let table = MemoryRegionTable::new();

        assert_eq!(
            call_builtin(&mut store, &table, builtin::FETCH_LOCAL, 1, 0xdead_0000),
            Some(1)
        );
    }

    #[test]
    fn unknown_helper_number_falls_through() {
        let mut store = VecKeyValueStore::new();
        let table = MemoryRegionTable::new();
        assert_eq!(call_builtin(&mut store, &table, 0xffff, 0, 0), None);
    }

    #[test]
    fn is_known_helper_covers_builtins_and_extras() {
        assert!(is_known_helper(builtin::STORE_LOCAL, &|_| false));
        assert!(!is_known_helper(999, &|_| false));
        assert!(is_known_helper(999, &|n| n == 999));
    }
}
