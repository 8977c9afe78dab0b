//! Memory region access control (§3, §4.2).
//!
//! A program's address space is not one VM-owned buffer: each region
//! records the real host address of a byte range (stack, data, rodata,
//! the argument/context buffer, and any caller-registered extras) together
//! with the access modes it permits. Every load/store is checked against
//! this table before the underlying pointer is dereferenced.

use crate::error::RuntimeError;

/// Access permissions carried by a single [`MemoryRegion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMode {
    bits: u8,
}

impl AccessMode {
    /// Readable.
    pub const READ: AccessMode = AccessMode { bits: 0b001 };
    /// Writable.
    pub const WRITE: AccessMode = AccessMode { bits: 0b010 };
    /// Executable (unused by any default region, reserved for extras).
    pub const EXEC: AccessMode = AccessMode { bits: 0b100 };
    /// No permissions at all.
    pub const NONE: AccessMode = AccessMode { bits: 0 };

    /// Union of `self` and `other`.
    pub const fn union(self, other: AccessMode) -> AccessMode {
        AccessMode {
            bits: self.bits | other.bits,
        }
    }

    /// Whether every bit set in `required` is also set in `self`.
    pub const fn contains(self, required: AccessMode) -> bool {
        self.bits & required.bits == required.bits
    }
}

impl core::ops::BitOr for AccessMode {
    type Output = AccessMode;
    fn bitor(self, rhs: AccessMode) -> AccessMode {
        self.union(rhs)
    }
}

/// A single contiguous range of host memory the program may touch.
///
/// `start` is a real host pointer value reinterpreted as `u64`, not an
/// offset into a VM-owned arena: the interpreter dereferences
/// `start + offset` directly once a region's flags have been checked.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    start: u64,
    len: u64,
    access: AccessMode,
}

impl MemoryRegion {
    /// Build a region directly from a caller-supplied host address and
    /// length, without requiring a live Rust reference over that range.
    ///
    /// Used by [`crate::interpreter::Vm::add_region`], where the caller
    /// hands over a raw `(start, len)` pair (e.g. a packet buffer owned
    /// elsewhere in the host) rather than a borrowed slice.
    pub const fn new(start: u64, len: u64, access: AccessMode) -> Self {
        Self { start, len, access }
    }

    /// Build a region over `slice`, readable and optionally writable.
    pub fn from_slice(slice: &[u8], access: AccessMode) -> Self {
        Self {
            start: slice.as_ptr() as u64,
            len: slice.len() as u64,
            access,
        }
    }

    /// Build a region over a mutable `slice`.
    pub fn from_slice_mut(slice: &mut [u8], access: AccessMode) -> Self {
        Self {
            start: slice.as_mut_ptr() as u64,
            len: slice.len() as u64,
            access,
        }
    }

    /// Host start address of this region.
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Length in bytes.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether this region covers zero bytes.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Permissions granted within this region.
    pub const fn access(&self) -> AccessMode {
        self.access
    }

    /// Whether `[addr, addr+width)` lies entirely within this region and
    /// `required` is a subset of the region's permissions.
    fn covers(&self, addr: u64, width: u64, required: AccessMode) -> bool {
        if !self.access.contains(required) {
            return false;
        }
        let Some(end) = addr.checked_add(width) else {
            return false;
        };
        addr >= self.start && end <= self.start + self.len
    }
}

/// The ordered list of regions a running program may address.
///
/// Order matters only in that the first covering region wins, matching the
/// reference implementation's linked-list walk; regions never overlap in
/// practice so this is purely a lookup order.
#[derive(Debug, Default)]
pub struct MemoryRegionTable {
    regions: Vec<MemoryRegion>,
}

impl MemoryRegionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Append a region, checked last during lookup.
    pub fn push(&mut self, region: MemoryRegion) {
        self.regions.push(region);
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no regions are registered.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Find the region (if any) that authorizes accessing `width` bytes at
    /// `addr` with `required` permissions.
    pub fn find(&self, addr: u64, width: u64, required: AccessMode) -> Option<&MemoryRegion> {
        self.regions
            .iter()
            .find(|region| region.covers(addr, width, required))
    }

    /// Whether `[addr, addr+len)` lies within some region, regardless of
    /// that region's access flags. Backs `store_load_allowed`.
    pub fn contains_range(&self, addr: u64, len: u64) -> bool {
        self.find(addr, len, AccessMode::NONE).is_some()
    }

    /// Check that `[addr, addr+width)` is entirely covered by some region
    /// granting `required`, returning the host pointer on success.
    pub fn check(&self, addr: u64, width: u8, required: AccessMode) -> Result<u64, RuntimeError> {
        match self.find(addr, width as u64, required) {
            Some(_) => Ok(addr),
            None => Err(RuntimeError::IllegalMem {
                addr,
                width,
                mode: required,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_union_and_contains() {
        let rw = AccessMode::READ | AccessMode::WRITE;
        assert!(rw.contains(AccessMode::READ));
        assert!(rw.contains(AccessMode::WRITE));
        assert!(!rw.contains(AccessMode::EXEC));
    }

    #[test]
    fn region_rejects_out_of_bounds_access() {
        let buf = [0u8; 16];
        let region = MemoryRegion::from_slice(&buf, AccessMode::READ);
        let start = region.start();

        assert!(region.covers(start, 16, AccessMode::READ));
        assert!(!region.covers(start, 17, AccessMode::READ));
        assert!(!region.covers(start + 1, 16, AccessMode::READ));
    }

    #[test]
    fn region_rejects_wrong_permission() {
        let buf = [0u8; 8];
        let region = MemoryRegion::from_slice(&buf, AccessMode::READ);
        assert!(!region.covers(region.start(), 1, AccessMode::WRITE));
    }

    #[test]
    fn table_finds_first_covering_region() {
        let a = [1u8; 8];
        let b = [2u8; 8];
        let mut table = MemoryRegionTable::new();
        table.push(MemoryRegion::from_slice(&a, AccessMode::READ));
        table.push(MemoryRegion::from_slice(&b, AccessMode::READ));

        assert!(table.check(a.as_ptr() as u64, 8, AccessMode::READ).is_ok());
        assert!(table.check(b.as_ptr() as u64, 8, AccessMode::READ).is_ok());
    }

    #[test]
    fn table_check_reports_illegal_mem_with_requested_mode() {
        let table = MemoryRegionTable::new();
        let err = table.check(0x1000, 4, AccessMode::WRITE).unwrap_err();
        match err {
            RuntimeError::IllegalMem { addr, width, mode } => {
                assert_eq!(addr, 0x1000);
                assert_eq!(width, 4);
                assert!(mode.contains(AccessMode::WRITE));
            }
            _ => panic!("wrong error variant"),
        }
    }

    #[test]
    fn addr_overflow_is_rejected_not_wrapped() {
        let buf = [0u8; 8];
        let region = MemoryRegion::from_slice(&buf, AccessMode::READ);
        assert!(!region.covers(u64::MAX - 1, 8, AccessMode::READ));
    }
}
