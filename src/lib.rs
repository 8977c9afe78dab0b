//! A sandboxed eBPF-family bytecode interpreter for constrained devices.
//!
//! The crate is organized around the data flow of one execution: a
//! [`container::Program`] is parsed from a byte blob, checked once by
//! [`verifier::preflight`], then driven by an [`interpreter::Vm`] whose
//! memory accesses are mediated by the region table in [`memory`] and
//! whose `CALL` instructions are dispatched through [`helpers`].

pub mod consts;
pub mod container;
pub mod error;
pub mod helpers;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod verifier;

pub use container::Program;
pub use error::{RuntimeError, Status, VerifyError};
pub use helpers::{HelperExtension, KeyValueStore, VecKeyValueStore};
pub use interpreter::{Vm, VmConfig};
pub use memory::{AccessMode, MemoryRegion, MemoryRegionTable};
