//! Runtime introspection - attached view of a managed process
//!
//! The harness never walks runtime data structures itself; it talks to an
//! external introspection backend through the traits below. A snapshot is a
//! read-only view scoped to one disassembly pass: attach, enumerate, and
//! detach when the snapshot is dropped.

pub mod types;

use std::time::Duration;

use thiserror::Error;

pub use types::{
    Architecture, CodeRegion, MethodIdentity, MethodRecord, ModuleRecord, RuntimeInfo, TypeRecord,
};

/// Errors raised while attaching to the target process
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Failed to attach to process {pid}: {reason}")]
    AttachFailed { pid: u32, reason: String },

    #[error("Attach to process {pid} timed out after {timeout_ms} ms")]
    Timeout { pid: u32, timeout_ms: u64 },

    #[error("No managed runtime found in process {pid}")]
    NoRuntime { pid: u32 },

    #[error("Failed to create runtime view for version {version}: {reason}")]
    RuntimeCreation { version: String, reason: String },
}

/// Errors raised while reading target process memory
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Failed to read {len} bytes at {address:#x}: {reason}")]
    ReadFailed {
        address: u64,
        len: usize,
        reason: String,
    },
}

/// Entry point of the introspection backend.
///
/// The timeout bounds only the initial connection, not the enumeration and
/// decoding work that follows.
pub trait ProcessInspector {
    /// Attach to a running process and take a read-only snapshot.
    ///
    /// Detach happens when the returned snapshot is dropped, whether the
    /// pass completed or failed.
    fn attach(&self, pid: u32, timeout: Duration)
        -> Result<Box<dyn RuntimeSnapshot + '_>, AttachError>;
}

/// A read-only attached view of the target process.
///
/// Never mutated; all enumeration reflects the process state at attach time.
pub trait RuntimeSnapshot {
    /// Managed runtimes found in the process, in discovery order.
    fn runtimes(&self) -> Vec<RuntimeInfo>;

    /// Create the metadata-level view for one of the discovered runtimes.
    fn create_runtime(&self, info: &RuntimeInfo)
        -> Result<Box<dyn ManagedRuntime + '_>, AttachError>;

    /// Read raw bytes from the target process address space.
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError>;
}

/// Metadata-level enumeration for one managed runtime.
pub trait ManagedRuntime {
    /// Modules loaded in the application domain, in load order.
    fn modules(&self) -> Vec<ModuleRecord>;

    /// Types declared in a module.
    fn types_in(&self, module: &ModuleRecord) -> Vec<TypeRecord>;

    /// Methods declared on a type, keyed by its method table.
    ///
    /// The same logical method may appear more than once; see
    /// [`crate::analysis::locator`].
    fn methods_of_type(&self, method_table: u64) -> Vec<MethodRecord>;

    /// The compiled method whose hot region starts at `address`, if any.
    fn method_at(&self, address: u64) -> Option<MethodRecord>;
}
