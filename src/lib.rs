//! Jitscope - diagnostic harness for JIT-compiled managed code
//!
//! Takes a small unit of source code, compiles it into an isolated
//! executable unit, runs it, and produces three text views of what
//! happened: the bytecode form, the execution result/log, and the native
//! machine code the runtime generated for it, annotated with symbol names.
//!
//! The interesting part is the third view: it correlates three independent
//! coordinate systems - metadata-level method identity, the runtime's
//! code-heap layout (including duplicate or stale compiled copies of one
//! method), and raw instruction byte offsets - with no direct,
//! always-populated link between them.
//!
//! Compilation, loading, runtime introspection, instruction decoding, and
//! native symbol lookup are external collaborators behind traits; this
//! crate implements the correlation and symbolization logic between them,
//! plus a Capstone-backed decoder and a goblin-backed export symbol index.

pub mod analysis;
pub mod disasm;
pub mod runtime;
pub mod session;
pub mod symbols;
pub mod unit;

pub use analysis::{
    find_compiled_region, MethodContext, NativeDisassemblyPipeline, ResolvedSymbol, SymbolResolver,
};
pub use disasm::{DecodedInstruction, DisasmEngine, InstructionDecoder};
pub use runtime::{
    Architecture, AttachError, CodeRegion, ManagedRuntime, MethodIdentity, MethodRecord,
    ProcessInspector, RuntimeSnapshot,
};
pub use session::{DiagnosticSession, DEFAULT_ATTACH_TIMEOUT};
pub use symbols::{ExportSymbolIndex, NativeSymbol, NativeSymbolIndex};
pub use unit::{CompiledImage, CompiledUnit, UnitError};
