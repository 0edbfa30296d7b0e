//! Layered symbol resolution
//!
//! An instruction's call/jump target may be a local label inside the method
//! being disassembled, a managed method compiled from the same unit or from
//! the runtime itself, or native code. Each needs a different lookup, so the
//! resolution order is an explicit contract rather than a chain of nullable
//! fallbacks.

use std::fmt;

use crate::disasm::DecodedInstruction;
use crate::runtime::ManagedRuntime;
use crate::symbols::{NativeSymbol, NativeSymbolIndex};

/// The enclosing method's base address, threaded through resolution.
///
/// The decoder expresses in-function branch operands relative to the
/// function start, so the resolver needs the base of the method currently
/// being disassembled - never the target address. A fresh context is built
/// at the top of each method's pass.
#[derive(Debug, Clone, Copy)]
pub struct MethodContext {
    /// Hot-region start address of the current method
    pub base: u64,
}

/// Outcome of resolving one instruction operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSymbol {
    /// Branch target inside the current method, as an offset from its base
    IntraMethodLabel(u64),
    /// Full signature of a compiled managed method starting at the target
    ManagedMethod(String),
    /// Symbol from the native modules of the host process
    Native(NativeSymbol),
    /// No annotation; the operand renders as the decoder wrote it
    Unresolved,
}

impl fmt::Display for ResolvedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedSymbol::IntraMethodLabel(offset) => write!(f, "L{offset:04x}"),
            ResolvedSymbol::ManagedMethod(signature) => write!(f, "{signature}"),
            ResolvedSymbol::Native(symbol) => write!(f, "{symbol}"),
            ResolvedSymbol::Unresolved => Ok(()),
        }
    }
}

/// Resolves branch targets against the attached runtime and the native
/// symbol index, in a fixed priority order.
pub struct SymbolResolver<'a> {
    runtime: &'a dyn ManagedRuntime,
    natives: &'a dyn NativeSymbolIndex,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(runtime: &'a dyn ManagedRuntime, natives: &'a dyn NativeSymbolIndex) -> Self {
        Self { runtime, natives }
    }

    /// Resolve the branch operand of `insn`, if any.
    ///
    /// Order, each step attempted only if the previous yields nothing:
    /// 1. Intra-method label, when the operand is a far pointer with a raw
    ///    offset of exactly zero. The label offset is
    ///    `(pc - method_base) + segment_displacement`.
    /// 2. Managed method starting at the absolute target address.
    /// 3. Native symbol covering the target address.
    pub fn resolve(&self, ctx: &MethodContext, insn: &DecodedInstruction) -> ResolvedSymbol {
        let Some(branch) = &insn.branch else {
            return ResolvedSymbol::Unresolved;
        };

        if let Some(far) = &branch.far_pointer {
            if far.offset == 0 {
                let base_offset = insn.address.wrapping_sub(ctx.base);
                return ResolvedSymbol::IntraMethodLabel(base_offset.wrapping_add(far.segment));
            }
        }

        if let Some(method) = self.runtime.method_at(branch.target) {
            if !method.full_signature.trim().is_empty() {
                return ResolvedSymbol::ManagedMethod(method.full_signature);
            }
        }

        if let Some(symbol) = self.natives.resolve(branch.target) {
            if !symbol.method_name.trim().is_empty() {
                return ResolvedSymbol::Native(symbol);
            }
        }

        ResolvedSymbol::Unresolved
    }
}
