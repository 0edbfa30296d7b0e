//! Native symbol resolution
//!
//! Maps raw code addresses in the host process's native modules back to
//! human-readable names. The pipeline only depends on [`NativeSymbolIndex`];
//! [`exports`] provides an implementation over module export/symbol tables.

pub mod exports;

use std::fmt;

pub use exports::ExportSymbolIndex;

/// A resolved native symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSymbol {
    /// Module the address belongs to (file stem, e.g. `coreclr`)
    pub module: String,
    /// Name of the nearest preceding exported function
    pub method_name: String,
    /// Distance from the symbol's start address
    pub displacement: u64,
}

impl fmt::Display for NativeSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.module, self.method_name)?;
        if self.displacement > 0 {
            write!(f, "+{:#x}", self.displacement)?;
        }
        Ok(())
    }
}

/// Address-to-symbol lookup over the process's loaded native modules
pub trait NativeSymbolIndex {
    /// Resolve an absolute address, if it falls inside a known module and
    /// a named symbol precedes it.
    fn resolve(&self, address: u64) -> Option<NativeSymbol>;
}
