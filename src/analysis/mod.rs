//! Analysis module - native-code correlation and symbolization
//!
//! Contains the code-region locator, the layered symbol resolver, and the
//! disassembly pipeline that joins them into one text report.

pub mod locator;
pub mod pipeline;
pub mod resolver;

pub use locator::find_compiled_region;
pub use pipeline::NativeDisassemblyPipeline;
pub use resolver::{MethodContext, ResolvedSymbol, SymbolResolver};
