//! Diagnostic session - owns the collaborator set and ties the three
//! reports together
//!
//! A session compiles scripts into [`CompiledUnit`]s and produces the three
//! views for each: the bytecode dump, the execution result, and the native
//! disassembly of the JIT-compiled code. The native pass attaches to the
//! session's own process, because units are loaded in-process before
//! disassembly begins.

use std::time::Duration;

use anyhow::Result;

use crate::analysis::NativeDisassemblyPipeline;
use crate::disasm::InstructionDecoder;
use crate::runtime::{AttachError, ProcessInspector};
use crate::symbols::NativeSymbolIndex;
use crate::unit::{
    BytecodeRenderer, CompiledUnit, OutputCapture, ScriptCompiler, UnitError, UnitLoader,
};

/// Upper bound on attach latency; enumeration and decoding are unbounded.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_millis(5000);

/// One diagnostic session over one target process.
///
/// Not designed for concurrent callers: a native dump attaches to, walks,
/// and detaches from the process as a single synchronous pass.
pub struct DiagnosticSession {
    pub compiler: Box<dyn ScriptCompiler>,
    pub loader: Box<dyn UnitLoader>,
    pub renderer: Box<dyn BytecodeRenderer>,
    pub capture: Box<dyn OutputCapture>,
    pub inspector: Box<dyn ProcessInspector>,
    pub decoder: Box<dyn InstructionDecoder>,
    pub natives: Box<dyn NativeSymbolIndex>,

    /// Process the units are loaded into; defaults to the current process
    pub pid: u32,
    pub attach_timeout: Duration,

    units_created: u32,
}

impl DiagnosticSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        compiler: Box<dyn ScriptCompiler>,
        loader: Box<dyn UnitLoader>,
        renderer: Box<dyn BytecodeRenderer>,
        capture: Box<dyn OutputCapture>,
        inspector: Box<dyn ProcessInspector>,
        decoder: Box<dyn InstructionDecoder>,
        natives: Box<dyn NativeSymbolIndex>,
    ) -> Self {
        Self {
            compiler,
            loader,
            renderer,
            capture,
            inspector,
            decoder,
            natives,
            pid: std::process::id(),
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            units_created: 0,
        }
    }

    /// Compile `source` into a freshly named unit and load it.
    ///
    /// Unit names are unique within the session (`Script_0`, `Script_1`,
    /// ...), so a recompiled script loads as a new module rather than
    /// replacing the old one.
    pub fn compile(&mut self, source: &str) -> Result<CompiledUnit, UnitError> {
        let name = format!("Script_{}", self.units_created);
        let unit = CompiledUnit::new(&name, source, self.compiler.as_ref(), self.loader.as_ref())?;
        self.units_created += 1;
        Ok(unit)
    }

    /// Run the unit's entry method; always returns a string.
    pub fn execute(&self, unit: &CompiledUnit, argument: &str) -> String {
        unit.execute(argument, self.capture.as_ref())
    }

    /// Render the unit's bytecode image as text.
    pub fn dump_bytecode(&self, unit: &CompiledUnit) -> Result<String> {
        unit.dump_bytecode(self.renderer.as_ref())
    }

    /// Produce the native disassembly report for the unit's module.
    pub fn dump_native(&self, unit: &CompiledUnit) -> Result<String, AttachError> {
        let pipeline = NativeDisassemblyPipeline::new(
            self.inspector.as_ref(),
            self.decoder.as_ref(),
            self.natives.as_ref(),
            self.pid,
            self.attach_timeout,
        );
        pipeline.dump(unit.name())
    }
}
