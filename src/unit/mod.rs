//! Compiled unit - compilation, loading, execution, bytecode dumping
//!
//! A [`CompiledUnit`] owns the in-memory compiled image and the handle to
//! the unit loaded into the current process. Compilation, loading, and
//! invocation are external collaborators behind the traits below; the unit
//! holds the orchestration and the retained image buffers.

use std::fmt;

use anyhow::Result;
use thiserror::Error;

/// Compilation or loading failure during unit creation
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Error-severity compiler diagnostics; no partial unit is produced
#[derive(Error, Debug)]
#[error("Script compilation failed:\n{diagnostics}")]
pub struct CompileError {
    pub diagnostics: String,
}

#[derive(Error, Debug)]
#[error("Failed to load unit: {reason}")]
pub struct LoadError {
    pub reason: String,
}

/// A fault raised by the invoked method, carrying its full textual
/// description. Caught at the call boundary, never propagated.
#[derive(Error, Debug)]
#[error("{description}")]
pub struct InvokeFault {
    pub description: String,
}

/// The compiled form of a unit: bytecode image plus debug image.
///
/// Both buffers are retained for the lifetime of the unit; the bytecode is
/// re-read for every [`CompiledUnit::dump_bytecode`] call.
#[derive(Debug, Clone, Default)]
pub struct CompiledImage {
    pub bytecode: Vec<u8>,
    pub debug_info: Vec<u8>,
}

/// Source-to-bytecode compiler
pub trait ScriptCompiler {
    fn compile(&self, source: &str) -> Result<CompiledImage, CompileError>;
}

/// Loads a bytecode image into the current process
pub trait UnitLoader {
    fn load(&self, bytecode: &[u8]) -> Result<Box<dyn LoadedUnit>, LoadError>;
}

/// A unit loaded into the current process.
///
/// `invoke_entry` constructs an instance of the unit's first declared type
/// and calls its first public instance method with the given argument,
/// returning the stringified result or the fault.
pub trait LoadedUnit {
    fn invoke_entry(&self, argument: &str) -> Result<String, InvokeFault>;
}

/// Renders a bytecode image as text
pub trait BytecodeRenderer {
    fn render(&self, bytecode: &[u8]) -> Result<String>;
}

/// Scoped redirection of the process's standard output.
///
/// `begin` redirects output into a capture buffer; dropping the returned
/// scope restores the previous output, fault or not.
pub trait OutputCapture {
    fn begin(&self) -> Box<dyn CaptureScope>;
}

pub trait CaptureScope {
    /// Text captured so far.
    fn captured(&self) -> String;
}

/// A compiled, loaded, executable unit
pub struct CompiledUnit {
    name: String,
    image: CompiledImage,
    handle: Box<dyn LoadedUnit>,
}

// Manual impl: the loaded-unit handle is an opaque trait object.
impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name)
            .field("bytecode_len", &self.image.bytecode.len())
            .field("debug_info_len", &self.image.debug_info.len())
            .finish_non_exhaustive()
    }
}

impl CompiledUnit {
    /// Compile `source` and load the resulting image into the current
    /// process. The image is loaded exactly once, here.
    pub fn new(
        name: &str,
        source: &str,
        compiler: &dyn ScriptCompiler,
        loader: &dyn UnitLoader,
    ) -> Result<Self, UnitError> {
        let image = compiler.compile(source)?;
        log::info!(
            "Script compiled into unit {} ({} bytes)",
            name,
            image.bytecode.len()
        );

        let handle = loader.load(&image.bytecode)?;
        log::info!("Dynamic unit {} loaded", name);

        Ok(Self {
            name: name.to_string(),
            image,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &CompiledImage {
        &self.image
    }

    /// Invoke the unit's entry method with `argument`, capturing standard
    /// output for the duration of the call.
    ///
    /// Always returns a string: a fault is converted to its full textual
    /// description, never propagated.
    pub fn execute(&self, argument: &str, capture: &dyn OutputCapture) -> String {
        let scope = capture.begin();
        log::debug!("Invoking entry method of {} with argument {:?}", self.name, argument);

        let result = match self.handle.invoke_entry(argument) {
            Ok(value) => {
                log::info!("Script result: {}", value);
                value
            }
            Err(fault) => {
                log::warn!("Script execution faulted: {}", fault);
                fault.to_string()
            }
        };

        let output = scope.captured();
        drop(scope);
        if !output.is_empty() {
            log::info!("Script output:\n{}", output);
        }

        result
    }

    /// Render the retained bytecode image as text. Pure and repeatable.
    pub fn dump_bytecode(&self, renderer: &dyn BytecodeRenderer) -> Result<String> {
        renderer.render(&self.image.bytecode)
    }
}
