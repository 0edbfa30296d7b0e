//! Native disassembly pipeline
//!
//! Attaches to the target process, walks the unit's module down to each
//! method, and renders the JIT-generated code with symbolized branch
//! targets. Per-method failures degrade to inline comment lines; only a
//! failure to attach aborts the report.

use std::time::Duration;

use crate::analysis::locator::find_compiled_region;
use crate::analysis::resolver::{MethodContext, ResolvedSymbol, SymbolResolver};
use crate::disasm::{DecodedInstruction, InstructionDecoder};
use crate::runtime::{
    Architecture, AttachError, ManagedRuntime, MethodRecord, ProcessInspector, RuntimeSnapshot,
};
use crate::symbols::NativeSymbolIndex;

/// Render an address as two 8-hex-digit groups separated by a backtick, so
/// lines stay aligned regardless of pointer width.
pub fn format_address(address: u64) -> String {
    format!(
        "0x{:08X}`{:08X}",
        (address >> 32) & 0xFFFF_FFFF,
        address & 0xFFFF_FFFF
    )
}

/// Orchestrates snapshot, enumeration, decoding, and symbolization into one
/// text report.
pub struct NativeDisassemblyPipeline<'a> {
    inspector: &'a dyn ProcessInspector,
    decoder: &'a dyn InstructionDecoder,
    natives: &'a dyn NativeSymbolIndex,
    pid: u32,
    attach_timeout: Duration,
}

impl<'a> NativeDisassemblyPipeline<'a> {
    pub fn new(
        inspector: &'a dyn ProcessInspector,
        decoder: &'a dyn InstructionDecoder,
        natives: &'a dyn NativeSymbolIndex,
        pid: u32,
        attach_timeout: Duration,
    ) -> Self {
        Self {
            inspector,
            decoder,
            natives,
            pid,
            attach_timeout,
        }
    }

    /// Produce the native disassembly report for the module whose assembly
    /// name starts with `unit_name`.
    ///
    /// Only [`AttachError`] propagates; everything else is recorded inline
    /// so a partial report stays useful.
    pub fn dump(&self, unit_name: &str) -> Result<String, AttachError> {
        log::info!("Attaching to process {} (passive)", self.pid);
        let snapshot = self.inspector.attach(self.pid, self.attach_timeout)?;

        let mut out = String::new();
        for info in snapshot.runtimes() {
            log::info!("Found runtime version {}", info.version);

            let runtime = match snapshot.create_runtime(&info) {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::warn!("Skipping runtime {}: {}", info.version, e);
                    continue;
                }
            };

            out.push_str(&format!("; {} {}\n", info.flavor, info.version));
            out.push_str(&format!(
                "; {} ({} {})\n",
                info.dac_file, info.architecture, info.version
            ));
            out.push('\n');

            // Last match wins: a reloaded module shadows earlier copies
            // sharing the name prefix.
            let module = runtime
                .modules()
                .into_iter()
                .filter(|m| {
                    m.assembly_name
                        .as_deref()
                        .is_some_and(|name| name.starts_with(unit_name))
                })
                .last();

            let Some(module) = module else {
                out.push_str(&format!("; No module matching '{unit_name}' found\n"));
                break;
            };

            for ty in runtime.types_in(&module) {
                out.push_str(&format!("; Type {}\n", ty.name));

                for method in runtime.methods_of_type(ty.method_table) {
                    self.disassemble_method(
                        snapshot.as_ref(),
                        runtime.as_ref(),
                        info.architecture,
                        &method,
                        &mut out,
                    );
                    out.push('\n');
                }
            }

            // First runtime that yields output is enough.
            break;
        }

        log::info!("Detaching from process {}", self.pid);
        Ok(out)
    }

    fn disassemble_method(
        &self,
        snapshot: &dyn RuntimeSnapshot,
        runtime: &dyn ManagedRuntime,
        arch: Architecture,
        method: &MethodRecord,
        out: &mut String,
    ) {
        out.push_str(&method.full_signature);
        out.push('\n');

        let Some(region) = find_compiled_region(runtime, method) else {
            out.push_str("    ; Failed to find HotColdInfo\n");
            return;
        };

        log::debug!(
            "Method {} compiled at {:#x} ({} bytes)",
            method.full_signature,
            region.hot_start,
            region.hot_size
        );

        let bytes = match snapshot.read_memory(region.hot_start, region.hot_size as usize) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping {}: {}", method.full_signature, e);
                out.push_str(&format!("    ; {e}\n"));
                return;
            }
        };

        let instructions = match self.decoder.decode(&bytes, region.hot_start, arch) {
            Ok(instructions) => instructions,
            Err(e) => {
                log::warn!("Decode failed for {}: {}", method.full_signature, e);
                out.push_str(&format!("    ; {e}\n"));
                return;
            }
        };

        let ctx = MethodContext { base: region.hot_start };
        let resolver = SymbolResolver::new(runtime, self.natives);

        for insn in &instructions {
            let offset = insn.address - ctx.base;
            out.push_str(&format!(
                "{}:    L{:04x}: {}\n",
                format_address(insn.address),
                offset,
                render_instruction(&resolver, &ctx, insn)
            ));
        }
    }
}

/// Render one instruction, substituting the branch operand with its
/// resolved symbol when resolution succeeds.
fn render_instruction(
    resolver: &SymbolResolver<'_>,
    ctx: &MethodContext,
    insn: &DecodedInstruction,
) -> String {
    match resolver.resolve(ctx, insn) {
        ResolvedSymbol::Unresolved => {
            if insn.operands.is_empty() {
                insn.mnemonic.clone()
            } else {
                format!("{} {}", insn.mnemonic, insn.operands)
            }
        }
        symbol => format!("{} {}", insn.mnemonic, symbol),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::disasm::{BranchOperand, DecodeError};
    use crate::runtime::{CodeRegion, MemoryError, ModuleRecord, RuntimeInfo, TypeRecord};
    use crate::symbols::NativeSymbol;

    #[derive(Clone, Default)]
    struct FakeRuntime {
        modules: Vec<ModuleRecord>,
        types_by_module: HashMap<u64, Vec<TypeRecord>>,
        methods_by_type: HashMap<u64, Vec<MethodRecord>>,
        compiled_at: HashMap<u64, String>,
    }

    impl ManagedRuntime for FakeRuntime {
        fn modules(&self) -> Vec<ModuleRecord> {
            self.modules.clone()
        }

        fn types_in(&self, module: &ModuleRecord) -> Vec<TypeRecord> {
            self.types_by_module
                .get(&module.base_address)
                .cloned()
                .unwrap_or_default()
        }

        fn methods_of_type(&self, method_table: u64) -> Vec<MethodRecord> {
            self.methods_by_type
                .get(&method_table)
                .cloned()
                .unwrap_or_default()
        }

        fn method_at(&self, address: u64) -> Option<MethodRecord> {
            self.compiled_at.get(&address).map(|signature| MethodRecord {
                metadata_token: 0x0600_0001,
                full_signature: signature.clone(),
                declaring_type: None,
                hot_cold: CodeRegion { hot_start: address, hot_size: 0x10 },
            })
        }
    }

    #[derive(Default)]
    struct FakeSnapshot {
        runtime: FakeRuntime,
        memory: HashMap<u64, Vec<u8>>,
    }

    impl RuntimeSnapshot for FakeSnapshot {
        fn runtimes(&self) -> Vec<RuntimeInfo> {
            vec![RuntimeInfo {
                version: "8.0.1".into(),
                flavor: "Core".into(),
                dac_file: "libmscordaccore.so".into(),
                architecture: Architecture::X64,
            }]
        }

        fn create_runtime(
            &self,
            _info: &RuntimeInfo,
        ) -> Result<Box<dyn ManagedRuntime + '_>, AttachError> {
            Ok(Box::new(self.runtime.clone()))
        }

        fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
            self.memory
                .get(&address)
                .cloned()
                .ok_or(MemoryError::ReadFailed {
                    address,
                    len,
                    reason: "unmapped".into(),
                })
        }
    }

    struct FakeInspector {
        snapshot: Option<FakeSnapshot>,
    }

    impl ProcessInspector for FakeInspector {
        fn attach(
            &self,
            pid: u32,
            _timeout: Duration,
        ) -> Result<Box<dyn RuntimeSnapshot + '_>, AttachError> {
            match &self.snapshot {
                Some(snapshot) => Ok(Box::new(FakeSnapshot {
                    runtime: snapshot.runtime.clone(),
                    memory: snapshot.memory.clone(),
                })),
                None => Err(AttachError::AttachFailed {
                    pid,
                    reason: "process gone".into(),
                }),
            }
        }
    }

    /// One fake instruction per byte, calls targeting 0x9000 when the byte
    /// is 0xe8.
    struct FakeDecoder;

    impl InstructionDecoder for FakeDecoder {
        fn decode(
            &self,
            bytes: &[u8],
            base_address: u64,
            _arch: Architecture,
        ) -> Result<Vec<DecodedInstruction>, DecodeError> {
            Ok(bytes
                .iter()
                .enumerate()
                .map(|(i, b)| {
                    let branch = (*b == 0xe8).then_some(BranchOperand {
                        target: 0x9000,
                        far_pointer: None,
                    });
                    DecodedInstruction {
                        address: base_address + i as u64,
                        bytes: vec![*b],
                        mnemonic: if *b == 0xe8 { "call".into() } else { "nop".into() },
                        operands: if *b == 0xe8 { "0x9000".into() } else { String::new() },
                        length: 1,
                        branch,
                    }
                })
                .collect())
        }
    }

    struct NoNatives;

    impl NativeSymbolIndex for NoNatives {
        fn resolve(&self, _address: u64) -> Option<NativeSymbol> {
            None
        }
    }

    fn script_module(base: u64) -> ModuleRecord {
        ModuleRecord {
            assembly_name: Some("Script_0".into()),
            base_address: base,
        }
    }

    fn snapshot_with_one_method() -> FakeSnapshot {
        let mut runtime = FakeRuntime {
            modules: vec![script_module(0x10000)],
            ..Default::default()
        };
        runtime.types_by_module.insert(
            0x10000,
            vec![TypeRecord { name: "Script.Program".into(), method_table: 0xaa00 }],
        );
        runtime.methods_by_type.insert(
            0xaa00,
            vec![MethodRecord {
                metadata_token: 0x0600_0001,
                full_signature: "Script.Program.Run(System.String)".into(),
                declaring_type: Some(0xaa00),
                hot_cold: CodeRegion { hot_start: 0x1000, hot_size: 3 },
            }],
        );
        runtime
            .compiled_at
            .insert(0x9000, "Script.Program.Helper()".into());

        let mut memory = HashMap::new();
        memory.insert(0x1000, vec![0x00, 0xe8, 0x00]);
        FakeSnapshot { runtime, memory }
    }

    fn dump(snapshot: FakeSnapshot, unit_name: &str) -> String {
        let inspector = FakeInspector { snapshot: Some(snapshot) };
        let pipeline = NativeDisassemblyPipeline::new(
            &inspector,
            &FakeDecoder,
            &NoNatives,
            1234,
            Duration::from_millis(5000),
        );
        pipeline.dump(unit_name).unwrap()
    }

    #[test]
    fn formats_addresses_as_two_hex_groups() {
        assert_eq!(format_address(0x1000), "0x00000000`00001000");
        assert_eq!(format_address(0x7FFE_0030_1000), "0x00007FFE`00301000");
    }

    #[test]
    fn emits_labeled_instruction_lines() {
        let out = dump(snapshot_with_one_method(), "Script");

        assert!(out.contains("; Core 8.0.1"));
        assert!(out.contains("; Type Script.Program"));
        assert!(out.contains("Script.Program.Run(System.String)\n"));
        assert!(out.contains("0x00000000`00001000:    L0000: nop\n"));
        assert!(out.contains("0x00000000`00001001:    L0001: call Script.Program.Helper()\n"));
    }

    #[test]
    fn header_precedes_type_output() {
        let out = dump(snapshot_with_one_method(), "Script");
        let header = out.find("; Core 8.0.1").unwrap();
        let ty = out.find("; Type").unwrap();
        assert!(header < ty);
    }

    #[test]
    fn missing_region_emits_placeholder_and_continues() {
        let mut snapshot = snapshot_with_one_method();
        snapshot.runtime.methods_by_type.get_mut(&0xaa00).unwrap().insert(
            0,
            MethodRecord {
                metadata_token: 0x0600_0002,
                full_signature: "Script.Program.Stub()".into(),
                declaring_type: Some(0xaa00),
                hot_cold: CodeRegion::default(),
            },
        );

        let out = dump(snapshot, "Script");

        let stub = out.find("Script.Program.Stub()").unwrap();
        let marker = out.find("    ; Failed to find HotColdInfo").unwrap();
        assert!(stub < marker);
        // The next method still gets disassembled
        assert!(out.contains("L0000: nop"));
    }

    #[test]
    fn memory_read_failure_degrades_inline() {
        let mut snapshot = snapshot_with_one_method();
        // First method's region is unmapped; a second method after it
        // still has readable memory.
        snapshot.memory.clear();
        snapshot.memory.insert(0x3000, vec![0x00, 0x00]);
        snapshot.runtime.methods_by_type.get_mut(&0xaa00).unwrap().push(
            MethodRecord {
                metadata_token: 0x0600_0003,
                full_signature: "Script.Program.After()".into(),
                declaring_type: Some(0xaa00),
                hot_cold: CodeRegion { hot_start: 0x3000, hot_size: 2 },
            },
        );

        let out = dump(snapshot, "Script");

        assert!(out.contains("Failed to read 3 bytes"));
        assert!(out.contains("Script.Program.Run(System.String)"));
        // Later methods are not suppressed by the failure
        assert!(out.contains("Script.Program.After()"));
        assert!(out.contains("0x00000000`00003000:    L0000: nop"));
        assert!(out.contains("0x00000000`00003001:    L0001: nop"));
    }

    #[test]
    fn last_module_with_prefix_wins() {
        let mut snapshot = snapshot_with_one_method();
        // A stale copy of the module, loaded earlier, with its own type
        snapshot
            .runtime
            .modules
            .insert(0, script_module(0x20000));
        snapshot.runtime.types_by_module.insert(
            0x20000,
            vec![TypeRecord { name: "Script.Stale".into(), method_table: 0xbb00 }],
        );

        let out = dump(snapshot, "Script");

        assert!(out.contains("; Type Script.Program"));
        assert!(!out.contains("; Type Script.Stale"));
    }

    #[test]
    fn missing_module_is_reported_inline() {
        let out = dump(snapshot_with_one_method(), "Other");
        assert!(out.contains("; No module matching 'Other' found"));
    }

    #[test]
    fn attach_failure_propagates() {
        let inspector = FakeInspector { snapshot: None };
        let pipeline = NativeDisassemblyPipeline::new(
            &inspector,
            &FakeDecoder,
            &NoNatives,
            1234,
            Duration::from_millis(5000),
        );

        let err = pipeline.dump("Script").unwrap_err();
        assert!(matches!(err, AttachError::AttachFailed { pid: 1234, .. }));
    }
}
