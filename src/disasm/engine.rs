//! Disassembly engine using Capstone
//!
//! Decodes the hot region bytes of a JIT-compiled method into the decoder
//! model consumed by the pipeline. Branch targets are extracted here so the
//! symbol resolver never has to parse operand text.

use capstone::arch::x86::X86OperandType;
use capstone::arch::ArchOperand;
use capstone::prelude::*;

use super::{BranchOperand, DecodeError, DecodedInstruction, FarPointer, InstructionDecoder};
use crate::runtime::Architecture;

/// Capstone-backed implementation of [`InstructionDecoder`]
pub struct DisasmEngine;

impl DisasmEngine {
    pub fn new() -> Self {
        Self
    }

    fn build(arch: Architecture) -> Result<Capstone, DecodeError> {
        let mode = match arch {
            Architecture::X64 => capstone::arch::x86::ArchMode::Mode64,
            Architecture::X86 => capstone::arch::x86::ArchMode::Mode32,
        };

        let mut cs = Capstone::new().x86().mode(mode).detail(true).build()?;

        // Enable SKIPDATA to handle invalid bytes gracefully
        cs.set_skipdata(true)?;

        Ok(cs)
    }
}

impl Default for DisasmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionDecoder for DisasmEngine {
    fn decode(
        &self,
        bytes: &[u8],
        base_address: u64,
        arch: Architecture,
    ) -> Result<Vec<DecodedInstruction>, DecodeError> {
        let cs = Self::build(arch)?;
        let insns = cs.disasm_all(bytes, base_address)?;

        let result = insns
            .iter()
            .map(|insn| {
                let branch = branch_operand(&cs, insn);

                DecodedInstruction {
                    address: insn.address(),
                    bytes: insn.bytes().to_vec(),
                    mnemonic: insn.mnemonic().unwrap_or("???").to_string(),
                    operands: insn.op_str().unwrap_or("").to_string(),
                    length: insn.len(),
                    branch,
                }
            })
            .collect();

        Ok(result)
    }
}

/// Extract the control-flow target of a jump/call instruction, if it has a
/// direct one. Indirect targets (register or memory operands) yield `None`.
fn branch_operand(cs: &Capstone, insn: &capstone::Insn) -> Option<BranchOperand> {
    let detail = cs.insn_detail(insn).ok()?;

    let is_flow_control = detail.groups().iter().any(|g| {
        let g_u8: u8 = g.0;
        g_u8 == capstone::InsnGroupType::CS_GRP_JUMP as u8
            || g_u8 == capstone::InsnGroupType::CS_GRP_CALL as u8
    });
    if !is_flow_control {
        return None;
    }

    let immediates: Vec<u64> = detail
        .arch_detail()
        .operands()
        .iter()
        .filter_map(|op| match op {
            ArchOperand::X86Operand(x86) => match x86.op_type {
                X86OperandType::Imm(value) => Some(value as u64),
                _ => None,
            },
            _ => None,
        })
        .collect();

    match immediates.as_slice() {
        // Far jump/call: segment:offset pair
        [segment, offset] => Some(BranchOperand {
            target: *offset,
            far_pointer: Some(FarPointer {
                segment: *segment,
                offset: *offset,
            }),
        }),
        // Near direct branch: Capstone already resolved the absolute target
        [target] => Some(BranchOperand {
            target: *target,
            far_pointer: None,
        }),
        _ => None,
    }
}
