//! Instruction decoding boundary
//!
//! The harness does not decode machine code itself; it consumes a decoder
//! through [`InstructionDecoder`]. The shipped implementation in
//! [`engine`] is backed by Capstone, but the pipeline only sees the
//! structured instruction model below.

pub mod engine;

use thiserror::Error;

use crate::runtime::Architecture;

pub use engine::DisasmEngine;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Capstone error: {0}")]
    Capstone(String),
    #[error("Unsupported architecture/mode")]
    UnsupportedArch,
}

impl From<capstone::Error> for DecodeError {
    fn from(err: capstone::Error) -> Self {
        DecodeError::Capstone(err.to_string())
    }
}

/// A far-pointer (`segment:offset`) branch operand.
///
/// Decoders express certain in-function branch operands this way, relative
/// to the function start rather than as absolute addresses; a far pointer
/// with a raw offset of exactly zero is the signal the symbol resolver keys
/// on for intra-method labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarPointer {
    /// Segment part; doubles as the in-function displacement
    pub segment: u64,
    /// Raw pointer offset part
    pub offset: u64,
}

/// The control-flow target of a decoded instruction, if it has one
#[derive(Debug, Clone, Copy)]
pub struct BranchOperand {
    /// Absolute target address
    pub target: u64,
    /// Far-pointer encoding of the operand, when the decoder used one
    pub far_pointer: Option<FarPointer>,
}

/// A single decoded instruction
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// Absolute address of the instruction
    pub address: u64,
    /// Raw instruction bytes
    pub bytes: Vec<u8>,
    /// Mnemonic text
    pub mnemonic: String,
    /// Operand text as rendered by the decoder
    pub operands: String,
    /// Instruction length in bytes
    pub length: usize,
    /// Call/jump target operand, if this is direct control flow
    pub branch: Option<BranchOperand>,
}

/// Decoder contract: turn a byte range into structured instructions.
pub trait InstructionDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        base_address: u64,
        arch: Architecture,
    ) -> Result<Vec<DecodedInstruction>, DecodeError>;
}
