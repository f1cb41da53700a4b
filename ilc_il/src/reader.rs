//! IL decoding and in-place token rewriting.

use crate::opcode::{ILOpcode, OperandKind, TWO_BYTE_PREFIX};
use crate::token::Token;
use std::fmt;

// =============================================================================
// Errors
// =============================================================================

/// Malformed IL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ILReadError {
    /// The stream ended inside an instruction.
    UnexpectedEnd { offset: u32 },
    /// Unknown or unsupported opcode.
    InvalidOpcode { offset: u32, value: u16 },
}

impl fmt::Display for ILReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ILReadError::UnexpectedEnd { offset } => {
                write!(f, "IL stream ends inside the instruction at IL_{:04x}", offset)
            }
            ILReadError::InvalidOpcode { offset, value } => {
                write!(f, "invalid opcode 0x{:x} at IL_{:04x}", value, offset)
            }
        }
    }
}

impl std::error::Error for ILReadError {}

// =============================================================================
// Instructions
// =============================================================================

/// Decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Argument or local index.
    Var(u16),
    Int(i64),
    /// Absolute branch target offset.
    Target(u32),
    Token(Token),
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: ILOpcode,
    pub operand: Operand,
    /// Offset of the following instruction.
    pub next_offset: u32,
}

impl Instruction {
    /// Argument or local index, including the implicit index of short forms
    /// such as `ldloc.2`.
    pub fn var_index(&self) -> Option<u16> {
        use ILOpcode::*;
        match self.opcode {
            Ldarg0 | Ldloc0 | Stloc0 => Some(0),
            Ldarg1 | Ldloc1 | Stloc1 => Some(1),
            Ldarg2 | Ldloc2 | Stloc2 => Some(2),
            Ldarg3 | Ldloc3 | Stloc3 => Some(3),
            _ => match self.operand {
                Operand::Var(index) => Some(index),
                _ => None,
            },
        }
    }

    /// Integer constant pushed by an `ldc.*` instruction.
    pub fn int_constant(&self) -> Option<i64> {
        use ILOpcode::*;
        match self.opcode {
            LdcI4M1 => Some(-1),
            LdcI4_0 => Some(0),
            LdcI4_1 => Some(1),
            LdcI4_2 => Some(2),
            LdcI4_3 => Some(3),
            LdcI4_4 => Some(4),
            LdcI4_5 => Some(5),
            LdcI4_6 => Some(6),
            LdcI4_7 => Some(7),
            LdcI4_8 => Some(8),
            LdcI4S | LdcI4 | LdcI8 => match self.operand {
                Operand::Int(value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Sequential IL decoder.
#[derive(Debug, Clone)]
pub struct ILReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ILReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Reader positioned at `offset`.
    pub fn at(bytes: &'a [u8], offset: u32) -> Self {
        Self {
            bytes,
            offset: offset as usize,
        }
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset as u32
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.offset < self.bytes.len()
    }

    fn take<const N: usize>(&mut self, start: u32) -> Result<[u8; N], ILReadError> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(ILReadError::UnexpectedEnd { offset: start })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Ok(out)
    }

    /// Decode the next instruction, or `None` at the end of the stream.
    pub fn next_instruction(&mut self) -> Result<Option<Instruction>, ILReadError> {
        if !self.has_next() {
            return Ok(None);
        }
        let start = self.offset();

        let [first] = self.take::<1>(start)?;
        let value = if first == TWO_BYTE_PREFIX {
            let [second] = self.take::<1>(start)?;
            0xFE00 | u16::from(second)
        } else {
            u16::from(first)
        };
        let opcode = ILOpcode::from_u16(value).ok_or(ILReadError::InvalidOpcode { offset: start, value })?;

        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::ShortVar => Operand::Var(u16::from(self.take::<1>(start)?[0])),
            OperandKind::Var => Operand::Var(u16::from_le_bytes(self.take::<2>(start)?)),
            OperandKind::ShortI => Operand::Int(i64::from(self.take::<1>(start)?[0] as i8)),
            OperandKind::I => Operand::Int(i64::from(i32::from_le_bytes(self.take::<4>(start)?))),
            OperandKind::I8 => Operand::Int(i64::from_le_bytes(self.take::<8>(start)?)),
            OperandKind::ShortBranch => {
                let delta = i64::from(self.take::<1>(start)?[0] as i8);
                Operand::Target((i64::from(self.offset()) + delta) as u32)
            }
            OperandKind::Branch => {
                let delta = i64::from(i32::from_le_bytes(self.take::<4>(start)?));
                Operand::Target((i64::from(self.offset()) + delta) as u32)
            }
            OperandKind::Token => Operand::Token(Token(u32::from_le_bytes(self.take::<4>(start)?))),
        };

        Ok(Some(Instruction {
            offset: start,
            opcode,
            operand,
            next_offset: self.offset(),
        }))
    }

    /// Decode the whole stream.
    pub fn read_all(bytes: &[u8]) -> Result<Vec<Instruction>, ILReadError> {
        let mut reader = ILReader::new(bytes);
        let mut out = Vec::new();
        while let Some(instruction) = reader.next_instruction()? {
            out.push(instruction);
        }
        Ok(out)
    }
}

/// Rewrite every token operand in `bytes` through `map`.
///
/// Returns `Ok(false)` and stops at the first token `map` cannot translate;
/// the bytes are then partially rewritten and must be discarded.
pub fn replace_tokens<F>(bytes: &mut [u8], mut map: F) -> Result<bool, ILReadError>
where
    F: FnMut(Token) -> Option<Token>,
{
    let mut offset = 0u32;
    while (offset as usize) < bytes.len() {
        let instruction = match ILReader::at(bytes, offset).next_instruction()? {
            Some(instruction) => instruction,
            None => break,
        };
        if let Operand::Token(token) = instruction.operand {
            let Some(replacement) = map(token) else {
                return Ok(false);
            };
            let at = (instruction.next_offset - 4) as usize;
            bytes[at..at + 4].copy_from_slice(&replacement.0.to_le_bytes());
        }
        offset = instruction.next_offset;
    }
    Ok(true)
}
