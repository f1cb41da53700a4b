//! IL opcodes.
//!
//! Encodings follow ECMA-335 Partition III. One-byte opcodes are stored as
//! their byte value; two-byte opcodes as `0xFE00 | second_byte`.
//!
//! Only the subset of the instruction set used by synthesized stubs and the
//! authored bodies they wrap is modeled. The reader rejects anything else.

use std::fmt;

/// Prefix byte of two-byte opcodes.
pub const TWO_BYTE_PREFIX: u8 = 0xFE;

/// Operand encoding of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand.
    None,
    /// `u8` argument or local index.
    ShortVar,
    /// `u16` argument or local index.
    Var,
    /// `i8` immediate.
    ShortI,
    /// `i32` immediate.
    I,
    /// `i64` immediate.
    I8,
    /// `i8` branch displacement.
    ShortBranch,
    /// `i32` branch displacement.
    Branch,
    /// Metadata token (method, type, signature or string).
    Token,
}

impl OperandKind {
    /// Encoded operand size in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::ShortVar | OperandKind::ShortI | OperandKind::ShortBranch => 1,
            OperandKind::Var => 2,
            OperandKind::I | OperandKind::Branch | OperandKind::Token => 4,
            OperandKind::I8 => 8,
        }
    }
}

macro_rules! il_opcodes {
    ($( $variant:ident = $value:literal, $name:literal, $operand:ident; )*) => {
        /// An IL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum ILOpcode {
            $( $variant = $value, )*
        }

        impl ILOpcode {
            /// Decode from the encoded value.
            pub const fn from_u16(value: u16) -> Option<ILOpcode> {
                match value {
                    $( $value => Some(ILOpcode::$variant), )*
                    _ => None,
                }
            }

            /// Assembler mnemonic.
            pub const fn name(self) -> &'static str {
                match self {
                    $( ILOpcode::$variant => $name, )*
                }
            }

            /// Operand encoding.
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $( ILOpcode::$variant => OperandKind::$operand, )*
                }
            }
        }
    };
}

il_opcodes! {
    Nop = 0x00, "nop", None;
    Ldarg0 = 0x02, "ldarg.0", None;
    Ldarg1 = 0x03, "ldarg.1", None;
    Ldarg2 = 0x04, "ldarg.2", None;
    Ldarg3 = 0x05, "ldarg.3", None;
    Ldloc0 = 0x06, "ldloc.0", None;
    Ldloc1 = 0x07, "ldloc.1", None;
    Ldloc2 = 0x08, "ldloc.2", None;
    Ldloc3 = 0x09, "ldloc.3", None;
    Stloc0 = 0x0A, "stloc.0", None;
    Stloc1 = 0x0B, "stloc.1", None;
    Stloc2 = 0x0C, "stloc.2", None;
    Stloc3 = 0x0D, "stloc.3", None;
    LdargS = 0x0E, "ldarg.s", ShortVar;
    LdlocS = 0x11, "ldloc.s", ShortVar;
    LdlocaS = 0x12, "ldloca.s", ShortVar;
    StlocS = 0x13, "stloc.s", ShortVar;
    Ldnull = 0x14, "ldnull", None;
    LdcI4M1 = 0x15, "ldc.i4.m1", None;
    LdcI4_0 = 0x16, "ldc.i4.0", None;
    LdcI4_1 = 0x17, "ldc.i4.1", None;
    LdcI4_2 = 0x18, "ldc.i4.2", None;
    LdcI4_3 = 0x19, "ldc.i4.3", None;
    LdcI4_4 = 0x1A, "ldc.i4.4", None;
    LdcI4_5 = 0x1B, "ldc.i4.5", None;
    LdcI4_6 = 0x1C, "ldc.i4.6", None;
    LdcI4_7 = 0x1D, "ldc.i4.7", None;
    LdcI4_8 = 0x1E, "ldc.i4.8", None;
    LdcI4S = 0x1F, "ldc.i4.s", ShortI;
    LdcI4 = 0x20, "ldc.i4", I;
    LdcI8 = 0x21, "ldc.i8", I8;
    Dup = 0x25, "dup", None;
    Pop = 0x26, "pop", None;
    Call = 0x28, "call", Token;
    Calli = 0x29, "calli", Token;
    Ret = 0x2A, "ret", None;
    BrS = 0x2B, "br.s", ShortBranch;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch;
    Br = 0x38, "br", Branch;
    Brfalse = 0x39, "brfalse", Branch;
    Brtrue = 0x3A, "brtrue", Branch;
    Add = 0x58, "add", None;
    Callvirt = 0x6F, "callvirt", Token;
    Ldobj = 0x71, "ldobj", Token;
    Ldstr = 0x72, "ldstr", Token;
    Newobj = 0x73, "newobj", Token;
    Throw = 0x7A, "throw", None;
    Stobj = 0x81, "stobj", Token;
    Box = 0x8C, "box", Token;
    Ldtoken = 0xD0, "ldtoken", Token;
    ConvI = 0xD3, "conv.i", None;
    Endfinally = 0xDC, "endfinally", None;
    Leave = 0xDD, "leave", Branch;
    LeaveS = 0xDE, "leave.s", ShortBranch;
    ConvU = 0xE0, "conv.u", None;
    Ceq = 0xFE01, "ceq", None;
    Ldftn = 0xFE06, "ldftn", Token;
    Ldarg = 0xFE09, "ldarg", Var;
    Ldarga = 0xFE0A, "ldarga", Var;
    Ldloc = 0xFE0C, "ldloc", Var;
    Ldloca = 0xFE0D, "ldloca", Var;
    Stloc = 0xFE0E, "stloc", Var;
    Initobj = 0xFE15, "initobj", Token;
    Rethrow = 0xFE1A, "rethrow", None;
}

impl ILOpcode {
    /// Whether the opcode uses the `0xFE` prefix.
    #[inline]
    pub const fn is_two_byte(self) -> bool {
        (self as u16) > 0xFF
    }

    /// Encoded size of the opcode itself, excluding the operand.
    #[inline]
    pub const fn opcode_size(self) -> usize {
        if self.is_two_byte() { 2 } else { 1 }
    }

    /// Encoded size including the operand.
    #[inline]
    pub const fn total_size(self) -> usize {
        self.opcode_size() + self.operand_kind().size()
    }

    /// Whether control never falls through to the next instruction.
    pub const fn ends_block(self) -> bool {
        matches!(
            self,
            ILOpcode::Ret
                | ILOpcode::Br
                | ILOpcode::BrS
                | ILOpcode::Leave
                | ILOpcode::LeaveS
                | ILOpcode::Throw
                | ILOpcode::Rethrow
                | ILOpcode::Endfinally
        )
    }

    /// Whether the operand is a branch displacement.
    #[inline]
    pub const fn is_branch(self) -> bool {
        matches!(self.operand_kind(), OperandKind::Branch | OperandKind::ShortBranch)
    }

    /// Append the opcode bytes to `out`.
    pub fn encode(self, out: &mut Vec<u8>) {
        let value = self as u16;
        if self.is_two_byte() {
            out.push(TWO_BYTE_PREFIX);
            out.push(value as u8);
        } else {
            out.push(value as u8);
        }
    }
}

impl fmt::Display for ILOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
