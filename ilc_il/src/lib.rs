//! IL for synthesized method bodies.
//!
//! This crate provides:
//! - The opcode subset used by stubs and the bodies they wrap
//! - A linked method body representation with exception regions
//! - An assembler with labels, locals, regions and a private token table
//! - A reader, token rewriter and disassembler
//! - A reference interpreter for checking generated control flow

pub mod disasm;
pub mod emitter;
pub mod interp;
pub mod method_il;
pub mod opcode;
pub mod reader;
pub mod token;

// Re-export commonly used items
pub use disasm::disassemble;
pub use emitter::{ILEmitter, ILLabel, ILLocal, ILRegion};
pub use interp::{CallOutcome, ExecutionHost, InterpError, Interpreter, Outcome, Value};
pub use method_il::{ExceptionRegion, ExceptionRegionKind, MethodIL};
pub use opcode::ILOpcode;
pub use reader::{ILReadError, ILReader, Instruction, Operand, replace_tokens};
pub use token::{LocalTokens, MappedTokens, Token, TokenObject, TokenResolver};
