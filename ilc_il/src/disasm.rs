//! Textual listing of method bodies.
//!
//! ```text
//! // [task-returning] App.Program.RunAsync
//! .maxstack 2
//! .locals (System.Threading.Tasks.Task, System.Runtime.CompilerServices.ExecutionAndSyncBlockStore)
//! .try IL_0007 to IL_0021 catch System.Exception handler IL_0021 to IL_002e
//! IL_0000: ldloca.s 1
//! IL_0002: call System.Runtime.CompilerServices.ExecutionAndSyncBlockStore.Push
//! ```

use crate::method_il::{ExceptionRegionKind, MethodIL};
use crate::reader::{ILReadError, ILReader, Operand};
use std::fmt::Write;

/// Render `il` as assembler text.
pub fn disassemble(il: &MethodIL) -> Result<String, ILReadError> {
    let mut out = String::new();
    let _ = writeln!(out, "// {}", il.owning_method());
    let _ = writeln!(out, ".maxstack {}", il.max_stack());

    if !il.locals().is_empty() {
        let locals: Vec<String> = il.locals().iter().map(|l| l.to_string()).collect();
        let _ = writeln!(out, ".locals ({})", locals.join(", "));
    }

    for region in il.exception_regions() {
        let handler = match region.kind {
            ExceptionRegionKind::Finally => "finally".to_string(),
            ExceptionRegionKind::Catch => match region.class_token.and_then(|t| il.get_object(t)) {
                Some(object) => format!("catch {}", object),
                None => "catch <unresolved>".to_string(),
            },
        };
        let _ = writeln!(
            out,
            ".try IL_{:04x} to IL_{:04x} {} handler IL_{:04x} to IL_{:04x}",
            region.try_offset,
            region.try_offset + region.try_length,
            handler,
            region.handler_offset,
            region.handler_end()
        );
    }

    let mut reader = ILReader::new(il.il_bytes());
    while let Some(instruction) = reader.next_instruction()? {
        let _ = write!(out, "IL_{:04x}: {}", instruction.offset, instruction.opcode);
        match instruction.operand {
            Operand::None => {}
            Operand::Var(index) => {
                let _ = write!(out, " {}", index);
            }
            Operand::Int(value) => {
                let _ = write!(out, " {}", value);
            }
            Operand::Target(target) => {
                let _ = write!(out, " IL_{:04x}", target);
            }
            Operand::Token(token) => match il.get_object(token) {
                Some(object) => {
                    let _ = write!(out, " {}", object);
                }
                None => {
                    let _ = write!(out, " {}", token);
                }
            },
        }
        out.push('\n');
    }
    Ok(out)
}
