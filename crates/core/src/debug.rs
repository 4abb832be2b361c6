//! Chunk disassembler
//!
//! Renders bytecode one instruction per line for `tracing` output and for
//! tests that assert on emitted code.

use std::fmt::Write as _;

use crate::chunk::{Chunk, OpCode};

/// Render a whole chunk with a header line.
pub fn disassemble(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset, &mut out);
    }
    out
}

/// Render the instruction at `offset`, returning the next offset.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let _ = write!(out, "{:04} ", offset);
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{:4} ", chunk.line(offset));
    }

    let byte = chunk.code()[offset];
    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(byte) => {
            let _ = writeln!(out, "<bad opcode {:#04x}>", byte);
            return offset + 1;
        }
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::DefineGlobal
        | OpCode::DelGlobal => constant_instruction(chunk, op, offset, 1, out),
        OpCode::ConstantLong
        | OpCode::GetGlobalLong
        | OpCode::SetGlobalLong
        | OpCode::DefineGlobalLong
        | OpCode::DelGlobalLong => constant_instruction(chunk, op, offset, 3, out),
        OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => {
            let operand = chunk.code()[offset + 1];
            let _ = writeln!(out, "{:<16} {:4}", format!("{:?}", op), operand);
            offset + 2
        }
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, offset, 1, out),
        OpCode::Loop => jump_instruction(chunk, op, offset, -1, out),
        OpCode::LoopLong => {
            let code = chunk.code();
            let operand = u32::from_le_bytes([
                code[offset + 1],
                code[offset + 2],
                code[offset + 3],
                0,
            ]) as usize;
            let _ = writeln!(
                out,
                "{:<16} {:4} -> {}",
                "LoopLong",
                offset,
                offset + 4 - operand
            );
            offset + 4
        }
        _ => {
            let _ = writeln!(out, "{:?}", op);
            offset + 1
        }
    }
}

fn constant_instruction(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    operand_bytes: usize,
    out: &mut String,
) -> usize {
    let code = chunk.code();
    let index = if operand_bytes == 1 {
        code[offset + 1] as usize
    } else {
        u32::from_le_bytes([code[offset + 1], code[offset + 2], code[offset + 3], 0]) as usize
    };
    let _ = writeln!(
        out,
        "{:<16} {:4} '{}'",
        format!("{:?}", op),
        index,
        chunk.constant(index)
    );
    offset + 1 + operand_bytes
}

fn jump_instruction(chunk: &Chunk, op: OpCode, offset: usize, sign: i64, out: &mut String) -> usize {
    let code = chunk.code();
    let operand = u16::from_le_bytes([code[offset + 1], code[offset + 2]]) as i64;
    let target = offset as i64 + 3 + sign * operand;
    let _ = writeln!(out, "{:<16} {:4} -> {}", format!("{:?}", op), offset, target);
    offset + 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::value::Object;

    #[test]
    fn test_disassemble_simple_chunk() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Rc::new(Object::Int(7)));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(idx as u8, 1);
        chunk.write_op(OpCode::Print, 1);
        chunk.write_op(OpCode::Return, 2);

        let text = disassemble(&chunk, "script");
        assert!(text.contains("== script =="));
        assert!(text.contains("Constant"));
        assert!(text.contains("'7'"));
        assert!(text.contains("Print"));
        assert!(text.contains("Return"));
    }
}
