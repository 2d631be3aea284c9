//! Textual disassembly, one instruction per line. Diagnostic only, not a stable format.

use core::fmt::Write;

use crate::bytecode::{Bytecode, Instruction};

/// `offset | line | MNEMONIC (0xWORD) operands…`
pub fn disassemble(bytecode: &Bytecode) -> String {
    disassemble_with(bytecode, |_| None)
}

/// Same as [`disassemble`], with an optional `;; comment` per instruction
/// (the compiler uses it to preview constants).
pub fn disassemble_with(
    bytecode: &Bytecode,
    annotate: impl Fn(&Instruction<'_>) -> Option<String>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, ";; locals: {}", bytecode.local_count);
    for ins in bytecode {
        let line = bytecode.position(ins.offset).map_or(0, |p| p.line);
        let name = ins.op.map_or("???", |op| op.name());
        let _ = write!(out, "{:04} | {:4} | {:<14} (0x{:06X})", ins.offset, line, name, ins.word);
        for operand in ins.operands {
            let _ = write!(out, " {operand}");
        }
        if let Some(note) = annotate(&ins) {
            let _ = write!(out, " ;; {note}");
        }
        out.push('\n');
    }
    out
}
