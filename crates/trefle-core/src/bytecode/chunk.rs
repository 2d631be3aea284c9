//! Instruction stream with a parallel source-position table.

use crate::{bytecode::OpCode, Position};

/// Compiled body of one function (or of the top-level program).
///
/// `instructions` and `positions` always have the same length: operands repeat the
/// position of their opcode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytecode {
    instructions: Vec<i32>,
    positions: Vec<Position>,
    /// Number of local slots (parameters, locals, captured free variables).
    pub local_count: usize,
}

/// One decoded instruction, borrowed from a [`Bytecode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Offset of the opcode word.
    pub offset: usize,
    /// Decoded opcode, `None` when the word is not a known opcode.
    pub op: Option<OpCode>,
    /// Raw opcode word.
    pub word: i32,
    /// Operand words.
    pub operands: &'a [i32],
}

impl Bytecode {
    /// Empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True when no word has been emitted.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Raw words.
    pub fn instructions(&self) -> &[i32] {
        &self.instructions
    }

    /// Position table (one entry per word).
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Word at `offset`.
    pub fn word(&self, offset: usize) -> Option<i32> {
        self.instructions.get(offset).copied()
    }

    /// Source position of the word at `offset`.
    pub fn position(&self, offset: usize) -> Option<&Position> {
        self.positions.get(offset)
    }

    /// Appends `op` and its operands, returns the offset of the opcode word.
    pub fn add(&mut self, op: OpCode, operands: &[i32], position: &Position) -> usize {
        debug_assert_eq!(operands.len(), op.operand_count(), "bad operand count for {op}");
        let at = self.instructions.len();
        self.instructions.push(op.word());
        self.instructions.extend_from_slice(operands);
        for _ in 0..op.width() {
            self.positions.push(position.clone());
        }
        at
    }

    /// Inserts a raw word at `at`, shifting what follows.
    ///
    /// Jump targets are not adjusted; use [`Bytecode::reposition`] afterwards.
    pub fn insert(&mut self, at: usize, word: i32, position: &Position) {
        self.instructions.insert(at, word);
        self.positions.insert(at, position.clone());
    }

    /// Overwrites the word at `at` (jump patching).
    pub fn patch(&mut self, at: usize, value: i32) {
        self.instructions[at] = value;
    }

    /// Offset of the last whole instruction.
    pub fn last_instruction_offset(&self) -> Option<usize> {
        let mut last = None;
        let mut at = 0;
        while at < self.instructions.len() {
            last = Some(at);
            at += step(self.instructions[at]);
        }
        last
    }

    /// Opcode of the last instruction.
    pub fn last_opcode(&self) -> Option<OpCode> {
        self.last_instruction_offset()
            .and_then(|at| OpCode::decode(self.instructions[at]))
    }

    /// Removes the last whole instruction and returns its opcode.
    pub fn pop_last(&mut self) -> Option<OpCode> {
        let at = self.last_instruction_offset()?;
        let op = OpCode::decode(self.instructions[at]);
        self.instructions.truncate(at);
        self.positions.truncate(at);
        op
    }

    /// Adds `offset` to every absolute jump target found from `start` on.
    ///
    /// `start` must sit on an instruction boundary.
    pub fn reposition(&mut self, start: usize, offset: i32) {
        let mut at = start;
        while at < self.instructions.len() {
            let word = self.instructions[at];
            if OpCode::decode(word).is_some_and(OpCode::is_jump) && at + 1 < self.instructions.len() {
                self.instructions[at + 1] += offset;
            }
            at += step(word);
        }
    }

    /// Walks the stream instruction by instruction.
    pub fn iter(&self) -> Instructions<'_> {
        Instructions { code: &self.instructions, at: 0 }
    }
}

/// Width of the instruction starting with `word`; unknown words advance by one.
fn step(word: i32) -> usize {
    OpCode::decode(word).map_or(1, OpCode::width)
}

/// Iterator returned by [`Bytecode::iter`].
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    code: &'a [i32],
    at: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let word = *self.code.get(self.at)?;
        let op = OpCode::decode(word);
        let end = (self.at + step(word)).min(self.code.len());
        let item = Instruction { offset: self.at, op, word, operands: &self.code[self.at + 1..end] };
        self.at += step(word);
        Some(item)
    }
}

impl<'a> IntoIterator for &'a Bytecode {
    type Item = Instruction<'a>;
    type IntoIter = Instructions<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
