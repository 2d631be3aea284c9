//! Bytecode Trèfle : opcodes à largeur embarquée, conteneur et désassembleur.
//!
//! Chaque mot d'opcode vaut `(id << 8) | largeur`, la largeur comptant l'opcode et ses
//! opérandes. Un flux peut donc être parcouru sans table de longueurs annexe.

/// Table des opcodes.
pub mod opcode;
/// Conteneur `Bytecode` (instructions + positions + nombre de slots locaux).
pub mod chunk;
/// Désassemblage textuel (diagnostic uniquement).
pub mod disasm;

pub use chunk::{Bytecode, Instruction, Instructions};
pub use opcode::OpCode;
