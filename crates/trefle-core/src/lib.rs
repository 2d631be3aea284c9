//! trefle-core — primitives partagées par toute la chaîne Trèfle
//!
//! Fournit :
//! - [`Position`] : fichier + ligne (1-based), attachée aux tokens, aux nœuds et à chaque mot de bytecode
//! - [`bytecode`] : table des opcodes ([`OpCode`]), conteneur [`Bytecode`], désassembleur
//!
//! Features :
//! - `serde` : derive (dé)sérialisation de [`Position`]

#![deny(missing_docs)]

use std::{fmt, rc::Rc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Conteneur de bytecode, opcodes et désassemblage.
pub mod bytecode;

pub use bytecode::{disasm::disassemble, disasm::disassemble_with, Bytecode, Instruction, OpCode};

/* ─────────────────────────── Positions ─────────────────────────── */

/// Position d'origine dans une source : nom de fichier + ligne (1-based).
///
/// Le nom de fichier est partagé (`Rc<str>`) : chaque mot de bytecode en porte une copie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// Nom logique de la source (chemin, `<repl>`, …).
    pub file: Rc<str>,
    /// Ligne, à partir de 1.
    pub line: u32,
}

impl Position {
    /// Construit une position.
    pub fn new(file: impl Into<Rc<str>>, line: u32) -> Self {
        Self { file: file.into(), line }
    }

    /// Même fichier, autre ligne (pas de réallocation du nom).
    #[must_use]
    pub fn with_line(&self, line: u32) -> Self {
        Self { file: Rc::clone(&self.file), line }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new("<unknown>", 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
