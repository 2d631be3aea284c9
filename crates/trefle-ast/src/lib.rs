//! Trèfle AST (Abstract Syntax Tree)
//!
//! Structures passives produites par `trefle-parser` et lues par `trefle-compiler`.
//! Chaque expression porte la [`Position`] de son token de tête, utilisée pour attribuer
//! les erreurs de compilation et d'exécution.
//!
//! # Features
//! - `serde` : sérialisation/désérialisation de l'AST (dump JSON côté CLI)
//!
//! # Exemple
//! ```rust
//! use trefle_ast::{Expr, ExprKind, Literal, Program};
//! use trefle_core::Position;
//!
//! let pos = Position::new("demo.tf", 1);
//! let program = Program::new(vec![Expr::new(ExprKind::Literal(Literal::Integer(42)), pos)]);
//! assert_eq!(program.expressions.len(), 1);
//! ```

#![deny(missing_docs)]

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use trefle_core::Position;

/// Un bloc : suite ordonnée d'expressions (corps de programme, de fonction, de branche…).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Program {
    /// Expressions, dans l'ordre source.
    pub expressions: Vec<Expr>,
}

impl Program {
    /// Construit un bloc.
    pub fn new(expressions: Vec<Expr>) -> Self {
        Self { expressions }
    }

    /// Vrai si le bloc ne contient aucune expression.
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

/// Expression + position de son token de tête.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Expr {
    /// Forme de l'expression.
    pub kind: ExprKind,
    /// Fichier + ligne.
    pub position: Position,
}

impl Expr {
    /// Construit une expression.
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Self { kind, position }
    }

    /// Vrai si l'expression peut apparaître à gauche d'une affectation.
    pub fn is_assignable(&self) -> bool {
        matches!(self.kind, ExprKind::Identifier(_) | ExprKind::Member { .. })
    }
}

/// Formes d'expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExprKind {
    /// Référence à une variable.
    Identifier(String),
    /// Valeur littérale.
    Literal(Literal),
    /// `this`
    This,
    /// `base` (seul `base.nom` est compilable).
    Base,
    /// Opération unaire.
    Prefix {
        /// Opérateur.
        op: UnaryOp,
        /// Opérande.
        expr: Box<Expr>,
    },
    /// Opération binaire.
    Binary {
        /// Opérande gauche.
        left: Box<Expr>,
        /// Opérateur.
        op: BinaryOp,
        /// Opérande droite.
        right: Box<Expr>,
    },
    /// `cible = valeur` ou `cible op= valeur`.
    Assign {
        /// Identifiant ou accès membre.
        target: Box<Expr>,
        /// Opérateur composé (`+=` → `Some(Add)`).
        op: Option<BinaryOp>,
        /// Valeur affectée.
        value: Box<Expr>,
    },
    /// `local nom [= valeur]`
    Local {
        /// Nom déclaré.
        name: String,
        /// Valeur initiale.
        value: Option<Box<Expr>>,
    },
    /// Littéral de fonction.
    Function(Function),
    /// Appel.
    Call {
        /// Expression appelée.
        callee: Box<Expr>,
        /// Arguments, évalués de gauche à droite.
        args: Vec<Expr>,
    },
    /// `if (cond) … [else …] end`
    If {
        /// Condition.
        condition: Box<Expr>,
        /// Branche vraie.
        then_branch: Program,
        /// Branche fausse.
        else_branch: Option<Program>,
    },
    /// `while (cond) … end`
    While {
        /// Condition.
        condition: Box<Expr>,
        /// Corps.
        body: Program,
    },
    /// `return [valeur]`
    Return(Option<Box<Expr>>),
    /// `[a, b, …]`
    Array(Vec<Expr>),
    /// `{ clé: valeur, … }`
    Map(Vec<MapEntry>),
    /// `class [extends parent] membre = valeur … end`
    Class(Class),
    /// `cible.nom` ou `cible[clé]`
    Member {
        /// Objet accédé.
        target: Box<Expr>,
        /// Clé (littéral chaîne pour `.nom`).
        key: Box<Expr>,
    },
}

/// Valeurs littérales.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Literal {
    /// Entier.
    Integer(i64),
    /// Flottant.
    Float(f64),
    /// Chaîne.
    String(String),
    /// Booléen.
    Boolean(bool),
    /// `null`
    Null,
}

/// Littéral de fonction.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Function {
    /// Paramètres, dans l'ordre.
    pub params: Vec<Param>,
    /// Corps.
    pub body: Program,
}

/// Paramètre de fonction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Param {
    /// Nom.
    pub name: String,
    /// Valeur par défaut, évaluée à la création de la closure.
    pub default: Option<Expr>,
    /// Position du nom.
    pub position: Position,
}

/// Entrée d'un littéral de map.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapEntry {
    /// Clé.
    pub key: String,
    /// Valeur.
    pub value: Expr,
}

/// Littéral de classe.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Class {
    /// Classe parente.
    pub parent: Option<Box<Expr>>,
    /// Membres, dans l'ordre source.
    pub members: Vec<Member>,
}

/// Membre de classe `nom = valeur`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Member {
    /// Nom.
    pub name: String,
    /// Valeur (souvent une fonction).
    pub value: Expr,
    /// Position du nom.
    pub position: Position,
}

/// Opérateurs binaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `and`, `&&`, `&`
    And,
    /// `or`, `||`, `|`
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

/// Opérateurs unaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnaryOp {
    /// `-x`
    Negate,
    /// `not x`, `!x`
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negate => "-",
            Self::Not => "not",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(line: u32) -> Position {
        Position::new("ast.tf", line)
    }

    #[test]
    fn assignable_targets() {
        let id = Expr::new(ExprKind::Identifier("x".into()), at(1));
        let member = Expr::new(
            ExprKind::Member {
                target: Box::new(id.clone()),
                key: Box::new(Expr::new(ExprKind::Literal(Literal::String("y".into())), at(1))),
            },
            at(1),
        );
        let lit = Expr::new(ExprKind::Literal(Literal::Integer(1)), at(1));
        assert!(id.is_assignable());
        assert!(member.is_assignable());
        assert!(!lit.is_assignable());
    }

    #[test]
    fn operators_display() {
        assert_eq!(BinaryOp::LessEqual.to_string(), "<=");
        assert_eq!(UnaryOp::Not.to_string(), "not");
    }
}
