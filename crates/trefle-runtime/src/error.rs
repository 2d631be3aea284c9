//! Erreurs d'exécution, partagées par le modèle objet, les natives et la VM.

use thiserror::Error;

/// Erreurs levées par le modèle objet et la VM.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Opération binaire non supportée entre deux types.
    #[error("can not {op} {left} and {right}")]
    Unsupported {
        /// Opération (`add`, `compare`, …).
        op: &'static str,
        /// Type de gauche.
        left: &'static str,
        /// Type de droite.
        right: &'static str,
    },

    /// Opération unaire non supportée.
    #[error("can not apply `{op}` to {kind}")]
    UnsupportedUnary {
        /// Opérateur.
        op: &'static str,
        /// Type de l'opérande.
        kind: &'static str,
    },

    /// Valeur sans conversion booléenne.
    #[error("can not convert {0} to Boolean")]
    NotBoolean(&'static str),

    /// Mauvais nombre d'arguments.
    #[error("arity mismatch: expected {expected} argument(s), got {got}")]
    Arity {
        /// Arguments attendus.
        expected: usize,
        /// Arguments fournis.
        got: usize,
    },

    /// Appel d'une valeur qui n'est pas une fonction.
    #[error("{0} is not callable")]
    NotCallable(&'static str),

    /// Clé d'un type non supporté par la cible.
    #[error("can not index {target} with {key}")]
    KeyType {
        /// Type indexé.
        target: &'static str,
        /// Type de la clé.
        key: &'static str,
    },

    /// Membre absent.
    #[error("{target} has no member `{name}`")]
    MemberNotFound {
        /// Type ciblé.
        target: &'static str,
        /// Nom demandé.
        name: String,
    },

    /// `base` hors d'une méthode d'instance.
    #[error("`base` used outside of a class instance")]
    BaseOutsideInstance,

    /// Nom ni local, ni membre, ni global.
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    /// Écriture (ou retrait) hors des bornes d'un tableau.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// Index demandé.
        index: i64,
        /// Longueur du tableau.
        len: usize,
    },

    /// Division entière par zéro.
    #[error("division by zero")]
    DivisionByZero,

    /// Débordement entier.
    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    /// `extends` sur autre chose qu'une classe.
    #[error("can not extend {0}")]
    InvalidParent(&'static str),

    /// Bytecode incohérent (opcode inconnu, opérande hors bornes, pile vide).
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),

    /// Erreur libre levée par une native.
    #[error("{0}")]
    Native(String),
}

/// Résultat du runtime.
pub type RResult<T> = Result<T, RuntimeError>;
