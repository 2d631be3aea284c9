//! trefle-runtime — modèle objet de Trèfle
//!
//! Fournit :
//! - [`Object`] : valeur dynamique (nombres, chaînes, tableaux, maps, fonctions, classes…)
//!   et la table d'opérations de chaque variante (`add`, `less`, `get_member`…) ;
//! - [`ScriptFunction`], [`Closure`], [`NativeFunction`], [`MemberFunction`] ;
//! - [`ScriptClass`] / [`Instance`] (héritage simple, membres matérialisés à la demande) ;
//! - [`Context`] : bytecode + pool de constantes produit par `trefle-compiler` ;
//! - [`VmHandle`] : le contrat offert aux natives pour rappeler la machine.
//!
//! Ce crate **n'exécute pas** le bytecode (c'est le rôle de `trefle-vm`).
//!
//! # Exemple
//! ```rust
//! use trefle_runtime::{Object, RuntimeError};
//!
//! let sum = Object::Integer(2).add(&Object::Float(0.5)).unwrap();
//! assert_eq!(sum.to_string(), "2.5");
//!
//! let err = Object::Boolean(true).add(&Object::array(vec![])).unwrap_err();
//! assert_eq!(err, RuntimeError::Unsupported { op: "add", left: "Boolean", right: "Array" });
//! ```

#![deny(missing_docs)]

pub mod class;
pub mod collections;
pub mod context;
pub mod error;
pub mod function;
pub mod object;

pub use class::{Instance, ScriptClass};
pub use context::Context;
pub use error::{RResult, RuntimeError};
pub use function::{native, Closure, MemberFunction, NativeFn, NativeFunction, ScriptFunction, VmHandle};
pub use object::{ArrayRef, MapRef, Object};
