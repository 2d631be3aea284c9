//! Valeurs appelables : gabarits, closures, natives, méthodes liées.

use std::{collections::BTreeMap, fmt, io::Write, rc::Rc};

use trefle_core::Bytecode;

use crate::{
    class::Instance,
    error::{RResult, RuntimeError},
    object::Object,
};

/// Capacité de rappel vers la machine, offerte aux natives.
///
/// Implémentée par la VM ; permet à une native d'appeler une valeur Trèfle
/// (constructeurs) et d'écrire sur la sortie de la machine.
pub trait VmHandle {
    /// Appelle `callee` avec `args` et exécute jusqu'à son retour.
    fn call(&mut self, callee: &Object, args: Vec<Object>) -> RResult<Object>;
    /// Sortie standard de la machine.
    fn stdout(&mut self) -> &mut dyn Write;
}

/// Corps d'une fonction native.
pub type NativeFn = Rc<dyn Fn(&mut dyn VmHandle, Vec<Object>) -> RResult<Object>>;

/// Gabarit compilé d'une fonction.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    /// Nombre de paramètres déclarés.
    pub parameter_count: usize,
    /// Corps ; `bytecode.local_count` couvre paramètres, locaux et variables libres.
    pub bytecode: Bytecode,
}

impl ScriptFunction {
    /// Construit un gabarit.
    pub const fn new(parameter_count: usize, bytecode: Bytecode) -> Self {
        Self { parameter_count, bytecode }
    }
}

/// Fonction instanciée à l'exécution.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Gabarit.
    pub function: Rc<ScriptFunction>,
    /// Une valeur par paramètre (`null` si pas de défaut).
    pub defaults: Vec<Object>,
    /// Slot local → index du pool de variables capturé.
    pub free_variables: BTreeMap<usize, usize>,
}

impl Closure {
    /// Index du pool capturé pour `slot`, s'il s'agit d'une variable libre.
    pub fn captured(&self, slot: usize) -> Option<usize> {
        self.free_variables.get(&slot).copied()
    }
}

/// Fonction fournie par l'hôte.
pub struct NativeFunction {
    /// Nom (affichage, traces).
    pub name: String,
    /// Nombre d'arguments exact ; `None` pour variadique.
    pub arity: Option<usize>,
    /// Corps.
    pub func: NativeFn,
}

impl NativeFunction {
    /// Appelle la native ; `Arity` si le nombre d'arguments ne convient pas.
    pub fn invoke(&self, vm: &mut dyn VmHandle, args: Vec<Object>) -> RResult<Object> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(RuntimeError::Arity { expected, got: args.len() });
            }
        }
        (self.func)(vm, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).field("arity", &self.arity).finish()
    }
}

/// Raccourci de construction d'une native.
pub fn native<F>(name: impl Into<String>, arity: Option<usize>, func: F) -> Object
where
    F: Fn(&mut dyn VmHandle, Vec<Object>) -> RResult<Object> + 'static,
{
    Object::NativeFunction(Rc::new(NativeFunction { name: name.into(), arity, func: Rc::new(func) }))
}

/// Closure liée à une instance : `this` vaut `receiver` pendant l'appel.
#[derive(Debug, Clone)]
pub struct MemberFunction {
    /// Fonction.
    pub closure: Rc<Closure>,
    /// Instance liée.
    pub receiver: Rc<Instance>,
}
