//! Classes (héritage simple) et instances à matérialisation paresseuse.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::RuntimeError,
    function::{native, MemberFunction},
    object::Object,
};

/// Classe : table de membres ordonnée + parent optionnel.
#[derive(Debug, Default)]
pub struct ScriptClass {
    parent: Option<Rc<ScriptClass>>,
    members: IndexMap<String, Object>,
}

impl ScriptClass {
    /// Construit une classe.
    pub fn new(parent: Option<Rc<Self>>, members: IndexMap<String, Object>) -> Self {
        Self { parent, members }
    }

    /// Classe parente.
    pub fn parent(&self) -> Option<&Rc<Self>> {
        self.parent.as_ref()
    }

    /// Membres propres, dans l'ordre de déclaration.
    pub fn members(&self) -> &IndexMap<String, Object> {
        &self.members
    }

    /// Cherche `name` dans la classe puis dans la chaîne des parents.
    pub fn find_member(&self, name: &str) -> Option<Object> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(found) = current.members.get(name) {
                return Some(found.clone());
            }
            class = current.parent.as_deref();
        }
        None
    }

    /// Membre vu depuis la classe : `new` puis membres bruts.
    pub fn get(this: &Rc<Self>, name: &str) -> Option<Object> {
        if name == "new" {
            return Some(Self::constructor(this));
        }
        this.find_member(name)
    }

    /// Native variadique `Classe.new(args…)`.
    fn constructor(this: &Rc<Self>) -> Object {
        let class = Rc::clone(this);
        native("new", None, move |vm, args| {
            let instance = Rc::new(Instance::new(Rc::clone(&class)));
            match Instance::get(&instance, "constructor") {
                Some(constructor) => {
                    debug!(args = args.len(), "calling constructor");
                    vm.call(&constructor, args)?;
                },
                None if !args.is_empty() => {
                    return Err(RuntimeError::Arity { expected: 0, got: args.len() });
                },
                None => {},
            }
            Ok(Object::Instance(instance))
        })
    }
}

/// Instance : classe + table propre remplie à la demande.
pub struct Instance {
    class: Rc<ScriptClass>,
    members: RefCell<IndexMap<String, Object>>,
}

impl Instance {
    /// Instance vide de `class`.
    pub fn new(class: Rc<ScriptClass>) -> Self {
        Self { class, members: RefCell::new(IndexMap::new()) }
    }

    /// Classe de l'instance.
    pub fn class(&self) -> &Rc<ScriptClass> {
        &self.class
    }

    /// Lecture d'un membre ; la première lecture d'un membre de classe le copie
    /// dans la table de l'instance.
    pub fn get(this: &Rc<Self>, name: &str) -> Option<Object> {
        if let Some(own) = this.members.borrow().get(name) {
            return Some(own.clone());
        }
        let value = Self::bind(this, &this.class.find_member(name)?);
        this.members.borrow_mut().insert(name.to_owned(), value.clone());
        Some(value)
    }

    /// `base.name` : recherche à partir du parent de la classe, sans cache.
    pub fn base_get(this: &Rc<Self>, name: &str) -> Option<Object> {
        let value = this.class.parent()?.find_member(name)?;
        Some(Self::bind(this, &value))
    }

    /// Écrit dans la table de l'instance.
    pub fn set(&self, name: &str, value: Object) {
        self.members.borrow_mut().insert(name.to_owned(), value);
    }

    /// Vrai si `name` est déjà présent dans la table propre.
    pub fn has_own(&self, name: &str) -> bool {
        self.members.borrow().contains_key(name)
    }

    fn bind(this: &Rc<Self>, value: &Object) -> Object {
        match value {
            Object::Closure(closure) => Object::MemberFunction(Rc::new(MemberFunction {
                closure: Rc::clone(closure),
                receiver: Rc::clone(this),
            })),
            other => other.detached(),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // les méthodes liées pointent vers l'instance : on n'affiche que les clés
        f.debug_struct("Instance").field("members", &self.members.borrow().keys().collect::<Vec<_>>()).finish()
    }
}
