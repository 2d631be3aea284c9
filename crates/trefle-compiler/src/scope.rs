//! Résolution des portées.
//!
//! Arène de nœuds reliés à leur parent :
//! - `Frame` : une fonction (ou le programme). Alloue les slots et liste les variables libres.
//!   Sert aussi de bloc racine de la fonction.
//! - `Block` : corps de `if`/`while`, noms visibles jusqu'au `pop`.
//! - `Class` : valeurs des membres d'une classe. Transparent pour les locaux, mais aucune
//!   capture ne le traverse.

use std::collections::BTreeMap;

use thiserror::Error;

/// Identifiant d'un nœud de l'arène.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

/// Variable résolue : slot dans la frame qui la possède.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// Slot (relatif à la frame).
    pub index: usize,
    /// Frame propriétaire.
    pub frame: ScopeId,
}

/// Erreurs de déclaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Nom déjà déclaré dans ce bloc.
    #[error("`{0}` is already defined in this scope")]
    Duplicate(String),
}

#[derive(Debug)]
enum ScopeKind {
    Block,
    Frame { slots: usize, free_variables: Vec<(usize, usize)> },
    Class,
}

#[derive(Debug)]
struct ScopeNode {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    names: BTreeMap<String, Symbol>,
}

/// Arène de portées + nœud courant.
#[derive(Debug)]
pub struct Scopes {
    nodes: Vec<ScopeNode>,
    current: ScopeId,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// Arène avec une frame racine (le programme).
    pub fn new() -> Self {
        let root = ScopeNode {
            kind: ScopeKind::Frame { slots: 0, free_variables: Vec::new() },
            parent: None,
            names: BTreeMap::new(),
        };
        Self { nodes: vec![root], current: ScopeId(0) }
    }

    /// Nœud courant.
    pub const fn current(&self) -> ScopeId {
        self.current
    }

    fn push(&mut self, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode { kind, parent: Some(self.current), names: BTreeMap::new() });
        self.current = id;
        id
    }

    /// Ouvre un bloc.
    pub fn push_block(&mut self) -> ScopeId {
        self.push(ScopeKind::Block)
    }

    /// Ouvre une frame (corps de fonction).
    pub fn push_frame(&mut self) -> ScopeId {
        self.push(ScopeKind::Frame { slots: 0, free_variables: Vec::new() })
    }

    /// Ouvre une portée de classe.
    pub fn push_class(&mut self) -> ScopeId {
        self.push(ScopeKind::Class)
    }

    /// Referme le nœud courant. La racine reste en place.
    pub fn pop(&mut self) {
        if let Some(parent) = self.nodes[self.current.0].parent {
            self.current = parent;
        }
    }

    fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    /// Frame qui contient `id` (lui-même s'il en est une).
    pub fn frame_of(&self, id: ScopeId) -> ScopeId {
        let mut at = id;
        loop {
            let node = self.node(at);
            match (&node.kind, node.parent) {
                (ScopeKind::Frame { .. }, _) | (_, None) => return at,
                (_, Some(parent)) => at = parent,
            }
        }
    }

    /// Frame courante.
    pub fn current_frame(&self) -> ScopeId {
        self.frame_of(self.current)
    }

    fn allocate_slot(&mut self, frame: ScopeId) -> usize {
        match &mut self.nodes[frame.0].kind {
            ScopeKind::Frame { slots, .. } => {
                *slots += 1;
                *slots - 1
            },
            _ => unreachable!("slots are only allocated in frames"),
        }
    }

    /// Déclare `name` dans le bloc courant (une classe déclare dans le bloc qui l'entoure).
    pub fn define_local(&mut self, name: &str) -> Result<Symbol, ScopeError> {
        let mut owner = self.current;
        while let (ScopeKind::Class, Some(parent)) = (&self.node(owner).kind, self.node(owner).parent) {
            owner = parent;
        }
        if self.node(owner).names.contains_key(name) {
            return Err(ScopeError::Duplicate(name.to_owned()));
        }
        let frame = self.frame_of(owner);
        let symbol = Symbol { index: self.allocate_slot(frame), frame };
        self.nodes[owner.0].names.insert(name.to_owned(), symbol);
        Ok(symbol)
    }

    /// Cherche `name` du nœud courant jusqu'à la frame courante incluse.
    pub fn find_local(&self, name: &str) -> Option<Symbol> {
        let mut at = self.current;
        loop {
            let node = self.node(at);
            if let Some(symbol) = node.names.get(name) {
                return Some(*symbol);
            }
            match (&node.kind, node.parent) {
                (ScopeKind::Frame { .. }, _) | (_, None) => return None,
                (_, Some(parent)) => at = parent,
            }
        }
    }

    /// Cherche `name` dans la frame immédiatement englobante de `frame`.
    ///
    /// `None` si une classe sépare les deux frames, ou si `frame` est la racine.
    pub fn find_outer(&self, frame: ScopeId, name: &str) -> Option<Symbol> {
        let mut at = self.node(frame).parent?;
        loop {
            let node = self.node(at);
            match node.kind {
                ScopeKind::Class => return None,
                _ => {
                    if let Some(symbol) = node.names.get(name) {
                        return Some(*symbol);
                    }
                },
            }
            match (&node.kind, node.parent) {
                (ScopeKind::Frame { .. }, _) | (_, None) => return None,
                (_, Some(parent)) => at = parent,
            }
        }
    }

    /// Frame immédiatement englobante de `frame`, sauf si une classe les sépare.
    pub fn enclosing_frame(&self, frame: ScopeId) -> Option<ScopeId> {
        let mut at = self.node(frame).parent?;
        loop {
            let node = self.node(at);
            match node.kind {
                ScopeKind::Class => return None,
                ScopeKind::Frame { .. } => return Some(at),
                ScopeKind::Block => at = node.parent?,
            }
        }
    }

    /// Nouveau slot de `frame` lié à `outer` (slot de la frame englobante).
    pub fn define_free(&mut self, frame: ScopeId, name: &str, outer: Symbol) -> Symbol {
        let index = self.allocate_slot(frame);
        if let ScopeKind::Frame { free_variables, .. } = &mut self.nodes[frame.0].kind {
            free_variables.push((outer.index, index));
        }
        let symbol = Symbol { index, frame };
        self.nodes[frame.0].names.insert(name.to_owned(), symbol);
        symbol
    }

    /// Paires `(slot parent, slot local)` des variables capturées par `frame`.
    pub fn free_variables(&self, frame: ScopeId) -> &[(usize, usize)] {
        match &self.node(frame).kind {
            ScopeKind::Frame { free_variables, .. } => free_variables,
            _ => &[],
        }
    }

    /// Nombre total de slots de `frame`.
    pub fn local_count(&self, frame: ScopeId) -> usize {
        match self.node(frame).kind {
            ScopeKind::Frame { slots, .. } => slots,
            _ => 0,
        }
    }

    /// Vrai si une portée de classe englobe le nœud courant.
    pub fn in_class(&self) -> bool {
        let mut at = Some(self.current);
        while let Some(id) = at {
            let node = self.node(id);
            if matches!(node.kind, ScopeKind::Class) {
                return true;
            }
            at = node.parent;
        }
        false
    }
}
