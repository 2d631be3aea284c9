//! Pool de variables : arène de cellules comptées par référence.
//!
//! Chaque slot de frame désigne une cellule du pool. Une closure qui capture une variable
//! ajoute une référence à la cellule, qui survit ainsi à la frame d'origine.

use trefle_runtime::Object;

/// Arène `values` / `refs` + liste des cellules libres.
#[derive(Debug, Default)]
pub struct VariablePool {
    values: Vec<Object>,
    refs: Vec<u32>,
    free: Vec<usize>,
}

impl VariablePool {
    /// Pool vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nouvelle cellule (compteur à 1), en réutilisant une cellule libre si possible.
    pub fn allocate(&mut self, value: Object) -> usize {
        if let Some(index) = self.free.pop() {
            self.values[index] = value;
            self.refs[index] = 1;
            return index;
        }
        self.values.push(value);
        self.refs.push(1);
        self.values.len() - 1
    }

    /// +1 sur le compteur de `index`.
    pub fn add_reference(&mut self, index: usize) {
        if let Some(count) = self.refs.get_mut(index) {
            *count += 1;
        }
    }

    /// -1 sur le compteur ; la cellule est libérée quand il atteint 0.
    pub fn release(&mut self, index: usize) {
        let Some(count) = self.refs.get_mut(index) else { return };
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.values[index] = Object::Null;
            self.free.push(index);
        }
    }

    /// Valeur de la cellule.
    pub fn get(&self, index: usize) -> Option<&Object> {
        self.values.get(index)
    }

    /// Remplace la valeur ; `false` si la cellule n'existe pas.
    pub fn set(&mut self, index: usize, value: Object) -> bool {
        match self.values.get_mut(index) {
            Some(cell) => {
                *cell = value;
                true
            },
            None => false,
        }
    }

    /// Nombre de cellules vivantes.
    pub fn live_count(&self) -> usize {
        self.refs.iter().filter(|&&count| count > 0).count()
    }

    /// Compteur de `index` (0 si libre ou inconnue).
    pub fn reference_count(&self, index: usize) -> u32 {
        self.refs.get(index).copied().unwrap_or(0)
    }
}
