//! Résultat de la compilation : bytecode de haut niveau + pool de constantes.

use trefle_core::{disassemble_with, Bytecode, OpCode};

use crate::object::Object;

/// Programme compilé, prêt à être chargé dans une VM.
///
/// Les indices de constantes sont stables : une constante ajoutée n'est jamais déplacée.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Code du programme principal.
    pub bytecode: Bytecode,
    /// Pool de constantes partagé par toutes les fonctions du programme.
    pub constants: Vec<Object>,
}

impl Context {
    /// Contexte vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute une constante et renvoie son indice.
    ///
    /// Les primitifs sont dédupliqués par valeur, les autres objets par identité.
    pub fn add_constant(&mut self, value: Object) -> usize {
        if let Some(found) = self.constants.iter().position(|c| c.same_constant(&value)) {
            return found;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Constante d'indice `index`.
    pub fn constant(&self, index: usize) -> Option<&Object> {
        self.constants.get(index)
    }

    /// Désassemblage lisible du programme et de chaque fonction, constantes annotées.
    pub fn dump(&self) -> String {
        let mut out = String::from(";; main\n");
        out.push_str(&self.annotated(&self.bytecode));
        for (index, constant) in self.constants.iter().enumerate() {
            if let Object::ScriptFunction(function) = constant {
                out.push_str(&format!("\n;; function #{index} ({} parameter(s))\n", function.parameter_count));
                out.push_str(&self.annotated(&function.bytecode));
            }
        }
        out
    }

    fn annotated(&self, bytecode: &Bytecode) -> String {
        disassemble_with(bytecode, |instruction| match instruction.op? {
            OpCode::Constant | OpCode::Closure => {
                let index = usize::try_from(*instruction.operands.first()?).ok()?;
                self.constant(index).map(|c| format!("{c:?}"))
            },
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ScriptFunction;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;
    use trefle_core::Position;

    #[test]
    fn primitives_are_deduplicated() {
        let mut ctx = Context::new();
        assert_eq!(ctx.add_constant(Object::Integer(1)), 0);
        assert_eq!(ctx.add_constant(Object::from("a")), 1);
        assert_eq!(ctx.add_constant(Object::Integer(1)), 0);
        assert_eq!(ctx.add_constant(Object::Float(1.0)), 2);
        assert_eq!(ctx.add_constant(Object::from("a")), 1);
    }

    #[test]
    fn functions_are_kept_by_identity() {
        let mut ctx = Context::new();
        let f = Rc::new(ScriptFunction::new(0, Bytecode::new()));
        let a = ctx.add_constant(Object::ScriptFunction(Rc::clone(&f)));
        let b = ctx.add_constant(Object::ScriptFunction(f));
        assert_ne!(a, b);
    }

    #[test]
    fn dump_lists_nested_functions() {
        let pos = Position::new("d.tf", 1);
        let mut body = Bytecode::new();
        body.add(OpCode::Null, &[], &pos);
        body.add(OpCode::Return, &[], &pos);
        let mut ctx = Context::new();
        let idx = ctx.add_constant(Object::ScriptFunction(Rc::new(ScriptFunction::new(2, body))));
        let operand = i32::try_from(idx).unwrap();
        ctx.bytecode.add(OpCode::Closure, &[operand, 0], &pos);
        let text = ctx.dump();
        assert!(text.contains("\n;; function #0 (2 parameter(s))\n;; locals: 0\n"), "{text}");
        assert!(text.contains("Return"), "{text}");
        assert!(text.contains(";; ScriptFunction("), "{text}");
    }
}
