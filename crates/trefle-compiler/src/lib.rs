//! trefle-compiler — AST → bytecode
//!
//! - Entrée : [`trefle_ast::Program`]
//! - Sortie : [`Context`] (bytecode du programme + pool de constantes, fonctions incluses)
//! - Résolution de chaque identifiant à la compilation : slot local, variable capturée
//!   (transitivement, à travers les frames intermédiaires), recherche d'environnement
//!   (dans une classe) ou globale.
//!
//! ```rust
//! use trefle_compiler::compile;
//!
//! let program = trefle_parser::parse("demo.tf", "local x = 5  x = x + 1  x").unwrap();
//! let context = compile(&program).unwrap();
//! assert_eq!(context.bytecode.local_count, 1);
//! ```

#![deny(missing_docs)]

pub mod scope;

use std::{fmt, rc::Rc};

use tracing::debug;
use trefle_ast::{BinaryOp, Class, Expr, ExprKind, Function, Literal, Program, UnaryOp};
use trefle_core::{Bytecode, OpCode, Position};
use trefle_runtime::{Context, Object, ScriptFunction};

use crate::scope::{Scopes, Symbol};

// ─────────────────────────────────────────────────────────────────────────────
/* Erreurs */
// ─────────────────────────────────────────────────────────────────────────────

/// Erreur de compilation, attribuée à l'expression fautive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Message humain.
    pub message: String,
    /// Position de l'expression.
    pub position: Position,
}

impl CompileError {
    fn new(message: impl Into<String>, position: &Position) -> Self {
        Self { message: message.into(), position: position.clone() }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

impl std::error::Error for CompileError {}

type CResult<T> = Result<T, CompileError>;

/// Compile un programme complet.
pub fn compile(program: &Program) -> Result<Context, CompileError> {
    Compiler::new().compile(program)
}

// ─────────────────────────────────────────────────────────────────────────────
/* Compilateur */
// ─────────────────────────────────────────────────────────────────────────────

/// État de compilation : portées, constantes, pile des corps de fonction en cours.
#[derive(Debug, Default)]
pub struct Compiler {
    scopes: Scopes,
    context: Context,
    code: Vec<Bytecode>,
}

impl Compiler {
    /// Compilateur vierge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consomme le compilateur et produit le contexte.
    pub fn compile(mut self, program: &Program) -> CResult<Context> {
        debug!(expressions = program.expressions.len(), "compiling program");
        let origin = program.expressions.first().map(|e| e.position.clone()).unwrap_or_default();
        self.code.push(Bytecode::new());
        self.program(program, &origin)?;
        let mut bytecode = self.code.pop().unwrap_or_default();
        bytecode.local_count = self.scopes.local_count(self.scopes.current_frame());
        self.context.bytecode = bytecode;
        debug!(
            words = self.context.bytecode.len(),
            constants = self.context.constants.len(),
            "compiled program"
        );
        Ok(self.context)
    }

    /* ─────────── Émission ─────────── */

    fn emit(&mut self, op: OpCode, operands: &[i32], position: &Position) -> usize {
        match self.code.last_mut() {
            Some(code) => code.add(op, operands, position),
            None => unreachable!("no bytecode being emitted"),
        }
    }

    fn code(&mut self) -> &mut Bytecode {
        match self.code.last_mut() {
            Some(code) => code,
            None => unreachable!("no bytecode being emitted"),
        }
    }

    fn here(&mut self, position: &Position) -> CResult<i32> {
        let len = self.code().len();
        operand(len, position)
    }

    /// Fait pointer le saut émis à `at` sur la position courante.
    fn patch_jump(&mut self, at: usize, position: &Position) -> CResult<()> {
        let target = self.here(position)?;
        self.code().patch(at + 1, target);
        Ok(())
    }

    fn constant(&mut self, value: Object, position: &Position) -> CResult<()> {
        let index = self.context.add_constant(value);
        let index = operand(index, position)?;
        self.emit(OpCode::Constant, &[index], position);
        Ok(())
    }

    /* ─────────── Blocs ─────────── */

    /// Chaque expression laisse sa valeur puis `Pop` ; un bloc vide vaut `null`.
    fn program(&mut self, program: &Program, origin: &Position) -> CResult<()> {
        if program.is_empty() {
            self.emit(OpCode::Null, &[], origin);
            self.emit(OpCode::Pop, &[], origin);
            return Ok(());
        }
        for expr in &program.expressions {
            self.expr(expr)?;
            self.emit(OpCode::Pop, &[], &expr.position);
        }
        Ok(())
    }

    /// Bloc dont la valeur reste sur la pile (branches de `if`).
    fn branch(&mut self, program: &Program, origin: &Position) -> CResult<()> {
        self.scopes.push_block();
        let compiled = self.program(program, origin);
        self.scopes.pop();
        compiled?;
        self.code().pop_last();
        Ok(())
    }

    /* ─────────── Expressions ─────────── */

    fn expr(&mut self, expr: &Expr) -> CResult<()> {
        let pos = &expr.position;
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal, pos)?,
            ExprKind::Identifier(name) => self.load(name, pos)?,
            ExprKind::This => {
                self.emit(OpCode::This, &[], pos);
            },
            ExprKind::Base => {
                return Err(CompileError::new("`base` must be followed by a member access", pos));
            },
            ExprKind::Prefix { op, expr: operand } => {
                self.expr(operand)?;
                let op = match op {
                    UnaryOp::Negate => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit(op, &[], pos);
            },
            ExprKind::Binary { left, op: op @ (BinaryOp::And | BinaryOp::Or), right } => {
                self.logical(left, *op, right, pos)?;
            },
            ExprKind::Binary { left, op, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.emit(binary_opcode(*op), &[], pos);
            },
            ExprKind::Assign { target, op, value } => self.assign(target, *op, value, pos)?,
            ExprKind::Local { name, value } => {
                let symbol = self.scopes.define_local(name).map_err(|e| CompileError::new(e.to_string(), pos))?;
                match value {
                    Some(value) => self.expr(value)?,
                    None => {
                        self.emit(OpCode::Null, &[], pos);
                    },
                }
                self.emit(OpCode::LocalSet, &[operand(symbol.index, pos)?], pos);
            },
            ExprKind::Function(function) => self.function(function, pos)?,
            ExprKind::Call { callee, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.expr(callee)?;
                self.emit(OpCode::Call, &[operand(args.len(), pos)?], pos);
            },
            ExprKind::If { condition, then_branch, else_branch } => {
                self.expr(condition)?;
                let to_then = self.emit(OpCode::JumpIf, &[0], pos);
                match else_branch {
                    Some(otherwise) => self.branch(otherwise, pos)?,
                    None => {
                        self.emit(OpCode::Null, &[], pos);
                    },
                }
                let to_end = self.emit(OpCode::Jump, &[0], pos);
                self.patch_jump(to_then, pos)?;
                self.branch(then_branch, pos)?;
                self.patch_jump(to_end, pos)?;
            },
            ExprKind::While { condition, body } => {
                let start = self.here(pos)?;
                self.expr(condition)?;
                let to_body = self.emit(OpCode::JumpIf, &[0], pos);
                let to_end = self.emit(OpCode::Jump, &[0], pos);
                self.patch_jump(to_body, pos)?;
                self.scopes.push_block();
                let body = self.program(body, pos);
                self.scopes.pop();
                body?;
                self.emit(OpCode::Jump, &[start], pos);
                self.patch_jump(to_end, pos)?;
                self.emit(OpCode::Null, &[], pos);
            },
            ExprKind::Return(value) => {
                match value {
                    Some(value) => self.expr(value)?,
                    None => {
                        self.emit(OpCode::Null, &[], pos);
                    },
                }
                self.emit(OpCode::Return, &[], pos);
            },
            ExprKind::Array(items) => {
                for item in items {
                    self.expr(item)?;
                }
                self.emit(OpCode::NewArray, &[operand(items.len(), pos)?], pos);
            },
            ExprKind::Map(entries) => {
                for entry in entries {
                    self.constant(Object::string(&entry.key), pos)?;
                    self.expr(&entry.value)?;
                }
                self.emit(OpCode::NewMap, &[operand(entries.len(), pos)?], pos);
            },
            ExprKind::Class(class) => self.class(class, pos)?,
            ExprKind::Member { target, key } => {
                if matches!(target.kind, ExprKind::Base) {
                    self.expr(key)?;
                    self.emit(OpCode::BaseGet, &[], pos);
                } else {
                    self.expr(target)?;
                    self.expr(key)?;
                    self.emit(OpCode::InstanceGet, &[], pos);
                }
            },
        }
        Ok(())
    }

    fn literal(&mut self, literal: &Literal, pos: &Position) -> CResult<()> {
        match literal {
            Literal::Integer(i) => self.constant(Object::Integer(*i), pos)?,
            Literal::Float(f) => self.constant(Object::Float(*f), pos)?,
            Literal::String(s) => self.constant(Object::string(s), pos)?,
            Literal::Boolean(true) => {
                self.emit(OpCode::True, &[], pos);
            },
            Literal::Boolean(false) => {
                self.emit(OpCode::False, &[], pos);
            },
            Literal::Null => {
                self.emit(OpCode::Null, &[], pos);
            },
        }
        Ok(())
    }

    /// `and` / `or` court-circuités ; le résultat est toujours un `Boolean`.
    ///
    /// L'opérande droit n'est évalué que si le gauche ne décide pas : il est alors combiné
    /// à la constante connue (`true and b`, `false or b`) par `And` / `Or`.
    fn logical(&mut self, left: &Expr, op: BinaryOp, right: &Expr, pos: &Position) -> CResult<()> {
        self.expr(left)?;
        let decided = self.emit(OpCode::JumpIf, &[0], pos);
        if op == BinaryOp::And {
            self.emit(OpCode::False, &[], pos);
            let to_end = self.emit(OpCode::Jump, &[0], pos);
            self.patch_jump(decided, pos)?;
            self.emit(OpCode::True, &[], pos);
            self.expr(right)?;
            self.emit(OpCode::And, &[], pos);
            self.patch_jump(to_end, pos)
        } else {
            self.emit(OpCode::False, &[], pos);
            self.expr(right)?;
            self.emit(OpCode::Or, &[], pos);
            let to_end = self.emit(OpCode::Jump, &[0], pos);
            self.patch_jump(decided, pos)?;
            self.emit(OpCode::True, &[], pos);
            self.patch_jump(to_end, pos)
        }
    }

    /* ─────────── Identifiants ─────────── */

    /// Local, puis capture, sinon `None` (recherche par nom à l'exécution).
    fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.scopes.find_local(name) {
            return Some(symbol);
        }
        let frame = self.scopes.current_frame();
        self.capture(frame, name)
    }

    /// Capture `name` dans `frame`, en la faisant transiter par chaque frame intermédiaire.
    fn capture(&mut self, frame: scope::ScopeId, name: &str) -> Option<Symbol> {
        let outer = match self.scopes.find_outer(frame, name) {
            Some(symbol) => symbol,
            None => {
                let parent = self.scopes.enclosing_frame(frame)?;
                self.capture(parent, name)?
            },
        };
        Some(self.scopes.define_free(frame, name, outer))
    }

    fn load(&mut self, name: &str, pos: &Position) -> CResult<()> {
        if let Some(symbol) = self.resolve(name) {
            self.emit(OpCode::LocalGet, &[operand(symbol.index, pos)?], pos);
            return Ok(());
        }
        self.constant(Object::string(name), pos)?;
        let op = if self.scopes.in_class() { OpCode::EnvironmentGet } else { OpCode::GlobalGet };
        self.emit(op, &[], pos);
        Ok(())
    }

    fn store(&mut self, name: &str, pos: &Position) -> CResult<()> {
        if let Some(symbol) = self.resolve(name) {
            self.emit(OpCode::LocalSet, &[operand(symbol.index, pos)?], pos);
            return Ok(());
        }
        self.constant(Object::string(name), pos)?;
        let op = if self.scopes.in_class() { OpCode::EnvironmentSet } else { OpCode::GlobalSet };
        self.emit(op, &[], pos);
        Ok(())
    }

    /// `target = value` ; `target op= value` est compilé comme `target = target op value`.
    fn assign(&mut self, target: &Expr, op: Option<BinaryOp>, value: &Expr, pos: &Position) -> CResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.assigned_value(target, op, value, pos)?;
                self.store(name, pos)
            },
            ExprKind::Member { target: object, key } if !matches!(object.kind, ExprKind::Base) => {
                self.assigned_value(target, op, value, pos)?;
                self.expr(object)?;
                self.expr(key)?;
                self.emit(OpCode::InstanceSet, &[], pos);
                Ok(())
            },
            _ => Err(CompileError::new("invalid assignment target", &target.position)),
        }
    }

    fn assigned_value(&mut self, target: &Expr, op: Option<BinaryOp>, value: &Expr, pos: &Position) -> CResult<()> {
        if let Some(op) = op {
            self.expr(target)?;
            self.expr(value)?;
            self.emit(binary_opcode(op), &[], pos);
            Ok(())
        } else {
            self.expr(value)
        }
    }

    /* ─────────── Fonctions & classes ─────────── */

    fn function(&mut self, function: &Function, pos: &Position) -> CResult<()> {
        let frame = self.scopes.push_frame();
        self.code.push(Bytecode::new());
        let body = self.function_body(function, pos);
        let free_variables = self.scopes.free_variables(frame).to_vec();
        let local_count = self.scopes.local_count(frame);
        self.scopes.pop();
        let mut bytecode = self.code.pop().unwrap_or_default();
        body?;
        bytecode.local_count = local_count;

        let template = ScriptFunction::new(function.params.len(), bytecode);
        let index = self.context.add_constant(Object::ScriptFunction(Rc::new(template)));

        for param in &function.params {
            match &param.default {
                Some(default) => self.expr(default)?,
                None => {
                    self.emit(OpCode::Null, &[], &param.position);
                },
            }
        }
        for &(parent_slot, slot) in &free_variables {
            self.emit(OpCode::FreeVariable, &[operand(parent_slot, pos)?, operand(slot, pos)?], pos);
        }
        self.emit(OpCode::Closure, &[operand(index, pos)?, operand(free_variables.len(), pos)?], pos);
        Ok(())
    }

    fn function_body(&mut self, function: &Function, pos: &Position) -> CResult<()> {
        for param in &function.params {
            self.scopes
                .define_local(&param.name)
                .map_err(|e| CompileError::new(e.to_string(), &param.position))?;
        }
        self.program(&function.body, pos)?;
        self.code().pop_last();
        if self.code().last_opcode() != Some(OpCode::Return) {
            let end = function.body.expressions.last().map_or(pos, |e| &e.position).clone();
            self.emit(OpCode::Return, &[], &end);
        }
        Ok(())
    }

    fn class(&mut self, class: &Class, pos: &Position) -> CResult<()> {
        self.scopes.push_class();
        let members = class.members.iter().try_for_each(|member| {
            self.constant(Object::string(&member.name), &member.position)?;
            self.expr(&member.value)
        });
        self.scopes.pop();
        members?;
        match &class.parent {
            Some(parent) => self.expr(parent)?,
            None => {
                self.emit(OpCode::Null, &[], pos);
            },
        }
        self.emit(OpCode::NewClass, &[operand(class.members.len(), pos)?], pos);
        Ok(())
    }
}

fn operand(value: usize, position: &Position) -> CResult<i32> {
    i32::try_from(value).map_err(|_| CompileError::new(format!("operand {value} does not fit in an instruction"), position))
}

const fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Equal => OpCode::Equal,
        BinaryOp::NotEqual => OpCode::NotEqual,
        BinaryOp::Less => OpCode::Less,
        BinaryOp::Greater => OpCode::Greater,
        BinaryOp::LessEqual => OpCode::LessEqual,
        BinaryOp::GreaterEqual => OpCode::GreaterEqual,
        BinaryOp::And => OpCode::And,
        BinaryOp::Or => OpCode::Or,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
/* Tests */
// ─────────────────────────────────────────────────────────────────────────────
