//! trefle-vm — machine à pile pour le bytecode Trèfle
//!
//! - [`Vm::new`] charge un [`Context`] compilé et prépare la frame du programme ;
//! - [`Vm::run`] exécute jusqu'à la fin, [`Vm::step`] exécute une instruction ;
//! - chaque slot de frame désigne une cellule du [`VariablePool`] : les closures
//!   partagent ainsi les variables capturées par référence ;
//! - une erreur d'exécution arrête la machine et renvoie un [`VmError`] positionné.
//!   L'état (frames, pile, pool) reste consultable.
//!
//! Les natives reçoivent la VM sous forme de [`VmHandle`] et peuvent la ré-entrer
//! (constructeurs de classes).
//!
//! ```rust
//! use trefle_vm::Vm;
//!
//! let program = trefle_parser::parse("demo.tf", "local x = 5  x = x + 1  x").unwrap();
//! let context = trefle_compiler::compile(&program).unwrap();
//! let mut vm = Vm::new(context);
//! assert_eq!(vm.run().unwrap().to_string(), "6");
//! ```

#![deny(missing_docs)]

pub mod pool;

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Write},
    rc::Rc,
};

use indexmap::IndexMap;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, trace, warn};
use trefle_core::{OpCode, Position};
use trefle_runtime::{Closure, Instance, Object, RResult, RuntimeError, ScriptClass, ScriptFunction};

pub use pool::VariablePool;
pub use trefle_runtime::{Context, VmHandle};

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreur d'exécution + position de l'instruction fautive.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {error}")]
pub struct VmError {
    /// Cause.
    pub error: RuntimeError,
    /// Instruction fautive (la plus profonde en cas de ré-entrée).
    pub position: Position,
}

fn invalid(message: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidBytecode(message.into())
}

/// Opérande `n` converti en index.
fn index(operands: &[i32], n: usize) -> RResult<usize> {
    operands
        .get(n)
        .and_then(|&word| usize::try_from(word).ok())
        .ok_or_else(|| invalid(format!("bad operand #{n}")))
}

/* ─────────────────────────── Frames ─────────────────────────── */

/// Activation d'une fonction.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Prochaine instruction.
    pub ip: usize,
    /// Fonction exécutée (le programme principal est une fonction sans paramètre).
    pub function: Rc<ScriptFunction>,
    /// `this` (`null` hors méthode).
    pub receiver: Object,
    /// Dernière valeur retirée par `Pop`.
    pub last_pop: Object,
    /// Slot local → cellule du pool.
    pub slots: Vec<usize>,
}

/// Tampon d'arguments : la plupart des appels en ont peu.
type Args = SmallVec<[Object; 8]>;

/* ─────────────────────────── Machine ─────────────────────────── */

/// Machine virtuelle. Globales et constantes sont propres à chaque instance.
pub struct Vm {
    constants: Vec<Object>,
    globals: IndexMap<String, Object>,
    stack: Vec<Object>,
    frames: Vec<Frame>,
    pool: VariablePool,
    captures: Vec<(usize, usize)>,
    result: Option<Object>,
    nested_error: Option<VmError>,
    stdout: Box<dyn Write>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("frames", &self.frames.len())
            .field("stack", &self.stack.len())
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("finished", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

impl Vm {
    /// Charge `context` : une frame de base avec `local_count` cellules à `null`.
    pub fn new(context: Context) -> Self {
        let Context { bytecode, constants } = context;
        let mut pool = VariablePool::new();
        let slots = (0..bytecode.local_count).map(|_| pool.allocate(Object::Null)).collect();
        let main = Frame {
            ip: 0,
            function: Rc::new(ScriptFunction::new(0, bytecode)),
            receiver: Object::Null,
            last_pop: Object::Null,
            slots,
        };
        Self {
            constants,
            globals: IndexMap::new(),
            stack: Vec::new(),
            frames: vec![main],
            pool,
            captures: Vec::new(),
            result: None,
            nested_error: None,
            stdout: Box::new(io::stdout()),
        }
    }

    /// Redirige la sortie utilisée par les natives (`std.print`).
    #[must_use]
    pub fn with_stdout(mut self, out: impl Write + 'static) -> Self {
        self.stdout = Box::new(out);
        self
    }

    /// Définit (ou remplace) une globale.
    pub fn add_global(&mut self, name: impl Into<String>, value: Object) {
        self.globals.insert(name.into(), value);
    }

    /// Valeur d'une globale.
    pub fn global(&self, name: &str) -> Option<&Object> {
        self.globals.get(name)
    }

    /// Pool de variables.
    pub const fn pool(&self) -> &VariablePool {
        &self.pool
    }

    /// Pile d'opérandes.
    pub fn stack(&self) -> &[Object] {
        &self.stack
    }

    /// Frames actives, de la base au sommet.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Pool de constantes.
    pub fn constants(&self) -> &[Object] {
        &self.constants
    }

    /// Valeur finale, une fois le programme terminé.
    pub const fn result(&self) -> Option<&Object> {
        self.result.as_ref()
    }

    /// Vrai quand le programme est terminé.
    pub const fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Exécute jusqu'à la fin du programme.
    pub fn run(&mut self) -> Result<Object, VmError> {
        debug!(words = self.frames.first().map_or(0, |f| f.function.bytecode.len()), "running program");
        loop {
            if let Some(result) = &self.result {
                return Ok(result.clone());
            }
            self.step_frame()?;
        }
    }

    /// Exécute une instruction (rien si le programme est terminé).
    pub fn step(&mut self) -> Result<(), VmError> {
        if self.result.is_some() {
            return Ok(());
        }
        self.step_frame()
    }

    fn step_frame(&mut self) -> Result<(), VmError> {
        // une erreur imbriquée ignorée par une native ne doit pas survivre à son instruction
        self.nested_error = None;
        let origin = self.frames.last().map(|f| (Rc::clone(&f.function), f.ip));
        self.execute().map_err(|error| {
            let failure = self.nested_error.take().filter(|nested| nested.error == error).unwrap_or_else(|| {
                let position = origin
                    .and_then(|(function, ip)| {
                        let code = &function.bytecode;
                        code.position(ip).or_else(|| code.positions().last()).cloned()
                    })
                    .unwrap_or_default();
                VmError { error, position }
            });
            warn!(%failure, "runtime error");
            failure
        })
    }

    /* ─────────── Pile & frames ─────────── */

    fn push(&mut self, value: Object) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RResult<Object> {
        self.stack.pop().ok_or_else(|| invalid("stack underflow"))
    }

    fn peek(&self) -> RResult<&Object> {
        self.stack.last().ok_or_else(|| invalid("stack underflow"))
    }

    /// Retire les `n` dernières valeurs, dans l'ordre où elles ont été empilées.
    fn pop_n(&mut self, n: usize) -> RResult<Args> {
        let start = self.stack.len().checked_sub(n).ok_or_else(|| invalid("stack underflow"))?;
        Ok(self.stack.drain(start..).collect())
    }

    fn pop_string(&mut self, target: &'static str) -> RResult<Rc<str>> {
        match self.pop()? {
            Object::String(key) => Ok(key),
            other => Err(RuntimeError::KeyType { target, key: other.kind() }),
        }
    }

    fn frame(&self) -> RResult<&Frame> {
        self.frames.last().ok_or_else(|| invalid("no active frame"))
    }

    fn frame_mut(&mut self) -> RResult<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| invalid("no active frame"))
    }

    fn receiver(&self) -> Object {
        self.frames.last().map(|f| f.receiver.clone()).unwrap_or_default()
    }

    /// Cellule du pool associée au slot `slot` de la frame courante.
    fn cell(&self, slot: usize) -> RResult<usize> {
        self.frame()?.slots.get(slot).copied().ok_or_else(|| invalid(format!("slot {slot} out of range")))
    }

    /* ─────────── Boucle ─────────── */

    fn execute(&mut self) -> RResult<()> {
        let frame = self.frame()?;
        let function = Rc::clone(&frame.function);
        let ip = frame.ip;
        let code = function.bytecode.instructions();
        let Some(&word) = code.get(ip) else {
            let value = frame.last_pop.clone();
            return self.leave_frame(value);
        };
        let op = OpCode::decode(word).ok_or_else(|| invalid(format!("unknown opcode 0x{word:06X} at {ip}")))?;
        let operands = code.get(ip + 1..ip + op.width()).ok_or_else(|| invalid(format!("truncated {op} at {ip}")))?;
        trace!(ip, %op, depth = self.frames.len(), "execute");
        self.frame_mut()?.ip = ip + op.width();

        match op {
            OpCode::Constant => {
                let at = index(operands, 0)?;
                let value = self.constants.get(at).cloned().ok_or_else(|| invalid(format!("no constant #{at}")))?;
                self.push(value);
            },
            OpCode::Pop => {
                let value = self.pop()?;
                self.frame_mut()?.last_pop = value;
            },
            OpCode::True => self.push(Object::Boolean(true)),
            OpCode::False => self.push(Object::Boolean(false)),
            OpCode::Null => self.push(Object::Null),

            OpCode::Add => self.binary(Object::add)?,
            OpCode::Sub => self.binary(Object::sub)?,
            OpCode::Mul => self.binary(Object::mul)?,
            OpCode::Div => self.binary(Object::div)?,
            OpCode::Equal => self.binary(Object::equal)?,
            OpCode::NotEqual => self.binary(Object::not_equal)?,
            OpCode::Less => self.binary(Object::less)?,
            OpCode::Greater => self.binary(Object::greater)?,
            OpCode::LessEqual => self.binary(Object::less_equal)?,
            OpCode::GreaterEqual => self.binary(Object::greater_equal)?,
            OpCode::And => self.binary(Object::and)?,
            OpCode::Or => self.binary(Object::or)?,
            OpCode::Negate => {
                let value = self.pop()?.negate()?;
                self.push(value);
            },
            OpCode::Not => {
                let value = self.pop()?.not()?;
                self.push(value);
            },

            OpCode::Jump => self.frame_mut()?.ip = index(operands, 0)?,
            OpCode::JumpIf => {
                let target = index(operands, 0)?;
                if self.pop()?.as_boolean()? {
                    self.frame_mut()?.ip = target;
                }
            },

            OpCode::LocalGet => {
                let cell = self.cell(index(operands, 0)?)?;
                let value = self.pool.get(cell).cloned().ok_or_else(|| invalid(format!("dead cell {cell}")))?;
                self.push(value);
            },
            OpCode::LocalSet => {
                let cell = self.cell(index(operands, 0)?)?;
                let value = self.peek()?.clone();
                if !self.pool.set(cell, value) {
                    return Err(invalid(format!("dead cell {cell}")));
                }
            },
            OpCode::GlobalGet => {
                let key = self.pop_string("globals")?;
                let value =
                    self.globals.get(&*key).cloned().ok_or_else(|| RuntimeError::UndefinedVariable(key.to_string()))?;
                self.push(value);
            },
            OpCode::GlobalSet => {
                let key = self.pop_string("globals")?;
                let value = self.peek()?.clone();
                self.globals.insert(key.to_string(), value);
            },
            OpCode::EnvironmentGet => {
                let key = self.pop_string("environment")?;
                let member = match self.receiver() {
                    Object::Instance(instance) => Instance::get(&instance, &key),
                    _ => None,
                };
                let value = member
                    .or_else(|| self.globals.get(&*key).cloned())
                    .ok_or_else(|| RuntimeError::UndefinedVariable(key.to_string()))?;
                self.push(value);
            },
            OpCode::EnvironmentSet => {
                let key = self.pop_string("environment")?;
                let value = self.peek()?.clone();
                match self.receiver() {
                    Object::Instance(instance) => instance.set(&key, value),
                    _ => match self.globals.get_mut(&*key) {
                        Some(global) => *global = value,
                        None => return Err(RuntimeError::UndefinedVariable(key.to_string())),
                    },
                }
            },
            OpCode::InstanceGet => {
                let key = self.pop()?;
                let target = self.pop()?;
                let value = target
                    .get_member(&key)?
                    .ok_or_else(|| RuntimeError::MemberNotFound { target: target.kind(), name: key.to_string() })?;
                self.push(value);
            },
            OpCode::InstanceSet => {
                let key = self.pop()?;
                let target = self.pop()?;
                let value = self.pop()?;
                target.set_member(&key, value.clone())?;
                self.push(value);
            },
            OpCode::BaseGet => {
                let key = self.pop()?;
                let Object::Instance(instance) = self.receiver() else {
                    return Err(RuntimeError::BaseOutsideInstance);
                };
                let Object::String(name) = &key else {
                    return Err(RuntimeError::KeyType { target: "base", key: key.kind() });
                };
                let value = Instance::base_get(&instance, name)
                    .ok_or_else(|| RuntimeError::MemberNotFound { target: "base", name: name.to_string() })?;
                self.push(value);
            },
            OpCode::This => {
                let receiver = self.receiver();
                self.push(receiver);
            },

            OpCode::FreeVariable => {
                let cell = self.cell(index(operands, 0)?)?;
                self.captures.push((cell, index(operands, 1)?));
            },
            OpCode::Closure => self.make_closure(index(operands, 0)?, index(operands, 1)?)?,
            OpCode::Call => {
                let argc = index(operands, 0)?;
                let callee = self.pop()?;
                self.call_value(callee, argc)?;
            },
            OpCode::Return => {
                let value = self.pop()?;
                self.leave_frame(value)?;
            },

            OpCode::NewArray => {
                let items = self.pop_n(index(operands, 0)?)?;
                self.push(Object::array(items.into_vec()));
            },
            OpCode::NewMap => {
                let count = index(operands, 0)?;
                let flat = self.pop_n(count * 2)?;
                let mut entries = IndexMap::with_capacity(count);
                let mut flat = flat.into_iter();
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    let key = match key {
                        Object::String(key) => key,
                        other => return Err(RuntimeError::KeyType { target: "Map", key: other.kind() }),
                    };
                    entries.insert(key.to_string(), value);
                }
                self.push(Object::map(entries));
            },
            OpCode::NewClass => {
                let count = index(operands, 0)?;
                let parent = match self.pop()? {
                    Object::Null => None,
                    Object::Class(class) => Some(class),
                    other => return Err(RuntimeError::InvalidParent(other.kind())),
                };
                let flat = self.pop_n(count * 2)?;
                let mut members = IndexMap::with_capacity(count);
                let mut flat = flat.into_iter();
                while let (Some(name), Some(value)) = (flat.next(), flat.next()) {
                    let Object::String(name) = name else {
                        return Err(invalid("class member name is not a string"));
                    };
                    members.insert(name.to_string(), value);
                }
                self.push(Object::Class(Rc::new(ScriptClass::new(parent, members))));
            },
        }
        Ok(())
    }

    fn binary(&mut self, op: fn(&Object, &Object) -> RResult<Object>) -> RResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let value = op(&left, &right)?;
        self.push(value);
        Ok(())
    }

    /// `Closure idx count` : consomme les captures en attente puis les défauts.
    fn make_closure(&mut self, at: usize, count: usize) -> RResult<()> {
        let Some(Object::ScriptFunction(function)) = self.constants.get(at).cloned() else {
            return Err(invalid(format!("constant #{at} is not a function")));
        };
        let start = self.captures.len().checked_sub(count).ok_or_else(|| invalid("missing free variables"))?;
        let mut free_variables = BTreeMap::new();
        for (cell, slot) in self.captures.drain(start..) {
            self.pool.add_reference(cell);
            free_variables.insert(slot, cell);
        }
        let defaults = self.pop_n(function.parameter_count)?.into_vec();
        self.push(Object::Closure(Rc::new(Closure { function, defaults, free_variables })));
        Ok(())
    }

    /* ─────────── Appels ─────────── */

    fn call_value(&mut self, callee: Object, argc: usize) -> RResult<()> {
        match callee {
            Object::Closure(closure) => self.enter(&closure, Object::Null, argc),
            Object::MemberFunction(method) => {
                self.enter(&method.closure, Object::Instance(Rc::clone(&method.receiver)), argc)
            },
            Object::NativeFunction(native) => {
                let args = self.pop_n(argc)?.into_vec();
                trace!(name = %native.name, argc, "native call");
                let value = native.invoke(self, args)?;
                self.push(value);
                Ok(())
            },
            other => Err(RuntimeError::NotCallable(other.kind())),
        }
    }

    /// Lie les arguments aux slots et empile une frame.
    fn enter(&mut self, closure: &Closure, receiver: Object, argc: usize) -> RResult<()> {
        let function = Rc::clone(&closure.function);
        let params = function.parameter_count;
        if argc > params {
            return Err(RuntimeError::Arity { expected: params, got: argc });
        }
        let mut args = self.pop_n(argc)?.into_iter();
        let mut slots = Vec::with_capacity(function.bytecode.local_count);
        for slot in 0..function.bytecode.local_count {
            let cell = if let Some(cell) = closure.captured(slot) {
                self.pool.add_reference(cell);
                cell
            } else {
                let value = if slot < params {
                    args.next().or_else(|| closure.defaults.get(slot).cloned()).unwrap_or_default()
                } else {
                    Object::Null
                };
                self.pool.allocate(value)
            };
            slots.push(cell);
        }
        trace!(argc, locals = slots.len(), depth = self.frames.len() + 1, "enter frame");
        self.frames.push(Frame { ip: 0, function, receiver, last_pop: Object::Null, slots });
        Ok(())
    }

    /// Quitte la frame courante ; depuis la frame de base, termine le programme.
    fn leave_frame(&mut self, value: Object) -> RResult<()> {
        if self.frames.len() <= 1 {
            debug!(result = ?value, "program finished");
            self.result = Some(value);
            return Ok(());
        }
        let frame = self.frames.pop().ok_or_else(|| invalid("no active frame"))?;
        for cell in frame.slots {
            self.pool.release(cell);
        }
        self.push(value);
        Ok(())
    }
}

impl VmHandle for Vm {
    /// Appel synchrone : exécute la frame appelée jusqu'à son retour.
    fn call(&mut self, callee: &Object, args: Vec<Object>) -> RResult<Object> {
        let depth = self.frames.len();
        let argc = args.len();
        self.stack.extend(args);
        self.call_value(callee.clone(), argc)?;
        while self.frames.len() > depth {
            if let Err(failure) = self.step_frame() {
                let error = failure.error.clone();
                self.nested_error = Some(failure);
                return Err(error);
            }
        }
        self.pop()
    }

    fn stdout(&mut self) -> &mut dyn Write {
        self.stdout.as_mut()
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
