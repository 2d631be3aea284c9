//! trefle-stdlib — natives de base, exposées sous la globale `std`.
//!
//! - `std.print(...)` : concatène la forme affichable des arguments, écrit la ligne sur la
//!   sortie de la VM et renvoie la chaîne produite ;
//! - `std.type(x)` : nom du type de `x` (`"Integer"`, `"Array"`…) ;
//! - `std.math` (feature `math`) : `pow`, `abs`, `floor`, `sqrt`, `min`, `max`.
//!
//! # Exemple
//! ```
//! use trefle_vm::{Context, Vm};
//!
//! let mut vm = Vm::new(Context::default()).with_stdout(std::io::sink());
//! trefle_stdlib::install(&mut vm);
//! assert!(vm.global("std").is_some());
//! ```

#![forbid(unsafe_code)]

use indexmap::IndexMap;
use tracing::debug;
use trefle_runtime::{native, Object, RResult, RuntimeError, VmHandle};
use trefle_vm::Vm;

/// Installe la globale `std` dans `vm`.
pub fn install(vm: &mut Vm) {
    let std = module();
    debug!(members = std.len(), "installing std");
    vm.add_global("std", Object::map(std));
}

/// Membres de `std`, sans les installer.
pub fn module() -> IndexMap<String, Object> {
    let mut std = IndexMap::new();
    std.insert("print".to_owned(), native("print", None, print));
    std.insert("type".to_owned(), native("type", Some(1), |_, args| Ok(Object::string(args[0].kind()))));
    #[cfg(feature = "math")]
    std.insert("math".to_owned(), Object::map(math::module()));
    std
}

/* ───────────────────────────── I/O ───────────────────────────── */

fn print(vm: &mut dyn VmHandle, args: Vec<Object>) -> RResult<Object> {
    let line: String = args.iter().map(ToString::to_string).collect();
    writeln!(vm.stdout(), "{line}").map_err(|e| RuntimeError::Native(format!("print: {e}")))?;
    Ok(Object::string(line))
}

/* ───────────────────────────── Math ──────────────────────────── */

#[cfg(feature = "math")]
mod math {
    use indexmap::IndexMap;
    use trefle_runtime::{native, Object, RResult, RuntimeError};

    pub fn module() -> IndexMap<String, Object> {
        let mut math = IndexMap::new();
        math.insert("pow".to_owned(), native("pow", Some(2), |_, args| pow(&args[0], &args[1])));
        math.insert("abs".to_owned(), native("abs", Some(1), |_, args| abs(&args[0])));
        math.insert("floor".to_owned(), native("floor", Some(1), |_, args| Ok(Object::Float(float("floor", &args[0])?.floor()))));
        math.insert("sqrt".to_owned(), native("sqrt", Some(1), |_, args| Ok(Object::Float(float("sqrt", &args[0])?.sqrt()))));
        math.insert("min".to_owned(), native("min", Some(2), |_, args| pick(&args[0], &args[1], true)));
        math.insert("max".to_owned(), native("max", Some(2), |_, args| pick(&args[0], &args[1], false)));
        math
    }

    #[allow(clippy::cast_precision_loss)]
    fn float(op: &'static str, value: &Object) -> RResult<f64> {
        match value {
            Object::Integer(i) => Ok(*i as f64),
            Object::Float(f) => Ok(*f),
            other => Err(RuntimeError::UnsupportedUnary { op, kind: other.kind() }),
        }
    }

    fn pow(base: &Object, exponent: &Object) -> RResult<Object> {
        match (base, exponent) {
            (Object::Integer(b), Object::Integer(e)) if *e >= 0 => {
                let e = u32::try_from(*e).map_err(|_| RuntimeError::Overflow("pow"))?;
                b.checked_pow(e).map(Object::Integer).ok_or(RuntimeError::Overflow("pow"))
            },
            (Object::Integer(_) | Object::Float(_), Object::Integer(_) | Object::Float(_)) => {
                Ok(Object::Float(float("pow", base)?.powf(float("pow", exponent)?)))
            },
            _ => Err(RuntimeError::Unsupported { op: "pow", left: base.kind(), right: exponent.kind() }),
        }
    }

    fn abs(value: &Object) -> RResult<Object> {
        match value {
            Object::Integer(i) => i.checked_abs().map(Object::Integer).ok_or(RuntimeError::Overflow("abs")),
            Object::Float(f) => Ok(Object::Float(f.abs())),
            other => Err(RuntimeError::UnsupportedUnary { op: "abs", kind: other.kind() }),
        }
    }

    fn pick(a: &Object, b: &Object, smaller: bool) -> RResult<Object> {
        let a_first = if smaller { !b.less(a)?.as_boolean()? } else { !a.less(b)?.as_boolean()? };
        Ok(if a_first { a.clone() } else { b.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(src: &str) -> (String, String) {
        let program = trefle_parser::parse("std.tf", src).expect("parse");
        let out = Capture::default();
        let mut vm = Vm::new(trefle_compiler::compile(&program).expect("compile")).with_stdout(out.clone());
        install(&mut vm);
        let result = vm.run().expect("run").to_string();
        let printed = String::from_utf8(out.0.borrow().clone()).expect("utf-8");
        (result, printed)
    }

    #[test]
    fn print_concatenates_and_returns_the_line() {
        let (result, printed) = run("std.print('a', 1, ' ', 2.5, null)");
        assert_eq!(printed, "a1 2.5null\n");
        assert_eq!(result, "a1 2.5null");
    }

    #[test]
    fn print_without_arguments_writes_an_empty_line() {
        let (result, printed) = run("std.print()\nstd.print('x')");
        assert_eq!(printed, "\nx\n");
        assert_eq!(result, "x");
    }

    #[test]
    fn print_shows_nested_values() {
        let (_, printed) = run("local a = [1, 'b']\nstd.print(a)");
        assert_eq!(printed, "[1, \"b\"]\n");
    }

    #[test]
    fn type_names() {
        assert_eq!(run("std.type(1)").0, "Integer");
        assert_eq!(run("std.type({a: 1})").0, "Map");
        assert_eq!(run("std.type(std.print)").0, "NativeFunction");
    }

    #[cfg(feature = "math")]
    #[test]
    fn math_functions() {
        assert_eq!(run("std.math.pow(2, 10)").0, "1024");
        assert_eq!(run("std.math.pow(2, 0.5) > 1.41").0, "true");
        assert_eq!(run("std.math.abs(-3)").0, "3");
        assert_eq!(run("std.math.floor(2.7)").0, "2");
        assert_eq!(run("std.math.sqrt(9)").0, "3");
        assert_eq!(run("std.math.min(3, 1.5)").0, "1.5");
        assert_eq!(run("std.math.max('a', 'b')").0, "b");
    }

    #[cfg(feature = "math")]
    #[test]
    fn math_errors() {
        let program = trefle_parser::parse("std.tf", "std.math.pow(2, 64)").expect("parse");
        let mut vm = Vm::new(trefle_compiler::compile(&program).expect("compile"));
        install(&mut vm);
        let err = vm.run().expect_err("overflow");
        assert_eq!(err.error, RuntimeError::Overflow("pow"));
    }

    #[test]
    fn module_lists_members_in_order() {
        let names: Vec<_> = module().keys().cloned().collect();
        assert_eq!(&names[..2], ["print", "type"]);
    }
}
