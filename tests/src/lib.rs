//! Aides partagées par les tests d'intégration : source → VM prête (stdlib installée),
//! sortie capturée.

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use trefle_vm::{Vm, VmError};

/// Tampon d'écriture partagé avec la VM.
#[derive(Debug, Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    /// Texte écrit jusqu'ici.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Parse + compile `src` (fichier `name`), stdlib installée, sortie capturée.
///
/// # Panics
/// Si la source ne parse ou ne compile pas.
pub fn machine(name: &str, src: &str) -> (Vm, Capture) {
    let program = trefle_parser::parse(name, src).unwrap_or_else(|e| panic!("parse: {e}"));
    let context = trefle_compiler::compile(&program).unwrap_or_else(|e| panic!("compile: {e}"));
    let capture = Capture::default();
    let mut vm = Vm::new(context).with_stdout(capture.clone());
    trefle_stdlib::install(&mut vm);
    (vm, capture)
}

/// Exécute `src` ; résultat affiché et sortie.
///
/// # Panics
/// Si le programme échoue.
pub fn eval(src: &str) -> (String, String) {
    let (mut vm, capture) = machine("main.tf", src);
    let result = vm.run().unwrap_or_else(|e| panic!("run: {e}"));
    (result.to_string(), capture.text())
}

/// Exécute `src` et renvoie l'erreur attendue.
///
/// # Panics
/// Si le programme réussit.
pub fn fail(src: &str) -> VmError {
    let (mut vm, _) = machine("main.tf", src);
    match vm.run() {
        Ok(value) => panic!("expected an error, got {value}"),
        Err(err) => err,
    }
}
