//! trefle-cli — bibliothèque interne du binaire `trefle`
//!
//! Le binaire (`main.rs`) ne fait que lire les arguments et initialiser les traces ;
//! tout le pipeline **source → AST → bytecode → VM** vit ici, testable sans processus.
//!
//! - [`Command`] : une commande haut-niveau déjà décodée (`run`, `repl`, `tokens`, `ast`, `disasm`) ;
//! - [`execute`] : exécute une commande et renvoie un code de sortie ;
//! - [`Output`] : sortie partagée entre le CLI et la VM (les natives y écrivent aussi).

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    cell::RefCell,
    fmt,
    io::{self, BufRead, Read, Write},
    path::PathBuf,
    rc::Rc,
};

use anyhow::{Context, Result};
use tracing::debug;
use trefle_ast::Program;
use trefle_parser::FsLoader;
use trefle_vm::Vm;

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande décodée par `main.rs`.
#[derive(Clone, Debug)]
pub enum Command {
    /// Exécute un programme.
    Run(Input),
    /// Boucle interactive : chaque ligne est un programme complet.
    Repl(ReplTask),
    /// Liste les tokens d'une source.
    Tokens(DumpTask),
    /// Affiche l'AST d'une source.
    Ast(DumpTask),
    /// Compile puis désassemble une source.
    Disasm(Input),
}

/// Source d'entrée : fichier ou `-` (= stdin).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Input {
    /// Fichier, lu via le chargeur du système de fichiers.
    Path(PathBuf),
    /// Entrée standard.
    #[default]
    Stdin,
}

impl Input {
    /// `-` désigne stdin, tout le reste un chemin.
    pub fn from_arg(arg: Option<PathBuf>) -> Self {
        match arg {
            Some(path) if path.as_os_str() != "-" => Self::Path(path),
            _ => Self::Stdin,
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// Options du REPL.
#[derive(Clone, Debug)]
pub struct ReplTask {
    /// Invite affichée avant chaque ligne.
    pub prompt: String,
}

impl Default for ReplTask {
    fn default() -> Self {
        Self { prompt: DEFAULT_PROMPT.to_owned() }
    }
}

/// Invite par défaut du REPL.
pub const DEFAULT_PROMPT: &str = "trefle> ";

/// Options des dumps `tokens` / `ast`.
#[derive(Clone, Debug, Default)]
pub struct DumpTask {
    /// Source.
    pub input: Input,
    /// Sortie JSON (feature `json`).
    pub json: bool,
}

/// Sortie partagée : le CLI et la VM écrivent au même endroit, dans l'ordre.
#[derive(Clone)]
pub struct Output {
    sink: Rc<RefCell<dyn Write>>,
}

impl Output {
    /// Sortie standard du processus.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Sortie arbitraire (tests, fichiers).
    pub fn new(sink: impl Write + 'static) -> Self {
        Self { sink: Rc::new(RefCell::new(sink)) }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.borrow_mut().flush()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Output")
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute `cmd` en écrivant sur `out`. Retourne un code de sortie.
pub fn execute(cmd: Command, out: &Output) -> Result<i32> {
    match cmd {
        Command::Run(input) => {
            let (name, program) = load(&input)?;
            let result = run_program(&name, &program, out)?;
            if !result.is_empty() {
                writeln!(out.clone(), "{result}")?;
            }
            Ok(0)
        },
        Command::Repl(task) => {
            let stdin = io::stdin();
            repl(&task.prompt, &mut stdin.lock(), out)
        },
        Command::Tokens(task) => {
            let (name, source) = read_source(&task.input)?;
            tokens(&name, &source, task.json, out)?;
            Ok(0)
        },
        Command::Ast(task) => {
            let (_, program) = load(&task.input)?;
            ast(&program, task.json, out)?;
            Ok(0)
        },
        Command::Disasm(input) => {
            let (_, program) = load(&input)?;
            let context = trefle_compiler::compile(&program).context("compilation")?;
            write!(out.clone(), "{}", context.dump())?;
            Ok(0)
        },
    }
}

/// Compile et exécute `program` avec la stdlib installée.
///
/// Renvoie la forme affichable du résultat, vide si le programme s'évalue à `null`.
pub fn run_program(name: &str, program: &Program, out: &Output) -> Result<String> {
    let context = trefle_compiler::compile(program).with_context(|| format!("compilation de {name}"))?;
    let mut vm = Vm::new(context).with_stdout(out.clone());
    trefle_stdlib::install(&mut vm);
    let result = vm.run().with_context(|| format!("exécution de {name}"))?;
    debug!(%name, "program finished");
    Ok(if result.is_null() { String::new() } else { result.to_string() })
}

/// Boucle interactive : lit une ligne, l'exécute dans une VM neuve, affiche le résultat.
///
/// `exit` ou la fin de l'entrée termine la boucle. Une erreur est affichée puis la boucle continue.
pub fn repl(prompt: &str, input: &mut dyn BufRead, out: &Output) -> Result<i32> {
    let mut out = out.clone();
    let mut line = String::new();
    loop {
        write!(out, "{prompt}")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(0);
        }
        let source = line.trim_end();
        match source {
            "exit" => return Ok(0),
            "" => continue,
            _ => {},
        }
        let outcome = trefle_parser::parse("<repl>", source)
            .map_err(anyhow::Error::from)
            .and_then(|program| run_program("<repl>", &program, &out));
        match outcome {
            Ok(result) if result.is_empty() => writeln!(out, "null")?,
            Ok(result) => writeln!(out, "{result}")?,
            Err(err) => report(&err),
        }
    }
}

fn tokens(name: &str, source: &str, json: bool, out: &Output) -> Result<()> {
    let mut out = out.clone();
    let tokens = trefle_lexer::tokenize(name, source);
    if json {
        return write_json(&tokens, &mut out);
    }
    for token in &tokens {
        writeln!(out, "{:>4}  {:<12} {}", token.position.line, token.kind.to_string(), token.lexeme)?;
    }
    Ok(())
}

fn ast(program: &Program, json: bool, out: &Output) -> Result<()> {
    let mut out = out.clone();
    if json {
        return write_json(program, &mut out);
    }
    writeln!(out, "{program:#?}")?;
    Ok(())
}

#[cfg(feature = "json")]
fn write_json<T: serde::Serialize + ?Sized>(value: &T, out: &mut Output) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("sérialisation JSON")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(not(feature = "json"))]
fn write_json<T: ?Sized>(_: &T, _: &mut Output) -> Result<()> {
    anyhow::bail!("sortie JSON indisponible : recompile `trefle-cli` avec la feature `json`")
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

/// Lit et parse `input` ; un fichier passe par [`FsLoader`].
pub fn load(input: &Input) -> Result<(String, Program)> {
    match input {
        Input::Path(path) => {
            let name = path.to_string_lossy().into_owned();
            let program = trefle_parser::parse_file(&FsLoader, &name).with_context(|| format!("chargement de {name}"))?;
            Ok((name, program))
        },
        Input::Stdin => {
            let (name, source) = read_source(input)?;
            let program = trefle_parser::parse(&name, &source)?;
            Ok((name, program))
        },
    }
}

fn read_source(input: &Input) -> Result<(String, String)> {
    match input {
        Input::Stdin => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source).context("lecture de stdin")?;
            Ok((input.to_string(), source))
        },
        Input::Path(path) => {
            let source =
                std::fs::read_to_string(path).with_context(|| format!("ouverture: {}", path.display()))?;
            Ok((input.to_string(), source))
        },
    }
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

/// Affiche une erreur (et ses causes) sur stderr.
pub fn report(err: &anyhow::Error) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {err:#}", "error:".red().bold());
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("error: {err:#}");
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

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

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn script(src: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".tf").tempfile().unwrap();
        file.write_all(src.as_bytes()).unwrap();
        file
    }

    #[test]
    fn input_dash_is_stdin() {
        assert_eq!(Input::from_arg(None), Input::Stdin);
        assert_eq!(Input::from_arg(Some("-".into())), Input::Stdin);
        assert_eq!(Input::from_arg(Some("a.tf".into())), Input::Path("a.tf".into()));
    }

    #[test]
    fn run_prints_std_output_then_the_result() {
        let file = script("std.print('hello')\n1 + 2");
        let capture = Capture::default();
        let code = execute(Command::Run(Input::Path(file.path().into())), &Output::new(capture.clone())).unwrap();
        assert_eq!(code, 0);
        assert_eq!(capture.text(), "hello\n3\n");
    }

    #[test]
    fn run_reports_runtime_errors_with_position() {
        let file = script("local a = 1\na + true");
        let err = execute(Command::Run(Input::Path(file.path().into())), &Output::new(io::sink())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains(":2: can not add Integer and Boolean"), "{message}");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = execute(Command::Run(Input::Path("/nonexistent/x.tf".into())), &Output::new(io::sink()));
        assert!(err.is_err());
    }

    #[test]
    fn disasm_lists_main_and_functions() {
        let file = script("function f(a) a end");
        let capture = Capture::default();
        execute(Command::Disasm(Input::Path(file.path().into())), &Output::new(capture.clone())).unwrap();
        let text = capture.text();
        assert!(text.starts_with(";; main\n"), "{text}");
        assert!(text.contains("(1 parameter(s))"), "{text}");
    }

    #[test]
    fn tokens_one_per_line() {
        let file = script("local x = 1");
        let capture = Capture::default();
        let task = DumpTask { input: Input::Path(file.path().into()), json: false };
        execute(Command::Tokens(task), &Output::new(capture.clone())).unwrap();
        let text = capture.text();
        assert!(text.lines().count() >= 4, "{text}");
        assert!(text.lines().all(|l| l.trim_start().starts_with('1')), "{text}");
    }

    #[cfg(feature = "json")]
    #[test]
    fn ast_as_json() {
        let file = script("1 + 2");
        let capture = Capture::default();
        let task = DumpTask { input: Input::Path(file.path().into()), json: true };
        execute(Command::Ast(task), &Output::new(capture.clone())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&capture.text()).unwrap();
        assert!(value.is_object());
    }

    #[test]
    fn repl_runs_each_line_in_a_fresh_vm() {
        let capture = Capture::default();
        let mut input = io::Cursor::new("null\n1 + 1\n\nstd.print('hi')\nexit\n99\n");
        let code = repl("> ", &mut input, &Output::new(capture.clone())).unwrap();
        assert_eq!(code, 0);
        assert_eq!(capture.text(), "> null\n> 2\n> > hi\nhi\n> ");
    }

    #[test]
    fn repl_keeps_going_after_an_error() {
        let capture = Capture::default();
        let mut input = io::Cursor::new("1 +\n3\n");
        repl("> ", &mut input, &Output::new(capture.clone())).unwrap();
        assert_eq!(capture.text(), "> > 3\n> \n");
    }
}
