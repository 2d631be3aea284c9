//! `trefle` — CLI principal de Trèfle
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation des traces,
//! et délégation à `trefle_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trefle_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "trefle", version, about = "Trèfle : exécuter, explorer et désassembler des scripts", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (erreurs seulement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Exécuter un script (stdlib `std` installée)
    Run {
        /// Fichier source (ou - pour stdin)
        file: Option<PathBuf>,
    },

    /// Boucle interactive (`exit` pour quitter)
    Repl {
        /// Invite
        #[arg(long, default_value = cli::DEFAULT_PROMPT)]
        prompt: String,
    },

    /// Lister les tokens d'une source
    Tokens {
        /// Fichier source (ou - pour stdin)
        file: Option<PathBuf>,
        /// Sortie JSON
        #[arg(long)]
        json: bool,
    },

    /// Afficher l'AST d'une source
    Ast {
        /// Fichier source (ou - pour stdin)
        file: Option<PathBuf>,
        /// Sortie JSON
        #[arg(long)]
        json: bool,
    },

    /// Compiler puis désassembler une source
    Disasm {
        /// Fichier source (ou - pour stdin)
        file: Option<PathBuf>,
    },
}

// ──────────────────────────── Traces / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            cli::report(&e);
            ExitCode::FAILURE
        },
    }
}

fn real_main() -> Result<i32> {
    let opt = Opt::parse();
    init_telemetry(opt.verbose, opt.quiet);

    let command = match opt.cmd {
        Command::Run { file } => cli::Command::Run(cli::Input::from_arg(file)),
        Command::Repl { prompt } => cli::Command::Repl(cli::ReplTask { prompt }),
        Command::Tokens { file, json } => {
            cli::Command::Tokens(cli::DumpTask { input: cli::Input::from_arg(file), json })
        },
        Command::Ast { file, json } => cli::Command::Ast(cli::DumpTask { input: cli::Input::from_arg(file), json }),
        Command::Disasm { file } => cli::Command::Disasm(cli::Input::from_arg(file)),
    };

    cli::execute(command, &cli::Output::stdout())
}
