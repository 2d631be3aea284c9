//! Chargement des sources : capacité abstraite « charger un fichier par son nom ».

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use crate::ParseError;

/// Fournit le texte source d'un fichier.
///
/// `base` est le fichier depuis lequel la demande est faite (vide pour le chargement initial),
/// `target` le nom demandé.
pub trait FileLoader {
    /// Charge `target`, éventuellement relativement à `base`.
    fn load_file(&self, base: &str, target: &str) -> io::Result<String>;
}

/// Chargeur par défaut : système de fichiers, chemins relatifs au dossier de `base`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FsLoader {
    /// Chemin effectif de `target` vu depuis `base`.
    pub fn resolve(base: &str, target: &str) -> PathBuf {
        let target = Path::new(target);
        if base.is_empty() || target.is_absolute() {
            return target.to_path_buf();
        }
        Path::new(base).parent().map_or_else(|| target.to_path_buf(), |dir| dir.join(target))
    }
}

impl FileLoader for FsLoader {
    fn load_file(&self, base: &str, target: &str) -> io::Result<String> {
        std::fs::read_to_string(Self::resolve(base, target))
    }
}

impl<F> FileLoader for F
where
    F: Fn(&str, &str) -> io::Result<String>,
{
    fn load_file(&self, base: &str, target: &str) -> io::Result<String> {
        self(base, target)
    }
}

/// Échec de [`crate::parse_file`] : lecture ou syntaxe.
#[derive(Debug)]
pub enum LoadError {
    /// Le chargeur n'a pas pu fournir la source.
    Io {
        /// Nom demandé.
        name: String,
        /// Cause.
        source: io::Error,
    },
    /// La source est syntaxiquement invalide.
    Parse(ParseError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { name, source } => write!(f, "cannot load `{name}`: {source}"),
            Self::Parse(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<ParseError> for LoadError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}
