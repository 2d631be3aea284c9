//! trefle-lexer — analyse lexicale pour Trèfle
//!
//! Faits saillants :
//! - `Lexer::next_token()` paresseux, `Eof` renvoyé indéfiniment en fin d'entrée
//! - commentaires `#` jusqu'à la fin de ligne
//! - chaînes `'…'` / `"…"` copiées telles quelles (aucun échappement)
//! - entiers et flottants (un `.` ne prolonge un entier que s'il est suivi d'un chiffre, une seule fois)
//! - opérateurs en « maximal munch » : deux caractères, puis un
//! - un caractère inconnu produit un token `Invalid` porteur d'un message, le scan continue
//!
//! Exemple éclair :
//! ```
//! use trefle_lexer::{Lexer, TokenKind};
//!
//! let mut lx = Lexer::new("demo.tf", "local x = 1.5 # commentaire");
//! assert_eq!(lx.next_token().kind, TokenKind::Local);
//! assert_eq!(lx.next_token().lexeme, "x");
//! assert_eq!(lx.next_token().kind, TokenKind::Assign);
//! assert_eq!(lx.next_token().kind, TokenKind::Float);
//! assert_eq!(lx.next_token().kind, TokenKind::Eof);
//! ```

#![deny(missing_docs)]

use core::fmt;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::Serialize;

use trefle_core::Position;

/* ─────────────────────────── Tokens ─────────────────────────── */

/// Type de token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TokenKind {
    /// Fin d'entrée.
    Eof,
    /// Entrée non reconnue ; le message décrit le problème.
    Invalid(&'static str),

    /// Identifiant.
    Identifier,
    /// Littéral entier.
    Integer,
    /// Littéral flottant.
    Float,
    /// Littéral chaîne (lexème sans les guillemets).
    String,

    // Mots-clés
    /// `function`
    Function,
    /// `local`
    Local,
    /// `end`
    End,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `and` / `&&`
    And,
    /// `or` / `||`
    Or,
    /// `not` / `!`
    Not,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `class`
    Class,
    /// `extends`
    Extends,
    /// `return`
    Return,
    /// `base`
    Base,
    /// `this`
    This,
    /// `load`
    Load,

    // Symboles
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,
}

impl TokenKind {
    /// Mot-clé correspondant à `ident`, s'il y en a un.
    pub fn keyword(ident: &str) -> Option<Self> {
        Some(match ident {
            "function" => Self::Function,
            "local" => Self::Local,
            "end" => Self::End,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "class" => Self::Class,
            "extends" => Self::Extends,
            "return" => Self::Return,
            "base" => Self::Base,
            "this" => Self::This,
            "load" => Self::Load,
            _ => return None,
        })
    }

    fn symbol2(a: char, b: char) -> Option<Self> {
        Some(match (a, b) {
            ('=', '=') => Self::Equal,
            ('!', '=') => Self::NotEqual,
            ('<', '=') => Self::LessEqual,
            ('>', '=') => Self::GreaterEqual,
            ('&', '&') => Self::And,
            ('|', '|') => Self::Or,
            ('+', '=') => Self::PlusAssign,
            ('-', '=') => Self::MinusAssign,
            ('*', '=') => Self::StarAssign,
            ('/', '=') => Self::SlashAssign,
            _ => return None,
        })
    }

    fn symbol1(c: char) -> Option<Self> {
        Some(match c {
            '=' => Self::Assign,
            '+' => Self::Plus,
            '-' => Self::Minus,
            '*' => Self::Star,
            '/' => Self::Slash,
            '!' => Self::Not,
            '(' => Self::LeftParen,
            ')' => Self::RightParen,
            '[' => Self::LeftBracket,
            ']' => Self::RightBracket,
            '{' => Self::LeftBrace,
            '}' => Self::RightBrace,
            ',' => Self::Comma,
            ':' => Self::Colon,
            '.' => Self::Dot,
            '&' => Self::BitAnd,
            '|' => Self::BitOr,
            '<' => Self::Less,
            '>' => Self::Greater,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eof => "end of input",
            Self::Invalid(msg) => return write!(f, "invalid token ({msg})"),
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Function => "`function`",
            Self::Local => "`local`",
            Self::End => "`end`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::While => "`while`",
            Self::And => "`and`",
            Self::Or => "`or`",
            Self::Not => "`not`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Null => "`null`",
            Self::Class => "`class`",
            Self::Extends => "`extends`",
            Self::Return => "`return`",
            Self::Base => "`base`",
            Self::This => "`this`",
            Self::Load => "`load`",
            Self::Assign => "`=`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::LeftParen => "`(`",
            Self::RightParen => "`)`",
            Self::LeftBracket => "`[`",
            Self::RightBracket => "`]`",
            Self::LeftBrace => "`{`",
            Self::RightBrace => "`}`",
            Self::Comma => "`,`",
            Self::Colon => "`:`",
            Self::Dot => "`.`",
            Self::BitAnd => "`&`",
            Self::BitOr => "`|`",
            Self::Equal => "`==`",
            Self::NotEqual => "`!=`",
            Self::Less => "`<`",
            Self::Greater => "`>`",
            Self::LessEqual => "`<=`",
            Self::GreaterEqual => "`>=`",
            Self::PlusAssign => "`+=`",
            Self::MinusAssign => "`-=`",
            Self::StarAssign => "`*=`",
            Self::SlashAssign => "`/=`",
        };
        f.write_str(s)
    }
}

/// Token : type, texte source, position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Token {
    /// Type.
    pub kind: TokenKind,
    /// Texte (contenu sans guillemets pour une chaîne).
    pub lexeme: String,
    /// Fichier + ligne de début.
    pub position: Position,
}

impl Token {
    /// Vrai si le token est de type `kind`.
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Scanner paresseux sur une source UTF-8.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    file: Rc<str>,
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    /// Crée un lexer sur `source`, attribué au fichier `file`.
    pub fn new(file: impl Into<Rc<str>>, source: &'a str) -> Self {
        Self { src: source, file: file.into(), pos: 0, line: 1 }
    }

    /// Nom du fichier courant.
    pub fn file(&self) -> &Rc<str> {
        &self.file
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    #[inline]
    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Token {
        Token { kind, lexeme: lexeme.into(), position: Position { file: Rc::clone(&self.file), line } }
    }

    /// Renvoie le prochain token ; `Eof` indéfiniment une fois la source épuisée.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let line = self.line;
        let start = self.pos;

        let Some(c) = self.bump() else {
            return self.token(TokenKind::Eof, "", line);
        };

        if c.is_ascii_alphabetic() || c == '_' {
            while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == '_') {
                self.bump();
            }
            let text = &self.src[start..self.pos];
            let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
            return self.token(kind, text, line);
        }

        if c.is_ascii_digit() {
            let mut kind = TokenKind::Integer;
            loop {
                match self.peek() {
                    Some(ch) if ch.is_ascii_digit() => {
                        self.bump();
                    },
                    Some('.')
                        if kind == TokenKind::Integer
                            && self.peek2().is_some_and(|d| d.is_ascii_digit()) =>
                    {
                        kind = TokenKind::Float;
                        self.bump();
                    },
                    _ => break,
                }
            }
            return self.token(kind, &self.src[start..self.pos], line);
        }

        if c == '"' || c == '\'' {
            let body = self.pos;
            loop {
                match self.bump() {
                    Some(ch) if ch == c => {
                        let text = &self.src[body..self.pos - c.len_utf8()];
                        return self.token(TokenKind::String, text, line);
                    },
                    Some(_) => {},
                    None => {
                        return self.token(
                            TokenKind::Invalid("unterminated string"),
                            &self.src[start..self.pos],
                            line,
                        );
                    },
                }
            }
        }

        if let Some(kind) = self.peek().and_then(|n| TokenKind::symbol2(c, n)) {
            self.bump();
            return self.token(kind, &self.src[start..self.pos], line);
        }
        if let Some(kind) = TokenKind::symbol1(c) {
            return self.token(kind, &self.src[start..self.pos], line);
        }

        self.token(TokenKind::Invalid("unknown character"), &self.src[start..self.pos], line)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Itère jusqu'à `Eof` (exclu).
    fn next(&mut self) -> Option<Token> {
        let tok = self.next_token();
        (tok.kind != TokenKind::Eof).then_some(tok)
    }
}

/// Tokenise toute la source (sans le `Eof` final).
pub fn tokenize(file: &str, source: &str) -> Vec<Token> {
    Lexer::new(file, source).collect()
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize("t.tf", src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("local function_ = function end classy class"),
            vec![Local, Identifier, Assign, Function, End, Identifier, Class]
        );
        // `constructor` et `new` ne sont pas réservés
        assert_eq!(kinds("constructor new"), vec![Identifier, Identifier]);
    }

    #[test]
    fn float_continuation_rule() {
        use TokenKind::*;
        assert_eq!(kinds("1.5"), vec![Float]);
        assert_eq!(kinds("1.2.3"), vec![Float, Dot, Integer]);
        assert_eq!(kinds("1.x"), vec![Integer, Dot, Identifier]);
        assert_eq!(kinds("7."), vec![Integer, Dot]);
        let toks = tokenize("t.tf", "12.75");
        assert_eq!(toks[0].lexeme, "12.75");
    }

    #[test]
    fn maximal_munch() {
        use TokenKind::*;
        assert_eq!(
            kinds("<= < = == != ! += - -= && & || |"),
            vec![
                LessEqual, Less, Assign, Equal, NotEqual, Not, PlusAssign, Minus, MinusAssign, And,
                BitAnd, Or, BitOr
            ]
        );
        assert_eq!(kinds("a>=b"), vec![Identifier, GreaterEqual, Identifier]);
    }

    #[test]
    fn strings_are_verbatim() {
        let toks = tokenize("t.tf", r#"'a\n"b' "it's""#);
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].kind, TokenKind::String);
        assert_eq!(toks[0].lexeme, r#"a\n"b"#);
        assert_eq!(toks[1].lexeme, "it's");
    }

    #[test]
    fn unterminated_string_is_invalid() {
        let toks = tokenize("t.tf", "'abc");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Invalid("unterminated string"));
    }

    #[test]
    fn comments_and_lines() {
        let toks = tokenize("t.tf", "a # ignoré\n\n  b # fin");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].position.line, 1);
        assert_eq!(toks[1].position.line, 3);
        assert_eq!(&*toks[1].position.file, "t.tf");
    }

    #[test]
    fn unknown_character_does_not_stop_the_scan() {
        let toks = tokenize("t.tf", "a $ b");
        assert_eq!(toks[1].kind, TokenKind::Invalid("unknown character"));
        assert_eq!(toks[1].lexeme, "$");
        assert_eq!(toks[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn eof_repeats() {
        let mut lx = Lexer::new("t.tf", "x");
        assert_eq!(lx.next_token().kind, TokenKind::Identifier);
        for _ in 0..3 {
            assert_eq!(lx.next_token().kind, TokenKind::Eof);
        }
    }

    proptest! {
        #[test]
        fn scanning_always_terminates(src in "[ -~\n]{0,80}") {
            let toks = tokenize("p.tf", &src);
            let newlines = u32::try_from(src.matches('\n').count()).unwrap();
            for t in &toks {
                prop_assert!(t.position.line >= 1 && t.position.line <= newlines + 1);
            }
        }

        #[test]
        fn identifiers_roundtrip(name in "[a-z_][a-z0-9_]{0,12}") {
            prop_assume!(TokenKind::keyword(&name).is_none());
            let toks = tokenize("p.tf", &name);
            prop_assert_eq!(toks.len(), 1);
            prop_assert_eq!(&toks[0].lexeme, &name);
            prop_assert_eq!(toks[0].kind, TokenKind::Identifier);
        }

        #[test]
        fn integers_roundtrip(n in 0u32..1_000_000) {
            let toks = tokenize("p.tf", &n.to_string());
            prop_assert_eq!(toks[0].kind, TokenKind::Integer);
            prop_assert_eq!(toks[0].lexeme.parse::<u32>().unwrap(), n);
        }
    }
}
