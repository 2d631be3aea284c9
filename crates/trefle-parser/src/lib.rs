//! trefle-parser — parseur du langage Trèfle
//!
//! Branches :
//! - `trefle-lexer` pour la tokenisation
//! - `trefle-core` pour `Position`
//! - `trefle-ast` pour l'AST cible
//!
//! Grammaire (essentiel) :
//! ```text
//! program   := expr*                                  (jusqu'à un terminateur)
//! expr      := prefix (infix)*                        (Pratt)
//! prefix    := IDENT | INT | FLOAT | STRING | true | false | null | this | base
//!            | ("-" | "not" | "!") expr
//!            | "(" expr ")"
//!            | "local" IDENT ("=" expr)?
//!            | "function" IDENT? "(" params? ")" program "end"
//!            | "class" IDENT? ("extends" expr)? (IDENT "=" expr)* "end"
//!            | "if" "(" expr ")" program ("else" program)? "end"
//!            | "while" "(" expr ")" program "end"
//!            | "return" expr?                         (valeur seulement sur la même ligne)
//!            | "[" (expr ("," expr)*)? "]"
//!            | "{" (key ":" expr ("," key ":" expr)*)? "}"
//! infix     := binop expr | assignop expr | "(" args ")" | "." IDENT | "[" expr "]"
//! params    := IDENT ("=" expr)? ("," IDENT ("=" expr)?)*
//! ```
//!
//! Précédences (faible → forte) : affectation < `and`/`or` < égalité < comparaison
//! < addition < multiplication (`* / & |`) < préfixe < appel/accès membre.

#![deny(missing_docs)]

use core::fmt;
use std::collections::HashSet;

use trefle_ast::{
    BinaryOp, Class, Expr, ExprKind, Function, Literal, MapEntry, Member, Param, Program, UnaryOp,
};
use trefle_core::Position;
use trefle_lexer::{Lexer, Token, TokenKind};

/// Chargement des sources.
pub mod loader;

pub use loader::{FileLoader, FsLoader, LoadError};

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreur de parsing : ce qui était attendu, ce qui a été trouvé, où.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Description de ce qui était attendu.
    pub expected: String,
    /// Description du token trouvé.
    pub found: String,
    /// Position du token fautif.
    pub position: Position,
}

impl ParseError {
    fn new(expected: impl Into<String>, found: impl Into<String>, position: Position) -> Self {
        Self { expected: expected.into(), found: found.into(), position }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, found {}", self.position, self.expected, self.found)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

/* ─────────────────────────── Précédences ─────────────────────────── */

/// Niveaux de précédence, du plus faible au plus fort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Assign,
    Boolean,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
}

fn infix_precedence(kind: TokenKind) -> Prec {
    use TokenKind as T;
    match kind {
        T::Assign | T::PlusAssign | T::MinusAssign | T::StarAssign | T::SlashAssign => Prec::Assign,
        T::And | T::Or => Prec::Boolean,
        T::Equal | T::NotEqual => Prec::Equals,
        T::Less | T::Greater | T::LessEqual | T::GreaterEqual => Prec::LessGreater,
        T::Plus | T::Minus => Prec::Sum,
        T::Star | T::Slash | T::BitAnd | T::BitOr => Prec::Product,
        T::LeftParen | T::LeftBracket | T::Dot => Prec::Call,
        _ => Prec::Lowest,
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind as T;
    Some(match kind {
        T::Plus => BinaryOp::Add,
        T::Minus => BinaryOp::Sub,
        T::Star => BinaryOp::Mul,
        T::Slash => BinaryOp::Div,
        T::Equal => BinaryOp::Equal,
        T::NotEqual => BinaryOp::NotEqual,
        T::Less => BinaryOp::Less,
        T::Greater => BinaryOp::Greater,
        T::LessEqual => BinaryOp::LessEqual,
        T::GreaterEqual => BinaryOp::GreaterEqual,
        T::And | T::BitAnd => BinaryOp::And,
        T::Or | T::BitOr => BinaryOp::Or,
        _ => return None,
    })
}

fn compound_op(kind: TokenKind) -> Option<Option<BinaryOp>> {
    use TokenKind as T;
    Some(match kind {
        T::Assign => None,
        T::PlusAssign => Some(BinaryOp::Add),
        T::MinusAssign => Some(BinaryOp::Sub),
        T::StarAssign => Some(BinaryOp::Mul),
        T::SlashAssign => Some(BinaryOp::Div),
        _ => return None,
    })
}

/// Vrai si `kind` a une règle préfixe (peut commencer une expression).
fn starts_expression(kind: TokenKind) -> bool {
    use TokenKind as T;
    matches!(
        kind,
        T::Identifier
            | T::Integer
            | T::Float
            | T::String
            | T::True
            | T::False
            | T::Null
            | T::This
            | T::Base
            | T::Minus
            | T::Not
            | T::LeftParen
            | T::LeftBracket
            | T::LeftBrace
            | T::If
            | T::While
            | T::Local
            | T::Function
            | T::Class
            | T::Return
    )
}

/* ─────────────────────────── Parser ─────────────────────────── */

/// Parser Trèfle (anticipation : token courant + suivant).
pub struct Parser<'a> {
    lx: Lexer<'a>,
    cur: Token,
    peek: Token,
    /// Ligne du dernier token consommé.
    prev_line: u32,
}

impl<'a> Parser<'a> {
    /// Crée un parser sur `source`, attribué à `file`.
    pub fn new(file: &str, source: &'a str) -> Self {
        let mut lx = Lexer::new(file, source);
        let cur = lx.next_token();
        let peek = lx.next_token();
        Self { lx, cur, peek, prev_line: 1 }
    }

    /// Parse un programme complet (jusqu'à la fin de l'entrée).
    pub fn parse_program(&mut self) -> PResult<Program> {
        self.parse_block(&[TokenKind::Eof])
    }

    /* ─────────── Curseur ─────────── */

    fn bump(&mut self) -> Token {
        let next = self.lx.next_token();
        let prev = std::mem::replace(&mut self.cur, std::mem::replace(&mut self.peek, next));
        self.prev_line = prev.position.line;
        prev
    }

    #[inline]
    fn check(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            Err(self.err_here(kind.to_string()))
        }
    }

    fn expect_ident(&mut self) -> PResult<Token> {
        self.expect(TokenKind::Identifier)
    }

    fn err_here(&self, expected: impl Into<String>) -> ParseError {
        ParseError::new(expected, describe(&self.cur), self.cur.position.clone())
    }

    /* ─────────── Blocs ─────────── */

    /// Expressions jusqu'à l'un des `terminators` (non consommé).
    fn parse_block(&mut self, terminators: &[TokenKind]) -> PResult<Program> {
        let mut expressions = Vec::new();
        loop {
            if terminators.contains(&self.cur.kind) {
                return Ok(Program::new(expressions));
            }
            if self.check(TokenKind::Eof) {
                return Err(self.err_here(expected_list(terminators)));
            }
            expressions.push(self.parse_expression(Prec::Lowest)?);
        }
    }

    /// Liste séparée par des virgules, fermée par `close` (consommé).
    fn comma_list<T>(
        &mut self,
        close: TokenKind,
        what: &str,
        mut item: impl FnMut(&mut Self) -> PResult<T>,
    ) -> PResult<Vec<T>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat(TokenKind::Comma) {
                if self.check(close) {
                    return Err(self.err_here(what.to_string()));
                }
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    /* ─────────── Pratt ─────────── */

    fn parse_expression(&mut self, bound: Prec) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;
        loop {
            let kind = self.cur.kind;
            // `(` et `[` en début de ligne ouvrent une nouvelle expression
            let postfix_on_new_line = matches!(kind, TokenKind::LeftParen | TokenKind::LeftBracket)
                && self.cur.position.line != self.prev_line;
            if postfix_on_new_line || bound >= infix_precedence(kind) {
                return Ok(left);
            }
            left = self.parse_infix(left)?;
        }
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        use TokenKind as T;
        let pos = self.cur.position.clone();
        match self.cur.kind {
            T::Identifier => {
                let tok = self.bump();
                Ok(Expr::new(ExprKind::Identifier(tok.lexeme), pos))
            },
            T::Integer => {
                let tok = self.bump();
                let value = tok.lexeme.parse::<i64>().map_err(|_| {
                    ParseError::new("64-bit integer", format!("`{}`", tok.lexeme), pos.clone())
                })?;
                literal(Literal::Integer(value), pos)
            },
            T::Float => {
                let tok = self.bump();
                let value = tok.lexeme.parse::<f64>().map_err(|_| {
                    ParseError::new("float literal", format!("`{}`", tok.lexeme), pos.clone())
                })?;
                literal(Literal::Float(value), pos)
            },
            T::String => {
                let tok = self.bump();
                literal(Literal::String(tok.lexeme), pos)
            },
            T::True | T::False => {
                let tok = self.bump();
                literal(Literal::Boolean(tok.kind == T::True), pos)
            },
            T::Null => {
                self.bump();
                literal(Literal::Null, pos)
            },
            T::This => {
                self.bump();
                Ok(Expr::new(ExprKind::This, pos))
            },
            T::Base => {
                self.bump();
                Ok(Expr::new(ExprKind::Base, pos))
            },
            T::Minus | T::Not => {
                let op = if self.bump().kind == T::Minus { UnaryOp::Negate } else { UnaryOp::Not };
                let expr = self.parse_expression(Prec::Prefix)?;
                Ok(Expr::new(ExprKind::Prefix { op, expr: Box::new(expr) }, pos))
            },
            T::LeftParen => {
                self.bump();
                let inner = self.parse_expression(Prec::Lowest)?;
                self.expect(T::RightParen)?;
                Ok(inner)
            },
            T::LeftBracket => self.parse_array(),
            T::LeftBrace => self.parse_map(),
            T::If => self.parse_if(),
            T::While => self.parse_while(),
            T::Local => self.parse_local(),
            T::Function => self.parse_function(),
            T::Class => self.parse_class(),
            T::Return => self.parse_return(),
            T::Load => Err(self.err_here("expression (nested `load` is not supported)")),
            _ => Err(self.err_here("expression")),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> PResult<Expr> {
        use TokenKind as T;
        let pos = self.cur.position.clone();
        let kind = self.cur.kind;

        if let Some(op) = compound_op(kind) {
            self.bump();
            // affectation associative à droite
            let value = self.parse_expression(Prec::Lowest)?;
            return Ok(Expr::new(
                ExprKind::Assign { target: Box::new(left), op, value: Box::new(value) },
                pos,
            ));
        }

        if let Some(op) = binary_op(kind) {
            self.bump();
            let right = self.parse_expression(infix_precedence(kind))?;
            return Ok(Expr::new(
                ExprKind::Binary { left: Box::new(left), op, right: Box::new(right) },
                pos,
            ));
        }

        match kind {
            T::LeftParen => {
                self.bump();
                let args = self.comma_list(T::RightParen, "argument after `,`", |p| {
                    p.parse_expression(Prec::Lowest)
                })?;
                Ok(Expr::new(ExprKind::Call { callee: Box::new(left), args }, pos))
            },
            T::Dot => {
                self.bump();
                let name = self.expect_ident()?;
                let key = Expr::new(ExprKind::Literal(Literal::String(name.lexeme)), name.position);
                Ok(Expr::new(ExprKind::Member { target: Box::new(left), key: Box::new(key) }, pos))
            },
            T::LeftBracket => {
                self.bump();
                let key = self.parse_expression(Prec::Lowest)?;
                self.expect(T::RightBracket)?;
                Ok(Expr::new(ExprKind::Member { target: Box::new(left), key: Box::new(key) }, pos))
            },
            _ => Err(self.err_here("operator")),
        }
    }

    /* ─────────── Formes préfixes ─────────── */

    fn parse_array(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::LeftBracket)?.position;
        let items = self.comma_list(TokenKind::RightBracket, "element after `,`", |p| {
            p.parse_expression(Prec::Lowest)
        })?;
        Ok(Expr::new(ExprKind::Array(items), pos))
    }

    fn parse_map(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::LeftBrace)?.position;
        let mut seen = HashSet::new();
        let entries = self.comma_list(TokenKind::RightBrace, "entry after `,`", |p| {
            let key = if p.check(TokenKind::Identifier) || p.check(TokenKind::String) {
                p.bump()
            } else {
                return Err(p.err_here("map key (identifier or string)"));
            };
            if !seen.insert(key.lexeme.clone()) {
                return Err(ParseError::new(
                    "unique map key",
                    format!("duplicate key `{}`", key.lexeme),
                    key.position,
                ));
            }
            p.expect(TokenKind::Colon)?;
            let value = p.parse_expression(Prec::Lowest)?;
            Ok(MapEntry { key: key.lexeme, value })
        })?;
        Ok(Expr::new(ExprKind::Map(entries), pos))
    }

    fn parse_if(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::If)?.position;
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expression(Prec::Lowest)?;
        self.expect(TokenKind::RightParen)?;
        let then_branch = self.parse_block(&[TokenKind::Else, TokenKind::End])?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_block(&[TokenKind::End])?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(Expr::new(ExprKind::If { condition: Box::new(condition), then_branch, else_branch }, pos))
    }

    fn parse_while(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::While)?.position;
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expression(Prec::Lowest)?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_block(&[TokenKind::End])?;
        self.expect(TokenKind::End)?;
        Ok(Expr::new(ExprKind::While { condition: Box::new(condition), body }, pos))
    }

    fn parse_local(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::Local)?.position;
        let name = self.expect_ident()?.lexeme;
        let value = if self.eat(TokenKind::Assign) {
            Some(Box::new(self.parse_expression(Prec::Lowest)?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Local { name, value }, pos))
    }

    fn parse_function(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::Function)?.position;
        let name = if self.check(TokenKind::Identifier) { Some(self.bump().lexeme) } else { None };

        self.expect(TokenKind::LeftParen)?;
        let mut seen = HashSet::new();
        let params = self.comma_list(TokenKind::RightParen, "parameter after `,`", |p| {
            let tok = p.expect_ident()?;
            if !seen.insert(tok.lexeme.clone()) {
                return Err(ParseError::new(
                    "unique parameter name",
                    format!("duplicate parameter `{}`", tok.lexeme),
                    tok.position,
                ));
            }
            let default =
                if p.eat(TokenKind::Assign) { Some(p.parse_expression(Prec::Lowest)?) } else { None };
            Ok(Param { name: tok.lexeme, default, position: tok.position })
        })?;

        let body = self.parse_block(&[TokenKind::End])?;
        self.expect(TokenKind::End)?;

        let function = Expr::new(ExprKind::Function(Function { params, body }), pos.clone());
        Ok(declare(name, function, pos))
    }

    fn parse_class(&mut self) -> PResult<Expr> {
        let pos = self.expect(TokenKind::Class)?.position;
        // `class Nom …` : un identifiant non suivi de `=` nomme la classe
        let name = if self.check(TokenKind::Identifier) && self.peek.kind != TokenKind::Assign {
            Some(self.bump().lexeme)
        } else {
            None
        };

        let parent = if self.eat(TokenKind::Extends) {
            Some(Box::new(self.parse_expression(Prec::Lowest)?))
        } else {
            None
        };

        let mut members: Vec<Member> = Vec::new();
        while !self.check(TokenKind::End) {
            if self.check(TokenKind::Eof) {
                return Err(self.err_here(TokenKind::End.to_string()));
            }
            let tok = self.expect_ident()?;
            if members.iter().any(|m| m.name == tok.lexeme) {
                return Err(ParseError::new(
                    "unique member name",
                    format!("duplicate member `{}`", tok.lexeme),
                    tok.position,
                ));
            }
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expression(Prec::Lowest)?;
            members.push(Member { name: tok.lexeme, value, position: tok.position });
        }
        self.expect(TokenKind::End)?;

        let class = Expr::new(ExprKind::Class(Class { parent, members }), pos.clone());
        Ok(bind(name, class, pos))
    }

    fn parse_return(&mut self) -> PResult<Expr> {
        let tok = self.expect(TokenKind::Return)?;
        let line = tok.position.line;
        let value = if self.cur.position.line == line && starts_expression(self.cur.kind) {
            Some(Box::new(self.parse_expression(Prec::Lowest)?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Return(value), tok.position))
    }
}

#[allow(clippy::unnecessary_wraps)]
fn literal(value: Literal, pos: Position) -> PResult<Expr> {
    Ok(Expr::new(ExprKind::Literal(value), pos))
}

/// `function nom(…)` → `local nom = …`.
fn declare(name: Option<String>, value: Expr, pos: Position) -> Expr {
    match name {
        Some(name) => Expr::new(ExprKind::Local { name, value: Some(Box::new(value)) }, pos),
        None => value,
    }
}

/// `class Nom …` → `Nom = class …` : globale au niveau racine, donc visible depuis les membres.
fn bind(name: Option<String>, value: Expr, pos: Position) -> Expr {
    match name {
        Some(name) => {
            let target = Expr::new(ExprKind::Identifier(name), pos.clone());
            Expr::new(ExprKind::Assign { target: Box::new(target), op: None, value: Box::new(value) }, pos)
        },
        None => value,
    }
}

fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Invalid(msg) => format!("{msg} `{}`", tok.lexeme),
        TokenKind::String => format!("string '{}'", tok.lexeme),
        _ => format!("`{}`", tok.lexeme),
    }
}

fn expected_list(kinds: &[TokenKind]) -> String {
    kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or ")
}

/* ─────────────────────────── Points d'entrée ─────────────────────────── */

/// Parse `source`, attribué au fichier `name`.
pub fn parse(name: &str, source: &str) -> Result<Program, ParseError> {
    Parser::new(name, source).parse_program()
}

/// Charge `name` via `loader` (chargement initial, base vide) puis le parse.
pub fn parse_file(loader: &dyn FileLoader, name: &str) -> Result<Program, LoadError> {
    let source = loader
        .load_file("", name)
        .map_err(|source| LoadError::Io { name: name.to_string(), source })?;
    Ok(parse(name, &source)?)
}

/* ─────────────────────────── Tests ─────────────────────────── */
