// src/core/token.rs
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    // Identifiers and literals
    Identifier(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Boolean(bool),
    Null,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Assign,       // =
    ColonAssign,  // :=
    DoubleEquals, // ==
    NotEquals,    // !=
    LessThan,     // <
    LessEqual,    // <=
    GreaterThan,  // >
    GreaterEqual, // >=
    AndAnd,       // && y and
    OrOr,         // || o or
    Bang,         // ! no not

    // Delimiters
    OpenParen,    // (
    CloseParen,   // )
    OpenBrace,    // {
    CloseBrace,   // }
    OpenBracket,  // [
    CloseBracket, // ]
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    Dot,          // .
    At,           // @

    // Keywords
    Var,
    Variable,
    Func,
    Method,
    Attribute,
    If,
    Else,
    While,
    For,
    In,
    Import,
    Use,
    Macro,
    Thread,
    Async,
    Switch,
    Case,
    Class,
    Enum,
    Interface,
    Try,
    Catch,
    Throw,
    Finally,
    Print,
    Yield,
    Await,
    Break,
    Continue,
    Pass,
    Assert,
    Del,
    Global,
    NonLocal,
    Lambda,
    With,
    As,
    From,
    End,
    Return,
    Guard,
    Defer,
    Option,
    Holobit,
    Export,
    List,
    Dict,

    // Special
    Eof,
}

impl TokenKind {
    /// Keyword kinds that may not be used as plain names.
    pub fn is_keyword(&self) -> bool {
        !matches!(
            self,
            TokenKind::Identifier(_)
                | TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Boolean(_)
                | TokenKind::Null
                | TokenKind::Eof
        ) && self.to_string().chars().all(|c| c.is_alphabetic())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            column,
        }
    }

    pub fn eof(line: usize, column: usize) -> Self {
        Self::new(TokenKind::Eof, String::new(), line, column)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Integer(_) => "integer",
            TokenKind::Float(_) => "float",
            TokenKind::Str(_) => "string",
            TokenKind::Boolean(_) => "boolean",
            TokenKind::Null => "nulo",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::ColonAssign => ":=",
            TokenKind::DoubleEquals => "==",
            TokenKind::NotEquals => "!=",
            TokenKind::LessThan => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::At => "@",
            TokenKind::Var => "var",
            TokenKind::Variable => "variable",
            TokenKind::Func => "func",
            TokenKind::Method => "metodo",
            TokenKind::Attribute => "atributo",
            TokenKind::If => "si",
            TokenKind::Else => "sino",
            TokenKind::While => "mientras",
            TokenKind::For => "para",
            TokenKind::In => "in",
            TokenKind::Import => "import",
            TokenKind::Use => "usar",
            TokenKind::Macro => "macro",
            TokenKind::Thread => "hilo",
            TokenKind::Async => "asincronico",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Class => "clase",
            TokenKind::Enum => "enum",
            TokenKind::Interface => "interface",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Throw => "throw",
            TokenKind::Finally => "finalmente",
            TokenKind::Print => "imprimir",
            TokenKind::Yield => "yield",
            TokenKind::Await => "esperar",
            TokenKind::Break => "romper",
            TokenKind::Continue => "continuar",
            TokenKind::Pass => "pasar",
            TokenKind::Assert => "afirmar",
            TokenKind::Del => "eliminar",
            TokenKind::Global => "global",
            TokenKind::NonLocal => "nolocal",
            TokenKind::Lambda => "lambda",
            TokenKind::With => "con",
            TokenKind::As => "como",
            TokenKind::From => "desde",
            TokenKind::End => "fin",
            TokenKind::Return => "retorno",
            TokenKind::Guard => "garantia",
            TokenKind::Defer => "defer",
            TokenKind::Option => "option",
            TokenKind::Holobit => "holobit",
            TokenKind::Export => "export",
            TokenKind::List => "lista",
            TokenKind::Dict => "diccionario",
            TokenKind::Eof => "end of file",
        };
        write!(f, "{}", name)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TokenKind::Identifier(name) => write!(f, "Identifier('{}') @{}:{}", name, self.line, self.column),
            TokenKind::Integer(v) => write!(f, "Integer({}) @{}:{}", v, self.line, self.column),
            TokenKind::Float(v) => write!(f, "Float({}) @{}:{}", v, self.line, self.column),
            TokenKind::Str(s) => write!(f, "String(\"{}\") @{}:{}", s, self.line, self.column),
            TokenKind::Boolean(b) => write!(f, "Boolean({}) @{}:{}", b, self.line, self.column),
            other => write!(f, "{} @{}:{}", other, self.line, self.column),
        }
    }
}
