//! Token model and the ordered token-pattern table
//!
//! Patterns are matched strictly in declaration order and the first match
//! wins, so longer operators precede their prefixes and keywords carry a
//! trailing word-boundary assertion (`returned` is an identifier, not
//! `return` followed by `ed`). Identifier patterns come last among the
//! non-literal patterns.

use std::sync::OnceLock;

use regex::Regex;
use stackc_core::NumberType;

/// Byte span of a token inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// Smallest span covering both operands.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// The closed, ordered set of token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    FloatLiteral,
    IntLiteral,
    CharLiteral,
    StringLiteral,

    // Keywords (C89 minus `register` and `volatile`)
    Auto,
    Break,
    Case,
    Char,
    Const,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    Float,
    For,
    Goto,
    If,
    Int,
    Long,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,
    While,

    // Operators, longest first
    ShlAssign,
    ShrAssign,
    Ellipsis,
    Arrow,
    Increment,
    Decrement,
    Shl,
    Shr,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    BangEqual,
    AmpAmp,
    PipePipe,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    CaretAssign,
    PipeAssign,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,
    Colon,
    Question,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Less,
    Greater,
    Assign,

    Identifier,
    EndOfFile,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            TokenKind::FloatLiteral => "a floating literal",
            TokenKind::IntLiteral => "an integer literal",
            TokenKind::CharLiteral => "a character literal",
            TokenKind::StringLiteral => "a string literal",
            TokenKind::Identifier => "an identifier",
            TokenKind::EndOfFile => "end of file",
            other => {
                return match fixed_text(*other) {
                    Some(text) => write!(f, "'{}'", text),
                    None => write!(f, "{:?}", other),
                };
            }
        };
        write!(f, "{}", description)
    }
}

/// Source text of keyword and operator kinds.
fn fixed_text(kind: TokenKind) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .chain(OPERATORS.iter())
        .find(|(_, candidate)| *candidate == kind)
        .map(|&(text, _)| text)
}

/// Semantic value of a token, depending on its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// Identifiers, keywords, and operators carry their source text.
    Text(String),
    /// Integer literal with its suffix-derived type.
    Int { value: u64, ty: NumberType },
    /// Floating literal with its suffix-derived type.
    Float { value: f64, ty: NumberType },
    /// Decoded code point of a character literal.
    Char(u32),
    /// Decoded bytes of a string literal.
    Str(Vec<u8>),
    EndOfFile,
}

/// A `(type, value, span)` triple produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, value: TokenValue, span: Span) -> Token {
        Token { kind, value, span }
    }

    pub fn end_of_file(offset: usize) -> Token {
        Token {
            kind: TokenKind::EndOfFile,
            value: TokenValue::EndOfFile,
            span: Span::new(offset, offset),
        }
    }

    /// The text payload of identifier/keyword/operator tokens.
    pub fn text(&self) -> &str {
        match &self.value {
            TokenValue::Text(text) => text,
            _ => "",
        }
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("auto", TokenKind::Auto),
    ("break", TokenKind::Break),
    ("case", TokenKind::Case),
    ("char", TokenKind::Char),
    ("const", TokenKind::Const),
    ("continue", TokenKind::Continue),
    ("default", TokenKind::Default),
    ("do", TokenKind::Do),
    ("double", TokenKind::Double),
    ("else", TokenKind::Else),
    ("enum", TokenKind::Enum),
    ("extern", TokenKind::Extern),
    ("float", TokenKind::Float),
    ("for", TokenKind::For),
    ("goto", TokenKind::Goto),
    ("if", TokenKind::If),
    ("int", TokenKind::Int),
    ("long", TokenKind::Long),
    ("return", TokenKind::Return),
    ("short", TokenKind::Short),
    ("signed", TokenKind::Signed),
    ("sizeof", TokenKind::Sizeof),
    ("static", TokenKind::Static),
    ("struct", TokenKind::Struct),
    ("switch", TokenKind::Switch),
    ("typedef", TokenKind::Typedef),
    ("union", TokenKind::Union),
    ("unsigned", TokenKind::Unsigned),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
];

const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("...", TokenKind::Ellipsis),
    ("->", TokenKind::Arrow),
    ("++", TokenKind::Increment),
    ("--", TokenKind::Decrement),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::BangEqual),
    ("&&", TokenKind::AmpAmp),
    ("||", TokenKind::PipePipe),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpAssign),
    ("^=", TokenKind::CaretAssign),
    ("|=", TokenKind::PipeAssign),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("[", TokenKind::LeftBracket),
    ("]", TokenKind::RightBracket),
    (";", TokenKind::Semicolon),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    ("?", TokenKind::Question),
    (".", TokenKind::Dot),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Ampersand),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("!", TokenKind::Bang),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
    ("=", TokenKind::Assign),
];

const ESCAPE: &str = r#"\\(?:['"?\\abfnrtv]|[0-7]{1,3}|x[0-9a-fA-F]+|u[0-9a-fA-F]{4})"#;

/// One entry of the ordered pattern table.
pub(crate) struct TokenPattern {
    pub kind: TokenKind,
    pub regex: Regex,
}

fn pattern(kind: TokenKind, body: &str) -> TokenPattern {
    TokenPattern {
        kind,
        regex: Regex::new(&format!("^(?:{})", body)).expect("token pattern is valid"),
    }
}

fn build_patterns() -> Vec<TokenPattern> {
    let mut patterns = Vec::new();

    // Literals first: a leading digit must never lex as an integer prefix of
    // a floating literal, and `.5` must beat the `.` operator.
    patterns.push(pattern(
        TokenKind::FloatLiteral,
        r"(?:\d+\.\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?|\d+[eE][+-]?\d+)[fFdD]?|\d+[fFdD]",
    ));
    patterns.push(pattern(
        TokenKind::IntLiteral,
        r"(?:0[xX][0-9a-fA-F]+|0[0-7]*|[1-9]\d*)(?:[uU][lL]?|[lL][uU]?)?",
    ));
    patterns.push(pattern(
        TokenKind::CharLiteral,
        &format!(r"'(?:{}|[^'\\\n])'", ESCAPE),
    ));
    patterns.push(pattern(
        TokenKind::StringLiteral,
        &format!(r#""(?:{}|[^"\\\n])*""#, ESCAPE),
    ));

    for &(text, kind) in KEYWORDS {
        patterns.push(pattern(kind, &format!(r"{}\b", text)));
    }
    for &(text, kind) in OPERATORS {
        patterns.push(pattern(kind, &regex::escape(text)));
    }
    patterns.push(pattern(TokenKind::Identifier, r"[A-Za-z_][A-Za-z0-9_]*"));
    patterns
}

/// The ordered token-pattern table.
pub(crate) fn patterns() -> &'static [TokenPattern] {
    static PATTERNS: OnceLock<Vec<TokenPattern>> = OnceLock::new();
    PATTERNS.get_or_init(build_patterns)
}

/// Extract the semantic value for a matched pattern.
pub(crate) fn extract_value(kind: TokenKind, text: &str) -> TokenValue {
    match kind {
        TokenKind::IntLiteral => {
            let (value, ty) = parse_int_literal(text);
            TokenValue::Int { value, ty }
        }
        TokenKind::FloatLiteral => {
            let (value, ty) = parse_float_literal(text);
            TokenValue::Float { value, ty }
        }
        TokenKind::CharLiteral => {
            let inner = &text[1..text.len() - 1];
            let code = decode_escape_sequences(inner).first().copied().unwrap_or(0);
            TokenValue::Char(code)
        }
        TokenKind::StringLiteral => {
            let inner = &text[1..text.len() - 1];
            TokenValue::Str(encode_decoded(&decode_escape_sequences(inner)))
        }
        TokenKind::EndOfFile => TokenValue::EndOfFile,
        _ => TokenValue::Text(text.to_string()),
    }
}

/// Hex (`0x…`), octal (`0…`), and decimal forms with optional `u`, `l`, `ul`
/// suffixes. Default type is sint32; `u` promotes to uint32, `l` to sint64,
/// `ul` to uint64.
fn parse_int_literal(text: &str) -> (u64, NumberType) {
    let digits_len = text
        .trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'))
        .len();
    let (digits, suffix) = text.split_at(digits_len);
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse()
    }
    .unwrap_or(u64::MAX);

    let has_u = suffix.contains(['u', 'U']);
    let has_l = suffix.contains(['l', 'L']);
    let ty = match (has_u, has_l) {
        (false, false) => NumberType::Sint32,
        (true, false) => NumberType::Uint32,
        (false, true) => NumberType::Sint64,
        (true, true) => NumberType::Uint64,
    };
    (value, ty)
}

/// `[digits].[digits][e[±]digits]` with optional `f`/`d` suffix. Default is
/// fp64; `f` forces fp32.
fn parse_float_literal(text: &str) -> (f64, NumberType) {
    let digits = text.trim_end_matches(['f', 'F', 'd', 'D']);
    let value = digits.parse().unwrap_or(0.0);
    let ty = if text.ends_with(['f', 'F']) {
        NumberType::Fp32
    } else {
        NumberType::Fp64
    };
    (value, ty)
}

/// Decode backslash escapes into code points. The caller's pattern already
/// vouched for well-formedness.
fn decode_escape_sequences(inner: &str) -> Vec<u32> {
    let mut out = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u32);
            continue;
        }
        match chars.next() {
            Some('a') => out.push(0x07),
            Some('b') => out.push(0x08),
            Some('f') => out.push(0x0C),
            Some('n') => out.push(0x0A),
            Some('r') => out.push(0x0D),
            Some('t') => out.push(0x09),
            Some('v') => out.push(0x0B),
            Some('x') => {
                let mut value: u32 = 0;
                while let Some(digit) = chars.peek().and_then(|c| c.to_digit(16)) {
                    value = value.wrapping_mul(16).wrapping_add(digit);
                    chars.next();
                }
                out.push(value);
            }
            Some('u') => {
                let mut value: u32 = 0;
                for _ in 0..4 {
                    if let Some(digit) = chars.peek().and_then(|c| c.to_digit(16)) {
                        value = value * 16 + digit;
                        chars.next();
                    }
                }
                out.push(value);
            }
            Some(first @ '0'..='7') => {
                let mut value = first as u32 - '0' as u32;
                for _ in 0..2 {
                    if let Some(digit) = chars.peek().and_then(|c| c.to_digit(8)) {
                        value = value * 8 + digit;
                        chars.next();
                    }
                }
                out.push(value);
            }
            Some(other) => out.push(other as u32),
            None => {}
        }
    }
    out
}

/// Turn decoded code points into bytes: byte-sized escapes stay single
/// bytes, anything larger is UTF-8 encoded.
fn encode_decoded(code_points: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &code in code_points {
        if code <= 0xFF {
            bytes.push(code as u8);
        } else if let Some(c) = char::from_u32(code) {
            let mut buffer = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
        }
    }
    bytes
}
