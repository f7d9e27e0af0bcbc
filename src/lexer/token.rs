use logos::Logos;
use std::fmt;

/// Raw tokens recognised by logos. Literal payloads are decoded by the
/// wrapping [`Lexer`](super::Lexer).
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum RawToken {
    #[token("/*")]
    BlockCommentStart,

    // ── Literals ─────────────────────────────────────────────
    #[regex(r"0x[0-9a-fA-F]+")]
    HexLiteral,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    FloatLiteral,

    #[regex(r"[0-9]+")]
    IntLiteral,

    /// Runs to the closing quote, or to the end of input when the literal
    /// is never closed.
    #[token("\"", string_body)]
    StringLiteral,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*")]
    PolyName,

    #[token("$")]
    Dollar,

    #[regex(r"#[a-zA-Z_][a-zA-Z0-9_]*")]
    Directive,

    // ── Multi-char operators (longest match first) ───────────
    #[token("...")]
    Ellipsis,
    #[token("->")]
    Arrow,
    #[token(":=")]
    ColonEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[regex(r"(\+|-|\*|/|%|&|\||\^|<<|>>)=")]
    OpAssign,

    // ── Single-char operators & delimiters ────────────────────
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("'")]
    Quote,
}

fn string_body(lex: &mut logos::Lexer<RawToken>) -> bool {
    let rest = lex.remainder();
    let len = closing_quote(rest).map_or(rest.len(), |i| i + 1);
    lex.bump(len);
    true
}

/// Offset of the unescaped `"` that ends a literal body.
pub fn closing_quote(body: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, b) in body.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(i),
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Fn,
    Return,
    If,
    Else,
    While,
    For,
    In,
    Extern,
    Type,
    Struct,
    Enum,
    Impl,
    New,
    Break,
    Continue,
    Use,
    As,
    True,
    False,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        Some(match s {
            "fn" => Keyword::Fn,
            "return" => Keyword::Return,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "extern" => Keyword::Extern,
            "type" => Keyword::Type,
            "struct" => Keyword::Struct,
            "enum" => Keyword::Enum,
            "impl" => Keyword::Impl,
            "new" => Keyword::New,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "use" => Keyword::Use,
            "as" => Keyword::As,
            "true" => Keyword::True,
            "false" => Keyword::False,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Fn => "fn",
            Keyword::Return => "return",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Extern => "extern",
            Keyword::Type => "type",
            Keyword::Struct => "struct",
            Keyword::Enum => "enum",
            Keyword::Impl => "impl",
            Keyword::New => "new",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Use => "use",
            Keyword::As => "as",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens handed to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// `$T`, stored without the sigil.
    Poly(String),
    /// `#name`, stored without the sigil.
    Directive(String),
    Keyword(Keyword),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    Pipe,
    AndAnd,
    OrOr,
    Bang,
    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    ColonEq,
    /// Compound assignment such as `+=`; the operator text without `=`.
    OpAssign(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Arrow,
    Quote,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{n}"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Poly(s) => write!(f, "${s}"),
            Token::Directive(s) => write!(f, "#{s}"),
            Token::Keyword(k) => write!(f, "{k}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Eq => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::BangEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::ColonEq => write!(f, ":="),
            Token::OpAssign(op) => write!(f, "{op}="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Ellipsis => write!(f, "..."),
            Token::Arrow => write!(f, "->"),
            Token::Quote => write!(f, "'"),
            Token::Eof => write!(f, "end of file"),
        }
    }
}
