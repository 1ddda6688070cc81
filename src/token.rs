use logos::Logos;

/// Token kinds produced by lexing GLSL node sources.
///
/// Only the tokens that change parsing structure get their own kind. Operators,
/// brackets and numeric punctuation all collapse into [`TokenKind::Other`]; the
/// parser never needs to look inside expressions.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    // ── Preprocessor ───────────────────────────────────────────────────
    /// `#` followed by everything up to the next whitespace: `#ifdef`, `#import`.
    #[regex(r"#[^ \t\r\n\f]*")]
    Preprocessor,

    // ── Literals ───────────────────────────────────────────────────────
    /// `"..."` with no escape handling.
    #[regex(r#""[^"]*""#)]
    String,

    // ── Keywords ───────────────────────────────────────────────────────
    #[token("uniform")]
    #[token("in")]
    #[token("out")]
    #[token("varying")]
    #[token("attribute")]
    #[token("discard")]
    #[token("if")]
    #[token("endif")]
    #[token("defined")]
    #[token("else")]
    #[token("ifdef")]
    #[token("ifndef")]
    #[token("const")]
    #[token("break")]
    #[token("continue")]
    #[token("do")]
    #[token("for")]
    #[token("while")]
    #[token("inout")]
    #[token("struct")]
    Keyword,

    /// Identifiers, type names and numbers alike.
    #[regex(r"[A-Za-z0-9_]+")]
    Word,

    // ── Structural punctuation ─────────────────────────────────────────
    #[token(";")]
    Semicolon,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("!")]
    Exclamation,
    #[token("||")]
    LogicalOr,
    #[token("&&")]
    LogicalAnd,

    /// Any other single character: operators, commas, dots, brackets.
    #[regex(r#"[^ \t\r\n\fA-Za-z0-9_#"(){};!]"#)]
    Other,

    /// End-of-input sentinel. Never produced by logos itself.
    Eof,
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Preprocessor => "preprocessor directive",
            TokenKind::String => "string",
            TokenKind::Keyword => "keyword",
            TokenKind::Word => "identifier",
            TokenKind::Semicolon => "';'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::Exclamation => "'!'",
            TokenKind::LogicalOr => "'||'",
            TokenKind::LogicalAnd => "'&&'",
            TokenKind::Other => "symbol",
            TokenKind::Eof => "end of input",
        }
    }

    /// Words and keywords both look like identifiers in source text.
    pub fn is_word_like(self) -> bool {
        matches!(self, TokenKind::Word | TokenKind::Keyword)
    }
}

/// A token with its source location. `span` is a byte range into the lexed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    /// 1-based line of the first byte.
    pub line: u32,
    pub span: std::ops::Range<usize>,
}

impl<'src> Token<'src> {
    pub fn offset(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Directive name of a preprocessor marker, without the leading `#`.
    pub fn directive(&self) -> Option<&'src str> {
        match self.kind {
            TokenKind::Preprocessor => Some(self.text[1..].trim_start()),
            _ => None,
        }
    }
}
