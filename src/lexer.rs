use logos::Logos;

use crate::token::{Token, TokenKind};

/// Pull-based lexer over a GLSL source buffer.
///
/// Wraps the logos scanner with the two things the parser needs on top of it:
/// an end-of-input sentinel that repeats forever, and cheap save/restore of the
/// cursor for bounded lookahead.
#[derive(Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    line_starts: std::rc::Rc<[usize]>,
}

/// Snapshot of a lexer cursor, see [`Lexer::save_state`].
#[derive(Clone)]
pub struct LexerState<'src> {
    inner: logos::Lexer<'src, TokenKind>,
}

impl<'src> LexerState<'src> {
    /// Byte offset the restored lexer will continue from.
    pub fn offset(&self) -> usize {
        self.inner.span().end
    }
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            inner: TokenKind::lexer(source),
            line_starts: line_starts.into(),
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Current cursor position in bytes.
    pub fn offset(&self) -> usize {
        self.inner.span().end
    }

    /// 1-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        idx as u32 + 1
    }

    /// Read the next token and advance. Returns an [`TokenKind::Eof`] token at
    /// (and after) the end of the buffer.
    pub fn next_token(&mut self) -> Token<'src> {
        match self.inner.next() {
            Some(result) => {
                let span = self.inner.span();
                // Stray characters logos cannot place (an unterminated `"`)
                // still become tokens; the parser ignores what it doesn't know.
                let kind = result.unwrap_or(TokenKind::Other);
                Token {
                    kind,
                    text: &self.source[span.clone()],
                    line: self.line_of(span.start),
                    span,
                }
            }
            None => {
                let end = self.source.len();
                Token {
                    kind: TokenKind::Eof,
                    text: "",
                    line: self.line_of(end),
                    span: end..end,
                }
            }
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&self) -> Token<'src> {
        self.clone().next_token()
    }

    pub fn save_state(&self) -> LexerState<'src> {
        LexerState {
            inner: self.inner.clone(),
        }
    }

    pub fn restore_state(&mut self, state: LexerState<'src>) {
        self.inner = state.inner;
    }
}

/// Tokenize a whole buffer, excluding the end-of-input sentinel.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.is_eof() {
            break;
        }
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_field_declaration() {
        let tokens = tokenize("uniform vec4 m_Color;");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Semicolon
            ]
        );
        assert_eq!(tokens[2].text, "m_Color");
        assert_eq!(tokens[2].span, 13..20);
        assert_eq!(tokens[3].offset(), 20);
        assert_eq!(tokens[3].len(), 1);
    }

    #[test]
    fn lex_keyword_prefix_stays_a_word() {
        let tokens = tokenize("in int inout interior");
        let kinds: Vec<_> = tokens.iter().map(|t| (t.kind, t.text)).collect();
        assert_eq!(
            kinds,
            vec![
                (TokenKind::Keyword, "in"),
                (TokenKind::Word, "int"),
                (TokenKind::Keyword, "inout"),
                (TokenKind::Word, "interior"),
            ]
        );
    }

    #[test]
    fn lex_punctuation_flushes_identifier() {
        assert_eq!(
            kinds("defined(FOO)"),
            vec![
                TokenKind::Keyword,
                TokenKind::LeftParen,
                TokenKind::Word,
                TokenKind::RightParen
            ]
        );
        assert_eq!(
            kinds("!x;"),
            vec![TokenKind::Exclamation, TokenKind::Word, TokenKind::Semicolon]
        );
    }

    #[test]
    fn lex_logical_operators() {
        assert_eq!(
            kinds("a||b && c | d & e"),
            vec![
                TokenKind::Word,
                TokenKind::LogicalOr,
                TokenKind::Word,
                TokenKind::LogicalAnd,
                TokenKind::Word,
                TokenKind::Other,
                TokenKind::Word,
                TokenKind::Other,
                TokenKind::Word,
            ]
        );
    }

    #[test]
    fn lex_preprocessor_and_string() {
        let tokens = tokenize("#import \"Common/ShaderLib/Skinning.glsllib\"\n#ifdef A");
        assert_eq!(tokens[0].kind, TokenKind::Preprocessor);
        assert_eq!(tokens[0].directive(), Some("import"));
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].text, "\"Common/ShaderLib/Skinning.glsllib\"");
        assert_eq!(tokens[2].directive(), Some("ifdef"));
        assert_eq!(tokens[2].line, 2);
    }

    #[test]
    fn lex_comments_are_skipped() {
        let tokens = tokenize("// uniform float a;\n/* uniform\n float b; */ out");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "out");
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn lex_eof_repeats() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().kind, TokenKind::Word);
        assert!(lexer.next_token().is_eof());
        assert!(lexer.next_token().is_eof());
    }

    #[test]
    fn save_and_restore_rewinds() {
        let mut lexer = Lexer::new("a b c");
        lexer.next_token();
        let state = lexer.save_state();
        assert_eq!(state.offset(), 1);
        assert_eq!(lexer.next_token().text, "b");
        assert_eq!(lexer.next_token().text, "c");
        lexer.restore_state(state);
        assert_eq!(lexer.next_token().text, "b");
        assert_eq!(lexer.peek_token().text, "c");
        assert_eq!(lexer.next_token().text, "c");
    }

    #[test]
    fn line_numbers_follow_newlines() {
        let lexer = Lexer::new("a\nb\n\nc");
        assert_eq!(lexer.line_of(0), 1);
        assert_eq!(lexer.line_of(2), 2);
        assert_eq!(lexer.line_of(4), 3);
        assert_eq!(lexer.line_of(5), 4);
    }
}
