use serde::{Deserialize, Serialize};

use crate::ast::*;
use crate::ast_util;
use crate::error::{Result, ShaderError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// How `&&` and `||` combine inside `#if` conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGrammar {
    /// Both operators share one precedence level and fold left to right:
    /// `a || b && c` is `(a || b) && c`. Existing node libraries were
    /// written against this.
    #[default]
    Flat,
    /// C precedence: `&&` binds tighter than `||`.
    Precedence,
}

/// GLSL type names recognised when scanning method bodies for locals.
const GLSL_TYPES: &[&str] = &[
    "float", "int", "uint", "bool", "double",
    "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4",
    "uvec2", "uvec3", "uvec4", "bvec2", "bvec3", "bvec4",
    "dvec2", "dvec3", "dvec4",
    "mat2", "mat3", "mat4", "mat2x2", "mat2x3", "mat2x4",
    "mat3x2", "mat3x3", "mat3x4", "mat4x2", "mat4x3", "mat4x4",
];

const PRECISION_QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];

/// Parse a GLSL node source with the default condition grammar.
pub fn parse(path: &str, source: &str) -> Result<Ast> {
    Parser::new(path, source, ConditionGrammar::default()).parse()
}

/// Recursive descent parser for the GLSL subset used by shader nodes.
///
/// Only declarations and preprocessor structure are parsed. Method bodies are
/// scanned, not parsed: the parser records where they start and end, the
/// locals declared in them and any conditional blocks they contain.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    ast: Ast,
    grammar: ConditionGrammar,
    brace_depth: u32,
}

impl<'src> Parser<'src> {
    pub fn new(path: &str, source: &'src str, grammar: ConditionGrammar) -> Self {
        Self {
            lexer: Lexer::new(source),
            ast: Ast::new(path, source),
            grammar,
            brace_depth: 0,
        }
    }

    /// Parse the whole file. Any error aborts the parse; no partial tree is
    /// returned.
    pub fn parse(mut self) -> Result<Ast> {
        let root = self.ast.root();
        match self.parse_file_level(root) {
            Ok(()) => Ok(self.ast),
            Err(e) => Err(e.in_file(self.ast.path())),
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    /// Skip tokens until one of `kind` turns up.
    fn find_token(&mut self, kind: TokenKind) -> Result<Token<'src>> {
        loop {
            let tok = self.lexer.next_token();
            if tok.is(kind) {
                return Ok(tok);
            }
            if tok.is_eof() {
                return Err(ShaderError::unexpected_eof(kind.describe()).at(tok.line, tok.span));
            }
        }
    }

    /// The next token must be a plain word.
    fn expect_word(&mut self, what: &str) -> Result<Token<'src>> {
        let tok = self.lexer.next_token();
        match tok.kind {
            TokenKind::Word => Ok(tok),
            TokenKind::Eof => Err(ShaderError::unexpected_eof(what).at(tok.line, tok.span)),
            _ => Err(ShaderError::unexpected_token(what, tok.text).at(tok.line, tok.span)),
        }
    }

    /// Consume the next token only if it sits on `line`.
    fn next_on_line(&mut self, line: u32) -> Option<Token<'src>> {
        let state = self.lexer.save_state();
        let tok = self.lexer.next_token();
        if tok.is_eof() || tok.line != line {
            self.lexer.restore_state(state);
            None
        } else {
            Some(tok)
        }
    }

    /// Consume the remainder of a directive line, honouring `\` continuations.
    /// Returns the end offset of the last consumed token.
    fn skip_line(&mut self, mut line: u32, mut end: usize) -> usize {
        while let Some(tok) = self.next_on_line(line) {
            end = tok.end();
            if tok.text == "\\" {
                line += 1;
            }
        }
        end
    }

    /// `# ifdef X` is legal GLSL; fold a bare `#` and its directive word into
    /// one marker token.
    fn read_marker(&mut self, marker: Token<'src>) -> Token<'src> {
        if marker.text != "#" {
            return marker;
        }
        match self.next_on_line(marker.line) {
            Some(name) => {
                let span = marker.offset()..name.end();
                Token {
                    kind: TokenKind::Preprocessor,
                    text: &self.lexer.source()[span.clone()],
                    line: marker.line,
                    span,
                }
            }
            None => marker,
        }
    }

    fn leaf(&mut self, parent: NodeId, ty: NodeType, tok: &Token<'src>) -> NodeId {
        let id = self.ast.alloc_leaf(ty, tok.line, tok.span.clone());
        self.ast.append(parent, id);
        id
    }

    fn detached_leaf(&mut self, ty: NodeType, tok: &Token<'src>) -> NodeId {
        self.ast.alloc_leaf(ty, tok.line, tok.span.clone())
    }

    fn child(&mut self, parent: NodeId, ty: NodeType, tok: &Token<'src>) -> NodeId {
        let id = self.ast.alloc(ty, tok.line, tok.offset());
        self.ast.append(parent, id);
        id
    }

    /// Last identifier before the next `;`, for error messages. Does not
    /// advance the lexer.
    fn misplaced_field_name(&self) -> &'src str {
        let mut probe = self.lexer.clone();
        let mut name = "";
        loop {
            let tok = probe.next_token();
            match tok.kind {
                TokenKind::Semicolon | TokenKind::Eof => return name,
                TokenKind::Word => name = tok.text,
                _ => {}
            }
        }
    }

    fn in_method(&self, parent: NodeId) -> bool {
        self.ast.ty(parent) == NodeType::MethodBody
            || ast_util::has_parent_by_type(&self.ast, parent, NodeType::MethodBody)
    }

    // ── File level ─────────────────────────────────────────────────────

    fn parse_file_level(&mut self, root: NodeId) -> Result<()> {
        loop {
            let tok = self.lexer.next_token();
            if tok.is_eof() {
                return Ok(());
            }
            self.parse_declaration(root, tok)?;
        }
    }

    /// Handle one token at declaration level: file scope, or a conditional
    /// body outside any method.
    fn parse_declaration(&mut self, parent: NodeId, tok: Token<'src>) -> Result<()> {
        match tok.kind {
            TokenKind::Preprocessor => self.parse_preprocessor(parent, tok),
            TokenKind::Keyword if FieldKind::from_keyword(tok.text).is_some() => {
                self.parse_field(parent, tok)
            }
            TokenKind::Word => self.try_parse_method(parent, tok),
            _ => Ok(()),
        }
    }

    fn parse_field(&mut self, parent: NodeId, keyword: Token<'src>) -> Result<()> {
        let field = self.child(parent, NodeType::FieldDeclaration, &keyword);
        self.leaf(field, NodeType::Symbol, &keyword);

        let mut ty = self.expect_word("field type")?;
        while PRECISION_QUALIFIERS.contains(&ty.text) {
            ty = self.expect_word("field type")?;
        }
        self.leaf(field, NodeType::Type, &ty);

        let name = self.find_token(TokenKind::Word)?;
        self.leaf(field, NodeType::Name, &name);

        let semi = self.find_token(TokenKind::Semicolon)?;
        self.leaf(field, NodeType::Symbol, &semi);
        self.ast.set_end(field, semi.end());
        Ok(())
    }

    // ── Methods ────────────────────────────────────────────────────────

    /// `<type> <name> ( ... ) { ... }`. Anything else starting with a word is
    /// discarded; prototypes (`... ) ;`) are skipped without a node.
    fn try_parse_method(&mut self, parent: NodeId, ret: Token<'src>) -> Result<()> {
        let state = self.lexer.save_state();
        let name = self.lexer.next_token();
        let open = self.lexer.next_token();
        if name.kind != TokenKind::Word || open.kind != TokenKind::LeftParen {
            self.lexer.restore_state(state);
            return Ok(());
        }

        let mut depth = 1u32;
        while depth > 0 {
            let tok = self.lexer.next_token();
            match tok.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                TokenKind::Eof => {
                    return Err(ShaderError::unexpected_eof("')'").at(tok.line, tok.span));
                }
                _ => {}
            }
        }

        let brace = self.lexer.next_token();
        match brace.kind {
            TokenKind::LeftBrace => {}
            TokenKind::Eof => {
                return Err(ShaderError::unexpected_eof("'{' or ';'").at(brace.line, brace.span));
            }
            // Prototype, or a call expression we don't model.
            _ => return Ok(()),
        }

        let method = self.child(parent, NodeType::MethodDeclaration, &ret);
        self.leaf(method, NodeType::Type, &ret);
        self.leaf(method, NodeType::Name, &name);
        let end = self.parse_method_body(method, brace)?;
        self.ast.set_end(method, end);
        Ok(())
    }

    fn parse_method_body(&mut self, method: NodeId, open: Token<'src>) -> Result<usize> {
        let body = self.child(method, NodeType::MethodBody, &open);
        let base = self.brace_depth;
        self.brace_depth += 1;

        loop {
            let tok = self.lexer.next_token();
            match tok.kind {
                TokenKind::RightBrace => {
                    self.brace_depth -= 1;
                    if self.brace_depth == base {
                        self.ast.set_end(body, tok.end());
                        return Ok(tok.end());
                    }
                }
                TokenKind::Eof => {
                    self.brace_depth = base;
                    return Err(ShaderError::unexpected_eof("'}'").at(tok.line, tok.span));
                }
                _ => self.parse_statement_token(body, tok)?,
            }
        }
    }

    /// Handle one token inside a method body, directly or within a
    /// conditional nested in it.
    fn parse_statement_token(&mut self, parent: NodeId, tok: Token<'src>) -> Result<()> {
        match tok.kind {
            TokenKind::LeftBrace => self.brace_depth += 1,
            TokenKind::RightBrace => self.brace_depth = self.brace_depth.saturating_sub(1),
            TokenKind::Preprocessor => self.parse_preprocessor(parent, tok)?,
            TokenKind::Keyword if matches!(tok.text, "uniform" | "varying" | "attribute") => {
                let name = self.misplaced_field_name();
                return Err(ShaderError::field_in_method(name).at(tok.line, tok.span));
            }
            TokenKind::Word if GLSL_TYPES.contains(&tok.text) => {
                self.try_parse_local(parent, tok);
            }
            _ => {}
        }
        Ok(())
    }

    /// `<glsl type> <ident>` followed by `=`, `;`, `,` or `[`, with any further
    /// `, <ident>` declarators of the same statement.
    fn try_parse_local(&mut self, parent: NodeId, ty: Token<'src>) {
        let state = self.lexer.save_state();
        let name = self.lexer.next_token();
        let after = self.lexer.peek_token();
        let declares = name.kind == TokenKind::Word
            && !GLSL_TYPES.contains(&name.text)
            && match after.kind {
                TokenKind::Semicolon => true,
                TokenKind::Other => matches!(after.text, "=" | "," | "["),
                _ => false,
            };
        if !declares {
            self.lexer.restore_state(state);
            return;
        }

        let local = self.child(parent, NodeType::LocalVarDeclaration, &ty);
        self.leaf(local, NodeType::Type, &ty);
        self.leaf(local, NodeType::Name, &name);
        let mut end = name.end();
        while let Some(next) = self.next_declarator() {
            self.leaf(local, NodeType::Name, &next);
            end = next.end();
        }
        self.ast.set_end(local, end);
    }

    /// Skip an initializer or array size up to the next top-level `,` and
    /// return the declarator after it. Stops at `;`, and before any brace,
    /// directive or unbalanced `)`.
    fn next_declarator(&mut self) -> Option<Token<'src>> {
        let mut depth = 0u32;
        loop {
            let state = self.lexer.save_state();
            let tok = self.lexer.next_token();
            match tok.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen if depth > 0 => depth -= 1,
                TokenKind::Other if tok.text == "[" => depth += 1,
                TokenKind::Other if tok.text == "]" => depth = depth.saturating_sub(1),
                TokenKind::Semicolon if depth == 0 => return None,
                TokenKind::Other if tok.text == "," && depth == 0 => {
                    let state = self.lexer.save_state();
                    let name = self.lexer.next_token();
                    if name.kind == TokenKind::Word && !GLSL_TYPES.contains(&name.text) {
                        return Some(name);
                    }
                    self.lexer.restore_state(state);
                    return None;
                }
                TokenKind::RightParen
                | TokenKind::LeftBrace
                | TokenKind::RightBrace
                | TokenKind::Preprocessor
                | TokenKind::Eof => {
                    self.lexer.restore_state(state);
                    return None;
                }
                _ => {}
            }
        }
    }

    // ── Preprocessor ───────────────────────────────────────────────────

    fn parse_preprocessor(&mut self, parent: NodeId, marker: Token<'src>) -> Result<()> {
        let marker = self.read_marker(marker);
        let directive = marker.directive().unwrap_or_default();

        match directive {
            "import" => {
                let import = self.child(parent, NodeType::Import, &marker);
                self.leaf(import, NodeType::Symbol, &marker);
                let path = self.find_token(TokenKind::String)?;
                self.leaf(import, NodeType::StringValue, &path);
                self.ast.set_end(import, path.end());
                Ok(())
            }
            "extension" => {
                let ext = self.child(parent, NodeType::ExtensionPreprocessor, &marker);
                self.leaf(ext, NodeType::Symbol, &marker);
                let name = self.expect_word("extension name")?;
                self.leaf(ext, NodeType::Name, &name);
                let end = self.skip_line(marker.line, name.end());
                self.ast.set_end(ext, end);
                Ok(())
            }
            "define" if !self.in_method(parent) => {
                let def = self.child(parent, NodeType::MacroDeclaration, &marker);
                self.leaf(def, NodeType::Symbol, &marker);
                let name = self.expect_word("macro name")?;
                self.leaf(def, NodeType::Name, &name);
                let end = self.skip_line(marker.line, name.end());
                self.ast.set_end(def, end);
                Ok(())
            }
            _ => match Directive::from_name(directive) {
                Some(d) => self.parse_conditional(parent, marker, d).map(|_| ()),
                None => {
                    // #else/#endif without an opener, #undef, #version, #pragma...
                    self.skip_line(marker.line, marker.end());
                    Ok(())
                }
            },
        }
    }

    fn parse_conditional(
        &mut self,
        parent: NodeId,
        marker: Token<'src>,
        directive: Directive,
    ) -> Result<NodeId> {
        let node = self.child(parent, NodeType::ConditionalPreprocessor, &marker);
        self.leaf(node, NodeType::Symbol, &marker);

        let condition = self.parse_condition(directive, &marker)?;
        self.ast.append(node, condition);

        // Every branch starts from the brace depth before the directive.
        let depth = self.brace_depth;
        self.parse_preprocessor_body(node, &marker)?;

        // The body stopped right before its terminator.
        let term = self.lexer.next_token();
        let term = self.read_marker(term);
        match term.directive() {
            Some("endif") => {
                self.leaf(node, NodeType::Symbol, &term);
                self.ast.set_end(node, term.end());
            }
            Some("else") => {
                self.leaf(node, NodeType::Symbol, &term);
                self.brace_depth = depth;
                self.parse_preprocessor_body(node, &term)?;
                let endif = self.lexer.next_token();
                let endif = self.read_marker(endif);
                if endif.directive() != Some("endif") {
                    return Err(ShaderError::unexpected_token("#endif", endif.text)
                        .at(endif.line, endif.span));
                }
                self.leaf(node, NodeType::Symbol, &endif);
                self.ast.set_end(node, endif.end());
            }
            Some("elif") => {
                self.brace_depth = depth;
                let chained = self.parse_conditional(node, term, Directive::Elif)?;
                let end = self.ast.node(chained).end();
                self.ast.set_end(node, end);
            }
            _ => {
                return Err(ShaderError::unexpected_eof("#endif").at(term.line, term.span));
            }
        }
        Ok(node)
    }

    /// Everything up to (not including) the matching `#endif`, `#else` or
    /// `#elif`. The terminator is rewound so the caller can consume it.
    fn parse_preprocessor_body(&mut self, owner: NodeId, header: &Token<'src>) -> Result<NodeId> {
        let body = self.ast.alloc(NodeType::PreprocessorBody, header.line, header.end());
        self.ast.append(owner, body);
        let in_method = self.in_method(owner);
        let mut range: Option<(u32, usize)> = None;
        let mut end = header.end();

        loop {
            let state = self.lexer.save_state();
            let mut tok = self.lexer.next_token();
            if tok.is_eof() {
                return Err(ShaderError::unexpected_eof("#endif").at(tok.line, tok.span));
            }
            if tok.is(TokenKind::Preprocessor) {
                tok = self.read_marker(tok);
                if matches!(tok.directive(), Some("endif" | "else" | "elif")) {
                    self.lexer.restore_state(state);
                    break;
                }
            }
            if range.is_none() {
                range = Some((tok.line, tok.offset()));
            }
            if in_method {
                self.parse_statement_token(body, tok)?;
            } else {
                self.parse_declaration(body, tok)?;
            }
            end = self.lexer.offset();
        }

        if let Some((line, start)) = range {
            self.ast.set_range(body, line, start, end);
        }
        Ok(body)
    }

    // ── Conditions ─────────────────────────────────────────────────────

    /// Condition of a conditional directive, returned detached. Only tokens
    /// on the directive's own line take part.
    fn parse_condition(&mut self, directive: Directive, marker: &Token<'src>) -> Result<NodeId> {
        let line = marker.line;
        match directive {
            Directive::Ifdef | Directive::Ifndef => {
                let name = self.condition_token(line, marker)?;
                if !name.kind.is_word_like() {
                    return Err(ShaderError::unexpected_token("macro name", name.text)
                        .at(name.line, name.span));
                }
                let value = self.detached_leaf(NodeType::DefineValue, &name);
                self.skip_line(line, name.end());
                Ok(value)
            }
            Directive::If | Directive::Elif => {
                let condition = self.parse_condition_expr(line, marker)?;
                self.skip_line(line, 0);
                Ok(condition)
            }
        }
    }

    fn condition_token(&mut self, line: u32, marker: &Token<'src>) -> Result<Token<'src>> {
        self.next_on_line(line).ok_or_else(|| {
            ShaderError::unexpected_token("condition", "end of line").at(line, marker.span.clone())
        })
    }

    /// The next token on the directive line must be `kind`.
    fn expect_on_line(
        &mut self,
        line: u32,
        marker: &Token<'src>,
        kind: TokenKind,
    ) -> Result<Token<'src>> {
        match self.next_on_line(line) {
            Some(tok) if tok.is(kind) => Ok(tok),
            Some(tok) => Err(ShaderError::unexpected_token(kind.describe(), tok.text)
                .at(tok.line, tok.span)),
            None => Err(ShaderError::unexpected_token(kind.describe(), "end of line")
                .at(line, marker.span.clone())),
        }
    }

    fn parse_condition_expr(&mut self, line: u32, marker: &Token<'src>) -> Result<NodeId> {
        let first = self.parse_condition_term(line, marker)?;
        let mut rest = Vec::new();
        loop {
            let state = self.lexer.save_state();
            let op = match self.next_on_line(line).map(|t| t.kind) {
                Some(TokenKind::LogicalOr) => NodeType::ConditionOr,
                Some(TokenKind::LogicalAnd) => NodeType::ConditionAnd,
                _ => {
                    self.lexer.restore_state(state);
                    break;
                }
            };
            rest.push((op, self.parse_condition_term(line, marker)?));
        }
        Ok(self.fold_condition(first, rest))
    }

    fn parse_condition_term(&mut self, line: u32, marker: &Token<'src>) -> Result<NodeId> {
        let tok = self.condition_token(line, marker)?;
        match tok.kind {
            TokenKind::Exclamation => {
                let node = self.ast.alloc(NodeType::ConditionIsNot, tok.line, tok.offset());
                self.leaf(node, NodeType::Symbol, &tok);
                let inner = self.parse_condition_term(line, marker)?;
                self.ast.append(node, inner);
                let end = self.ast.node(inner).end();
                self.ast.set_end(node, end);
                Ok(node)
            }
            TokenKind::LeftParen => {
                let node = self.ast.alloc(NodeType::ConditionIs, tok.line, tok.offset());
                self.leaf(node, NodeType::Symbol, &tok);
                let inner = self.parse_condition_expr(line, marker)?;
                self.ast.append(node, inner);
                let close = self.expect_on_line(line, marker, TokenKind::RightParen)?;
                self.leaf(node, NodeType::Symbol, &close);
                self.ast.set_end(node, close.end());
                Ok(node)
            }
            TokenKind::Keyword if tok.text == "defined" => {
                let node = self.ast.alloc(NodeType::ConditionIs, tok.line, tok.offset());
                self.leaf(node, NodeType::Symbol, &tok);
                let next = self.condition_token(line, marker)?;
                match next.kind {
                    TokenKind::LeftParen => {
                        self.leaf(node, NodeType::Symbol, &next);
                        let name = self.condition_token(line, marker)?;
                        if !name.kind.is_word_like() {
                            return Err(ShaderError::unexpected_token("macro name", name.text)
                                .at(name.line, name.span));
                        }
                        self.leaf(node, NodeType::DefineValue, &name);
                        let close = self.expect_on_line(line, marker, TokenKind::RightParen)?;
                        self.leaf(node, NodeType::Symbol, &close);
                        self.ast.set_end(node, close.end());
                    }
                    TokenKind::Word | TokenKind::Keyword => {
                        self.leaf(node, NodeType::DefineValue, &next);
                        self.ast.set_end(node, next.end());
                    }
                    _ => {
                        return Err(ShaderError::unexpected_token("macro name", next.text)
                            .at(next.line, next.span));
                    }
                }
                Ok(node)
            }
            TokenKind::Word | TokenKind::Keyword => {
                let value = self.detached_leaf(NodeType::DefineValue, &tok);
                // Comparison tail of `NAME > 2`; not modelled.
                loop {
                    let state = self.lexer.save_state();
                    match self.next_on_line(line) {
                        Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::Other) => {}
                        _ => {
                            self.lexer.restore_state(state);
                            break;
                        }
                    }
                }
                Ok(value)
            }
            _ => Err(ShaderError::unexpected_token("condition", tok.text).at(tok.line, tok.span)),
        }
    }

    /// Combine condition terms joined by `&&`/`||` according to the configured
    /// grammar. This is the only place operator precedence is decided.
    fn fold_condition(&mut self, first: NodeId, rest: Vec<(NodeType, NodeId)>) -> NodeId {
        match self.grammar {
            ConditionGrammar::Flat => self.fold_left(first, rest),
            ConditionGrammar::Precedence => {
                let mut groups = Vec::new();
                let mut head = first;
                let mut tail = Vec::new();
                for (op, term) in rest {
                    if op == NodeType::ConditionOr {
                        groups.push(self.fold_left(head, std::mem::take(&mut tail)));
                        head = term;
                    } else {
                        tail.push((op, term));
                    }
                }
                groups.push(self.fold_left(head, tail));
                let head = groups.remove(0);
                let ors = groups
                    .into_iter()
                    .map(|g| (NodeType::ConditionOr, g))
                    .collect();
                self.fold_left(head, ors)
            }
        }
    }

    fn fold_left(&mut self, first: NodeId, rest: Vec<(NodeType, NodeId)>) -> NodeId {
        let mut acc = first;
        for (op, rhs) in rest {
            let (line, start) = {
                let n = self.ast.node(acc);
                (n.line, n.offset)
            };
            let node = self.ast.alloc(op, line, start);
            self.ast.append(node, acc);
            self.ast.append(node, rhs);
            let end = self.ast.node(rhs).end();
            self.ast.set_end(node, end);
            acc = node;
        }
        acc
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
