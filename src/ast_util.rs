//! Queries and text transforms over parsed node sources.
//!
//! Everything here is a pure function of an [`Ast`] or a string; the
//! composition engine strings these together.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::ast::{Ast, FieldKind, NodeId, NodeType};

// ── Search ─────────────────────────────────────────────────────────────

/// Every node of type `ty` under `root` (inclusive), pre-order.
pub fn find_all_by_type(ast: &Ast, root: NodeId, ty: NodeType) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if ast.ty(id) == ty {
            found.push(id);
        }
        stack.extend(ast.children(id).iter().rev().copied());
    }
    found
}

pub fn find_first_by_type(ast: &Ast, root: NodeId, ty: NodeType) -> Option<NodeId> {
    find_all_by_type(ast, root, ty).into_iter().next()
}

/// Direct children of type `ty`.
pub fn children_by_type(ast: &Ast, id: NodeId, ty: NodeType) -> Vec<NodeId> {
    ast.children(id)
        .iter()
        .copied()
        .filter(|&c| ast.ty(c) == ty)
        .collect()
}

/// True when some strict ancestor of `id` has type `ty`.
pub fn has_parent_by_type(ast: &Ast, id: NodeId, ty: NodeType) -> bool {
    let mut current = ast.parent(id);
    while let Some(parent) = current {
        if ast.ty(parent) == ty {
            return true;
        }
        current = ast.parent(parent);
    }
    false
}

/// Methods declared at file level, with their names.
pub fn methods(ast: &Ast) -> Vec<(NodeId, &str)> {
    find_all_by_type(ast, ast.root(), NodeType::MethodDeclaration)
        .into_iter()
        .filter_map(|m| ast.name_of(m).map(|name| (m, name)))
        .collect()
}

pub fn find_method(ast: &Ast, name: &str) -> Option<NodeId> {
    methods(ast)
        .into_iter()
        .find(|&(_, n)| n == name)
        .map(|(id, _)| id)
}

// ── Preprocessor collections ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDecl {
    pub name: String,
    /// The whole directive line, verbatim.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub path: String,
}

pub fn collect_extensions(ast: &Ast) -> Vec<ExtensionDecl> {
    find_all_by_type(ast, ast.root(), NodeType::ExtensionPreprocessor)
        .into_iter()
        .filter_map(|id| {
            Some(ExtensionDecl {
                name: ast.name_of(id)?.to_string(),
                text: ast.text(id).to_string(),
            })
        })
        .collect()
}

pub fn collect_imports(ast: &Ast) -> Vec<ImportDecl> {
    find_all_by_type(ast, ast.root(), NodeType::Import)
        .into_iter()
        .filter_map(|id| {
            Some(ImportDecl {
                path: ast.import_path(id)?.to_string(),
            })
        })
        .collect()
}

/// Macro identifiers referenced by conditions under `root`.
pub fn collect_define_values(ast: &Ast, root: NodeId) -> Vec<String> {
    find_all_by_type(ast, root, NodeType::DefineValue)
        .into_iter()
        .map(|id| ast.text(id).to_string())
        .collect()
}

/// Keep the first occurrence of every key, preserving order.
pub fn dedup_by_key<T, K: Eq + Hash>(items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

pub fn dedup_extensions(items: Vec<ExtensionDecl>) -> Vec<ExtensionDecl> {
    dedup_by_key(items, |e| e.name.clone())
}

pub fn dedup_imports(items: Vec<ImportDecl>) -> Vec<ImportDecl> {
    dedup_by_key(items, |i| i.path.clone())
}

pub fn dedup_define_values(items: Vec<String>) -> Vec<String> {
    dedup_by_key(items, |d| d.clone())
}

/// Source text with the given nodes cut out. A node that occupies its own
/// line takes the line break with it.
pub fn strip_nodes(ast: &Ast, ids: &[NodeId]) -> String {
    let source = ast.source();
    let mut ranges: Vec<(usize, usize)> = ids
        .iter()
        .map(|&id| {
            let node = ast.node(id);
            let mut end = node.end();
            if source[end..].starts_with("\r\n") {
                end += 2;
            } else if source[end..].starts_with('\n') {
                end += 1;
            }
            (node.offset, end)
        })
        .collect();
    ranges.sort_unstable();

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (start, end) in ranges {
        if start < last {
            continue;
        }
        out.push_str(&source[last..start]);
        last = end;
    }
    out.push_str(&source[last..]);
    out
}

// ── Renaming ───────────────────────────────────────────────────────────

/// A set of identifier substitutions applied in one pass.
///
/// Variables are renamed wherever they occur as a whole identifier; methods
/// only where the identifier is followed by `(`. On preprocessor lines the
/// define map is consulted first, so a name can mean a macro in `#ifdef X`
/// and a variable elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Renames {
    vars: HashMap<String, String>,
    methods: HashMap<String, String>,
    defines: HashMap<String, String>,
}

impl Renames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.vars.insert(from.into(), to.into());
        self
    }

    pub fn method(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.methods.insert(from.into(), to.into());
        self
    }

    pub fn define(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.defines.insert(from.into(), to.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.methods.is_empty() && self.defines.is_empty()
    }

    pub fn lookup_var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn apply(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_string();
        }
        rename_with(text, |ident, site| {
            if site.in_directive {
                if let Some(to) = self.defines.get(ident) {
                    return Some(to.as_str());
                }
            }
            if site.is_call {
                if let Some(to) = self.methods.get(ident) {
                    return Some(to.as_str());
                }
            }
            self.vars.get(ident).map(String::as_str)
        })
    }
}

/// Where an identifier offered by [`rename_with`] sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    /// Followed by `(`.
    pub is_call: bool,
    /// On a preprocessor line.
    pub in_directive: bool,
}

/// Rename whole identifiers through `map`.
pub fn rename_identifiers(text: &str, map: &HashMap<String, String>) -> String {
    rename_with(text, |ident, _| map.get(ident).map(String::as_str))
}

/// Rename every whole-identifier occurrence of `from`.
pub fn replace_var(text: &str, from: &str, to: &str) -> String {
    rename_with(text, |ident, _| (ident == from).then_some(to))
}

/// Rename calls of `from`: occurrences followed by `(`.
pub fn replace_method(text: &str, from: &str, to: &str) -> String {
    rename_with(text, |ident, site| (site.is_call && ident == from).then_some(to))
}

/// Walk `text` identifier by identifier and substitute whatever `rename`
/// returns. String literals, comments, numbers and member accesses (`v.x`)
/// are never offered.
pub fn rename_with<'m>(text: &str, mut rename: impl FnMut(&str, Site) -> Option<&'m str>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;
    let mut line_start = true;
    let mut in_directive = false;
    // Last byte of code seen, skipping whitespace and comments.
    let mut last_code = 0u8;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\n' {
            let continued = text[..i].trim_end_matches([' ', '\t', '\r']).ends_with('\\');
            in_directive &= continued;
            line_start = true;
            i += 1;
            continue;
        }
        if b == b' ' || b == b'\t' || b == b'\r' {
            i += 1;
            continue;
        }
        if b == b'#' && line_start {
            in_directive = true;
        }
        line_start = false;

        if b == b'"' {
            i = find_from(bytes, i + 1, b"\"").map_or(bytes.len(), |p| p + 1);
            last_code = b'"';
        } else if bytes[i..].starts_with(b"//") {
            i = find_from(bytes, i, b"\n").unwrap_or(bytes.len());
        } else if bytes[i..].starts_with(b"/*") {
            i = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2);
        } else if b.is_ascii_digit() {
            while i < bytes.len() && (is_ident_byte(bytes[i]) || bytes[i] == b'.') {
                i += 1;
            }
            last_code = b'0';
        } else if is_ident_byte(b) {
            let start = i;
            while i < bytes.len() && is_ident_byte(bytes[i]) {
                i += 1;
            }
            let member = last_code == b'.';
            last_code = b'_';
            if member {
                continue;
            }
            let site = Site {
                is_call: text[i..].trim_start().starts_with('('),
                in_directive,
            };
            if let Some(to) = rename(&text[start..i], site) {
                out.push_str(&text[copied..start]);
                out.push_str(to);
                copied = i;
            }
        } else {
            last_code = b;
            i += 1;
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

// ── Declared symbols ───────────────────────────────────────────────────

/// A field declared at file level, reduced to what declaration merging needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSymbol {
    pub kind: FieldKind,
    pub ty: String,
    pub name: String,
}

impl DeclaredSymbol {
    pub fn new(kind: FieldKind, ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            ty: ty.into(),
            name: name.into(),
        }
    }
}

/// All field declarations of a file, in source order.
pub fn declared_fields(ast: &Ast) -> Vec<DeclaredSymbol> {
    find_all_by_type(ast, ast.root(), NodeType::FieldDeclaration)
        .into_iter()
        .filter_map(|id| {
            Some(DeclaredSymbol::new(
                ast.field_kind(id)?,
                ast.type_of(id)?,
                ast.name_of(id)?,
            ))
        })
        .collect()
}

/// Field declarations directly at file level, skipping those guarded by a
/// conditional block.
pub fn file_level_fields(ast: &Ast) -> Vec<DeclaredSymbol> {
    children_by_type(ast, ast.root(), NodeType::FieldDeclaration)
        .into_iter()
        .filter_map(|id| {
            Some(DeclaredSymbol::new(
                ast.field_kind(id)?,
                ast.type_of(id)?,
                ast.name_of(id)?,
            ))
        })
        .collect()
}

/// Append the symbols of `src` whose names `dst` doesn't have yet.
pub fn copy_defined_variables(dst: &mut Vec<DeclaredSymbol>, src: &[DeclaredSymbol]) {
    for symbol in src {
        if !dst.iter().any(|d| d.name == symbol.name) {
            dst.push(symbol.clone());
        }
    }
}

/// Like [`copy_defined_variables`] restricted to world-parameter uniforms
/// (`g_` prefix).
pub fn copy_global_uniforms(dst: &mut Vec<DeclaredSymbol>, src: &[DeclaredSymbol]) {
    let globals: Vec<DeclaredSymbol> = src
        .iter()
        .filter(|s| s.kind == FieldKind::Uniform && s.name.starts_with("g_"))
        .cloned()
        .collect();
    copy_defined_variables(dst, &globals);
}

/// Drop from `list` every symbol whose name is in `existing`.
pub fn remove_exists(list: &mut Vec<DeclaredSymbol>, existing: &[DeclaredSymbol]) {
    list.retain(|s| !existing.iter().any(|e| e.name == s.name));
}
