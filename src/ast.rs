//! Abstract syntax tree for GLSL node sources.
//!
//! Nodes live in an index arena owned by [`Ast`]. Every node records the byte
//! range it covers in the source buffer, so [`Ast::text`] always returns the
//! exact source slice. The composition engine relies on that to re-emit
//! extensions, imports and preprocessor blocks verbatim.

use std::fmt::Write as _;

/// Index of a node inside its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Root of every tree.
    FileDeclaration,
    /// `uniform vec4 m_Color;` and friends at file level.
    FieldDeclaration,
    /// `vec4 helper(float x) { ... }`
    MethodDeclaration,
    /// The brace-delimited body of a method, kept as opaque text.
    MethodBody,
    /// `float temp = ...` inside a method body.
    LocalVarDeclaration,
    /// `#if`, `#ifdef`, `#ifndef` or `#elif` through its terminator.
    ConditionalPreprocessor,
    /// Everything between a conditional header and its terminator.
    PreprocessorBody,
    /// `#import "path"`
    Import,
    /// `#extension NAME : behaviour`
    ExtensionPreprocessor,
    /// `#define NAME value`
    MacroDeclaration,
    /// A macro identifier referenced by a condition.
    DefineValue,
    /// `defined(X)` or a parenthesised sub-condition.
    ConditionIs,
    ConditionIsNot,
    ConditionAnd,
    ConditionOr,
    Name,
    Type,
    StringValue,
    /// A single punctuation or marker token bounding a range.
    Symbol,
}

impl NodeType {
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            NodeType::Name
                | NodeType::Type
                | NodeType::StringValue
                | NodeType::Symbol
                | NodeType::DefineValue
        )
    }
}

/// Storage qualifier of a [`NodeType::FieldDeclaration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Uniform,
    In,
    Out,
    Varying,
    Attribute,
}

impl FieldKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "uniform" => Some(FieldKind::Uniform),
            "in" => Some(FieldKind::In),
            "out" => Some(FieldKind::Out),
            "varying" => Some(FieldKind::Varying),
            "attribute" => Some(FieldKind::Attribute),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Uniform => "uniform",
            FieldKind::In => "in",
            FieldKind::Out => "out",
            FieldKind::Varying => "varying",
            FieldKind::Attribute => "attribute",
        }
    }
}

/// Which conditional directive opened a [`NodeType::ConditionalPreprocessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    If,
    Ifdef,
    Ifndef,
    Elif,
}

impl Directive {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Directive::If),
            "ifdef" => Some(Directive::Ifdef),
            "ifndef" => Some(Directive::Ifndef),
            "elif" => Some(Directive::Elif),
            _ => None,
        }
    }
}

/// One arena entry.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub ty: NodeType,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub line: u32,
    pub offset: usize,
    pub length: usize,
}

impl AstNode {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A parsed source file: the buffer plus its node arena. Immutable once the
/// parser hands it out.
#[derive(Debug, Clone)]
pub struct Ast {
    path: String,
    source: String,
    nodes: Vec<AstNode>,
}

impl Ast {
    pub(crate) fn new(path: &str, source: &str) -> Self {
        let root = AstNode {
            ty: NodeType::FileDeclaration,
            parent: None,
            children: Vec::new(),
            line: 1,
            offset: 0,
            length: source.len(),
        };
        Self {
            path: path.to_string(),
            source: source.to_string(),
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }

    pub fn ty(&self, id: NodeId) -> NodeType {
        self.node(id).ty
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// All node ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Exact source slice covered by the node.
    pub fn text(&self, id: NodeId) -> &str {
        let node = self.node(id);
        &self.source[node.offset..node.end()]
    }

    /// First direct child of the given type.
    pub fn child_of_type(&self, id: NodeId, ty: NodeType) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.ty(c) == ty)
    }

    /// Text of the first [`NodeType::Name`] child.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.child_of_type(id, NodeType::Name).map(|n| self.text(n))
    }

    /// Texts of every [`NodeType::Name`] child; `float a, b;` has two.
    pub fn names_of(&self, id: NodeId) -> impl Iterator<Item = &str> + '_ {
        self.children(id)
            .iter()
            .filter(|&&c| self.ty(c) == NodeType::Name)
            .map(|&c| self.text(c))
    }

    /// Text of the first [`NodeType::Type`] child.
    pub fn type_of(&self, id: NodeId) -> Option<&str> {
        self.child_of_type(id, NodeType::Type).map(|n| self.text(n))
    }

    /// Storage qualifier of a field declaration.
    pub fn field_kind(&self, id: NodeId) -> Option<FieldKind> {
        if self.ty(id) != NodeType::FieldDeclaration {
            return None;
        }
        let qualifier = self.child_of_type(id, NodeType::Symbol)?;
        FieldKind::from_keyword(self.text(qualifier))
    }

    /// Opening directive of a conditional block.
    pub fn directive(&self, id: NodeId) -> Option<Directive> {
        if self.ty(id) != NodeType::ConditionalPreprocessor {
            return None;
        }
        let marker = self.child_of_type(id, NodeType::Symbol)?;
        let text = self.text(marker).trim_start_matches('#').trim();
        Directive::from_name(text)
    }

    /// Unquoted path of an import.
    pub fn import_path(&self, id: NodeId) -> Option<&str> {
        if self.ty(id) != NodeType::Import {
            return None;
        }
        let value = self.child_of_type(id, NodeType::StringValue)?;
        Some(self.text(value).trim_matches('"'))
    }

    /// Everything after the macro name of a `#define`, trimmed.
    pub fn macro_value(&self, id: NodeId) -> Option<&str> {
        if self.ty(id) != NodeType::MacroDeclaration {
            return None;
        }
        let name = self.child_of_type(id, NodeType::Name)?;
        let node = self.node(id);
        Some(self.source[self.node(name).end()..node.end()].trim())
    }

    // ── Construction (parser only) ─────────────────────────────────────

    /// Allocate a detached node starting at `offset`.
    pub(crate) fn alloc(&mut self, ty: NodeType, line: u32, offset: usize) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode {
            ty,
            parent: None,
            children: Vec::new(),
            line,
            offset,
            length: 0,
        });
        id
    }

    /// Allocate a leaf covering exactly `span`.
    pub(crate) fn alloc_leaf(
        &mut self,
        ty: NodeType,
        line: u32,
        span: std::ops::Range<usize>,
    ) -> NodeId {
        let id = self.alloc(ty, line, span.start);
        self.nodes[id.index()].length = span.len();
        id
    }

    pub(crate) fn append(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    pub(crate) fn set_range(&mut self, id: NodeId, line: u32, start: usize, end: usize) {
        let node = &mut self.nodes[id.index()];
        node.line = line;
        node.offset = start;
        node.length = end.saturating_sub(start);
    }

    pub(crate) fn set_end(&mut self, id: NodeId, end: usize) {
        let node = &mut self.nodes[id.index()];
        node.length = end.saturating_sub(node.offset);
    }

    // ── Debug rendering ────────────────────────────────────────────────

    /// Compact structural rendering: node types only, nested in parentheses.
    /// Two trees with the same shape render identically regardless of offsets.
    pub fn shape(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_shape(id, &mut out);
        out
    }

    fn write_shape(&self, id: NodeId, out: &mut String) {
        let _ = write!(out, "{:?}", self.ty(id));
        let children = self.children(id);
        if !children.is_empty() {
            out.push('(');
            for (i, &child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                self.write_shape(child, out);
            }
            out.push(')');
        }
    }

    /// Indented tree dump with line numbers and leaf text.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_dump(self.root(), 0, &mut out);
        out
    }

    fn write_dump(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let _ = write!(
            out,
            "{:indent$}{:?} @{}:{}+{}",
            "",
            node.ty,
            node.line,
            node.offset,
            node.length,
            indent = depth * 2
        );
        if node.ty.is_leaf() {
            let _ = write!(out, " {:?}", self.text(id));
        }
        out.push('\n');
        for &child in &node.children {
            self.write_dump(child, depth + 1, out);
        }
    }
}
