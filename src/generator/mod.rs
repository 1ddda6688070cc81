//! Shader composition: turns a technique graph plus the GLSL sources of its
//! nodes into one shader per stage.
//!
//! A request runs in fixed order. Node sources are resolved and parsed, then
//! imports are pulled in (depth first). Next come the header (extensions,
//! node defines and macros) and the uniform/attribute/varying block. Helper
//! methods are flattened under node-prefixed names, and finally `main` is
//! assembled node by node in graph order.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::assets::AssetLoader;
use crate::ast::Ast;
use crate::ast_util::{self, DeclaredSymbol, ExtensionDecl};
use crate::cache::{self, AstCache};
use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::graph::{GlslVersion, ShaderNode, ShaderStage, TechniqueDefinition};

mod body;
mod declarations;

#[cfg(test)]
mod tests;

// ── Public types ───────────────────────────────────────────────────────

/// Composed source of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShader {
    pub stage: ShaderStage,
    pub source: String,
    /// World parameters (without the `g_` prefix) that imported libraries
    /// use but the technique never declared. The host must bind them.
    pub required_uniforms: BTreeSet<String>,
}

/// Entry point of the composition engine.
///
/// Holds no per-request state, so one generator can serve any number of
/// requests, sequentially or from several threads.
pub struct Generator<'a> {
    loader: &'a dyn AssetLoader,
    config: GeneratorConfig,
    cache: Option<&'a AstCache>,
}

impl<'a> Generator<'a> {
    pub fn new(loader: &'a dyn AssetLoader, config: GeneratorConfig) -> Self {
        Self {
            loader,
            config,
            cache: None,
        }
    }

    /// Reuse parsed sources through `cache`. Ignored when
    /// [`GeneratorConfig::use_ast_cache`] is off.
    pub fn with_cache(mut self, cache: &'a AstCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Compose the `stage` shader of `technique`. Any failure aborts the
    /// request; no partial source is returned.
    pub fn generate(
        &self,
        technique: &TechniqueDefinition,
        stage: ShaderStage,
    ) -> Result<GeneratedShader> {
        log::info!("composing {stage} shader for technique '{}'", technique.name);

        let mut ctx = GenerationContext::new(technique, stage, &self.config);
        ctx.resolve_nodes(self)?;
        ctx.resolve_imports(self)?;
        ctx.emit_header();
        ctx.emit_declarations()?;
        ctx.emit_helpers();
        ctx.emit_main()?;
        Ok(ctx.finish())
    }

    /// Both stages, vertex first.
    pub fn generate_technique(&self, technique: &TechniqueDefinition) -> Result<Vec<GeneratedShader>> {
        [ShaderStage::Vertex, ShaderStage::Fragment]
            .into_iter()
            .map(|stage| self.generate(technique, stage))
            .collect()
    }

    fn parse(&self, path: &str) -> Result<Arc<Ast>> {
        let grammar = self.config.condition_grammar;
        match self.cache {
            Some(cache) if self.config.use_ast_cache => cache.get_or_parse(path, self.loader, grammar),
            _ => cache::load_and_parse(path, self.loader, grammar).map(Arc::new),
        }
    }
}

// ── Code blocks ────────────────────────────────────────────────────────

/// One section of the output, written line by line.
pub(super) struct CodeBlock {
    out: String,
    depth: usize,
    unit: String,
}

impl CodeBlock {
    fn new(unit: &str) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            unit: unit.to_string(),
        }
    }

    /// Indented line. Preprocessor lines always start at column 0.
    pub(super) fn line(&mut self, s: &str) {
        if !s.is_empty() && !s.starts_with('#') {
            for _ in 0..self.depth {
                self.out.push_str(&self.unit);
            }
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub(super) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Multi-line text copied as is.
    pub(super) fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn is_empty(&self) -> bool {
        self.out.is_empty()
    }
}

// ── Per-request state ──────────────────────────────────────────────────

/// A node taking part in the current stage, with its parsed source.
pub(super) struct ActiveNode<'t> {
    pub(super) node: &'t ShaderNode,
    pub(super) ast: Arc<Ast>,
}

/// Everything one composition request accumulates. Created by
/// [`Generator::generate`] and consumed by [`GenerationContext::finish`].
pub(super) struct GenerationContext<'t> {
    pub(super) technique: &'t TechniqueDefinition,
    pub(super) stage: ShaderStage,
    pub(super) version: GlslVersion,
    pub(super) nodes: Vec<ActiveNode<'t>>,

    pub(super) header: CodeBlock,
    pub(super) imports: CodeBlock,
    pub(super) declarations: CodeBlock,
    pub(super) helpers: CodeBlock,
    pub(super) main: CodeBlock,

    pub(super) extensions: Vec<ExtensionDecl>,
    /// Import paths already emitted.
    pub(super) emitted_imports: HashSet<String>,
    /// Imports being expanded, outermost first.
    pub(super) import_stack: Vec<String>,
    /// Fields declared by imported libraries.
    pub(super) imported: Vec<DeclaredSymbol>,
    /// Uniform names the technique itself declares.
    pub(super) declared_uniforms: HashSet<String>,
}

impl<'t> GenerationContext<'t> {
    fn new(technique: &'t TechniqueDefinition, stage: ShaderStage, config: &GeneratorConfig) -> Self {
        let unit = config.indent.as_str();
        Self {
            technique,
            stage,
            version: config.glsl_version,
            nodes: Vec::new(),
            header: CodeBlock::new(unit),
            imports: CodeBlock::new(unit),
            declarations: CodeBlock::new(unit),
            helpers: CodeBlock::new(unit),
            main: CodeBlock::new(unit),
            extensions: Vec::new(),
            emitted_imports: HashSet::new(),
            import_stack: Vec::new(),
            imported: Vec::new(),
            declared_uniforms: HashSet::new(),
        }
    }

    /// Assemble the sections and compute the required world parameters.
    fn finish(self) -> GeneratedShader {
        let mut globals = Vec::new();
        ast_util::copy_global_uniforms(&mut globals, &self.imported);
        let required_uniforms = globals
            .iter()
            .filter(|s| !self.declared_uniforms.contains(&s.name))
            .map(|s| s.name["g_".len()..].to_string())
            .collect();

        let mut source = String::new();
        for block in [&self.header, &self.imports, &self.declarations, &self.helpers, &self.main] {
            if block.is_empty() {
                continue;
            }
            if !source.is_empty() {
                source.push('\n');
            }
            source.push_str(&block.out);
        }

        GeneratedShader {
            stage: self.stage,
            source,
            required_uniforms,
        }
    }
}
