use super::{body, ActiveNode, GenerationContext, Generator};
use crate::ast::{FieldKind, NodeType};
use crate::ast_util::{self, DeclaredSymbol, ImportDecl};
use crate::error::{Result, ShaderError};
use crate::graph::{GlslVersion, NameSpace, ShaderNode, ShaderNodeVariable, ShaderStage};

impl<'t> GenerationContext<'t> {
    // ── Node sources ───────────────────────────────────────────────────

    /// Parse the source of every node that contributes to this stage.
    pub(super) fn resolve_nodes(&mut self, gen: &Generator<'_>) -> Result<()> {
        let technique = self.technique;
        for node in &technique.shader_nodes {
            if node.stage() != self.stage {
                continue;
            }
            if technique.generation_info.is_unused(&node.name) {
                log::debug!("skipping unused node {}", node.name);
                continue;
            }
            let path = node.definition.source_for(self.version).ok_or_else(|| {
                ShaderError::message(format!(
                    "shader node definition '{}' has no shader source",
                    node.definition.name
                ))
            })?;
            log::debug!("node {} ({}) from {path}", node.name, node.definition.name);
            let ast = gen.parse(path)?;
            self.nodes.push(ActiveNode { node, ast });
        }
        Ok(())
    }

    // ── Imports ────────────────────────────────────────────────────────

    /// Pull in every library the active nodes import, nested imports first.
    pub(super) fn resolve_imports(&mut self, gen: &Generator<'_>) -> Result<()> {
        let mut imports = Vec::new();
        for active in &self.nodes {
            let documented = &active.node.definition.imports;
            imports.extend(documented.iter().map(|path| ImportDecl { path: path.clone() }));
            imports.extend(ast_util::collect_imports(&active.ast));
            self.extensions.extend(ast_util::collect_extensions(&active.ast));
        }

        for import in ast_util::dedup_imports(imports) {
            self.import_file(gen, &import.path)?;
        }
        Ok(())
    }

    fn import_file(&mut self, gen: &Generator<'_>, path: &str) -> Result<()> {
        if self.emitted_imports.contains(path) {
            return Ok(());
        }
        if self.import_stack.iter().any(|p| p == path) {
            return Err(ShaderError::circular_import(path));
        }

        let ast = gen.parse(path)?;
        self.import_stack.push(path.to_string());
        for nested in ast_util::collect_imports(&ast) {
            self.import_file(gen, &nested.path)
                .map_err(|e| e.in_file(path))?;
        }
        self.import_stack.pop();
        self.emitted_imports.insert(path.to_string());
        log::debug!("importing {path}");

        ast_util::copy_defined_variables(&mut self.imported, &ast_util::declared_fields(&ast));
        self.extensions.extend(ast_util::collect_extensions(&ast));

        // Extensions move to the header and nested imports were expanded above.
        let mut hoisted = ast_util::find_all_by_type(&ast, ast.root(), NodeType::Import);
        hoisted.extend(ast_util::find_all_by_type(
            &ast,
            ast.root(),
            NodeType::ExtensionPreprocessor,
        ));
        let text = ast_util::strip_nodes(&ast, &hoisted);
        let text = text.trim();
        if !text.is_empty() {
            if !self.imports.is_empty() {
                self.imports.blank();
            }
            self.imports.raw(text);
        }
        Ok(())
    }

    // ── Header ─────────────────────────────────────────────────────────

    /// Extensions, per-node binding defines and node macros.
    pub(super) fn emit_header(&mut self) {
        let extensions = ast_util::dedup_extensions(std::mem::take(&mut self.extensions));
        for ext in &extensions {
            self.header.line(&ext.text);
        }

        for active in &self.nodes {
            let node = active.node;
            let ast = &active.ast;
            let referenced = ast_util::dedup_define_values(ast_util::collect_define_values(
                ast,
                ast.root(),
            ));
            let documented = &node.definition.defines;
            let is_referenced = |name: &str| {
                referenced.iter().chain(documented).any(|d| d == name)
            };

            for input in &node.definition.inputs {
                let bound =
                    node.mappings_for(&input.name).next().is_some() || input.default_value.is_some();
                if bound && is_referenced(&input.name) {
                    self.header.line(&format!("#define {} 1", body::bound_define(node, &input.name)));
                }
            }
            for output in &node.definition.outputs {
                if is_referenced(&output.name) && self.is_consumed(node, &output.name) {
                    self.header.line(&format!("#define {} 1", body::bound_define(node, &output.name)));
                }
            }

            let renames = body::scope_renames(node, ast);
            for id in ast_util::children_by_type(ast, ast.root(), NodeType::MacroDeclaration) {
                let Some(name) = ast.name_of(id) else {
                    continue;
                };
                let value = renames.apply(ast.macro_value(id).unwrap_or_default());
                if value.is_empty() {
                    self.header.line(&format!("#define {}_{name}", node.name));
                } else {
                    self.header.line(&format!("#define {}_{name} {value}", node.name));
                }
            }
        }
    }

    /// Whether anything reads `output` of `node`: its own output mappings or
    /// another node's input mapping.
    fn is_consumed(&self, node: &ShaderNode, output: &str) -> bool {
        let mapped_out = node
            .output_mapping
            .iter()
            .filter_map(|m| m.right.as_ref())
            .any(|r| r.name == output);
        mapped_out
            || self
                .technique
                .shader_nodes
                .iter()
                .flat_map(|n| &n.input_mapping)
                .filter_map(|m| m.right.as_ref())
                .any(|r| r.name_space == node.name && r.name == output)
    }

    // ── Uniforms, attributes, varyings ─────────────────────────────────

    pub(super) fn emit_declarations(&mut self) -> Result<()> {
        let technique = self.technique;
        let info = &technique.generation_info;
        let stage = self.stage;

        let mut uniforms: Vec<DeclaredSymbol> = Vec::new();
        let mut attributes: Vec<DeclaredSymbol> = Vec::new();
        let mut varyings: Vec<DeclaredSymbol> = Vec::new();

        for var in info.uniforms_for(stage) {
            push_unique(&mut uniforms, symbol(FieldKind::Uniform, var));
        }
        if stage == ShaderStage::Vertex {
            for var in &info.attributes {
                push_unique(&mut attributes, symbol(FieldKind::Attribute, var));
            }
        }
        for var in &info.varyings {
            push_unique(&mut varyings, symbol(FieldKind::Varying, var));
        }

        for active in &self.nodes {
            let node = active.node;
            for right in node.input_mapping.iter().filter_map(|m| m.right.as_ref()) {
                match right.name_space() {
                    NameSpace::MatParam | NameSpace::WorldParam => {
                        push_unique(&mut uniforms, symbol(FieldKind::Uniform, right));
                    }
                    NameSpace::Attr if stage == ShaderStage::Vertex => {
                        push_unique(&mut attributes, symbol(FieldKind::Attribute, right));
                    }
                    NameSpace::Node(_) if technique.is_varying(right) => {
                        push_unique(&mut varyings, symbol(FieldKind::Varying, right));
                    }
                    _ => {}
                }
            }
            if stage == ShaderStage::Vertex {
                for output in &node.definition.outputs {
                    let var = owned_by(node, output);
                    if technique.is_varying(&var) {
                        push_unique(&mut varyings, symbol(FieldKind::Varying, &var));
                    }
                }
            }

            for field in ast_util::file_level_fields(&active.ast) {
                match (field.kind, stage) {
                    (FieldKind::Uniform, _) => push_unique(&mut uniforms, field),
                    (FieldKind::Attribute | FieldKind::In, ShaderStage::Vertex) => {
                        push_unique(&mut attributes, field)
                    }
                    (FieldKind::Varying, _)
                    | (FieldKind::Out, ShaderStage::Vertex)
                    | (FieldKind::In, ShaderStage::Fragment) => push_unique(&mut varyings, field),
                    (FieldKind::Attribute | FieldKind::Out, ShaderStage::Fragment) => {}
                }
            }
        }

        if stage == ShaderStage::Vertex {
            if let Some(pos) = attributes.iter().find(|a| a.name == "inPosition" && a.ty != "vec3") {
                log::warn!("attribute inPosition declared as {}, emitting vec3", pos.ty);
            }
            attributes.retain(|a| a.name != "inPosition");
            attributes.insert(0, DeclaredSymbol::new(FieldKind::Attribute, "vec3", "inPosition"));
        }

        self.declared_uniforms = uniforms.iter().map(|u| u.name.clone()).collect();
        ast_util::remove_exists(&mut uniforms, &self.imported);
        ast_util::remove_exists(&mut attributes, &self.imported);
        ast_util::remove_exists(&mut varyings, &self.imported);

        let block = &mut self.declarations;
        for u in &uniforms {
            block.line(&format!("uniform {} {};", u.ty, u.name));
        }
        for a in &attributes {
            block.line(&format!("{} {} {};", self.version.attribute_qualifier(), a.ty, a.name));
        }
        let varying = self.version.varying_qualifier(stage);
        for v in &varyings {
            block.line(&format!("{varying} {} {};", v.ty, v.name));
        }
        if stage == ShaderStage::Fragment && self.version == GlslVersion::Glsl150 {
            block.line("out vec4 outFragColor;");
        }

        // File-level conditional blocks without methods travel verbatim.
        for active in &self.nodes {
            let ast = &active.ast;
            let blocks: Vec<_> =
                ast_util::children_by_type(ast, ast.root(), NodeType::ConditionalPreprocessor)
                    .into_iter()
                    .filter(|&c| {
                        ast_util::find_first_by_type(ast, c, NodeType::MethodDeclaration).is_none()
                    })
                    .collect();
            if blocks.is_empty() {
                continue;
            }
            let renames = body::main_renames(active.node, ast)?;
            for id in blocks {
                self.declarations.raw(&renames.apply(ast.text(id)));
            }
        }
        Ok(())
    }
}

/// `var` as a member of `node`'s namespace.
pub(super) fn owned_by(node: &ShaderNode, var: &ShaderNodeVariable) -> ShaderNodeVariable {
    ShaderNodeVariable {
        name_space: node.name.clone(),
        ..var.clone()
    }
}

fn symbol(kind: FieldKind, var: &ShaderNodeVariable) -> DeclaredSymbol {
    DeclaredSymbol::new(kind, var.ty.as_str(), var.qualified_name())
}

fn push_unique(list: &mut Vec<DeclaredSymbol>, symbol: DeclaredSymbol) {
    if !list.iter().any(|s| s.name == symbol.name) {
        list.push(symbol);
    }
}
