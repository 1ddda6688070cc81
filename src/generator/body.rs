use super::declarations::owned_by;
use super::{ActiveNode, CodeBlock, GenerationContext};
use crate::ast::{Ast, NodeType};
use crate::ast_util::{self, Renames};
use crate::error::{Result, ShaderError};
use crate::graph::{
    GlslVersion, ShaderNode, ShaderStage, TechniqueDefinition, VariableMapping,
};

impl<'t> GenerationContext<'t> {
    // ── Helper methods ─────────────────────────────────────────────────

    /// Every method except `main`, renamed into the node's namespace.
    pub(super) fn emit_helpers(&mut self) {
        for active in &self.nodes {
            let renames = scope_renames(active.node, &active.ast);
            for (id, name) in ast_util::methods(&active.ast) {
                if name == "main" {
                    continue;
                }
                if !self.helpers.is_empty() {
                    self.helpers.blank();
                }
                self.helpers.raw(&renames.apply(active.ast.text(id)));
            }
        }
    }

    // ── main ───────────────────────────────────────────────────────────

    pub(super) fn emit_main(&mut self) -> Result<()> {
        let globals = self.technique.generation_info.globals_for(self.stage);
        let init = match self.stage {
            ShaderStage::Vertex => "vec4(inPosition, 1.0)",
            ShaderStage::Fragment => "vec4(1.0)",
        };

        self.main.line("void main() {");
        self.main.depth += 1;
        for global in &globals {
            self.main
                .line(&format!("{} {} = {init};", global.ty, global.qualified_name()));
        }

        for active in &self.nodes {
            self.main.blank();
            write_node(&mut self.main, self.technique, self.stage, active)?;
        }

        self.main.blank();
        let names: Vec<String> = globals.iter().map(|g| g.qualified_name()).collect();
        match (self.stage, self.version, names.as_slice()) {
            (_, _, []) => {}
            (ShaderStage::Vertex, _, [position, ..]) => {
                self.main.line(&format!("gl_Position = {position};"));
            }
            (ShaderStage::Fragment, GlslVersion::Glsl100, [color]) => {
                self.main.line(&format!("gl_FragColor = {color};"));
            }
            (ShaderStage::Fragment, GlslVersion::Glsl100, targets) => {
                for (i, target) in targets.iter().enumerate() {
                    self.main.line(&format!("gl_FragData[{i}] = {target};"));
                }
            }
            (ShaderStage::Fragment, GlslVersion::Glsl150, [color, rest @ ..]) => {
                if !rest.is_empty() {
                    log::warn!("GLSL 1.50 output has a single color target, ignoring {rest:?}");
                }
                self.main.line(&format!("outFragColor = {color};"));
            }
        }
        self.main.depth -= 1;
        self.main.line("}");
        Ok(())
    }
}

/// One node's section of `main`: input wiring, output locals, the renamed
/// body and the output mappings, between begin/end markers.
fn write_node(
    out: &mut CodeBlock,
    technique: &TechniqueDefinition,
    stage: ShaderStage,
    active: &ActiveNode<'_>,
) -> Result<()> {
    let node = active.node;
    let ast = &active.ast;
    log::debug!("emitting node {}", node.name);

    out.line(&format!("/* {} Begin */", node.name));
    let body = ast_util::find_method(ast, "main")
        .and_then(|main| ast.child_of_type(main, NodeType::MethodBody));
    let Some(body) = body else {
        out.line(&format!("/* {} End */", node.name));
        return Ok(());
    };
    let renames = main_renames(node, ast)?;

    if let Some(condition) = &node.condition {
        out.line(&guard(condition));
    }
    write_inputs(out, node)?;
    write_outputs(out, technique, stage, node);

    let text = ast.text(body);
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(text);
    let renamed = renames.apply(inner);
    for line in dedent(&renamed) {
        out.line(line);
    }

    for mapping in &node.output_mapping {
        let value = right_value(node, mapping)?;
        let target = mapping.left.qualified_name();
        assign(out, &target, &mapping.left_swizzling, &value, mapping.condition.as_deref());
    }
    if node.condition.is_some() {
        out.line("#endif");
    }
    out.line(&format!("/* {} End */", node.name));
    Ok(())
}

fn write_inputs(out: &mut CodeBlock, node: &ShaderNode) -> Result<()> {
    for input in &node.definition.inputs {
        // Samplers are substituted by their uniform, see `main_renames`.
        if input.is_sampler() {
            continue;
        }
        let local = prefixed(node, &input.name);
        let declaration = match &input.default_value {
            Some(default) => format!("{} {local} = {default};", input.ty),
            None => format!("{} {local};", input.ty),
        };
        let mappings: Vec<&VariableMapping> = node.mappings_for(&input.name).collect();
        match mappings.as_slice() {
            [] => out.line(&declaration),
            [m] if m.left_swizzling.is_empty() && m.condition.is_none() => {
                let value = right_value(node, m)?;
                out.line(&format!("{} {local} = {value};", input.ty));
            }
            _ => {
                out.line(&declaration);
                for m in mappings {
                    let value = right_value(node, m)?;
                    assign(out, &local, &m.left_swizzling, &value, m.condition.as_deref());
                }
            }
        }
    }
    Ok(())
}

fn write_outputs(
    out: &mut CodeBlock,
    technique: &TechniqueDefinition,
    stage: ShaderStage,
    node: &ShaderNode,
) {
    for output in &node.definition.outputs {
        // Varyings are declared with the other globals.
        if stage == ShaderStage::Vertex && technique.is_varying(&owned_by(node, output)) {
            continue;
        }
        let local = prefixed(node, &output.name);
        match &output.default_value {
            Some(default) => out.line(&format!("{} {local} = {default};", output.ty)),
            None => out.line(&format!("{} {local};", output.ty)),
        }
    }
}

fn assign(out: &mut CodeBlock, target: &str, swizzle: &str, value: &str, condition: Option<&str>) {
    if let Some(condition) = condition {
        out.line(&guard(condition));
    }
    if swizzle.is_empty() {
        out.line(&format!("{target} = {value};"));
    } else {
        out.line(&format!("{target}.{swizzle} = {value};"));
    }
    if condition.is_some() {
        out.line("#endif");
    }
}

fn right_value(node: &ShaderNode, mapping: &VariableMapping) -> Result<String> {
    mapping.right_value().ok_or_else(|| {
        ShaderError::message(format!(
            "mapping of {}.{} has neither a variable nor an expression",
            node.name, mapping.left.name
        ))
    })
}

/// `#ifdef NAME` for a bare macro name, `#if ...` for anything else.
fn guard(condition: &str) -> String {
    let condition = condition.trim();
    let bare = !condition.is_empty()
        && condition.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if bare {
        format!("#ifdef {condition}")
    } else {
        format!("#if {condition}")
    }
}

fn prefixed(node: &ShaderNode, name: &str) -> String {
    format!("{}_{name}", node.name)
}

/// Define announcing that `name` of `node` is bound. Kept apart from the
/// prefixed local so the preprocessor never rewrites the declaration.
pub(super) fn bound_define(node: &ShaderNode, name: &str) -> String {
    format!("{}_{name}_BOUND", node.name)
}

// ── Renaming ───────────────────────────────────────────────────────────

/// Helper methods and file-level macros of a node, moved into its namespace.
pub(super) fn scope_renames(node: &ShaderNode, ast: &Ast) -> Renames {
    let mut renames = Renames::new();
    for (_, name) in ast_util::methods(ast) {
        if name != "main" {
            renames.method(name, prefixed(node, name));
        }
    }
    for id in ast_util::find_all_by_type(ast, ast.root(), NodeType::MacroDeclaration) {
        if let Some(name) = ast.name_of(id) {
            renames.var(name, prefixed(node, name));
        }
    }
    renames
}

/// Everything `main` refers to: the scope renames plus main's locals and the
/// node's inputs and outputs. Sampler inputs become the uniform they are
/// bound to. In directives every input and output names its binding define.
pub(super) fn main_renames(node: &ShaderNode, ast: &Ast) -> Result<Renames> {
    let mut renames = scope_renames(node, ast);
    if let Some(main) = ast_util::find_method(ast, "main") {
        for local in ast_util::find_all_by_type(ast, main, NodeType::LocalVarDeclaration) {
            for name in ast.names_of(local) {
                renames.var(name, prefixed(node, name));
            }
        }
    }
    for output in &node.definition.outputs {
        renames
            .var(output.name.as_str(), prefixed(node, &output.name))
            .define(output.name.as_str(), bound_define(node, &output.name));
    }
    for input in &node.definition.inputs {
        let local = match sampler_uniform(node, &input.name, input.is_sampler())? {
            Some(uniform) => uniform,
            None => prefixed(node, &input.name),
        };
        renames
            .var(input.name.as_str(), local)
            .define(input.name.as_str(), bound_define(node, &input.name));
    }
    Ok(renames)
}

/// Uniform a sampler input is bound to. Samplers can only be fed by
/// material or world parameters.
fn sampler_uniform(node: &ShaderNode, input: &str, is_sampler: bool) -> Result<Option<String>> {
    if !is_sampler {
        return Ok(None);
    }
    let Some(mapping) = node.mappings_for(input).next() else {
        return Ok(None);
    };
    match &mapping.right {
        Some(right) if right.is_uniform_param() => Ok(Some(right.qualified_name())),
        Some(right) => Err(ShaderError::sampler_binding(
            &node.name,
            input,
            &right.qualified_name(),
        )),
        None => Err(ShaderError::sampler_binding(
            &node.name,
            input,
            mapping.right_expression.as_deref().unwrap_or_default(),
        )),
    }
}

/// Lines of `text` with the common indentation of code lines removed.
/// Preprocessor lines are left-aligned; blank edges are dropped.
pub(super) fn dedent(text: &str) -> Vec<&str> {
    let leading = |l: &str| l.len() - l.trim_start_matches([' ', '\t']).len();
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let indent = lines
        .iter()
        .filter(|l| !l.is_empty() && !l.trim_start().starts_with('#'))
        .map(|&l| leading(l))
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .map(|&l| {
            let trimmed = l.trim_start();
            if trimmed.starts_with('#') || leading(l) < indent {
                trimmed
            } else {
                &l[indent..]
            }
        })
        .collect();
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}
