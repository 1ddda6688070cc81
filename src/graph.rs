//! Node-graph data model handed to the composer.
//!
//! An editor (or a JSON file) describes a technique: the shader nodes it
//! uses, how their inputs and outputs are wired, and the declarations the
//! technique as a whole needs. The composer only reads this model.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShaderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target GLSL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlslVersion {
    #[default]
    #[serde(rename = "GLSL100")]
    Glsl100,
    #[serde(rename = "GLSL150")]
    Glsl150,
}

impl GlslVersion {
    /// Language tag used by [`ShaderSource::language`].
    pub fn as_str(self) -> &'static str {
        match self {
            GlslVersion::Glsl100 => "GLSL100",
            GlslVersion::Glsl150 => "GLSL150",
        }
    }

    /// Storage qualifier for vertex inputs.
    pub fn attribute_qualifier(self) -> &'static str {
        match self {
            GlslVersion::Glsl100 => "attribute",
            GlslVersion::Glsl150 => "in",
        }
    }

    /// Storage qualifier for a varying as seen from `stage`.
    pub fn varying_qualifier(self, stage: ShaderStage) -> &'static str {
        match (self, stage) {
            (GlslVersion::Glsl100, _) => "varying",
            (GlslVersion::Glsl150, ShaderStage::Vertex) => "out",
            (GlslVersion::Glsl150, ShaderStage::Fragment) => "in",
        }
    }
}

/// Where a variable lives, decoded from [`ShaderNodeVariable::name_space`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSpace<'a> {
    /// Material parameter, emitted as `m_<name>`.
    MatParam,
    /// Engine-provided world parameter, emitted as `g_<name>`.
    WorldParam,
    /// Vertex attribute, name used as is.
    Attr,
    /// Shared shader global such as `Global_color`.
    Global,
    /// Input or output of the named shader node.
    Node(&'a str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderNodeVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub name_space: String,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl ShaderNodeVariable {
    pub fn new(ty: &str, name_space: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            name_space: name_space.to_string(),
            default_value: None,
            condition: None,
        }
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    pub fn name_space(&self) -> NameSpace<'_> {
        match self.name_space.as_str() {
            "MatParam" => NameSpace::MatParam,
            "WorldParam" => NameSpace::WorldParam,
            "Attr" | "Attribute" => NameSpace::Attr,
            "Global" => NameSpace::Global,
            node => NameSpace::Node(node),
        }
    }

    pub fn is_sampler(&self) -> bool {
        self.ty.starts_with("sampler")
    }

    /// Material and world parameters end up as uniforms.
    pub fn is_uniform_param(&self) -> bool {
        matches!(self.name_space(), NameSpace::MatParam | NameSpace::WorldParam)
    }

    /// Name the variable carries in generated code.
    pub fn qualified_name(&self) -> String {
        match self.name_space() {
            NameSpace::MatParam => format!("m_{}", self.name),
            NameSpace::WorldParam => format!("g_{}", self.name),
            NameSpace::Attr => self.name.clone(),
            NameSpace::Global => format!("Global_{}", self.name),
            NameSpace::Node(node) => format!("{node}_{}", self.name),
        }
    }
}

/// One wire of the graph: `left = right` for input mappings, where `left`
/// belongs to the node; for output mappings `right` belongs to the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMapping {
    pub left: ShaderNodeVariable,
    #[serde(default)]
    pub right: Option<ShaderNodeVariable>,
    /// Literal GLSL used instead of `right`.
    #[serde(default)]
    pub right_expression: Option<String>,
    #[serde(default)]
    pub left_swizzling: String,
    #[serde(default)]
    pub right_swizzling: String,
    #[serde(default)]
    pub condition: Option<String>,
}

impl VariableMapping {
    pub fn new(left: ShaderNodeVariable, right: ShaderNodeVariable) -> Self {
        Self {
            left,
            right: Some(right),
            ..Self::default()
        }
    }

    /// The right-hand side as GLSL, or `None` when the mapping has neither a
    /// variable nor an expression.
    pub fn right_value(&self) -> Option<String> {
        if let Some(expr) = &self.right_expression {
            return Some(expr.clone());
        }
        let right = self.right.as_ref()?;
        let mut value = right.qualified_name();
        if !self.right_swizzling.is_empty() {
            value.push('.');
            value.push_str(&self.right_swizzling);
        }
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSource {
    /// `GLSL100`, `GLSL150`...
    pub language: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderNodeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub stage: ShaderStage,
    pub shader_sources: Vec<ShaderSource>,
    #[serde(default)]
    pub inputs: Vec<ShaderNodeVariable>,
    #[serde(default)]
    pub outputs: Vec<ShaderNodeVariable>,
    /// Library files the node needs in addition to its own `#import`s.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Defines the node reacts to. A bound input listed here gets its
    /// binding define even when the source never tests it.
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl ShaderNodeDefinition {
    /// Source path for `version`, falling back to the first listed source.
    pub fn source_for(&self, version: GlslVersion) -> Option<&str> {
        self.shader_sources
            .iter()
            .find(|s| s.language == version.as_str())
            .or_else(|| self.shader_sources.first())
            .map(|s| s.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderNode {
    pub name: String,
    pub definition: ShaderNodeDefinition,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub input_mapping: Vec<VariableMapping>,
    #[serde(default)]
    pub output_mapping: Vec<VariableMapping>,
}

impl ShaderNode {
    pub fn stage(&self) -> ShaderStage {
        self.definition.stage
    }

    /// Mappings that feed the named input.
    pub fn mappings_for<'a>(&'a self, input: &'a str) -> impl Iterator<Item = &'a VariableMapping> {
        self.input_mapping.iter().filter(move |m| m.left.name == input)
    }
}

/// Declarations the technique contributes on top of what the nodes declare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderGenerationInfo {
    #[serde(default)]
    pub attributes: Vec<ShaderNodeVariable>,
    #[serde(default)]
    pub vertex_uniforms: Vec<ShaderNodeVariable>,
    #[serde(default)]
    pub fragment_uniforms: Vec<ShaderNodeVariable>,
    #[serde(default)]
    pub varyings: Vec<ShaderNodeVariable>,
    #[serde(default)]
    pub vertex_global: Option<ShaderNodeVariable>,
    #[serde(default)]
    pub fragment_globals: Vec<ShaderNodeVariable>,
    /// Nodes present in the graph but not contributing to the output.
    #[serde(default)]
    pub unused_nodes: Vec<String>,
}

impl ShaderGenerationInfo {
    pub fn uniforms_for(&self, stage: ShaderStage) -> &[ShaderNodeVariable] {
        match stage {
            ShaderStage::Vertex => &self.vertex_uniforms,
            ShaderStage::Fragment => &self.fragment_uniforms,
        }
    }

    /// Shader globals of `stage`, defaulting to `Global_position` and
    /// `Global_color`.
    pub fn globals_for(&self, stage: ShaderStage) -> Vec<ShaderNodeVariable> {
        match stage {
            ShaderStage::Vertex => vec![self
                .vertex_global
                .clone()
                .unwrap_or_else(|| ShaderNodeVariable::new("vec4", "Global", "position"))],
            ShaderStage::Fragment if self.fragment_globals.is_empty() => {
                vec![ShaderNodeVariable::new("vec4", "Global", "color")]
            }
            ShaderStage::Fragment => self.fragment_globals.clone(),
        }
    }

    pub fn is_unused(&self, node: &str) -> bool {
        self.unused_nodes.iter().any(|n| n == node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueDefinition {
    pub name: String,
    #[serde(default)]
    pub shader_nodes: Vec<ShaderNode>,
    #[serde(default)]
    pub generation_info: ShaderGenerationInfo,
}

impl TechniqueDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ShaderError::message(format!("invalid technique definition: {e}")))
    }

    pub fn node(&self, name: &str) -> Option<&ShaderNode> {
        self.shader_nodes.iter().find(|n| n.name == name)
    }

    /// Whether `var` is an output of a vertex node read by the fragment
    /// stage, i.e. must travel as a varying.
    pub fn is_varying(&self, var: &ShaderNodeVariable) -> bool {
        if self.generation_info.varyings.iter().any(|v| {
            v.name == var.name && v.name_space == var.name_space
        }) {
            return true;
        }
        let NameSpace::Node(owner) = var.name_space() else {
            return false;
        };
        if self.node(owner).map(ShaderNode::stage) != Some(ShaderStage::Vertex) {
            return false;
        }
        self.shader_nodes
            .iter()
            .filter(|n| n.stage() == ShaderStage::Fragment)
            .flat_map(|n| &n.input_mapping)
            .filter_map(|m| m.right.as_ref())
            .any(|r| r.name == var.name && r.name_space == var.name_space)
    }
}
