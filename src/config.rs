use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShaderError};
use crate::graph::GlslVersion;
use crate::parser::ConditionGrammar;

/// Knobs of the composition engine. Every field has a default, so a config
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Reuse parsed node sources across requests through an [`AstCache`].
    ///
    /// [`AstCache`]: crate::cache::AstCache
    pub use_ast_cache: bool,
    pub glsl_version: GlslVersion,
    pub condition_grammar: ConditionGrammar,
    /// One indentation level in generated code.
    pub indent: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            use_ast_cache: true,
            glsl_version: GlslVersion::default(),
            condition_grammar: ConditionGrammar::default(),
            indent: "    ".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ShaderError::message(format!("invalid generator config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|e| ShaderError::resolve(&display, e))?;
        Self::from_json(&json).map_err(|e| e.in_file(&display))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = GeneratorConfig::from_json(r#"{ "glslVersion": "GLSL150" }"#).unwrap();
        assert_eq!(config.glsl_version, GlslVersion::Glsl150);
        assert!(config.use_ast_cache);
        assert_eq!(config.condition_grammar, ConditionGrammar::Flat);
        assert_eq!(config.indent, "    ");
    }

    #[test]
    fn condition_grammar_is_snake_case() {
        let config =
            GeneratorConfig::from_json(r#"{ "conditionGrammar": "precedence", "indent": "\t" }"#)
                .unwrap();
        assert_eq!(config.condition_grammar, ConditionGrammar::Precedence);
        assert_eq!(config.indent, "\t");
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(GeneratorConfig::from_json(r#"{ "glslVersion": "GLSL330" }"#).is_err());
    }
}
