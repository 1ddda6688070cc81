pub mod assets;
pub mod ast;
pub mod ast_util;
pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod lexer;
pub mod logger;
pub mod parser;
pub mod token;

use assets::AssetLoader;
use config::GeneratorConfig;
use error::Result;
use generator::{GeneratedShader, Generator};
use graph::{ShaderStage, TechniqueDefinition};

/// Parse one GLSL shader-node source with the default condition grammar.
pub fn parse_file(path: &str, source: &str) -> Result<ast::Ast> {
    parser::parse(path, source)
}

/// Compose one stage of a technique given as JSON, with default settings.
pub fn compose(
    technique_json: &str,
    loader: &dyn AssetLoader,
    stage: ShaderStage,
) -> Result<GeneratedShader> {
    let technique = TechniqueDefinition::from_json(technique_json)?;
    Generator::new(loader, GeneratorConfig::default()).generate(&technique, stage)
}

/// Compose both stages of a technique given as JSON, vertex first.
pub fn compose_technique(
    technique_json: &str,
    loader: &dyn AssetLoader,
    config: GeneratorConfig,
) -> Result<Vec<GeneratedShader>> {
    let technique = TechniqueDefinition::from_json(technique_json)?;
    Generator::new(loader, config).generate_technique(&technique)
}
