use super::*;
use crate::assets::MemoryAssetLoader;
use crate::error::ErrorKind;
use crate::graph::{ShaderGenerationInfo, ShaderNodeDefinition, ShaderNodeVariable, ShaderSource, VariableMapping};
use crate::lexer;
use crate::token::TokenKind;

const SCALE_FRAG: &str = "float scale(float v) {
    return v * 2.0;
}

void main() {
    float temp = scale(inValue);
    outValue = temp;
}
";

fn var(ty: &str, name_space: &str, name: &str) -> ShaderNodeVariable {
    ShaderNodeVariable::new(ty, name_space, name)
}

fn definition(
    name: &str,
    stage: ShaderStage,
    path: &str,
    inputs: Vec<ShaderNodeVariable>,
    outputs: Vec<ShaderNodeVariable>,
) -> ShaderNodeDefinition {
    ShaderNodeDefinition {
        name: name.to_string(),
        stage,
        shader_sources: vec![ShaderSource {
            language: "GLSL100".to_string(),
            path: path.to_string(),
        }],
        inputs,
        outputs,
        imports: vec![],
        defines: vec![],
        documentation: None,
    }
}

fn node(name: &str, definition: ShaderNodeDefinition) -> ShaderNode {
    ShaderNode {
        name: name.to_string(),
        definition,
        condition: None,
        input_mapping: vec![],
        output_mapping: vec![],
    }
}

fn technique(nodes: Vec<ShaderNode>) -> TechniqueDefinition {
    TechniqueDefinition {
        name: "Default".to_string(),
        shader_nodes: nodes,
        generation_info: ShaderGenerationInfo::default(),
    }
}

/// Two instances of the same `Scale` definition, chained: N1 reads the
/// material parameter `Factor`, N2 reads N1 and writes the red channel.
fn scale_chain() -> TechniqueDefinition {
    let scale = definition(
        "Scale",
        ShaderStage::Fragment,
        "Scale.frag",
        vec![var("float", "", "inValue")],
        vec![var("float", "", "outValue")],
    );
    let mut n1 = node("N1", scale.clone());
    n1.input_mapping.push(VariableMapping::new(
        var("float", "N1", "inValue"),
        var("float", "MatParam", "Factor"),
    ));
    let mut n2 = node("N2", scale);
    n2.input_mapping.push(VariableMapping::new(
        var("float", "N2", "inValue"),
        var("float", "N1", "outValue"),
    ));
    let mut out = VariableMapping::new(var("vec4", "Global", "color"), var("float", "N2", "outValue"));
    out.left_swizzling = "r".to_string();
    n2.output_mapping.push(out);
    technique(vec![n1, n2])
}

fn compose(loader: &MemoryAssetLoader, technique: &TechniqueDefinition, stage: ShaderStage) -> GeneratedShader {
    Generator::new(loader, GeneratorConfig::default())
        .generate(technique, stage)
        .expect("composition failed")
}

fn words(source: &str) -> Vec<&str> {
    lexer::tokenize(source)
        .into_iter()
        .filter(|t| t.kind == TokenKind::Word)
        .map(|t| t.text)
        .collect()
}

#[test]
fn compose_two_instances_of_one_definition() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let shader = compose(&loader, &scale_chain(), ShaderStage::Fragment);

    let expected = "\
uniform float m_Factor;

float N1_scale(float v) {
    return v * 2.0;
}

float N2_scale(float v) {
    return v * 2.0;
}

void main() {
    vec4 Global_color = vec4(1.0);

    /* N1 Begin */
    float N1_inValue = m_Factor;
    float N1_outValue;
    float N1_temp = N1_scale(N1_inValue);
    N1_outValue = N1_temp;
    /* N1 End */

    /* N2 Begin */
    float N2_inValue = N1_outValue;
    float N2_outValue;
    float N2_temp = N2_scale(N2_inValue);
    N2_outValue = N2_temp;
    Global_color.r = N2_outValue;
    /* N2 End */

    gl_FragColor = Global_color;
}
";
    assert_eq!(shader.source, expected);
    assert!(shader.required_uniforms.is_empty());
}

#[test]
fn renamed_symbols_never_leak_bare() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let shader = compose(&loader, &scale_chain(), ShaderStage::Fragment);
    let words = words(&shader.source);
    for bare in ["temp", "scale", "inValue", "outValue"] {
        assert!(!words.contains(&bare), "bare '{bare}' left in:\n{}", shader.source);
    }
    assert!(shader.source.contains("N1_temp"));
    assert!(shader.source.contains("N2_scale("));
}

const TANGLED_FRAG: &str = "float scale(float v) {
    return v * 2.0;
}

void main() {
    // Scale the input.
    float a, b = scale(inValue), c[2];
    /* Halve it. */
    a = b * 0.5;
    c[0] = a;
    c[1] = b;
#ifdef inValue
    outValue = c[0] + c[1];
#else
    outValue = 0.0;
#endif
}
";

#[test]
fn two_instances_rename_every_declared_symbol() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", TANGLED_FRAG);
    let shader = compose(&loader, &scale_chain(), ShaderStage::Fragment);
    let src = &shader.source;

    let words = words(src);
    for bare in ["a", "b", "c", "scale", "inValue", "outValue"] {
        assert!(!words.contains(&bare), "bare '{bare}' left in:\n{src}");
    }
    for n in ["N1", "N2"] {
        let declaration = format!("    float {n}_a, {n}_b = {n}_scale({n}_inValue), {n}_c[2];\n");
        assert_eq!(src.matches(&declaration).count(), 1, "{declaration:?} in:\n{src}");
        assert!(src.contains(&format!("    // Scale the input.\n{declaration}")));
        assert!(src.contains(&format!("    /* Halve it. */\n    {n}_a = {n}_b * 0.5;\n")));
        assert!(src.contains(&format!("#ifdef {n}_inValue_BOUND\n    {n}_outValue = {n}_c[0] + {n}_c[1];\n")));
    }
    assert!(src.starts_with("#define N1_inValue_BOUND 1\n#define N2_inValue_BOUND 1\n"));
}

#[test]
fn binding_defines_never_name_a_declared_local() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", TANGLED_FRAG);
    let src = compose(&loader, &scale_chain(), ShaderStage::Fragment).source;
    let defines: Vec<&str> = src
        .lines()
        .filter_map(|l| l.strip_prefix("#define "))
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(defines.len(), 2);
    for define in defines {
        for tail in [" =", ";", ",", "["] {
            assert!(!src.contains(&format!(" {define}{tail}")), "{define} is also declared in:\n{src}");
        }
    }
}

#[test]
fn bound_output_define_does_not_shadow_its_local() {
    let source = "void main() {\n    outValue = 1.0;\n#ifdef outValue\n    outValue *= 2.0;\n#endif\n}\n";
    let loader = MemoryAssetLoader::new().with("Double.frag", source);
    let def = definition("Double", ShaderStage::Fragment, "Double.frag", vec![], vec![var("float", "", "outValue")]);
    let mut double = node("O1", def);
    let mut out = VariableMapping::new(var("vec4", "Global", "color"), var("float", "O1", "outValue"));
    out.left_swizzling = "r".to_string();
    double.output_mapping.push(out);

    let src = compose(&loader, &technique(vec![double]), ShaderStage::Fragment).source;
    assert!(src.starts_with("#define O1_outValue_BOUND 1\n"));
    assert!(src.contains("    float O1_outValue;\n    O1_outValue = 1.0;\n#ifdef O1_outValue_BOUND\n    O1_outValue *= 2.0;\n#endif\n"));
    assert!(!src.contains("#define O1_outValue "));
}

#[test]
fn vertex_stage_declares_in_position_once() {
    let source = "attribute vec4 inPosition;\nuniform mat4 g_WorldViewProjectionMatrix;\nvoid main() {\n    projPosition = g_WorldViewProjectionMatrix * modelPosition;\n}\n";
    let loader = MemoryAssetLoader::new().with("Transform.vert", source);
    let def = definition(
        "Transform",
        ShaderStage::Vertex,
        "Transform.vert",
        vec![var("vec4", "", "modelPosition")],
        vec![var("vec4", "", "projPosition")],
    );
    let mut transform = node("Transform", def);
    transform.input_mapping.push(VariableMapping::new(
        var("vec4", "Transform", "modelPosition"),
        var("vec4", "Global", "position"),
    ));
    transform.output_mapping.push(VariableMapping::new(
        var("vec4", "Global", "position"),
        var("vec4", "Transform", "projPosition"),
    ));
    let mut t = technique(vec![transform]);
    t.generation_info.attributes.push(var("vec3", "Attr", "inPosition"));

    let shader = compose(&loader, &t, ShaderStage::Vertex);
    assert_eq!(shader.source.matches("inPosition;").count(), 1);
    assert!(shader.source.contains("attribute vec3 inPosition;"));
    assert!(shader.source.contains("uniform mat4 g_WorldViewProjectionMatrix;"));
    assert!(shader.source.contains("vec4 Global_position = vec4(inPosition, 1.0);"));
    assert!(shader.source.contains("vec4 Transform_modelPosition = Global_position;"));
    assert!(shader.source.contains(
        "Transform_projPosition = g_WorldViewProjectionMatrix * Transform_modelPosition;"
    ));
    assert!(shader.source.contains("Global_position = Transform_projPosition;"));
    assert!(shader.source.trim_end().ends_with("gl_Position = Global_position;\n}"));
}

#[test]
fn empty_vertex_stage_still_has_position() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let shader = compose(&loader, &scale_chain(), ShaderStage::Vertex);
    assert_eq!(
        shader.source,
        "attribute vec3 inPosition;\n\nvoid main() {\n    vec4 Global_position = vec4(inPosition, 1.0);\n\n    gl_Position = Global_position;\n}\n"
    );
}

const TEXTURE_FRAG: &str = "void main() {
#ifdef colorMap
    outColor = texture2D(colorMap, texCoord);
#else
    outColor = vec4(1.0);
#endif
}
";

fn texture_node(source_var: ShaderNodeVariable) -> TechniqueDefinition {
    let def = definition(
        "Texture",
        ShaderStage::Fragment,
        "Texture.frag",
        vec![var("sampler2D", "", "colorMap"), var("vec2", "", "texCoord").with_default("vec2(0.0)")],
        vec![var("vec4", "", "outColor")],
    );
    let mut tex = node("Tex", def);
    tex.input_mapping.push(VariableMapping::new(var("sampler2D", "Tex", "colorMap"), source_var));
    tex.output_mapping.push(VariableMapping::new(
        var("vec4", "Global", "color"),
        var("vec4", "Tex", "outColor"),
    ));
    technique(vec![tex])
}

#[test]
fn sampler_input_is_replaced_by_its_uniform() {
    let loader = MemoryAssetLoader::new().with("Texture.frag", TEXTURE_FRAG);
    let shader = compose(&loader, &texture_node(var("sampler2D", "MatParam", "ColorMap")), ShaderStage::Fragment);
    let src = &shader.source;

    assert!(src.starts_with("#define Tex_colorMap_BOUND 1\n"));
    assert!(src.contains("uniform sampler2D m_ColorMap;"));
    assert!(src.contains("#ifdef Tex_colorMap_BOUND\n"));
    assert!(src.contains("Tex_outColor = texture2D(m_ColorMap, Tex_texCoord);"));
    assert!(src.contains("vec2 Tex_texCoord = vec2(0.0);"));
    assert!(!src.contains("sampler2D Tex_colorMap"));
}

#[test]
fn sampler_bound_to_non_uniform_is_fatal() {
    let loader = MemoryAssetLoader::new().with("Texture.frag", TEXTURE_FRAG);
    let t = texture_node(var("vec4", "Global", "color"));
    let err = Generator::new(&loader, GeneratorConfig::default())
        .generate(&t, ShaderStage::Fragment)
        .unwrap_err();
    match err.kind {
        ErrorKind::SamplerBinding { node, input, source_name } => {
            assert_eq!(node, "Tex");
            assert_eq!(input, "colorMap");
            assert_eq!(source_name, "Global_color");
        }
        other => panic!("expected SamplerBinding, got {other:?}"),
    }
}

const LIGHT_FRAG: &str = "#import \"Common/ShaderLib/Lighting.glsllib\"
#extension GL_OES_standard_derivatives : enable
void main() {
    outColor = lightColor(inColor);
}
";

const LIGHTING_LIB: &str = "#import \"Common/ShaderLib/Math.glsllib\"
#extension GL_OES_standard_derivatives : enable
uniform vec4 g_AmbientLightColor;

vec4 lightColor(vec4 c) {
    return c * g_AmbientLightColor * PI_HALF;
}
";

const MATH_LIB: &str = "#define PI_HALF 1.5707963
uniform float g_Time;
";

fn lighting_assets() -> MemoryAssetLoader {
    MemoryAssetLoader::new()
        .with("Light.frag", LIGHT_FRAG)
        .with("Common/ShaderLib/Lighting.glsllib", LIGHTING_LIB)
        .with("Common/ShaderLib/Math.glsllib", MATH_LIB)
}

fn lighting_technique() -> TechniqueDefinition {
    let def = definition(
        "Light",
        ShaderStage::Fragment,
        "Light.frag",
        vec![var("vec4", "", "inColor").with_default("vec4(1.0)")],
        vec![var("vec4", "", "outColor")],
    );
    let mut t = technique(vec![node("L1", def.clone()), node("L2", def)]);
    t.generation_info.fragment_uniforms.push(var("float", "WorldParam", "Time"));
    t
}

#[test]
fn imports_are_expanded_once_nested_first() {
    let loader = lighting_assets();
    let shader = compose(&loader, &lighting_technique(), ShaderStage::Fragment);
    let src = &shader.source;

    assert_eq!(src.matches("#extension GL_OES_standard_derivatives : enable").count(), 1);
    assert!(src.starts_with("#extension GL_OES_standard_derivatives : enable\n"));
    assert!(!src.contains("#import"));
    assert_eq!(src.matches("vec4 lightColor(vec4 c)").count(), 1);
    assert_eq!(src.matches("uniform float g_Time;").count(), 1);

    let math = src.find("#define PI_HALF").unwrap();
    let lighting = src.find("uniform vec4 g_AmbientLightColor;").unwrap();
    let main = src.find("void main()").unwrap();
    assert!(math < lighting && lighting < main);

    assert!(src.contains("L1_outColor = lightColor(L1_inColor);"));
    assert!(src.contains("L2_outColor = lightColor(L2_inColor);"));
}

#[test]
fn undeclared_world_parameters_are_required() {
    let loader = lighting_assets();
    let shader = compose(&loader, &lighting_technique(), ShaderStage::Fragment);
    assert_eq!(
        shader.required_uniforms.into_iter().collect::<Vec<_>>(),
        vec!["AmbientLightColor".to_string()]
    );
}

#[test]
fn circular_import_is_reported() {
    let loader = MemoryAssetLoader::new()
        .with("Loop.frag", "#import \"A.glsllib\"\nvoid main() {}\n")
        .with("A.glsllib", "#import \"B.glsllib\"\nfloat a() { return 1.0; }\n")
        .with("B.glsllib", "#import \"A.glsllib\"\nfloat b() { return 2.0; }\n");
    let def = definition("Loop", ShaderStage::Fragment, "Loop.frag", vec![], vec![]);
    let t = technique(vec![node("Loop", def)]);
    let err = Generator::new(&loader, GeneratorConfig::default())
        .generate(&t, ShaderStage::Fragment)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CircularImport { ref path } if path == "A.glsllib"));
    assert_eq!(err.path.as_deref(), Some("B.glsllib"));
}

#[test]
fn missing_import_names_the_asset() {
    let loader = MemoryAssetLoader::new().with("Light.frag", LIGHT_FRAG);
    let err = Generator::new(&loader, GeneratorConfig::default())
        .generate(&lighting_technique(), ShaderStage::Fragment)
        .unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::Resolve { ref path, .. } if path == "Common/ShaderLib/Lighting.glsllib")
    );
}

#[test]
fn glsl150_uses_in_out_qualifiers() {
    let vert = "void main() {\n    texCoordOut = inTexCoord;\n}\n";
    let frag = "void main() {\n    outColor = vec4(texCoordIn, 0.0, 1.0);\n}\n";
    let loader = MemoryAssetLoader::new().with("Pass.vert", vert).with("Show.frag", frag);

    let mut pass = node(
        "Pass",
        definition("Pass", ShaderStage::Vertex, "Pass.vert", vec![var("vec2", "", "inTexCoord")], vec![var("vec2", "", "texCoordOut")]),
    );
    pass.input_mapping.push(VariableMapping::new(
        var("vec2", "Pass", "inTexCoord"),
        var("vec2", "Attr", "inTexCoord"),
    ));
    let mut show = node(
        "Show",
        definition("Show", ShaderStage::Fragment, "Show.frag", vec![var("vec2", "", "texCoordIn")], vec![var("vec4", "", "outColor")]),
    );
    show.input_mapping.push(VariableMapping::new(
        var("vec2", "Show", "texCoordIn"),
        var("vec2", "Pass", "texCoordOut"),
    ));
    show.output_mapping.push(VariableMapping::new(
        var("vec4", "Global", "color"),
        var("vec4", "Show", "outColor"),
    ));
    let t = technique(vec![pass, show]);

    let config = GeneratorConfig {
        glsl_version: GlslVersion::Glsl150,
        ..GeneratorConfig::default()
    };
    let shaders = Generator::new(&loader, config).generate_technique(&t).unwrap();
    let (vs, fs) = (&shaders[0].source, &shaders[1].source);

    assert!(vs.contains("in vec3 inPosition;"));
    assert!(vs.contains("in vec2 inTexCoord;"));
    assert!(vs.contains("out vec2 Pass_texCoordOut;"));
    assert!(!vs.contains("    vec2 Pass_texCoordOut;"), "varying declared as a local:\n{vs}");
    assert!(vs.contains("Pass_texCoordOut = Pass_inTexCoord;"));

    assert!(fs.contains("in vec2 Pass_texCoordOut;"));
    assert!(fs.contains("out vec4 outFragColor;"));
    assert!(fs.contains("vec2 Show_texCoordIn = Pass_texCoordOut;"));
    assert!(fs.contains("outFragColor = Global_color;"));
    assert!(!fs.contains("gl_FragColor"));
}

#[test]
fn conditions_guard_nodes_and_mappings() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let mut t = scale_chain();
    t.shader_nodes[0].condition = Some("USE_SCALE".to_string());
    let mapping = &mut t.shader_nodes[1].input_mapping[0];
    mapping.condition = Some("defined(USE_SCALE) && !defined(FLAT)".to_string());
    mapping.left_swizzling = "x".to_string();

    let src = compose(&loader, &t, ShaderStage::Fragment).source;
    assert!(src.contains("/* N1 Begin */\n#ifdef USE_SCALE\n    float N1_inValue = m_Factor;"));
    assert!(src.contains("N1_outValue = N1_temp;\n#endif\n    /* N1 End */"));
    assert!(src.contains(
        "    float N2_inValue;\n#if defined(USE_SCALE) && !defined(FLAT)\n    N2_inValue.x = N1_outValue;\n#endif\n"
    ));
}

#[test]
fn unused_and_other_stage_nodes_are_skipped() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let mut t = scale_chain();
    t.generation_info.unused_nodes.push("N2".to_string());
    let src = compose(&loader, &t, ShaderStage::Fragment).source;
    assert!(src.contains("/* N1 Begin */"));
    assert!(!src.contains("N2"));
}

#[test]
fn node_macros_and_bound_defines_are_prefixed() {
    let source = "#define BOOST 2.0
#define TWICE_BOOST (BOOST * 2.0)
void main() {
#ifdef inValue
    outValue = inValue * TWICE_BOOST;
#endif
}
";
    let loader = MemoryAssetLoader::new().with("Boost.frag", source);
    let def = definition(
        "Boost",
        ShaderStage::Fragment,
        "Boost.frag",
        vec![var("float", "", "inValue").with_default("1.0")],
        vec![var("float", "", "outValue")],
    );
    let t = technique(vec![node("B1", def)]);
    let src = compose(&loader, &t, ShaderStage::Fragment).source;
    assert!(src.starts_with(
        "#define B1_inValue_BOUND 1\n#define B1_BOOST 2.0\n#define B1_TWICE_BOOST (B1_BOOST * 2.0)\n"
    ));
    assert!(src.contains("#ifdef B1_inValue_BOUND\n    B1_outValue = B1_inValue * B1_TWICE_BOOST;\n#endif"));
    assert!(src.contains("float B1_inValue = 1.0;"));
    // A define named like the local would turn its declaration into `float 1`.
    assert!(!src.contains("#define B1_inValue "));
    assert!(!src.contains("#define B1_outValue"));
}

#[test]
fn file_level_conditional_declarations_are_kept() {
    let source = "#ifdef DISCARD_ALPHA
uniform float m_AlphaDiscardThreshold;
#endif
void main() {
    outValue = 1.0;
}
";
    let loader = MemoryAssetLoader::new().with("Alpha.frag", source);
    let def = definition("Alpha", ShaderStage::Fragment, "Alpha.frag", vec![], vec![var("float", "", "outValue")]);
    let t = technique(vec![node("A", def)]);
    let src = compose(&loader, &t, ShaderStage::Fragment).source;
    assert!(src.starts_with("#ifdef DISCARD_ALPHA\nuniform float m_AlphaDiscardThreshold;\n#endif\n"));
}

#[test]
fn cached_and_uncached_outputs_match() {
    let loader = lighting_assets();
    let t = lighting_technique();
    let cache = AstCache::new();

    let uncached = Generator::new(&loader, GeneratorConfig::default())
        .generate(&t, ShaderStage::Fragment)
        .unwrap();
    let generator = Generator::new(&loader, GeneratorConfig::default()).with_cache(&cache);
    let first = generator.generate(&t, ShaderStage::Fragment).unwrap();
    let second = generator.generate(&t, ShaderStage::Fragment).unwrap();

    assert_eq!(uncached, first);
    assert_eq!(first, second);
    // Light.frag plus the two libraries, each parsed once.
    assert_eq!(cache.len(), 3);
}

#[test]
fn cache_is_bypassed_when_disabled() {
    let loader = lighting_assets();
    let cache = AstCache::new();
    let config = GeneratorConfig {
        use_ast_cache: false,
        ..GeneratorConfig::default()
    };
    Generator::new(&loader, config)
        .with_cache(&cache)
        .generate(&lighting_technique(), ShaderStage::Fragment)
        .unwrap();
    assert!(cache.is_empty());
}

#[test]
fn dedent_keeps_relative_indentation() {
    let text = "\n        if (a) {\n            b();\n        }\n    #ifdef X\n        c();\n  #endif\n\n";
    assert_eq!(
        body::dedent(text),
        vec!["if (a) {", "    b();", "}", "#ifdef X", "c();", "#endif"]
    );
}

#[test]
fn documented_defines_emit_binding_defines() {
    let loader = MemoryAssetLoader::new().with("Scale.frag", SCALE_FRAG);
    let mut t = scale_chain();
    for node in &mut t.shader_nodes {
        node.definition.defines.push("inValue".to_string());
    }
    let src = compose(&loader, &t, ShaderStage::Fragment).source;
    assert!(src.starts_with("#define N1_inValue_BOUND 1\n#define N2_inValue_BOUND 1\n\nuniform float m_Factor;"));
}
