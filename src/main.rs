use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use notify::{Event, RecursiveMode, Watcher};

use node_shader_compiler::assets::{AssetLoader, FsAssetLoader};
use node_shader_compiler::cache::AstCache;
use node_shader_compiler::config::GeneratorConfig;
use node_shader_compiler::error::ShaderError;
use node_shader_compiler::generator::{GeneratedShader, Generator};
use node_shader_compiler::graph::{GlslVersion, ShaderStage, TechniqueDefinition};
use node_shader_compiler::logger::{self, StderrLogger};
use node_shader_compiler::parser::{ConditionGrammar, Parser as GlslParser};

#[derive(Parser)]
#[command(name = "nsc", version)]
#[command(about = "Shader node composer: builds GLSL shaders from node graphs")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the shaders of a technique
    Compose {
        #[command(flatten)]
        input: TechniqueArgs,

        /// Stage to emit
        #[arg(long, value_enum, default_value_t = StageArg::Both)]
        stage: StageArg,

        /// Write output here instead of stdout. With both stages, the
        /// extension is replaced by `.vert` and `.frag`.
        #[arg(short)]
        o: Option<PathBuf>,
    },

    /// Compose a technique without writing output
    Check {
        #[command(flatten)]
        input: TechniqueArgs,
    },

    /// Parse one GLSL node source and print its tree
    Parse {
        /// Input .vert/.frag/.glsllib file
        file: PathBuf,

        /// Print only the node structure
        #[arg(long)]
        shape: bool,

        /// Give `&&` precedence over `||` in #if conditions
        #[arg(long)]
        precedence: bool,
    },

    /// Recompose a technique whenever it or one of its sources changes
    Watch {
        #[command(flatten)]
        input: TechniqueArgs,

        /// Output file stem; `.vert` and `.frag` are appended
        #[arg(short)]
        o: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct TechniqueArgs {
    /// Technique definition (.json)
    technique: PathBuf,

    /// Asset root directories, searched in order (default: the technique's directory)
    #[arg(long = "assets")]
    asset_roots: Vec<PathBuf>,

    /// Generator config file (.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target GLSL version, overriding the config file
    #[arg(long, value_enum)]
    glsl: Option<GlslArg>,
}

impl TechniqueArgs {
    fn roots(&self) -> Vec<PathBuf> {
        if self.asset_roots.is_empty() {
            vec![parent_dir(&self.technique).to_path_buf()]
        } else {
            self.asset_roots.clone()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    Vertex,
    Fragment,
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
enum GlslArg {
    /// GLSL ES 1.00 / GLSL 1.10 style (attribute, varying, gl_FragColor)
    #[value(name = "100")]
    Glsl100,
    /// GLSL 1.50 (in, out)
    #[value(name = "150")]
    Glsl150,
}

fn main() {
    let cli = Cli::parse();
    let _ = StderrLogger::new(logger::level_for_verbosity(cli.verbose)).init();

    let roots = match &cli.command {
        Commands::Compose { input, .. } | Commands::Check { input } | Commands::Watch { input, .. } => {
            input.roots()
        }
        Commands::Parse { .. } => Vec::new(),
    };
    if let Err(e) = run(cli.command) {
        print_error(&e, &roots);
        process::exit(1);
    }
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Compose { input, stage, o } => {
            let session = Session::open(&input)?;
            let cache = AstCache::new();
            let shaders = session.compose(&cache, stage)?;
            report_required(&shaders);
            match o {
                Some(out) => write_outputs(&out, &shaders, stage != StageArg::Both)?,
                None => {
                    for shader in &shaders {
                        if shaders.len() > 1 {
                            println!("// ---- {} ----", shader.stage);
                        }
                        print!("{}", shader.source);
                    }
                }
            }
            Ok(())
        }

        Commands::Check { input } => {
            let session = Session::open(&input)?;
            let shaders = session.compose(&AstCache::new(), StageArg::Both)?;
            report_required(&shaders);
            eprintln!("{}: ok", input.technique.display());
            Ok(())
        }

        Commands::Parse {
            file,
            shape,
            precedence,
        } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("cannot read '{}'", file.display()))?;
            let grammar = if precedence {
                ConditionGrammar::Precedence
            } else {
                ConditionGrammar::Flat
            };
            let path = file.display().to_string();
            let ast = GlslParser::new(&path, &source, grammar).parse()?;
            if shape {
                println!("{}", ast.shape(ast.root()));
            } else {
                print!("{}", ast.dump());
            }
            Ok(())
        }

        Commands::Watch { input, o } => watch(&input, o.as_deref()),
    }
}

// ── Technique loading ─────────────────────────────────────────────────

/// Everything a compose run needs, loaded from the command line.
struct Session {
    technique_path: PathBuf,
    technique: TechniqueDefinition,
    loader: FsAssetLoader,
    config: GeneratorConfig,
}

impl Session {
    fn open(args: &TechniqueArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => GeneratorConfig::load(path)?,
            None => GeneratorConfig::default(),
        };
        if let Some(glsl) = args.glsl {
            config.glsl_version = match glsl {
                GlslArg::Glsl100 => GlslVersion::Glsl100,
                GlslArg::Glsl150 => GlslVersion::Glsl150,
            };
        }

        let roots = args.roots();
        for root in &roots {
            if !root.is_dir() {
                bail!("asset root '{}' is not a directory", root.display());
            }
        }

        Ok(Self {
            technique_path: args.technique.clone(),
            technique: load_technique(&args.technique)?,
            loader: FsAssetLoader::new(roots),
            config,
        })
    }

    fn compose(&self, cache: &AstCache, stage: StageArg) -> anyhow::Result<Vec<GeneratedShader>> {
        let generator = Generator::new(&self.loader, self.config.clone()).with_cache(cache);
        let shaders = match stage {
            StageArg::Vertex => vec![generator.generate(&self.technique, ShaderStage::Vertex)?],
            StageArg::Fragment => vec![generator.generate(&self.technique, ShaderStage::Fragment)?],
            StageArg::Both => generator.generate_technique(&self.technique)?,
        };
        Ok(shaders)
    }

    /// Asset path of a changed file, if it lives under one of the roots.
    fn asset_path_of(&self, file: &Path) -> Option<String> {
        // Watcher events carry absolute paths; roots may be relative.
        self.loader.roots().iter().find_map(|root| {
            let root = root.canonicalize().ok()?;
            let relative = file.strip_prefix(&root).ok()?;
            Some(relative.to_string_lossy().replace('\\', "/"))
        })
    }
}

fn load_technique(path: &Path) -> anyhow::Result<TechniqueDefinition> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;
    let technique = TechniqueDefinition::from_json(&json)
        .map_err(|e| e.in_file(&path.display().to_string()))?;
    log::info!(
        "loaded technique '{}' ({} nodes)",
        technique.name,
        technique.shader_nodes.len()
    );
    Ok(technique)
}

// ── Output ────────────────────────────────────────────────────────────

fn stage_extension(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vert",
        ShaderStage::Fragment => "frag",
    }
}

fn write_outputs(out: &Path, shaders: &[GeneratedShader], single: bool) -> anyhow::Result<()> {
    for shader in shaders {
        let path = if single {
            out.to_path_buf()
        } else {
            out.with_extension(stage_extension(shader.stage))
        };
        fs::write(&path, &shader.source)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        eprintln!(
            "wrote {} shader to {} ({} bytes)",
            shader.stage,
            path.display(),
            shader.source.len()
        );
    }
    Ok(())
}

fn report_required(shaders: &[GeneratedShader]) {
    for shader in shaders {
        for name in &shader.required_uniforms {
            eprintln!("note: {} shader needs world parameter '{name}'", shader.stage);
        }
    }
}

// ── Watch mode ────────────────────────────────────────────────────────

fn watch(args: &TechniqueArgs, out: Option<&Path>) -> anyhow::Result<()> {
    let mut session = Session::open(args)?;
    let cache = AstCache::new();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    for root in session.loader.roots() {
        watcher.watch(root, RecursiveMode::Recursive)?;
    }
    watcher.watch(parent_dir(&session.technique_path), RecursiveMode::NonRecursive)?;

    eprintln!("nsc watch");
    eprintln!("  technique: {}", session.technique_path.display());
    for root in session.loader.roots() {
        eprintln!("  assets:    {}", root.display());
    }
    eprintln!("  watching for changes...");

    recompose(&session, &cache, out);
    while let Ok(first) = rx.recv() {
        // Editors emit bursts of events per save.
        let mut events = vec![first];
        while let Ok(more) = rx.recv_timeout(Duration::from_millis(50)) {
            events.push(more);
        }

        let mut changed = false;
        for event in events.iter().filter(|e| !e.kind.is_access()) {
            for path in &event.paths {
                if same_file(path, &session.technique_path) {
                    match load_technique(&session.technique_path) {
                        Ok(technique) => session.technique = technique,
                        Err(e) => print_error(&e, session.loader.roots()),
                    }
                    changed = true;
                } else if let Some(asset) = session.asset_path_of(path) {
                    log::debug!("changed: {asset}");
                    cache.invalidate(&asset);
                    changed = true;
                }
            }
        }
        if changed {
            recompose(&session, &cache, out);
        }
    }

    drop(watcher);
    Ok(())
}

fn recompose(session: &Session, cache: &AstCache, out: Option<&Path>) {
    let result = session.compose(cache, StageArg::Both).and_then(|shaders| {
        report_required(&shaders);
        match out {
            Some(out) => write_outputs(out, &shaders, false),
            None => {
                for shader in &shaders {
                    println!("// ---- {} ----", shader.stage);
                    print!("{}", shader.source);
                }
                Ok(())
            }
        }
    });
    match result {
        Ok(()) => eprintln!("recomposed {}", session.technique_path.display()),
        Err(e) => print_error(&e, session.loader.roots()),
    }
}

/// Directory containing `file`, `.` for a bare file name.
fn parent_dir(file: &Path) -> &Path {
    file.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────

fn print_error(e: &anyhow::Error, roots: &[PathBuf]) {
    eprintln!("error: {e:#}");

    let Some(err) = e.downcast_ref::<ShaderError>() else {
        return;
    };
    let (Some(path), Some(span)) = (&err.path, &err.span) else {
        return;
    };
    // Paths inside errors are asset paths, except for `parse` and config files.
    let source = FsAssetLoader::new(roots.iter().cloned())
        .load_text(path)
        .or_else(|_| fs::read_to_string(path).map_err(|_| ()));
    let Ok(source) = source else {
        return;
    };
    if span.start > source.len() {
        return;
    }

    let line_num = source[..span.start].chars().filter(|c| *c == '\n').count() + 1;
    let line_start = source[..span.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[span.start..]
        .find('\n')
        .map(|i| span.start + i)
        .unwrap_or(source.len());
    let line = &source[line_start..line_end];
    let col = span.start - line_start;

    eprintln!();
    eprintln!("  {line_num} | {line}");
    eprintln!(
        "  {} | {}^",
        " ".repeat(line_num.to_string().len()),
        " ".repeat(col)
    );
}
