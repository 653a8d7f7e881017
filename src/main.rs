use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use node_forge_shadergen::{
    dsl,
    schema::{NodeLibrary, validate_document},
    shadergen::{
        GenContext, GenOptions, ShaderGenerator, Target,
        validation::{GlslShaderStage, glsl_to_wgsl, validate_shader},
    },
};

const USAGE: &str = "usage: node-forge-shadergen --graph <doc.json> [--target <genglsl|genosl|genmdl|genmsl>]... \
[--options <opts.json>] [--outputdir <dir>] [--name <shader>] [--library <lib.json>] \
[--light <id>=<nodedef>]... [--validate] [--wgsl]";

#[derive(Debug, Default, Clone)]
struct Cli {
    graph: Option<PathBuf>,
    targets: Vec<Target>,
    options: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    name: Option<String>,
    libraries: Vec<PathBuf>,
    lights: Vec<(u32, String)>,
    validate: bool,
    wgsl: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let value = |flag: &str| -> Result<&String> {
            args.get(i + 1)
                .ok_or_else(|| anyhow!("missing value for {flag}"))
        };
        match args[i].as_str() {
            "--graph" => {
                cli.graph = Some(PathBuf::from(value("--graph")?));
                i += 2;
            }
            "--target" => {
                cli.targets.push(value("--target")?.parse()?);
                i += 2;
            }
            "--options" => {
                cli.options = Some(PathBuf::from(value("--options")?));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                cli.output_dir = Some(PathBuf::from(value("--outputdir")?));
                i += 2;
            }
            "--name" => {
                cli.name = Some(value("--name")?.clone());
                i += 2;
            }
            "--library" => {
                cli.libraries.push(PathBuf::from(value("--library")?));
                i += 2;
            }
            "--light" => {
                cli.lights.push(parse_light(value("--light")?)?);
                i += 2;
            }
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            "--wgsl" => {
                cli.wgsl = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => {
                return Err(anyhow!("unknown argument: {other}\n{USAGE}"));
            }
        }
    }
    if cli.targets.is_empty() {
        cli.targets.push(Target::Glsl);
    }
    Ok(cli)
}

/// `<id>=<nodedef>`, e.g. `1=point_light`.
fn parse_light(arg: &str) -> Result<(u32, String)> {
    let (id, nodedef) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("--light expects <id>=<nodedef>, got '{arg}'"))?;
    let id = id
        .trim()
        .parse::<u32>()
        .with_context(|| format!("invalid light type id in '{arg}'"))?;
    Ok((id, nodedef.trim().to_string()))
}

fn load_options(path: Option<&Path>) -> Result<GenOptions> {
    let Some(path) = path else {
        return Ok(GenOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read --options file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid options json in {}", path.display()))
}

fn load_library(extra: &[PathBuf]) -> Result<NodeLibrary> {
    let mut lib = NodeLibrary::load_default()?;
    for path in extra {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read --library file {}", path.display()))?;
        lib.merge_json_str(&text)
            .with_context(|| format!("in {}", path.display()))?;
    }
    Ok(lib)
}

fn shader_name(cli: &Cli, doc: &dsl::MaterialDocument, graph_path: &Path) -> String {
    if let Some(name) = &cli.name {
        return name.clone();
    }
    if !doc.metadata.name.is_empty() {
        return doc.metadata.name.clone();
    }
    graph_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shader".to_string())
}

fn run(cli: Cli) -> Result<()> {
    let graph_path = cli
        .graph
        .clone()
        .ok_or_else(|| anyhow!("--graph is required\n{USAGE}"))?;
    let doc = dsl::load_document_from_path(&graph_path)?;
    let options = load_options(cli.options.as_deref())?;
    let library = load_library(&cli.libraries)?;
    validate_document(&doc, &library)?;

    let output_dir = cli.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let name = shader_name(&cli, &doc, &graph_path);

    for &target in &cli.targets {
        let generator = ShaderGenerator::with_library(target, library.clone())?;
        let mut ctx = GenContext::new(options.clone());
        for (id, nodedef) in &cli.lights {
            ctx.bind_light_shader(*id, nodedef);
        }
        let shader = generator
            .generate(&name, &doc, &mut ctx)
            .with_context(|| format!("{target} generation failed for {}", graph_path.display()))?;

        if cli.validate {
            if target == Target::Glsl {
                validate_shader(&shader)?;
                info!("{} GLSL stages of '{name}' validated", shader.stages.len());
            } else {
                warn!("--validate only checks {}, skipping {target}", Target::Glsl);
            }
        }

        for path in shader.write_to_dir(&output_dir)? {
            println!("[{target}] wrote: {}", path.display());
        }

        if cli.wgsl && target == Target::Glsl {
            for stage in &shader.stages {
                let Some(kind) = GlslShaderStage::from_stage_name(&stage.name) else {
                    continue;
                };
                let wgsl = glsl_to_wgsl(&stage.source, kind)
                    .with_context(|| format!("failed to translate {} stage to WGSL", stage.name))?;
                let path = output_dir.join(format!("{name}.{}.wgsl", stage.name));
                std::fs::write(&path, wgsl)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("[{target}] wrote: {}", path.display());
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;
    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_cli_defaults_to_glsl() {
        let cli = parse_cli(&args(&["--graph", "doc.json"])).unwrap();
        assert_eq!(cli.graph, Some(PathBuf::from("doc.json")));
        assert_eq!(cli.targets, vec![Target::Glsl]);
        assert!(!cli.validate);
    }

    #[test]
    fn test_parse_cli_multiple_targets_and_lights() {
        let cli = parse_cli(&args(&[
            "--graph", "doc.json", "--target", "genosl", "--target", "genmsl", "--light", "1=point_light",
            "--outputdir", "out", "--wgsl",
        ]))
        .unwrap();
        assert_eq!(cli.targets, vec![Target::Osl, Target::Msl]);
        assert_eq!(cli.lights, vec![(1, "point_light".to_string())]);
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert!(cli.wgsl);
    }

    #[test]
    fn test_parse_cli_rejects_unknown() {
        assert!(parse_cli(&args(&["--bogus"])).is_err());
        assert!(parse_cli(&args(&["--target", "hlsl"])).is_err());
        assert!(parse_cli(&args(&["--graph"])).is_err());
        assert!(parse_light("point_light").is_err());
    }
}
