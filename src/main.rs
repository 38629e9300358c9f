use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use shader_graph_material::{
    FileGraphFetcher, FrameContext, LoaderConfig, MaterialOptions, MaterialRuntime,
    ParameterOverrides,
};

#[derive(Debug, Default, Clone)]
struct Cli {
    graph: Option<String>,
    graph_dir: Option<PathBuf>,
    params: Option<PathBuf>,
    verbose: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--graph" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph"));
                };
                cli.graph = Some(v.clone());
                i += 2;
            }
            "--graph-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph-dir"));
                };
                cli.graph_dir = Some(PathBuf::from(v));
                i += 2;
            }
            "--params" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --params"));
                };
                cli.params = Some(PathBuf::from(v));
                i += 2;
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
                i += 1;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --graph <path|url>, --graph-dir <dir>, --params <overrides.json>, --verbose)"
                ));
            }
        }
    }
    Ok(cli)
}

/// Ids resolve under `--graph-dir`; plain paths are turned into `file://` URLs.
fn graph_url(graph: &str, graph_dir: Option<&Path>) -> String {
    if graph.contains("://") || graph_dir.is_some() {
        graph.to_string()
    } else {
        format!("file://{graph}")
    }
}

fn load_overrides(path: &Path) -> Result<ParameterOverrides> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read --params file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("--params must be a JSON object in {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let graph = cli
        .graph
        .as_deref()
        .ok_or_else(|| anyhow!("--graph <path|url> is required"))?;

    let mut config = LoaderConfig {
        verbose: cli.verbose,
        ..LoaderConfig::default()
    };
    if let Some(dir) = &cli.graph_dir {
        config.base_url = format!("file://{}", dir.display());
    }

    let parameters = match &cli.params {
        Some(path) => load_overrides(path)?,
        None => ParameterOverrides::new(),
    };

    let runtime = MaterialRuntime::with_config(FileGraphFetcher::new(), config);
    let mut material = runtime.create_material(
        MaterialOptions::new()
            .with_url(graph_url(graph, cli.graph_dir.as_deref()))
            .with_parameters(parameters)
            .with_verbose(cli.verbose),
    );
    runtime.begin_frame();

    if let Some(err) = material.load_error() {
        return Err(anyhow!("failed to load graph {graph}: {err}"));
    }
    if !material.is_loaded() {
        return Err(anyhow!("graph {graph} did not load"));
    }
    material.on_before_render(&FrameContext::new());

    let packed = material.packed_uniforms();
    let summary = json!({
        "url": material.full_url().map(|u| u.to_string()),
        "version": material.version(),
        "lightModel": material.light_model(),
        "cullMode": material.cull_mode(),
        "renderState": material.render_state(),
        "uniforms": &*material.uniforms(),
        "defines": &*material.defines(),
        "layout": packed.layout,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    run(cli)
}
