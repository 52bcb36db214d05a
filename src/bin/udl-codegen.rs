/// UDL codegen CLI - typed client bindings from observed data shapes.
///
/// Generates TypeScript type declarations, optional runtime type guards,
/// and typed GraphQL operation documents from one of three schema sources:
///
///   udl-codegen --endpoint https://shop.example/graphql
///   udl-codegen --from-response sample.json --type Product
///   udl-codegen --from-store http://localhost:4000
///
/// A project-level `udl.config.{json,toml}` provides defaults; CLI flags
/// win field by field. Writes are idempotent: a re-run over unchanged
/// inputs touches nothing.
use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use udl::codegen::watch::{watch_and_rerun, DEFAULT_SETTLE};
use udl::codegen::{run_codegen, CodegenConfig, CodegenReport};
use udl::config::ProjectConfig;
use udl::schema::{infer_json_sample, infer_store, InferOptions, IntrospectionClient, IntrospectionOptions};
use udl::{Node, NodeStore, TypeDefinition};

#[derive(Parser, Debug)]
#[command(
    name = "udl-codegen",
    version,
    about = "Generate typed client bindings from a UDL schema"
)]
struct Cli {
    /// GraphQL endpoint to introspect for the schema
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Infer the schema from a sample JSON response file
    #[arg(short = 'r', long = "from-response", requires = "type_name")]
    from_response: Option<PathBuf>,

    /// Content type name for --from-response
    #[arg(short = 't', long = "type")]
    type_name: Option<String>,

    /// Infer the schema from a running server's live store (base URL)
    #[arg(short = 's', long = "from-store")]
    from_store: Option<String>,

    /// Output directory (default ./generated)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit runtime type guards
    #[arg(short, long)]
    guards: bool,

    /// Re-run when operation documents change
    #[arg(short, long)]
    watch: bool,

    /// Remove stale generated files from the output directory
    #[arg(short, long)]
    clean: bool,

    /// Show what would change without writing anything
    #[arg(short, long)]
    dry_run: bool,

    /// Explicit config file path (default: discover udl.config.*)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Skip the internal descriptor field on generated types
    #[arg(long)]
    no_internal: bool,

    /// Skip JSDoc comments on generated fields
    #[arg(long)]
    no_jsdoc: bool,

    /// Emit type aliases instead of interfaces
    #[arg(long)]
    export_type: bool,
}

#[tokio::main]
async fn main() {
    udl::init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let project = load_project_config(&cli)?;
    let config = effective_config(&cli, &project);

    let types = acquire_types(&cli, &config)
        .await
        .context("failed to acquire a schema")?;
    if types.is_empty() {
        bail!("the schema source produced no types");
    }
    println!(
        "{} {} type{} from {}",
        "schema:".bold(),
        types.len(),
        if types.len() == 1 { "" } else { "s" },
        schema_source_label(&cli, &config)
    );

    let report = run_codegen(&types, &config, cli.dry_run)?;
    print_report(&report, cli.dry_run);

    if cli.watch {
        if config.document_roots.is_empty() {
            bail!("--watch needs documentRoots configured (nothing to watch)");
        }
        println!("{}", "watching for document changes…".cyan());
        let watch_config = config.clone();
        let watch_types = types.clone();
        watch_and_rerun(&config.document_roots, DEFAULT_SETTLE, move || {
            let report = run_codegen(&watch_types, &watch_config, false)?;
            print_report(&report, false);
            Ok(())
        })?;
    }
    Ok(())
}

fn load_project_config(cli: &Cli) -> Result<ProjectConfig> {
    if let Some(path) = &cli.config {
        return udl::config::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let cwd = std::env::current_dir().context("resolving working directory")?;
    Ok(udl::config::discover(&cwd)?
        .map(|(_, config)| config)
        .unwrap_or_default())
}

/// Merge the project codegen block with CLI flags; the CLI wins.
fn effective_config(cli: &Cli, project: &ProjectConfig) -> CodegenConfig {
    let mut config = project.codegen.clone().unwrap_or_default();
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    config.guards |= cli.guards;
    config.clean |= cli.clean;
    config.export_type |= cli.export_type;
    if cli.no_internal {
        config.internal_field = false;
    }
    if cli.no_jsdoc {
        config.jsdoc = false;
    }
    config
}

fn schema_source_label(cli: &Cli, config: &CodegenConfig) -> String {
    if let Some(path) = &cli.from_response {
        format!("response sample {}", path.display())
    } else if let Some(url) = &cli.from_store {
        format!("live store at {url}")
    } else if let Some(endpoint) = &config.endpoint {
        format!("introspection of {endpoint}")
    } else {
        "?".into()
    }
}

async fn acquire_types(cli: &Cli, config: &CodegenConfig) -> Result<Vec<TypeDefinition>> {
    if let Some(path) = &cli.from_response {
        let type_name = cli
            .type_name
            .as_deref()
            .expect("clap enforces --type with --from-response");
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let sample = match &value {
            serde_json::Value::Array(items) => items
                .first()
                .context("response sample is an empty array")?,
            other => other,
        };
        return Ok(vec![infer_json_sample(type_name, sample, None)]);
    }

    if let Some(base_url) = &cli.from_store {
        return fetch_store_types(base_url).await;
    }

    if let Some(endpoint) = &config.endpoint {
        let client = IntrospectionClient::new();
        let types = client
            .introspect(endpoint, &IntrospectionOptions::default())
            .await
            .with_context(|| format!("introspecting {endpoint}"))?;
        return Ok(types);
    }

    bail!("no schema source: pass --endpoint, --from-response, or --from-store")
}

/// Pull every node from a running server's sync endpoint and infer from
/// the rebuilt store.
async fn fetch_store_types(base_url: &str) -> Result<Vec<TypeDefinition>> {
    let url = format!(
        "{}/_sync?since=1970-01-01T00:00:00.000Z",
        base_url.trim_end_matches('/')
    );
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("fetching {url}"))?
        .error_for_status()
        .context("sync endpoint returned an error")?;
    let body: serde_json::Value = response.json().await.context("reading sync response")?;

    let nodes: Vec<Node> = serde_json::from_value(body["updated"].clone())
        .context("sync response carried malformed nodes")?;
    let store = NodeStore::new();
    for node in nodes {
        store.set(node);
    }
    Ok(infer_store(&store, None, &InferOptions::default()))
}

fn print_report(report: &CodegenReport, dry_run: bool) {
    if dry_run {
        if report.previews.is_empty() {
            println!("{}", "dry run: everything up to date".green());
        }
        for (path, preview) in &report.previews {
            println!("{} {}", "would write".yellow().bold(), path.display());
            print!("{preview}");
        }
        return;
    }

    for path in &report.written {
        println!("{} {}", "wrote".green().bold(), path.display());
    }
    for path in &report.unchanged {
        println!("{} {}", "unchanged".dimmed(), path.display());
    }
    for path in &report.removed {
        println!("{} {}", "removed".yellow().bold(), path.display());
    }
}
