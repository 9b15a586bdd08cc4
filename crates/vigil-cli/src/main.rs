//! Vigil CLI - inspect roles, scopes and scoped filters offline.
//!
//! Every subcommand runs the same code the control plane runs at login and
//! query time, against a hierarchy loaded from a TOML file, and prints the
//! result as JSON on stdout.
//!
//! # Subcommands
//!
//! | Command | Prints |
//! |---------|--------|
//! | `capabilities --role R` | capability names of `R` |
//! | `scope --role R [--node N]` | the geographic scope `R` resolves to |
//! | `filter --role R [--node N] --where k=v...` | the narrowed filter |
//! | `can-view --role R [--node N] --target T --tier TIER` | visibility decision |
//!
//! # Hierarchy File
//!
//! ```toml
//! [[district]]
//! id = "D1"
//!
//! [[mandal]]
//! id = "M1"
//! parent = "D1"
//! ```
//!
//! # Configuration
//!
//! Settings merge the same way the control plane loads them: defaults, then
//! `~/.vigil/config.toml` (or `--config`), then `<project>/.vigil/config.toml`,
//! then `VIGIL_*` environment variables. `--debug` overrides the merged value.
//! The resolver honors `auth.invariant_mode`.
//!
//! # Logging
//!
//! Diagnostics go to stderr: debug > `--verbose` > `RUST_LOG` > `warn`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use vigil_auth::{
    Filter, GeographicScope, HierarchySpec, MemoryHierarchy, PermissionMatrix, ScopeResolver,
};
use vigil_runtime::{ConfigLoader, VigilConfig};
use vigil_types::{ErrorCode, NodeId, Role, Tier};

/// Vigil CLI - role, scope and filter inspector
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Organizational hierarchy file (TOML)
    #[arg(long, global = true, value_name = "FILE", env = "VIGIL_HIERARCHY")]
    hierarchy: Option<PathBuf>,

    /// Global config file (defaults to ~/.vigil/config.toml)
    #[arg(long, global = true, value_name = "FILE", env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Project root holding `.vigil/config.toml` (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Role plus optional assigned node, shared by every scope-aware command.
#[derive(clap::Args, Debug)]
struct Assignment {
    /// Role, e.g. MANDAL_IN_CHARGE (case-insensitive, `-` accepted)
    #[arg(short, long)]
    role: Role,

    /// Assigned node key; ignored for SUPER_ADMIN
    #[arg(short, long)]
    node: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the capability set of a role
    Capabilities {
        /// Role to look up
        #[arg(short, long)]
        role: Role,
    },

    /// Resolve the geographic scope of a role assignment
    Scope {
        #[command(flatten)]
        assignment: Assignment,
    },

    /// Narrow a base filter to a role assignment's scope
    Filter {
        #[command(flatten)]
        assignment: Assignment,

        /// Base equality clause `field=value`; value is parsed as JSON when possible
        #[arg(short = 'w', long = "where", value_name = "FIELD=VALUE")]
        clauses: Vec<String>,
    },

    /// Decide whether a role assignment may view a node
    CanView {
        #[command(flatten)]
        assignment: Assignment,

        /// Target node key
        #[arg(short, long)]
        target: String,

        /// Tier of the target node (district, mandal, centre)
        #[arg(long)]
        tier: Tier,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&args, &config);
    debug!(invariant_mode = ?config.auth.invariant_mode, "config loaded");

    let output = run(&args, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Merges file and env config, then applies CLI overrides.
fn load_config(args: &Args) -> Result<VigilConfig> {
    let project_root = match &args.project {
        Some(root) => root.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let mut loader = ConfigLoader::new().with_project_root(project_root);
    if let Some(path) = &args.config {
        loader = loader.with_global_config(path);
    }
    let mut config = loader.load().map_err(coded)?;
    if args.debug {
        config.debug = true;
    }
    Ok(config)
}

/// Terminal filter: debug > --verbose > RUST_LOG env > default "warn".
fn init_tracing(args: &Args, config: &VigilConfig) {
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();
}

fn run(args: &Args, config: &VigilConfig) -> Result<Value> {
    match &args.command {
        Command::Capabilities { role } => {
            let caps = PermissionMatrix::capabilities_for(*role);
            debug!(%role, %caps, "capabilities resolved");
            Ok(json!({
                "role": role,
                "capabilities": caps.names(),
            }))
        }
        Command::Scope { assignment } => {
            let resolver = resolver(args.hierarchy.as_deref(), config, false)?;
            let scope = resolve(&resolver, assignment)?;
            Ok(json!({
                "role": assignment.role,
                "scope": scope,
                "unrestricted": scope.is_unrestricted(),
            }))
        }
        Command::Filter {
            assignment,
            clauses,
        } => {
            let resolver = resolver(args.hierarchy.as_deref(), config, false)?;
            let scope = resolve(&resolver, assignment)?;
            let base = parse_clauses(clauses)?;
            let scoped = resolver
                .build_filter_for(assignment.role, &scope, base)
                .map_err(coded)?;
            info!(%scope, filter = %scoped.as_filter(), "filter narrowed");
            Ok(json!({
                "filter": scoped.as_filter(),
                "contradicted": scoped.is_contradicted(),
            }))
        }
        Command::CanView {
            assignment,
            target,
            tier,
        } => {
            let resolver = resolver(args.hierarchy.as_deref(), config, true)?;
            let scope = resolve(&resolver, assignment)?;
            let target = NodeId::new(target.as_str());
            let visible = resolver
                .can_view_for(assignment.role, &scope, &target, *tier)
                .map_err(coded)?;
            Ok(json!({
                "target": target,
                "tier": tier,
                "visible": visible,
            }))
        }
    }
}

fn resolver(path: Option<&Path>, config: &VigilConfig, required: bool) -> Result<ScopeResolver> {
    let hierarchy = match path {
        Some(path) => load_hierarchy(path)?,
        None if required => bail!("--hierarchy is required for this command"),
        None => MemoryHierarchy::new(),
    };
    Ok(ScopeResolver::new(Arc::new(hierarchy)).with_invariant_mode(config.auth.invariant_mode))
}

fn load_hierarchy(path: &Path) -> Result<MemoryHierarchy> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read hierarchy file {}", path.display()))?;
    let spec: HierarchySpec = toml::from_str(&content)
        .with_context(|| format!("invalid hierarchy file {}", path.display()))?;
    let hierarchy = MemoryHierarchy::try_from(spec)
        .with_context(|| format!("inconsistent hierarchy in {}", path.display()))?;
    info!(path = %path.display(), nodes = hierarchy.len(), "hierarchy loaded");
    Ok(hierarchy)
}

fn resolve(resolver: &ScopeResolver, assignment: &Assignment) -> Result<GeographicScope> {
    let node = assignment.node.as_deref().map(NodeId::new);
    resolver
        .resolve_scope(assignment.role, node.as_ref())
        .map_err(coded)
}

/// Parses `field=value` pairs into a filter.
fn parse_clauses(clauses: &[String]) -> Result<Filter> {
    let mut filter = Filter::new();
    for clause in clauses {
        let Some((field, raw)) = clause.split_once('=') else {
            bail!("clause '{clause}' is not of the form field=value");
        };
        let field = field.trim();
        if field.is_empty() {
            bail!("clause '{clause}' has an empty field name");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        filter.insert(field, value);
    }
    Ok(filter)
}

fn coded<E: ErrorCode + std::fmt::Display>(err: E) -> anyhow::Error {
    anyhow::anyhow!("[{}] {err}", err.code())
}
