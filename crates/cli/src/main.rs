use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use canvas_api::OfflineBackend;
use canvas_apply::PolicyPipeline;
use canvas_core::{EntityKind, LabelToken, Labeled};
use canvas_search::{find_by_label, match_summary, LabelGroup, LabelIndex};
use canvas_store::{CanvasStore, DragController, Inventory, InventoryHandle, CANVAS_TARGET, CLUSTER_PANEL, WORKLOAD_PANEL};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "canvasctl", version, about = "Binding policy canvas CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Kind { Cluster, Workload }

impl From<Kind> for EntityKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Cluster => EntityKind::Cluster,
            Kind::Workload => EntityKind::Workload,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the canvas token for a label
    Encode { key: String, value: String },
    /// Decode a canvas token back into its label (fails when unparseable)
    Decode { token: String },
    /// List label groups of an inventory file
    Groups {
        /// Inventory file (YAML or JSON with `clusters` and `workloads`)
        #[arg(long = "inventory")]
        inventory: PathBuf,
        #[arg(long = "kind", value_enum)]
        kind: Kind,
        /// Case-insensitive substring filter on key or value
        #[arg(long = "filter")]
        filter: Option<String>,
        /// Rank by fuzzy score instead of filtering
        #[arg(long = "fuzzy", action = ArgAction::SetTrue)]
        fuzzy: bool,
        #[arg(long = "limit", default_value_t = 50)]
        limit: usize,
    },
    /// Entities matching a label token
    Match {
        #[arg(long = "inventory")]
        inventory: PathBuf,
        #[arg(long = "kind", value_enum)]
        kind: Kind,
        token: String,
    },
    /// Resource types a policy would declare for a workload kind
    Resources {
        /// Workload kind, e.g. Deployment (omit for the default set)
        #[arg(long = "kind")]
        kind: Option<String>,
    },
    /// Place two tokens on a canvas and render the resulting policy offline
    Preview {
        #[arg(long = "inventory")]
        inventory: PathBuf,
        #[arg(long = "cluster")]
        cluster: String,
        #[arg(long = "workload")]
        workload: String,
    },
}

fn init_tracing() {
    let env = std::env::var("CANVAS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CANVAS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CANVAS_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_inventory(path: &Path) -> Result<Inventory> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading inventory {}", path.display()))?;
    // YAML parser accepts JSON too
    let inv: Inventory = serde_yaml::from_str(&text).with_context(|| format!("parsing inventory {}", path.display()))?;
    debug!(clusters = inv.clusters.len(), workloads = inv.workloads.len(), "inventory loaded");
    Ok(inv)
}

#[derive(Serialize)]
struct GroupRow<'a> {
    #[serde(flatten)]
    group: &'a LabelGroup,
    token: LabelToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<i64>,
}

fn print_groups(rows: &[GroupRow<'_>], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            println!("{:<36} {:>5}  {:<40} MEMBERS", "LABEL", "COUNT", "TOKEN");
            for r in rows {
                let members: Vec<&str> = r.group.members.iter().map(|m| m.name.as_str()).collect();
                let label = format!("{}={}", r.group.key, r.group.value);
                println!("{:<36} {:>5}  {:<40} {}", label, members.len(), r.token.as_str(), members.join(","));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

fn matching_names(inv: &Inventory, kind: EntityKind, token: &str) -> Result<Vec<String>> {
    let Some(label) = canvas_core::decode(token) else {
        bail!("unparseable label token: {token}");
    };
    fn names<T: Labeled>(hits: Vec<&T>) -> Vec<String> { hits.iter().map(|e| e.name().to_string()).collect() }
    Ok(match kind {
        EntityKind::Cluster => names(find_by_label(&inv.clusters, &label)),
        EntityKind::Workload => names(find_by_label(&inv.workloads, &label)),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { key, value } => {
            let token = canvas_core::encode(&key, &value);
            match cli.output {
                Output::Human => println!("{}", token),
                Output::Json => println!("{}", serde_json::json!({ "key": key, "value": value, "token": token })),
            }
        }
        Commands::Decode { token } => {
            let Some(label) = canvas_core::decode(&token) else {
                bail!("unparseable label token: {token}");
            };
            match cli.output {
                Output::Human => println!("{}", label),
                Output::Json => println!("{}", serde_json::to_string_pretty(&label)?),
            }
        }
        Commands::Groups { inventory, kind, filter, fuzzy, limit } => {
            let inv = load_inventory(&inventory)?;
            let excluded = canvas_search::excluded_patterns_from_env();
            let index = match EntityKind::from(kind) {
                EntityKind::Cluster => LabelIndex::build(&inv.clusters, &excluded),
                EntityKind::Workload => LabelIndex::build(&inv.workloads, &excluded),
            };
            info!(kind = %index.kind(), groups = index.len(), "groups built");
            let query = filter.unwrap_or_default();
            let rows: Vec<GroupRow<'_>> = if fuzzy {
                index
                    .rank(&query, limit)
                    .into_iter()
                    .map(|(g, s)| GroupRow { group: g, token: g.token(), score: Some(s) })
                    .collect()
            } else {
                index
                    .filter(&query)
                    .into_iter()
                    .take(limit)
                    .map(|g| GroupRow { group: g, token: g.token(), score: None })
                    .collect()
            };
            print_groups(&rows, cli.output)?;
        }
        Commands::Match { inventory, kind, token } => {
            let inv = load_inventory(&inventory)?;
            let kind = EntityKind::from(kind);
            let names = matching_names(&inv, kind, &token)?;
            match cli.output {
                Output::Human => {
                    println!("{}", match_summary(kind, names.len()));
                    for n in &names {
                        println!("  {}", n);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            }
        }
        Commands::Resources { kind } => {
            let resources = canvas_core::infer_resources_for_kind(kind.as_deref());
            match cli.output {
                Output::Human => {
                    for r in &resources {
                        let mode = if r.create_only { "create-only" } else { "managed" };
                        println!("{:<24} {}", r.resource_type, mode);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&resources)?),
            }
        }
        Commands::Preview { inventory, cluster, workload } => {
            let inv = InventoryHandle::new(load_inventory(&inventory)?);
            let canvas = CanvasStore::new();
            let mut ctl = DragController::new(canvas.clone(), inv.clone());
            for (token, panel) in [(&cluster, CLUSTER_PANEL), (&workload, WORKLOAD_PANEL)] {
                ctl.drag_start(token, panel)?;
                let outcome = ctl.drag_end(Some(CANVAS_TARGET));
                if !outcome.mutated() {
                    bail!("{token} was not placed on the canvas ({})", outcome.as_str());
                }
            }
            let pipeline = PolicyPipeline::new(Arc::new(OfflineBackend), canvas, inv);
            let draft = pipeline.preview().await?;
            match cli.output {
                Output::Human => {
                    println!("# policy {} in namespace {}", draft.request.policy_name, draft.request.namespace);
                    print!("{}", draft.yaml);
                }
                Output::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "request": draft.request, "yaml": draft.yaml }))?
                ),
            }
        }
    }
    Ok(())
}
