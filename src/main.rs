use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use cost_audit::audit::{AuditSetRange, AuditType, CoverageStrategy};
use cost_audit::config::Settings;
use cost_audit::logging::{LogDeduper, init_logging, profile};
use cost_audit::network::{
    CostAlignment, QueryResults, StaticPricing, get_network_costs, get_network_usage_data,
    warn_mis_sampled,
};

#[derive(Parser, Debug)]
#[command(name = "cost-audit", version, about = "Egress cost aggregation and audit coverage")]
struct Cli {
    /// Settings file (defaults to ~/.config/cost-audit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join egress usage query results and price them per workload
    NetworkCost {
        /// Prometheus JSON response for zone egress
        #[arg(long)]
        zone: PathBuf,
        /// Prometheus JSON response for region egress
        #[arg(long)]
        region: PathBuf,
        /// Prometheus JSON response for internet egress
        #[arg(long)]
        internet: PathBuf,
        /// Egress rates (TOML, or JSON by extension)
        #[arg(long)]
        pricing: PathBuf,
        /// Cluster id for rows without one
        #[arg(long)]
        cluster_id: Option<String>,
        #[arg(long, value_enum)]
        alignment: Option<CostAlignment>,
    },
    /// Report audit coverage from a MessagePack audit history
    Coverage {
        #[arg(long)]
        history: PathBuf,
        #[arg(long, value_enum)]
        strategy: Option<CoverageStrategy>,
    },
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) => Settings::load_from(p),
        None => Settings::load(),
    };
    settings.context("loading settings")
}

fn read_query(path: &Path) -> Result<QueryResults> {
    let body =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    QueryResults::from_prometheus_json(&body)
        .with_context(|| format!("decoding query result {}", path.display()))
}

fn network_cost(
    settings: &Settings,
    zone: &Path,
    region: &Path,
    internet: &Path,
    pricing: &Path,
    cluster_id: Option<String>,
    alignment: Option<CostAlignment>,
) -> Result<()> {
    let start = Instant::now();
    let cluster_id = cluster_id.unwrap_or_else(|| settings.default_cluster_id.clone());
    let alignment = alignment.unwrap_or(settings.cost_alignment);

    let zone = read_query(zone)?;
    let region = read_query(region)?;
    let internet = read_query(internet)?;
    let provider = StaticPricing::from_path(pricing).context("loading pricing")?;

    let usage = get_network_usage_data(zone.rows(), region.rows(), internet.rows(), &cluster_id)
        .context("joining egress usage")?;
    let dedup = LogDeduper::new();
    warn_mis_sampled(&usage, alignment, &dedup, settings.dedup_log_limit);
    let costs = get_network_costs(&usage, &provider, alignment).context("pricing egress usage")?;
    info!(workloads = costs.len(), %alignment, "priced network usage");
    profile(start, "network-cost");

    println!("{}", serde_json::to_string_pretty(&costs)?);
    Ok(())
}

fn coverage(history: &Path, strategy: CoverageStrategy) -> Result<()> {
    let bytes = std::fs::read(history).with_context(|| format!("reading {}", history.display()))?;
    let range = AuditSetRange::from_binary(&bytes)
        .with_context(|| format!("decoding audit history {}", history.display()))?;
    let cov = range.coverage(strategy);
    info!(sets = range.len(), %strategy, "computed audit coverage");

    let audit_type = AuditType::AllocationReconciliation;
    let payload = json!({
        "audit_type": audit_type,
        "strategy": strategy,
        "sets": range.len(),
        "window": cov.window(audit_type),
        "intervals": cov.intervals(audit_type),
        "gaps": cov.gaps(audit_type),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn main() -> Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    init_logging(&settings.log_config());

    match cli.command {
        Commands::NetworkCost {
            zone,
            region,
            internet,
            pricing,
            cluster_id,
            alignment,
        } => network_cost(
            &settings, &zone, &region, &internet, &pricing, cluster_id, alignment,
        ),
        Commands::Coverage { history, strategy } => {
            coverage(&history, strategy.unwrap_or(settings.coverage_strategy))
        }
    }
}
