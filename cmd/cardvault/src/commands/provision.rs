use cardvault_cardindex::BuildReport;
use cardvault_match::{ProvisionState, ServiceStatus, SnapshotSource};
use clap::Args;
use serde::Serialize;

use super::{create_matcher, get_config, output_result, print_success};
use crate::Cli;

/// Run the provisioning state machine once and report how the index was
/// obtained.
#[derive(Args)]
pub struct ProvisionCommand {
    /// Corpus manifest used if the index has to be rebuilt
    #[arg(long)]
    manifest: Option<String>,
}

#[derive(Serialize)]
struct ProvisionSummary {
    source: SnapshotSource,
    trail: Vec<ProvisionState>,
    status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<BuildReport>,
}

impl ProvisionCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let matcher = create_matcher(cfg, self.manifest.as_deref())?;

        let p = matcher.provision().await?;
        let trail: Vec<String> = p.trail.iter().map(ToString::to_string).collect();
        print_success(&format!("index ready ({}): {}", p.source, trail.join(" -> ")));

        let summary = ProvisionSummary {
            source: p.source,
            trail: p.trail,
            status: matcher.status(),
            report: p.report,
        };
        output_result(&summary, cli.output.as_deref(), cli.json)
    }
}
