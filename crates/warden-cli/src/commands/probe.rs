use std::sync::Arc;

use anyhow::anyhow;
use warden_auth::{BootstrapGate, ConsoleClient, HttpAdapterLoader};

use crate::cli::OutputFormat;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::{ProbeView, render_probe};

pub(crate) async fn handle_probe(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let view = probe(ctx).await?;
    render_probe(&view, format)
}

async fn probe(ctx: &AppContext) -> CliResult<ProbeView> {
    let console = ConsoleClient::new(&ctx.settings)
        .map_err(|err| CliError::failure(anyhow!("failed to build console client: {err}")))?;
    let loader = Arc::new(HttpAdapterLoader::new(
        console.http().clone(),
        ctx.adapter_factory(),
    ));
    let gate = BootstrapGate::new(console, loader, &ctx.settings);
    let requirement = gate.requirement().await;
    Ok(ProbeView::from_requirement(
        &requirement,
        &ctx.settings.adapter_script,
    ))
}
