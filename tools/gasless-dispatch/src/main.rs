use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use gasless_dispatch::{
    config::Cli, logging::init_tracing, run_once, IdentityStore, JsonFileStore, Orchestrator,
    SponsoredExecutor,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.network_env) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(true) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let deployment = cli.deployment.clone().into_config();
    if deployment.proxy_creation_code.is_none() {
        info!(factory = %deployment.factory, "resolving smart account through the factory");
    }

    let mut executor = SponsoredExecutor::connect(
        &cli.endpoints(),
        deployment.clone(),
        cli.dispatch.stage_timeout(),
    )?;
    if let Some(interval) = cli.dispatch.receipt_poll() {
        executor = executor.with_receipt_polling(interval);
    }
    let orchestrator = Orchestrator::new(executor)
        .with_retry(cli.dispatch.retry_policy())
        .with_explorer(cli.dispatch.explorer_url.clone());
    let identities = IdentityStore::new(
        JsonFileStore::new(&cli.identity_path),
        orchestrator.dispatcher(),
    );

    let intent = cli.intent;
    let outcome = run_once(&identities, &orchestrator, |identity| {
        intent.into_intent(identity.owner, &deployment)
    })
    .await
    .context("dispatch run aborted")?;

    Ok(orchestrator.report(&outcome))
}
