mod errors;
mod gateway;
mod identity;
mod models;
mod pdp;
mod settings;
mod store;
#[cfg(test)]
mod testing;
mod web;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::gateway::Gateway;
use crate::identity::HttpIdentityResolver;
use crate::pdp::HttpPolicyClient;
use crate::store::HttpDocumentStore;

#[derive(Parser, Debug)]
#[command(
    name = "coursegate",
    version,
    about = "Authorization gateway for a course-management system"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // external collaborators
    let identity = HttpIdentityResolver::new(
        &settings.identity.endpoint,
        Duration::from_millis(settings.identity.timeout_ms),
    )
    .map_err(|e| miette::miette!("identity resolver client: {e}"))?;
    let store = HttpDocumentStore::new(
        &settings.store.endpoint,
        Duration::from_millis(settings.store.timeout_ms),
    )
    .map_err(|e| miette::miette!("document store client: {e}"))?;
    let policy = HttpPolicyClient::new(
        &settings.pdp.endpoint,
        Duration::from_millis(settings.pdp.timeout_ms),
    )
    .map_err(|e| miette::miette!("policy client: {e}"))?;

    let gateway = Gateway::new(Arc::new(store), Arc::new(policy));

    let state = web::AppState {
        settings: Arc::new(settings),
        identity: Arc::new(identity),
        gateway: Arc::new(gateway),
    };

    web::serve(state).await?;
    Ok(())
}
