use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use helpdesk_crm::config::CrmConfig;
use helpdesk_crm::error::Result;
use helpdesk_crm::{seed, Crm};

async fn run() -> Result<()> {
    let crm = Crm::new(CrmConfig::service_from_env()?)?;
    let report = seed::run(&crm).await?;
    info!(
        customer_id = %report.customer_id,
        user_id = %report.user_id,
        inserted = report.inserted,
        "seeding finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "error generating test data");
        std::process::exit(1);
    }
}
