//! Run command - start the controllers

use kube::Client;

use super::ConfigArgs;
use crate::error::Result;

/// Run the controllers until SIGINT/SIGTERM
pub async fn run(args: &ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::debug!(?config, "Effective configuration");

    let client = Client::try_default().await?;
    certsync_kube::run(client, config).await?;
    Ok(())
}
