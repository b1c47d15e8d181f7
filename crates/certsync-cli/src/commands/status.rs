//! Status command - show the certificates of opted-in services

use certsync_kube::status::{self, SecretState, ServiceStatus};
use certsync_kube::CertSettings;
use console::style;
use kube::Client;

use super::ConfigArgs;
use crate::error::{CliError, Result};

/// Run the status command
pub async fn run(args: &ConfigArgs, output_json: bool) -> Result<()> {
    let config = args.resolve()?;
    let client = Client::try_default().await?;

    let statuses = status::collect(
        client,
        config.namespace.as_deref(),
        &CertSettings::from(&config),
    )
    .await?;

    if output_json {
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("{}", style("No services opted in").dim());
        return Ok(());
    }

    for (i, service) in statuses.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_service(service);
    }
    Ok(())
}

fn print_service(service: &ServiceStatus) {
    println!(
        "{}",
        style(format!("{}/{}", service.namespace, service.service))
            .bold()
            .underlined()
    );
    println!("  Secret:     {}", style(&service.secret).cyan());

    let state = match &service.state {
        SecretState::Current => style("current".to_string()).green(),
        SecretState::Missing => style("missing".to_string()).yellow(),
        SecretState::RotationDue { reason } => style(format!("rotation due ({reason})")).yellow(),
        SecretState::Invalid { error } => style(format!("invalid: {error}")).red(),
    };
    println!("  State:      {}", state);

    if let Some(not_after) = service.not_after {
        println!("  Expires:    {}", not_after.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  DNS names:  {}", service.dns_names.join(", "));

    if service.dependents.is_empty() {
        println!("  Dependents: {}", style("none").dim());
    } else {
        println!("  Dependents:");
        for dependent in &service.dependents {
            println!("    - {} {}", style(dependent.kind).dim(), dependent.name);
        }
    }
}
