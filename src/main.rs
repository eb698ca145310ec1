use clap::Parser;
use linkboot::{Args, ClientConfig, ProvisionError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ProvisionError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_args(args).await?;

    tracing::info!(
        "Provisioning '{}' as {}, final destination {}",
        config.interface,
        config.mac_address,
        config.destination
    );

    let binding = run(config).await?;

    tracing::info!(
        "Address {} (mask {}), gateway {} at {}, DNS {}",
        binding.client_ip,
        binding.netmask,
        binding.upstream_ip,
        binding.upstream_mac,
        binding.dns
    );
    Ok(())
}

#[cfg(target_os = "linux")]
async fn run(config: ClientConfig) -> Result<linkboot::Binding, ProvisionError> {
    // The link must exist before any handshake starts.
    let link = linkboot::network::RawLink::open(&config.interface)?;
    let mut client = linkboot::ProvisioningClient::new(config, link);
    client.run().await
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: ClientConfig) -> Result<linkboot::Binding, ProvisionError> {
    Err(linkboot::network::LinkError::NotImplemented.into())
}
