//! # Linkboot - Raw-Frame Address Provisioning
//!
//! Linkboot acquires an IPv4 address over a raw Ethernet link without help
//! from the host network stack. It builds every frame itself (Ethernet,
//! IPv4, UDP, ARP and DHCP, checksums included), runs the DHCP
//! DISCOVER/REQUEST exchange, resolves the gateway with ARP, and finally
//! sends one UDP datagram from the acquired address.
//!
//! ## Features
//!
//! - Byte-exact codecs with fixed-offset readers
//! - Sans-IO state machine driven by timestamped events
//! - Asynchronous driver using Tokio
//! - `AF_PACKET` raw link (Linux)
//!
//! ## Example
//!
//! ```rust,no_run
//! use linkboot::{network::RawLink, ClientConfig, ProvisioningClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mac = "de:ad:be:ef:ca:fe".parse()?;
//!     let config = ClientConfig::new("eth0".to_string(), mac, "10.0.0.5:9000".parse()?);
//!     let link = RawLink::open(&config.interface)?;
//!     let mut client = ProvisioningClient::new(config, link);
//!     let binding = client.run().await?;
//!     println!("Provisioned: {:?}", binding);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod provision;

pub use client::{Binding, ProvisioningClient};
pub use config::{Args, ClientConfig};
pub use error::ProvisionError;
