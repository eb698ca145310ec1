use crate::{codec::MacAddr, error::ProvisionError};
use bytes::Bytes;
use clap::Parser;
use std::{
    net::SocketAddrV4,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;

pub const DEFAULT_DESTINATION_FILE: &str = "test_server.txt";
pub const DESTINATION_ENV: &str = "LINKBOOT_DESTINATION";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to provision (e.g., 'eth0')
    #[arg(short, long)]
    pub interface: String,

    /// Hardware address to send from; read from sysfs when omitted
    #[arg(short, long)]
    pub mac: Option<MacAddr>,

    /// Where the final datagram goes, as ip:port
    #[arg(short, long, env = DESTINATION_ENV)]
    pub destination: Option<SocketAddrV4>,

    /// File holding the destination when none is given directly
    #[arg(short = 'f', long, default_value = DEFAULT_DESTINATION_FILE)]
    pub destination_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub interface: String,
    pub mac_address: MacAddr,
    pub destination: SocketAddrV4,
    pub client_port: u16,
    pub server_port: u16,
    /// How long to wait for a reply before resending a REQUEST.
    pub request_timeout: Duration,
    /// Pause between ARP resolution and the re-affirming REQUEST.
    pub settle_delay: Duration,
    /// Pause between the final ACK and the application datagram.
    pub finish_delay: Duration,
    pub app_source_port: u16,
    pub payload: Bytes,
}

impl ClientConfig {
    pub fn new(interface: String, mac_address: MacAddr, destination: SocketAddrV4) -> Self {
        Self {
            interface,
            mac_address,
            destination,
            client_port: 68,
            server_port: 67,
            request_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            finish_delay: Duration::from_secs(1),
            app_source_port: 58099,
            payload: Bytes::from_static(b"hello"),
        }
    }

    /// Resolves everything the handshake needs. Runs once at startup.
    pub async fn from_args(args: Args) -> Result<Self, ProvisionError> {
        let mac_address = match args.mac {
            Some(mac) => mac,
            None => read_interface_mac(&args.interface).await?,
        };
        let destination = match args.destination {
            Some(destination) => destination,
            None => read_destination_file(&args.destination_file).await?,
        };
        Ok(Self::new(args.interface, mac_address, destination))
    }
}

/// Parses an `ip:port` destination.
pub fn parse_destination(s: &str) -> Result<SocketAddrV4, ProvisionError> {
    s.trim()
        .parse()
        .map_err(|e| ProvisionError::Config(format!("bad destination {s:?}: {e}")))
}

pub async fn read_destination_file(path: &Path) -> Result<SocketAddrV4, ProvisionError> {
    let contents = fs::read_to_string(path).await.map_err(|e| {
        ProvisionError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let line = contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ProvisionError::Config(format!("{} is empty", path.display())))?;
    parse_destination(line)
}

/// Reads the hardware address from `/sys/class/net/<interface>/address`.
pub async fn read_interface_mac(interface: &str) -> Result<MacAddr, ProvisionError> {
    let mac_path = format!("/sys/class/net/{interface}/address");
    let mac_str = fs::read_to_string(&mac_path)
        .await
        .map_err(|_| ProvisionError::InterfaceInvalid(interface.to_string()))?;
    mac_str
        .trim()
        .parse()
        .map_err(|e: crate::codec::ethernet::ParseMacError| ProvisionError::MacParse(e.0))
}
