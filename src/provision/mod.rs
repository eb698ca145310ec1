//! Client-side address acquisition over a raw link
//!
//! This module contains the provisioning state machine:
//! - DHCP DISCOVER/REQUEST with unbounded REQUEST retries
//! - ARP resolution of the upstream gateway
//! - lease re-affirmation and the final application datagram

pub mod handler;

pub use handler::{ProvisionState, Provisioner};

#[cfg(test)]
mod tests;
