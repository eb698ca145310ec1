//! The link the provisioning client talks over.
//!
//! A [`Link`] moves whole Ethernet frames. `send` takes header and payload
//! only; the interface appends the FCS. `recv` waits at most a short poll
//! interval and returns `Ok(None)` when nothing arrived.

use std::io;
use thiserror::Error;

#[cfg(target_os = "linux")]
mod raw;
#[cfg(target_os = "linux")]
pub use raw::RawLink;

/// Largest frame the client expects to receive.
pub const MAX_FRAME_LEN: usize = 4096;

/// Defines all possible errors for opening a link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to create a raw packet socket")]
    CreateSocket(#[source] io::Error),

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Failed to bind raw socket to interface '{interface}'")]
    Bind {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to register socket with the runtime")]
    Register(#[source] io::Error),

    #[error("Raw links are not implemented on this platform")]
    NotImplemented,
}

/// A raw frame transport. Calls are strictly sequential.
#[allow(async_fn_in_trait)]
pub trait Link {
    /// Transmits one frame (header and payload, no FCS).
    async fn send(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Receives one frame into `buf`, or `None` if none is available now.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}
