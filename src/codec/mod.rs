//! Byte-exact builders and fixed-offset readers for the frames the
//! provisioning client exchanges.
//!
//! Builders always produce well-formed output. Readers trust the caller to
//! have checked the buffer is long enough and index out of bounds otherwise.

pub mod arp;
pub mod checksum;
pub mod dhcp;
pub mod ethernet;
pub mod ip;

pub use checksum::{crc32, ip_checksum};
pub use ethernet::{build_frame, EtherType, Frame, MacAddr};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("DHCP option stream ends at offset {offset} without an end option")]
    UnterminatedOptions { offset: usize },

    #[error("buffer too short: need {needed} bytes, got {len}")]
    Truncated { needed: usize, len: usize },
}

/// Checks that `buf` holds at least `needed` bytes before a fixed-offset read.
pub fn ensure_len(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            len: buf.len(),
        });
    }
    Ok(())
}
