//! Ethernet II framing.
//!
//! ```text
//! +----------------+----------------+-----------+-------------+---------+
//! | dst MAC (6)    | src MAC (6)    | type (2)  | payload     | FCS (4) |
//! +----------------+----------------+-----------+-------------+---------+
//! ```
//!
//! Readers work at fixed offsets and expect at least [`HEADER_LEN`] bytes.

use super::checksum::crc32;
use bytes::{BufMut as _, Bytes, BytesMut};
use std::{fmt, str::FromStr};

pub const MAC_LEN: usize = 6;
pub const ETHERTYPE_LEN: usize = 2;
pub const HEADER_LEN: usize = 2 * MAC_LEN + ETHERTYPE_LEN;
pub const FCS_LEN: usize = 4;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; MAC_LEN]);
    pub const ZERO: MacAddr = MacAddr([0; MAC_LEN]);

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; MAC_LEN]> for MacAddr {
    fn from(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }
}

impl AsRef<[u8]> for MacAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a MAC address string is not six colon-separated hex octets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0:?}")]
pub struct ParseMacError(pub String);

impl FromStr for MacAddr {
    type Err = ParseMacError;

    /// Parses `0a:1b:2c:3d:4e:5f` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacError(s.to_string());
        let mut octets = [0u8; MAC_LEN];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().filter(|p| p.len() == 2).ok_or_else(err)?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self(octets))
    }
}

/// The protocol carried in an Ethernet frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EtherType(pub u16);

impl EtherType {
    pub const IPV4: EtherType = EtherType(0x0800);
    pub const ARP: EtherType = EtherType(0x0806);
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A complete frame: header, payload and FCS trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// Header and payload without the FCS. This is what goes to the link,
    /// since the interface hardware appends its own FCS.
    pub fn body(&self) -> &[u8] {
        &self.0[..self.0.len() - FCS_LEN]
    }

    pub fn fcs(&self) -> u32 {
        let trailer = &self.0[self.0.len() - FCS_LEN..];
        u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Recomputes the FCS over the body and compares it with the trailer.
    pub fn verify(&self) -> bool {
        crc32(self.body()) == self.fcs()
    }
}

/// Builds `dst ‖ src ‖ ethertype ‖ payload ‖ FCS`.
pub fn build_frame(dst: MacAddr, src: MacAddr, ethertype: EtherType, payload: &[u8]) -> Frame {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + FCS_LEN);
    buf.put_slice(&dst.0);
    buf.put_slice(&src.0);
    buf.put_u16(ethertype.0);
    buf.put_slice(payload);
    let fcs = crc32(&buf);
    buf.put_u32(fcs);
    Frame(buf.freeze())
}

pub fn dst_mac(frame: &[u8]) -> MacAddr {
    mac_at(frame, 0)
}

pub fn src_mac(frame: &[u8]) -> MacAddr {
    mac_at(frame, MAC_LEN)
}

pub fn ethertype(frame: &[u8]) -> EtherType {
    EtherType(u16::from_be_bytes([frame[2 * MAC_LEN], frame[2 * MAC_LEN + 1]]))
}

/// Everything after the header. A received frame has no FCS, so this is the
/// network-layer packet.
pub fn payload(frame: &[u8]) -> &[u8] {
    &frame[HEADER_LEN..]
}

fn mac_at(frame: &[u8], offset: usize) -> MacAddr {
    let mut octets = [0u8; MAC_LEN];
    octets.copy_from_slice(&frame[offset..offset + MAC_LEN]);
    MacAddr(octets)
}
