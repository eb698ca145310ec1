//! ARP for Ethernet/IPv4 (RFC 826).
//!
//! Messages are read from the first byte after the Ethernet header.

use super::{ethernet::MacAddr, ip::addr_at};
use bytes::{BufMut as _, Bytes, BytesMut};
use std::net::Ipv4Addr;

pub const ARP_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArpOperation(pub u16);

impl ArpOperation {
    pub const REQUEST: ArpOperation = ArpOperation(1);
    pub const REPLY: ArpOperation = ArpOperation(2);
}

/// Builds a who-has request for `target_ip`, sent from `mac`/`client_ip`.
pub fn build_arp_request(mac: MacAddr, client_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Bytes {
    let mut buf = BytesMut::with_capacity(ARP_LEN);
    buf.put_u16(HTYPE_ETHERNET);
    buf.put_u16(PTYPE_IPV4);
    buf.put_u8(6);
    buf.put_u8(4);
    buf.put_u16(ArpOperation::REQUEST.0);
    buf.put_slice(&mac.0);
    buf.put_slice(&client_ip.octets());
    buf.put_slice(&MacAddr::ZERO.0);
    buf.put_slice(&target_ip.octets());
    buf.freeze()
}

pub fn operation(msg: &[u8]) -> ArpOperation {
    ArpOperation(u16::from_be_bytes([msg[6], msg[7]]))
}

pub fn sender_mac(msg: &[u8]) -> MacAddr {
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&msg[8..14]);
    MacAddr(octets)
}

pub fn sender_addr(msg: &[u8]) -> Ipv4Addr {
    addr_at(msg, 14)
}

pub fn target_addr(msg: &[u8]) -> Ipv4Addr {
    addr_at(msg, 24)
}
