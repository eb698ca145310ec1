//! IPv4 and UDP.
//!
//! Only 20-byte IPv4 headers (IHL = 5, no options) are built or understood.
//! The readers below take a packet starting at the IPv4 header and use fixed
//! offsets; a packet carrying IP options will be misread.

use super::checksum::ip_checksum;
use bytes::{BufMut as _, BytesMut};
use std::net::Ipv4Addr;

pub const IP_VERSION_4: u8 = 4;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const IPADDR_LEN: usize = 4;

const IHL_DEFAULT: u8 = (IPV4_HEADER_LEN / 4) as u8;
const FLAGS_DONT_FRAGMENT: u8 = 0x40;
const TTL_DEFAULT: u8 = 128;

/// The IPv4 protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpProtocol(pub u8);

impl IpProtocol {
    pub const UDP: IpProtocol = IpProtocol(17);
}

/// Prepends an IPv4 header to `payload`.
///
/// Identification is zero, DF is set and TTL is 128.
pub fn build_ipv4(protocol: IpProtocol, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> BytesMut {
    let total_len = (IPV4_HEADER_LEN + payload.len()) as u16;
    let mut buf = BytesMut::with_capacity(total_len as usize);
    buf.put_u8((IP_VERSION_4 << 4) | IHL_DEFAULT);
    buf.put_u8(0); // DSCP/ECN
    buf.put_u16(total_len);
    buf.put_u16(0); // identification
    buf.put_u8(FLAGS_DONT_FRAGMENT);
    buf.put_u8(0); // fragment offset
    buf.put_u8(TTL_DEFAULT);
    buf.put_u8(protocol.0);
    buf.put_u16(0); // checksum placeholder
    buf.put_slice(&src.octets());
    buf.put_slice(&dst.octets());

    let checksum = ip_checksum(&buf[..IPV4_HEADER_LEN]);
    buf[10..12].copy_from_slice(&checksum.to_be_bytes());

    buf.put_slice(payload);
    buf
}

/// Builds a UDP datagram and wraps it in an IPv4 packet.
pub fn build_udp(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> BytesMut {
    let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;

    let mut segment = BytesMut::with_capacity(udp_len as usize);
    segment.put_u16(src_port);
    segment.put_u16(dst_port);
    segment.put_u16(udp_len);
    segment.put_u16(0); // checksum placeholder
    segment.put_slice(payload);

    let mut covered = BytesMut::with_capacity(12 + segment.len());
    covered.put_slice(&src.octets());
    covered.put_slice(&dst.octets());
    covered.put_u8(0);
    covered.put_u8(IpProtocol::UDP.0);
    covered.put_u16(udp_len);
    covered.put_slice(&segment);

    // Zero means "no checksum" on the wire (RFC 768).
    let checksum = match ip_checksum(&covered) {
        0 => 0xffff,
        sum => sum,
    };
    segment[6..8].copy_from_slice(&checksum.to_be_bytes());

    build_ipv4(IpProtocol::UDP, src, dst, &segment)
}

pub fn version(packet: &[u8]) -> u8 {
    packet[0] >> 4
}

pub fn total_length(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[2], packet[3]])
}

pub fn protocol(packet: &[u8]) -> IpProtocol {
    IpProtocol(packet[9])
}

pub fn src_addr(packet: &[u8]) -> Ipv4Addr {
    addr_at(packet, 12)
}

pub fn dst_addr(packet: &[u8]) -> Ipv4Addr {
    addr_at(packet, 16)
}

pub fn udp_src_port(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[IPV4_HEADER_LEN], packet[IPV4_HEADER_LEN + 1]])
}

pub fn udp_dst_port(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[IPV4_HEADER_LEN + 2], packet[IPV4_HEADER_LEN + 3]])
}

/// The UDP payload of an IPv4/UDP packet.
pub fn udp_payload(packet: &[u8]) -> &[u8] {
    &packet[IPV4_HEADER_LEN + UDP_HEADER_LEN..]
}

pub(crate) fn addr_at(buf: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3])
}
