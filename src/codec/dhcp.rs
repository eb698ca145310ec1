//! DHCPv4 client messages (RFC 2131 subset).
//!
//! ```text
//! op(1) htype(1) hlen(1) hops(1) | xid(4) | secs(2) flags(2)
//! ciaddr(4) yiaddr(4) siaddr(4) giaddr(4) | chaddr(16) | sname(64) file(128)
//! magic cookie(4) | options: code(1) len(1) value(len) ... end(255)
//! ```
//!
//! Builders return a complete IPv4/UDP packet; readers take the UDP payload.

use super::{
    ethernet::{MacAddr, MAC_LEN},
    ip::{addr_at, build_udp, IPADDR_LEN},
    CodecError,
};
use bytes::{BufMut as _, BytesMut};
use std::net::Ipv4Addr;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

const HTYPE_ETHERNET: u8 = 1;
const CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const FLAGS_BROADCAST: u16 = 0x8000;

pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
/// Length of the fixed BOOTP section, up to and excluding the magic cookie.
pub const DHCP_FIXED_LEN: usize = 236;
/// Offset of the first option.
pub const OPTIONS_OFFSET: usize = DHCP_FIXED_LEN + MAGIC_COOKIE.len();

/// Options asked for in a DISCOVER.
const PARAMETER_REQUEST_LIST: [OptionCode; 5] = [
    OptionCode::SubnetMask,
    OptionCode::Router,
    OptionCode::DomainNameServer,
    OptionCode::DomainName,
    OptionCode::ServerIdentifier,
];

/// BOOTP `op` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BootOp(pub u8);

impl BootOp {
    pub const REQUEST: BootOp = BootOp(1);
    pub const REPLY: BootOp = BootOp(2);
}

/// The messages this client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientMessage {
    Discover = 1,
    Request = 3,
}

/// Option 53 values, used to describe replies in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DhcpMessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for DhcpMessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            other => return Err(other),
        })
    }
}

/// Option codes understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DomainNameServer = 6,
    DomainName = 15,
    RequestedIpAddress = 50,
    AddressLeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    End = 255,
}

impl From<OptionCode> for u8 {
    fn from(code: OptionCode) -> Self {
        code as u8
    }
}

/// Options of a received message, indexed by code.
///
/// Values borrow from the message they were parsed from. A code that
/// appears twice keeps its last value.
#[derive(Clone)]
pub struct DhcpOptions<'a> {
    slots: [Option<&'a [u8]>; 256],
}

impl<'a> DhcpOptions<'a> {
    pub fn new() -> Self {
        Self { slots: [None; 256] }
    }

    pub fn insert(&mut self, code: u8, value: &'a [u8]) {
        self.slots[code as usize] = Some(value);
    }

    pub fn get(&self, code: OptionCode) -> Option<&'a [u8]> {
        self.get_raw(code.into())
    }

    pub fn get_raw(&self, code: u8) -> Option<&'a [u8]> {
        self.slots[code as usize]
    }

    /// First address of an address-valued option such as router or DNS.
    pub fn ipv4(&self, code: OptionCode) -> Option<Ipv4Addr> {
        self.get(code)
            .filter(|value| value.len() >= IPADDR_LEN)
            .map(|value| addr_at(value, 0))
    }

    pub fn message_type(&self) -> Option<DhcpMessageType> {
        match self.get(OptionCode::MessageType)? {
            [value] => DhcpMessageType::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn lease_time(&self) -> Option<u32> {
        match self.get(OptionCode::AddressLeaseTime)? {
            [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &'a [u8])> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(code, value)| value.map(|v| (code as u8, v)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DhcpOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DhcpOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Appends TLV-encoded options to a message buffer.
pub struct OptionWriter<'b> {
    buf: &'b mut BytesMut,
}

impl<'b> OptionWriter<'b> {
    pub fn new(buf: &'b mut BytesMut) -> Self {
        Self { buf }
    }

    /// Writes one option. Values longer than 255 bytes cannot be encoded.
    pub fn option(&mut self, code: u8, value: &[u8]) -> &mut Self {
        assert!(value.len() <= u8::MAX as usize, "option {code} value too long");
        self.buf.put_u8(code);
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value);
        self
    }

    pub fn end(&mut self) {
        self.buf.put_u8(OptionCode::End.into());
    }
}

/// Inputs of [`build_dhcp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpParams {
    pub xid: u32,
    pub secs: u16,
    pub message: ClientMessage,
    pub client_ip: Ipv4Addr,
    pub renew: bool,
    pub server_ip: Ipv4Addr,
    pub client_port: u16,
    pub server_port: u16,
}

/// Builds a client message inside IPv4/UDP from `client_port` to `server_port`.
///
/// Extra options: none when renewing, a parameter request list while the
/// client has no address, otherwise the requested address.
pub fn build_dhcp(mac: MacAddr, params: &DhcpParams) -> BytesMut {
    let unconfigured = params.client_ip.is_unspecified();
    let ciaddr = if params.renew {
        params.client_ip
    } else {
        Ipv4Addr::UNSPECIFIED
    };

    let mut msg = BytesMut::with_capacity(OPTIONS_OFFSET + 16);
    msg.put_u8(BootOp::REQUEST.0);
    msg.put_u8(HTYPE_ETHERNET);
    msg.put_u8(MAC_LEN as u8);
    msg.put_u8(0); // hops
    msg.put_u32(params.xid);
    msg.put_u16(params.secs);
    msg.put_u16(if unconfigured { FLAGS_BROADCAST } else { 0 });
    msg.put_slice(&ciaddr.octets());
    msg.put_slice(&Ipv4Addr::UNSPECIFIED.octets()); // yiaddr
    msg.put_slice(&Ipv4Addr::UNSPECIFIED.octets()); // siaddr
    msg.put_slice(&Ipv4Addr::UNSPECIFIED.octets()); // giaddr
    msg.put_slice(&mac.0);
    msg.put_bytes(0, CHADDR_LEN - MAC_LEN);
    msg.put_bytes(0, SNAME_LEN + FILE_LEN);
    msg.put_slice(&MAGIC_COOKIE);

    let mut opts = OptionWriter::new(&mut msg);
    opts.option(OptionCode::MessageType.into(), &[params.message as u8]);
    if !params.renew {
        if unconfigured {
            let list = PARAMETER_REQUEST_LIST.map(u8::from);
            opts.option(OptionCode::ParameterRequestList.into(), &list);
        } else {
            opts.option(OptionCode::RequestedIpAddress.into(), &params.client_ip.octets());
        }
    }
    opts.end();

    build_udp(
        ciaddr,
        params.server_ip,
        params.client_port,
        params.server_port,
        &msg,
    )
}

/// A broadcast DISCOVER on the standard ports.
pub fn build_discover(mac: MacAddr, xid: u32, secs: u16) -> BytesMut {
    build_dhcp(
        mac,
        &DhcpParams {
            xid,
            secs,
            message: ClientMessage::Discover,
            client_ip: Ipv4Addr::UNSPECIFIED,
            renew: false,
            server_ip: Ipv4Addr::BROADCAST,
            client_port: CLIENT_PORT,
            server_port: SERVER_PORT,
        },
    )
}

pub fn build_request(
    mac: MacAddr,
    xid: u32,
    secs: u16,
    client_ip: Ipv4Addr,
    renew: bool,
    server_ip: Ipv4Addr,
) -> BytesMut {
    build_dhcp(
        mac,
        &DhcpParams {
            xid,
            secs,
            message: ClientMessage::Request,
            client_ip,
            renew,
            server_ip,
            client_port: CLIENT_PORT,
            server_port: SERVER_PORT,
        },
    )
}

pub fn op(msg: &[u8]) -> BootOp {
    BootOp(msg[0])
}

pub fn xid(msg: &[u8]) -> u32 {
    u32::from_be_bytes([msg[4], msg[5], msg[6], msg[7]])
}

pub fn secs(msg: &[u8]) -> u16 {
    u16::from_be_bytes([msg[8], msg[9]])
}

pub fn flags(msg: &[u8]) -> u16 {
    u16::from_be_bytes([msg[10], msg[11]])
}

pub fn ciaddr(msg: &[u8]) -> Ipv4Addr {
    addr_at(msg, 12)
}

pub fn yiaddr(msg: &[u8]) -> Ipv4Addr {
    addr_at(msg, 16)
}

/// Reads the option stream that follows the magic cookie.
///
/// Parsing stops at the end option. Pad bytes are skipped. A stream that
/// runs out before the end option is rejected.
pub fn parse_options(msg: &[u8]) -> Result<DhcpOptions<'_>, CodecError> {
    let mut opts = DhcpOptions::new();
    let mut offset = OPTIONS_OFFSET;
    loop {
        let code = *msg
            .get(offset)
            .ok_or(CodecError::UnterminatedOptions { offset })?;
        match code {
            c if c == u8::from(OptionCode::End) => return Ok(opts),
            c if c == u8::from(OptionCode::Pad) => offset += 1,
            _ => {
                let len = *msg
                    .get(offset + 1)
                    .ok_or(CodecError::UnterminatedOptions { offset })?
                    as usize;
                let value = msg
                    .get(offset + 2..offset + 2 + len)
                    .ok_or(CodecError::UnterminatedOptions { offset })?;
                opts.insert(code, value);
                offset += 2 + len;
            }
        }
    }
}
