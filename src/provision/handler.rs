//! Provisioning state machine
//!
//! Drives the DHCP DISCOVER/REQUEST exchange, resolves the gateway with ARP,
//! re-affirms the lease and finally emits one application datagram. The
//! machine performs no I/O and never reads the clock; every event carries
//! the instant it was observed at.

use crate::{
    client::{Action, Binding, Event, ProvisioningStateMachine},
    codec::{
        arp::{self, ArpOperation, ARP_LEN},
        build_frame,
        dhcp::{self, BootOp, ClientMessage, DhcpParams, OptionCode, DHCP_FIXED_LEN},
        ethernet::{self, HEADER_LEN},
        ip::{self, IpProtocol, IPV4_HEADER_LEN, IP_VERSION_4, UDP_HEADER_LEN},
        ensure_len, EtherType, MacAddr,
    },
    config::ClientConfig,
    error::ProvisionError,
};
use std::{
    net::Ipv4Addr,
    time::{Duration, Instant},
};

const MIN_DHCP_FRAME_LEN: usize = HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN + DHCP_FIXED_LEN;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProvisionState {
    Init,
    DiscoverSent,
    OfferBound,
    RequestSent,
    AckBound,
    ArpSent,
    Resolved,
    Reaffirming,
    Settled,
    Done,
}

/// What the first accepted reply told us.
#[derive(Debug, Clone, Copy)]
struct Offer {
    client_ip: Ipv4Addr,
    server_mac: MacAddr,
    server_ip: Ipv4Addr,
    upstream_ip: Ipv4Addr,
    netmask: Ipv4Addr,
    dns: Ipv4Addr,
    lease_time: Option<Duration>,
}

pub struct Provisioner {
    config: ClientConfig,
    state: ProvisionState,
    xid: u32,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
    offer: Option<Offer>,
    upstream_mac: Option<MacAddr>,
}

impl Provisioner {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_xid(config, rand::random())
    }

    pub fn with_xid(config: ClientConfig, xid: u32) -> Self {
        Self {
            config,
            state: ProvisionState::Init,
            xid,
            started_at: None,
            deadline: None,
            offer: None,
            upstream_mac: None,
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// The binding, once the gateway has been resolved.
    pub fn binding(&self) -> Option<Binding> {
        let offer = self.offer?;
        Some(Binding {
            client_ip: offer.client_ip,
            server_ip: offer.server_ip,
            server_mac: offer.server_mac,
            upstream_ip: offer.upstream_ip,
            upstream_mac: self.upstream_mac?,
            netmask: offer.netmask,
            dns: offer.dns,
            lease_time: offer.lease_time,
        })
    }

    fn transition(&mut self, next: ProvisionState) {
        tracing::info!("Transitioning {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Whole seconds since the DISCOVER went out.
    fn secs(&self, now: Instant) -> u16 {
        let elapsed = self
            .started_at
            .map_or(Duration::ZERO, |t0| now.saturating_duration_since(t0));
        elapsed.as_secs().min(u64::from(u16::MAX)) as u16
    }

    fn offer(&self) -> Result<Offer, ProvisionError> {
        self.offer
            .ok_or_else(|| ProvisionError::Critical(format!("no offer in state {:?}", self.state)))
    }

    /// Message parameters on the configured ports, addressed to IP broadcast.
    fn dhcp_params(&self, message: ClientMessage, client_ip: Ipv4Addr, secs: u16) -> DhcpParams {
        DhcpParams {
            xid: self.xid,
            secs,
            message,
            client_ip,
            renew: false,
            server_ip: Ipv4Addr::BROADCAST,
            client_port: self.config.client_port,
            server_port: self.config.server_port,
        }
    }

    fn handle_init(&mut self, now: Instant) -> Action {
        self.started_at = Some(now);
        tracing::info!("Broadcasting DHCP DISCOVER, xid={:#010x}", self.xid);
        let packet = dhcp::build_dhcp(
            self.config.mac_address,
            &self.dhcp_params(ClientMessage::Discover, Ipv4Addr::UNSPECIFIED, 0),
        );
        self.transition(ProvisionState::DiscoverSent);
        Action::Send(build_frame(
            MacAddr::BROADCAST,
            self.config.mac_address,
            EtherType::IPV4,
            &packet,
        ))
    }

    /// Returns the DHCP message if `frame` is a reply to our transaction.
    fn accept_dhcp_reply<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        if let Err(e) = ensure_len(frame, MIN_DHCP_FRAME_LEN) {
            tracing::debug!("Dropping frame: {}", e);
            return None;
        }
        if ethernet::ethertype(frame) != EtherType::IPV4 {
            return None;
        }
        let packet = ethernet::payload(frame);
        if ip::version(packet) != IP_VERSION_4 || ip::protocol(packet) != IpProtocol::UDP {
            return None;
        }
        if ip::udp_dst_port(packet) != self.config.client_port {
            return None;
        }
        let msg = ip::udp_payload(packet);
        if dhcp::op(msg) != BootOp::REPLY {
            return None;
        }
        if dhcp::xid(msg) != self.xid {
            tracing::debug!("XID mismatch ({:#010x}), ignoring reply", dhcp::xid(msg));
            return None;
        }
        Some(msg)
    }

    fn handle_selecting(&mut self, frame: &[u8]) -> Action {
        let Some(msg) = self.accept_dhcp_reply(frame) else {
            return Action::Listen(None);
        };
        let opts = match dhcp::parse_options(msg) {
            Ok(opts) => opts,
            Err(e) => {
                tracing::warn!("Dropping reply: {}", e);
                return Action::Listen(None);
            }
        };

        let required = (
            opts.ipv4(OptionCode::Router),
            opts.ipv4(OptionCode::SubnetMask),
            opts.ipv4(OptionCode::DomainNameServer),
            opts.ipv4(OptionCode::ServerIdentifier),
        );
        let (Some(upstream_ip), Some(netmask), Some(dns), Some(server_ip)) = required else {
            tracing::warn!("Dropping reply without router/mask/dns/server id: {:?}", opts);
            return Action::Listen(None);
        };

        let offer = Offer {
            client_ip: dhcp::yiaddr(msg),
            server_mac: ethernet::src_mac(frame),
            server_ip,
            upstream_ip,
            netmask,
            dns,
            lease_time: opts.lease_time().map(|secs| Duration::from_secs(secs.into())),
        };
        tracing::info!(
            "Received {:?} from {} ({}), offered IP: {}",
            opts.message_type(),
            offer.server_ip,
            offer.server_mac,
            offer.client_ip
        );
        self.offer = Some(offer);
        self.transition(ProvisionState::OfferBound);
        Action::Proceed
    }

    /// Sends (or resends) the REQUEST for the offered address.
    ///
    /// Used both for the initial request and, after ARP resolution, to
    /// re-affirm the lease in place of a real renewal.
    fn send_request(
        &mut self,
        next: ProvisionState,
        now: Instant,
    ) -> Result<Action, ProvisionError> {
        let offer = self.offer()?;
        let secs = self.secs(now);
        tracing::info!("Sending DHCP REQUEST for {} (secs={})", offer.client_ip, secs);
        let packet = dhcp::build_dhcp(
            self.config.mac_address,
            &self.dhcp_params(ClientMessage::Request, offer.client_ip, secs),
        );
        if self.state != next {
            self.transition(next);
        }
        Ok(Action::Send(build_frame(
            offer.server_mac,
            self.config.mac_address,
            EtherType::IPV4,
            &packet,
        )))
    }

    fn start_request_timer(&mut self, now: Instant) -> Action {
        self.deadline = Some(now + self.config.request_timeout);
        Action::Listen(self.deadline)
    }

    fn handle_request_timeout(&mut self, now: Instant) -> Result<Action, ProvisionError> {
        tracing::warn!("No reply found, sending another DHCP REQUEST");
        self.send_request(self.state, now)
    }

    /// Waits for the reply to a REQUEST; moves to `next` once it arrives.
    fn handle_requesting(&mut self, frame: &[u8], next: ProvisionState, then: Action) -> Action {
        let Some(msg) = self.accept_dhcp_reply(frame) else {
            return Action::Listen(self.deadline);
        };
        let message_type = dhcp::parse_options(msg).ok().and_then(|opts| opts.message_type());
        tracing::info!("Received {:?} for xid {:#010x}", message_type, self.xid);
        self.deadline = None;
        self.transition(next);
        then
    }

    fn send_arp_request(&mut self) -> Result<Action, ProvisionError> {
        let offer = self.offer()?;
        tracing::info!("Resolving gateway {} via ARP", offer.upstream_ip);
        let request =
            arp::build_arp_request(self.config.mac_address, offer.client_ip, offer.upstream_ip);
        self.transition(ProvisionState::ArpSent);
        Ok(Action::Send(build_frame(
            MacAddr::BROADCAST,
            self.config.mac_address,
            EtherType::ARP,
            &request,
        )))
    }

    fn accept_arp_reply(&self, frame: &[u8], client_ip: Ipv4Addr) -> Option<MacAddr> {
        if ensure_len(frame, HEADER_LEN + ARP_LEN).is_err()
            || ethernet::ethertype(frame) != EtherType::ARP
        {
            return None;
        }
        let msg = ethernet::payload(frame);
        if arp::operation(msg) != ArpOperation::REPLY || arp::target_addr(msg) != client_ip {
            return None;
        }
        Some(arp::sender_mac(msg))
    }

    fn handle_resolving(&mut self, frame: &[u8]) -> Result<Action, ProvisionError> {
        let offer = self.offer()?;
        let Some(upstream_mac) = self.accept_arp_reply(frame, offer.client_ip) else {
            return Ok(Action::Listen(None));
        };
        tracing::info!("Gateway {} is at {}", offer.upstream_ip, upstream_mac);
        self.upstream_mac = Some(upstream_mac);
        self.transition(ProvisionState::Resolved);
        Ok(Action::Sleep(self.config.settle_delay))
    }

    fn send_datagram(&mut self) -> Result<Action, ProvisionError> {
        let binding = self.binding().ok_or_else(|| {
            ProvisionError::Critical("gateway not resolved before final send".to_string())
        })?;
        let destination = self.config.destination;
        tracing::info!(
            "Sending {} byte datagram to {} via {}",
            self.config.payload.len(),
            destination,
            binding.upstream_mac
        );
        let packet = ip::build_udp(
            binding.client_ip,
            *destination.ip(),
            self.config.app_source_port,
            destination.port(),
            &self.config.payload,
        );
        self.transition(ProvisionState::Done);
        Ok(Action::Send(build_frame(
            binding.upstream_mac,
            self.config.mac_address,
            EtherType::IPV4,
            &packet,
        )))
    }

    fn finish(&self) -> Result<Action, ProvisionError> {
        self.binding()
            .map(Action::Finish)
            .ok_or_else(|| ProvisionError::Critical("finished without a binding".to_string()))
    }
}

impl ProvisioningStateMachine for Provisioner {
    fn state_name(&self) -> &'static str {
        match self.state {
            ProvisionState::Init => "Init",
            ProvisionState::DiscoverSent => "DiscoverSent",
            ProvisionState::OfferBound => "OfferBound",
            ProvisionState::RequestSent => "RequestSent",
            ProvisionState::AckBound => "AckBound",
            ProvisionState::ArpSent => "ArpSent",
            ProvisionState::Resolved => "Resolved",
            ProvisionState::Reaffirming => "Reaffirming",
            ProvisionState::Settled => "Settled",
            ProvisionState::Done => "Done",
        }
    }

    fn handle_event(&mut self, event: Event, now: Instant) -> Result<Action, ProvisionError> {
        use ProvisionState as S;

        tracing::trace!("Handling event {:?} in state {:?}", event, self.state);
        match (self.state, event) {
            (S::Init, Event::Start) => Ok(self.handle_init(now)),
            (S::DiscoverSent, Event::Sent) => Ok(Action::Listen(None)),
            (S::DiscoverSent, Event::FrameReceived(frame)) => Ok(self.handle_selecting(frame)),
            (S::OfferBound, Event::Resume) => self.send_request(S::RequestSent, now),
            (S::RequestSent | S::Reaffirming, Event::Sent) => Ok(self.start_request_timer(now)),
            (S::RequestSent | S::Reaffirming, Event::Timeout) => self.handle_request_timeout(now),
            (S::RequestSent, Event::FrameReceived(frame)) => {
                Ok(self.handle_requesting(frame, S::AckBound, Action::Proceed))
            }
            (S::AckBound, Event::Resume) => self.send_arp_request(),
            (S::ArpSent, Event::Sent) => Ok(Action::Listen(None)),
            (S::ArpSent, Event::FrameReceived(frame)) => self.handle_resolving(frame),
            // Stand-in for lease renewal: the address is requested once more.
            (S::Resolved, Event::Resume) => self.send_request(S::Reaffirming, now),
            (S::Reaffirming, Event::FrameReceived(frame)) => {
                let then = Action::Sleep(self.config.finish_delay);
                Ok(self.handle_requesting(frame, S::Settled, then))
            }
            (S::Settled, Event::Resume) => self.send_datagram(),
            (S::Done, _) => self.finish(),
            (state, event) => {
                tracing::debug!("Ignoring {:?} in state {:?}", event, state);
                Ok(Action::Listen(self.deadline))
            }
        }
    }
}
