use super::*;
use crate::{
    client::{Action, Event, ProvisioningStateMachine},
    codec::{
        build_frame,
        dhcp::{self, OptionCode},
        ethernet, ip, EtherType, Frame, MacAddr,
    },
    config::ClientConfig,
};
use dhcproto::{v4, Encodable as _, Encoder};
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::{Duration, Instant},
};

const CLIENT_MAC: MacAddr = MacAddr([0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe]);
const SERVER_MAC: MacAddr = MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
const GATEWAY_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 7);
const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DNS_IP: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
const XID: u32 = 0x1234_5678;

fn config() -> ClientConfig {
    ClientConfig::new(
        "eth0".to_string(),
        CLIENT_MAC,
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 9000),
    )
}

fn dhcp_reply(xid: u32, msg_type: v4::MessageType, with_router: bool) -> Frame {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootReply)
        .set_htype(v4::HType::Eth)
        .set_xid(xid)
        .set_yiaddr(CLIENT_IP)
        .set_chaddr(&CLIENT_MAC.0);
    msg.opts_mut().insert(v4::DhcpOption::MessageType(msg_type));
    msg.opts_mut()
        .insert(v4::DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)));
    if with_router {
        msg.opts_mut().insert(v4::DhcpOption::Router(vec![GATEWAY_IP]));
    }
    msg.opts_mut()
        .insert(v4::DhcpOption::DomainNameServer(vec![DNS_IP]));
    msg.opts_mut()
        .insert(v4::DhcpOption::ServerIdentifier(GATEWAY_IP));
    msg.opts_mut()
        .insert(v4::DhcpOption::AddressLeaseTime(3600));

    let mut buf = Vec::new();
    msg.encode(&mut Encoder::new(&mut buf)).unwrap();
    let packet = ip::build_udp(GATEWAY_IP, Ipv4Addr::BROADCAST, 67, 68, &buf);
    build_frame(MacAddr::BROADCAST, SERVER_MAC, EtherType::IPV4, &packet)
}

fn offer(xid: u32) -> Frame {
    dhcp_reply(xid, v4::MessageType::Offer, true)
}

fn ack(xid: u32) -> Frame {
    dhcp_reply(xid, v4::MessageType::Ack, true)
}

fn arp_reply(target: Ipv4Addr) -> Frame {
    let mut msg = vec![0, 1, 0x08, 0x00, 6, 4, 0, 2];
    msg.extend_from_slice(&GATEWAY_MAC.0);
    msg.extend_from_slice(&GATEWAY_IP.octets());
    msg.extend_from_slice(&CLIENT_MAC.0);
    msg.extend_from_slice(&target.octets());
    build_frame(CLIENT_MAC, GATEWAY_MAC, EtherType::ARP, &msg)
}

fn step(machine: &mut Provisioner, event: Event, now: Instant) -> Action {
    machine.handle_event(event, now).unwrap()
}

fn expect_send(action: Action) -> Frame {
    match action {
        Action::Send(frame) => frame,
        other => panic!("Expected Send action, got {other:?}"),
    }
}

fn receive(machine: &mut Provisioner, frame: &Frame, now: Instant) -> Action {
    step(machine, Event::FrameReceived(frame.body()), now)
}

/// Runs the machine until the first REQUEST has been sent and its timer started.
fn machine_requesting(t0: Instant) -> (Provisioner, Frame) {
    let mut machine = Provisioner::with_xid(config(), XID);
    step(&mut machine, Event::Start, t0);
    step(&mut machine, Event::Sent, t0);
    receive(&mut machine, &offer(XID), t0 + Duration::from_secs(1));
    let request = expect_send(step(&mut machine, Event::Resume, t0 + Duration::from_secs(2)));
    (machine, request)
}

#[test]
fn test_provisioner_creation() {
    let machine = Provisioner::new(config());
    assert_eq!(machine.state(), ProvisionState::Init);
    assert_eq!(machine.state_name(), "Init");
    assert!(machine.binding().is_none());
}

#[test]
fn test_start_broadcasts_discover() {
    let t0 = Instant::now();
    let mut machine = Provisioner::with_xid(config(), XID);

    let frame = expect_send(step(&mut machine, Event::Start, t0));
    assert!(frame.verify());
    let body = frame.body();
    assert_eq!(ethernet::dst_mac(body), MacAddr::BROADCAST);
    assert_eq!(ethernet::src_mac(body), CLIENT_MAC);
    assert_eq!(ethernet::ethertype(body), EtherType::IPV4);

    let packet = ethernet::payload(body);
    assert_eq!(ip::dst_addr(packet), Ipv4Addr::BROADCAST);
    let msg = ip::udp_payload(packet);
    assert_eq!(dhcp::xid(msg), XID);
    assert_eq!(
        dhcp::parse_options(msg).unwrap().get(OptionCode::MessageType),
        Some(&[1u8][..])
    );
    assert_eq!(machine.state(), ProvisionState::DiscoverSent);

    assert!(matches!(step(&mut machine, Event::Sent, t0), Action::Listen(None)));
}

#[test]
fn test_offer_binds_and_request_is_broadcast() {
    let t0 = Instant::now();
    let mut machine = Provisioner::with_xid(config(), XID);
    step(&mut machine, Event::Start, t0);
    step(&mut machine, Event::Sent, t0);

    let action = receive(&mut machine, &offer(XID), t0 + Duration::from_secs(3));
    assert!(matches!(action, Action::Proceed));
    assert_eq!(machine.state(), ProvisionState::OfferBound);

    let request = expect_send(step(&mut machine, Event::Resume, t0 + Duration::from_secs(3)));
    assert_eq!(machine.state(), ProvisionState::RequestSent);

    let body = request.body();
    assert_eq!(ethernet::dst_mac(body), SERVER_MAC);
    let packet = ethernet::payload(body);
    assert_eq!(ip::src_addr(packet), Ipv4Addr::UNSPECIFIED);
    assert_eq!(ip::dst_addr(packet), Ipv4Addr::BROADCAST);

    let msg = ip::udp_payload(packet);
    assert_eq!(dhcp::xid(msg), XID);
    assert_eq!(dhcp::secs(msg), 3);
    let opts = dhcp::parse_options(msg).unwrap();
    assert_eq!(opts.get(OptionCode::MessageType), Some(&[3u8][..]));
    assert_eq!(opts.ipv4(OptionCode::RequestedIpAddress), Some(CLIENT_IP));
}

#[test]
fn test_configured_ports_drive_messages_and_reply_filter() {
    let t0 = Instant::now();
    let mut custom = config();
    custom.client_port = 1068;
    custom.server_port = 1067;
    let mut machine = Provisioner::with_xid(custom, XID);

    let discover = expect_send(step(&mut machine, Event::Start, t0));
    let packet = ethernet::payload(discover.body());
    assert_eq!(ip::udp_src_port(packet), 1068);
    assert_eq!(ip::udp_dst_port(packet), 1067);
    step(&mut machine, Event::Sent, t0);

    // An offer to the standard client port is not for us.
    let action = receive(&mut machine, &offer(XID), t0);
    assert!(matches!(action, Action::Listen(None)));
    assert_eq!(machine.state(), ProvisionState::DiscoverSent);

    let mut retargeted = offer(XID).body().to_vec();
    retargeted[ethernet::HEADER_LEN + 22..ethernet::HEADER_LEN + 24]
        .copy_from_slice(&1068u16.to_be_bytes());
    let action = step(&mut machine, Event::FrameReceived(&retargeted), t0);
    assert!(matches!(action, Action::Proceed));

    let request = expect_send(step(&mut machine, Event::Resume, t0));
    let packet = ethernet::payload(request.body());
    assert_eq!(ip::udp_src_port(packet), 1068);
    assert_eq!(ip::udp_dst_port(packet), 1067);
}

#[test]
fn test_selecting_filter_drops_irrelevant_frames() {
    let t0 = Instant::now();
    let mut machine = Provisioner::with_xid(config(), XID);
    step(&mut machine, Event::Start, t0);
    step(&mut machine, Event::Sent, t0);

    // Our own DISCOVER echoed back by the link.
    let mut echo = Provisioner::with_xid(config(), XID);
    let own = expect_send(step(&mut echo, Event::Start, t0));

    let mut wrong_port = offer(XID).body().to_vec();
    wrong_port[ethernet::HEADER_LEN + 22..ethernet::HEADER_LEN + 24]
        .copy_from_slice(&69u16.to_be_bytes());

    let mut not_udp = offer(XID).body().to_vec();
    not_udp[ethernet::HEADER_LEN + 9] = 6;

    let mut unterminated = offer(XID).body().to_vec();
    unterminated.truncate(ethernet::HEADER_LEN + 28 + dhcp::OPTIONS_OFFSET + 3);

    let rejected: Vec<Vec<u8>> = vec![
        offer(XID + 1).body().to_vec(),
        own.body().to_vec(),
        wrong_port,
        not_udp,
        arp_reply(CLIENT_IP).body().to_vec(),
        offer(XID).body()[..100].to_vec(),
        vec![0u8; 10],
        unterminated,
        dhcp_reply(XID, v4::MessageType::Offer, false).body().to_vec(),
    ];
    for frame in &rejected {
        let action = step(&mut machine, Event::FrameReceived(frame.as_slice()), t0);
        assert!(matches!(action, Action::Listen(None)));
        assert_eq!(machine.state(), ProvisionState::DiscoverSent);
    }

    assert!(matches!(
        receive(&mut machine, &offer(XID), t0),
        Action::Proceed
    ));
}

#[test]
fn test_request_timeout_resends_once_with_same_xid() {
    let t0 = Instant::now();
    let (mut machine, first) = machine_requesting(t0);
    let first_msg = ip::udp_payload(ethernet::payload(first.body())).to_vec();
    assert_eq!(dhcp::secs(&first_msg), 2);

    let sent_at = t0 + Duration::from_secs(2);
    let deadline = sent_at + Duration::from_secs(5);
    assert!(matches!(
        step(&mut machine, Event::Sent, sent_at),
        Action::Listen(Some(d)) if d == deadline
    ));

    // An unrelated reply does not move the deadline.
    assert!(matches!(
        receive(&mut machine, &offer(XID ^ 0xffff), sent_at + Duration::from_secs(1)),
        Action::Listen(Some(d)) if d == deadline
    ));

    let resent = expect_send(step(&mut machine, Event::Timeout, deadline));
    assert_eq!(machine.state(), ProvisionState::RequestSent);
    let msg = ip::udp_payload(ethernet::payload(resent.body()));
    assert_eq!(dhcp::xid(msg), XID);
    assert_eq!(dhcp::secs(msg), 7);
    assert_eq!(&msg[12..], &first_msg[12..]);

    // The timer restarts from the resend.
    assert!(matches!(
        step(&mut machine, Event::Sent, deadline),
        Action::Listen(Some(d)) if d == deadline + Duration::from_secs(5)
    ));
}

#[test]
fn test_full_handshake() {
    let t0 = Instant::now();
    let (mut machine, _) = machine_requesting(t0);
    let t = t0 + Duration::from_secs(2);
    step(&mut machine, Event::Sent, t);

    assert!(matches!(receive(&mut machine, &ack(XID), t), Action::Proceed));
    assert_eq!(machine.state(), ProvisionState::AckBound);

    let arp_frame = expect_send(step(&mut machine, Event::Resume, t));
    assert_eq!(machine.state(), ProvisionState::ArpSent);
    let body = arp_frame.body();
    assert_eq!(ethernet::dst_mac(body), MacAddr::BROADCAST);
    assert_eq!(ethernet::ethertype(body), EtherType::ARP);
    let arp_msg = ethernet::payload(body);
    assert_eq!(crate::codec::arp::operation(arp_msg), crate::codec::arp::ArpOperation::REQUEST);
    assert_eq!(crate::codec::arp::sender_addr(arp_msg), CLIENT_IP);
    assert_eq!(crate::codec::arp::target_addr(arp_msg), GATEWAY_IP);
    assert!(matches!(step(&mut machine, Event::Sent, t), Action::Listen(None)));

    // A reply for somebody else is ignored.
    assert!(matches!(
        receive(&mut machine, &arp_reply(Ipv4Addr::new(10, 0, 0, 99)), t),
        Action::Listen(None)
    ));
    assert!(machine.binding().is_none());

    assert!(matches!(
        receive(&mut machine, &arp_reply(CLIENT_IP), t),
        Action::Sleep(d) if d == Duration::from_secs(5)
    ));
    assert_eq!(machine.state(), ProvisionState::Resolved);
    assert_eq!(machine.binding().unwrap().upstream_mac, GATEWAY_MAC);

    let t = t + Duration::from_secs(5);
    let reaffirm = expect_send(step(&mut machine, Event::Resume, t));
    assert_eq!(machine.state(), ProvisionState::Reaffirming);
    assert_eq!(ethernet::dst_mac(reaffirm.body()), SERVER_MAC);
    let msg = ip::udp_payload(ethernet::payload(reaffirm.body()));
    assert_eq!(dhcp::xid(msg), XID);
    assert_eq!(dhcp::secs(msg), 7);
    assert!(matches!(step(&mut machine, Event::Sent, t), Action::Listen(Some(_))));

    assert!(matches!(
        receive(&mut machine, &ack(XID), t),
        Action::Sleep(d) if d == Duration::from_secs(1)
    ));
    assert_eq!(machine.state(), ProvisionState::Settled);

    let datagram = expect_send(step(&mut machine, Event::Resume, t + Duration::from_secs(1)));
    assert_eq!(machine.state(), ProvisionState::Done);
    let body = datagram.body();
    assert_eq!(ethernet::dst_mac(body), GATEWAY_MAC);
    let packet = ethernet::payload(body);
    assert_eq!(ip::src_addr(packet), CLIENT_IP);
    assert_eq!(ip::dst_addr(packet), Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(ip::udp_src_port(packet), 58099);
    assert_eq!(ip::udp_dst_port(packet), 9000);
    assert_eq!(ip::udp_payload(packet), b"hello");

    match step(&mut machine, Event::Sent, t) {
        Action::Finish(binding) => {
            assert_eq!(binding.client_ip, CLIENT_IP);
            assert_eq!(binding.server_ip, GATEWAY_IP);
            assert_eq!(binding.server_mac, SERVER_MAC);
            assert_eq!(binding.upstream_ip, GATEWAY_IP);
            assert_eq!(binding.upstream_mac, GATEWAY_MAC);
            assert_eq!(binding.netmask, Ipv4Addr::new(255, 255, 255, 0));
            assert_eq!(binding.dns, DNS_IP);
            assert_eq!(binding.lease_time, Some(Duration::from_secs(3600)));
        }
        other => panic!("Expected Finish action, got {other:?}"),
    }

    // Done is terminal.
    assert!(matches!(step(&mut machine, Event::Timeout, t), Action::Finish(_)));
}

#[test]
fn test_reaffirm_timeout_resends() {
    let t0 = Instant::now();
    let (mut machine, _) = machine_requesting(t0);
    step(&mut machine, Event::Sent, t0);
    receive(&mut machine, &ack(XID), t0);
    step(&mut machine, Event::Resume, t0);
    step(&mut machine, Event::Sent, t0);
    receive(&mut machine, &arp_reply(CLIENT_IP), t0);
    step(&mut machine, Event::Resume, t0);
    assert!(matches!(step(&mut machine, Event::Sent, t0), Action::Listen(Some(_))));

    let resent = expect_send(step(&mut machine, Event::Timeout, t0 + Duration::from_secs(5)));
    assert_eq!(machine.state(), ProvisionState::Reaffirming);
    let msg = ip::udp_payload(ethernet::payload(resent.body()));
    assert_eq!(dhcp::secs(msg), 5);
}

#[test]
fn test_unexpected_events_are_ignored() {
    let t0 = Instant::now();
    let mut machine = Provisioner::with_xid(config(), XID);
    step(&mut machine, Event::Start, t0);
    assert!(matches!(step(&mut machine, Event::Resume, t0), Action::Listen(None)));
    assert!(matches!(step(&mut machine, Event::Timeout, t0), Action::Listen(None)));
    assert_eq!(machine.state(), ProvisionState::DiscoverSent);
}
