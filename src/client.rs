//! Provisioning client driver
//!
//! This module contains the pieces that connect the sans-IO state machine
//! to a [`Link`]:
//! - the actions the state machine asks for and the events it reacts to
//! - the [`Binding`] produced by a completed handshake
//! - [`ProvisioningClient`], which executes actions against the link

use crate::{
    codec::{Frame, MacAddr},
    config::ClientConfig,
    error::ProvisionError,
    network::{Link, MAX_FRAME_LEN},
    provision::Provisioner,
};
use std::{
    net::Ipv4Addr,
    time::{Duration, Instant},
};
use tokio::time;

/// Actions returned by the state machine, executed by the client driver.
#[derive(Debug)]
pub enum Action {
    /// Transmit the frame body, then report [`Event::Sent`].
    Send(Frame),
    /// Poll the link until a frame arrives or the deadline passes.
    /// `None` waits indefinitely.
    Listen(Option<Instant>),
    /// Wait without receiving, then report [`Event::Resume`].
    Sleep(Duration),
    /// Report [`Event::Resume`] immediately.
    Proceed,
    /// The handshake is complete.
    Finish(Binding),
}

/// Events the state machine reacts to.
#[derive(Debug)]
pub enum Event<'a> {
    Start,
    Sent,
    FrameReceived(&'a [u8]),
    Timeout,
    Resume,
}

/// Everything learned during provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub client_ip: Ipv4Addr,
    /// DHCP server identifier (option 54).
    pub server_ip: Ipv4Addr,
    pub server_mac: MacAddr,
    pub upstream_ip: Ipv4Addr,
    pub upstream_mac: MacAddr,
    pub netmask: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub lease_time: Option<Duration>,
}

/// Common interface of provisioning state machines.
pub trait ProvisioningStateMachine {
    /// Handles one event observed at `now` and returns the next action.
    fn handle_event(&mut self, event: Event, now: Instant) -> Result<Action, ProvisionError>;
    /// Name of the current state, for logging.
    fn state_name(&self) -> &'static str;
}

pub struct ProvisioningClient<L: Link> {
    link: L,
    state_machine: Box<dyn ProvisioningStateMachine + Send>,
}

impl<L: Link> ProvisioningClient<L> {
    pub fn new(config: ClientConfig, link: L) -> Self {
        Self::with_state_machine(link, Box::new(Provisioner::new(config)))
    }

    pub fn with_state_machine(
        link: L,
        state_machine: Box<dyn ProvisioningStateMachine + Send>,
    ) -> Self {
        Self {
            link,
            state_machine,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn state_name(&self) -> &'static str {
        self.state_machine.state_name()
    }

    /// Reads the runtime clock, which tests can pause and advance.
    fn now() -> Instant {
        time::Instant::now().into_std()
    }

    /// Polls the link until a frame arrives or `deadline` passes.
    async fn listen(&mut self, deadline: Option<Instant>) -> Result<Action, ProvisionError> {
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        loop {
            if deadline.is_some_and(|deadline| Self::now() >= deadline) {
                tracing::debug!("Listen deadline passed");
                return self.state_machine.handle_event(Event::Timeout, Self::now());
            }
            if let Some(len) = self.link.recv(&mut buf).await? {
                tracing::trace!("Received {} byte frame", len);
                return self
                    .state_machine
                    .handle_event(Event::FrameReceived(&buf[..len]), Self::now());
            }
        }
    }

    pub async fn run(&mut self) -> Result<Binding, ProvisionError> {
        let mut next_action = self.state_machine.handle_event(Event::Start, Self::now())?;

        loop {
            tracing::debug!(
                "State: {}, Action: {:?}",
                self.state_machine.state_name(),
                next_action
            );

            next_action = match next_action {
                Action::Send(frame) => {
                    let sent = self.link.send(frame.body()).await?;
                    tracing::debug!("Sent {} bytes", sent);
                    self.state_machine.handle_event(Event::Sent, Self::now())?
                }
                Action::Listen(deadline) => self.listen(deadline).await?,
                Action::Sleep(duration) => {
                    time::sleep(duration).await;
                    self.state_machine.handle_event(Event::Resume, Self::now())?
                }
                Action::Proceed => self.state_machine.handle_event(Event::Resume, Self::now())?,
                Action::Finish(binding) => {
                    tracing::info!("Provisioning complete: {:?}", binding);
                    return Ok(binding);
                }
            };
        }
    }
}
