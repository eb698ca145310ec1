use super::{Link, LinkError};
use socket2::{Domain, Protocol, Socket, Type};
use std::{ffi::CString, io, io::Read as _, mem, os::fd::AsRawFd, time::Duration};
use tokio::{io::unix::AsyncFd, time};

/// How long `recv` waits for readiness before reporting "nothing yet".
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An `AF_PACKET` raw socket bound to one interface, receiving every protocol.
pub struct RawLink {
    interface: String,
    fd: AsyncFd<Socket>,
}

impl RawLink {
    /// Opens the link. Must be called inside a tokio runtime.
    pub fn open(interface: &str) -> Result<Self, LinkError> {
        let eth_p_all = (libc::ETH_P_ALL as u16).to_be();
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(i32::from(eth_p_all))),
        )
        .map_err(LinkError::CreateSocket)?;

        let name = CString::new(interface)
            .map_err(|_| LinkError::InterfaceNotFound(interface.to_string()))?;
        // Safe: `name` is a valid NUL-terminated string for the duration of the call.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(LinkError::InterfaceNotFound(interface.to_string()));
        }

        // Safe: sockaddr_ll is plain old data and all-zero is a valid value.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = eth_p_all;
        addr.sll_ifindex = ifindex as libc::c_int;

        // Safe: the fd is open and `addr` outlives the call with the length we pass.
        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(LinkError::Bind {
                interface: interface.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        socket
            .set_nonblocking(true)
            .map_err(LinkError::SetNonBlocking)?;
        // Safe: `socket` is owned by the AsyncFd and stays open until it is dropped.
        let fd = unsafe { AsyncFd::register(socket) }
            .map_err(|e| LinkError::Register(e.into_parts().1))?;

        tracing::info!("Opened raw link on '{}' (ifindex {})", interface, ifindex);
        Ok(Self {
            interface: interface.to_string(),
            fd,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Link for RawLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send(frame)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut guard = match time::timeout(POLL_INTERVAL, self.fd.readable()).await {
            Ok(guard) => guard?,
            Err(_elapsed) => return Ok(None),
        };
        match guard.try_io(|inner| {
            let mut socket = inner.get_ref();
            socket.read(buf)
        }) {
            Ok(Ok(len)) => Ok(Some(len)),
            Ok(Err(e)) => Err(e),
            Err(_would_block) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_unknown_interface_fails() {
        // Without CAP_NET_RAW socket creation fails first; either way no link is returned.
        let result = RawLink::open("linkboot-none0");
        assert!(matches!(
            result,
            Err(LinkError::CreateSocket(_)) | Err(LinkError::InterfaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_loopback_registers_with_runtime() {
        match RawLink::open("lo") {
            Ok(link) => assert_eq!(link.interface(), "lo"),
            Err(e) => assert!(matches!(e, LinkError::CreateSocket(_)), "unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_interface_name_with_nul_is_rejected() {
        let result = RawLink::open("eth\0zero");
        assert!(result.is_err());
    }
}
