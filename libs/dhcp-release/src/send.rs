//! Sending the built packet: a UDP socket bound to port 68, optionally
//! pinned to a device, transmitted to the DHCP server on port 67 from
//! inside the target network namespace.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use thiserror::Error;

use crate::netns::NetnsGuard;
use crate::packet::build_release_packet;

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;

/// Failures while releasing a lease.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// could not enter the target network namespace
    #[error("failed to enter network namespace {namespace:?}: {source}")]
    NamespaceEnter {
        /// the namespace name that was requested
        namespace: String,
        /// underlying errno
        #[source]
        source: nix::Error,
    },
    /// socket setup (create/bind/bind-to-device) failed
    #[error("socket setup failed: {0}")]
    Socket(#[source] std::io::Error),
    /// the datagram was only partially written
    #[error("partial send: {sent} of {total} bytes")]
    PartialSend {
        /// bytes actually written
        sent: usize,
        /// total datagram length
        total: usize,
    },
}

/// Send a pre-built DHCPRELEASE datagram to `server_ip`, optionally
/// bound to `from_ip` (default `0.0.0.0`) and `ifname` (no device
/// pinning if `None`). Does not touch network namespaces; callers that
/// need namespace isolation should wrap this with [`NetnsGuard::enter`]
/// or call [`release_dhcp_lease`].
pub fn send_release_packet(
    packet: &[u8],
    server_ip: Ipv4Addr,
    from_ip: Option<Ipv4Addr>,
    ifname: Option<&str>,
) -> Result<(), ReleaseError> {
    let socket = UdpSocket::bind(SocketAddrV4::new(
        from_ip.unwrap_or(Ipv4Addr::UNSPECIFIED),
        DHCP_CLIENT_PORT,
    ))
    .map_err(ReleaseError::Socket)?;

    if let Some(ifname) = ifname {
        bind_to_device(&socket, ifname).map_err(ReleaseError::Socket)?;
    }

    let sent = socket
        .send_to(packet, SocketAddrV4::new(server_ip, DHCP_SERVER_PORT))
        .map_err(ReleaseError::Socket)?;

    if sent != packet.len() {
        tracing::error!(sent, total = packet.len(), "partial DHCPRELEASE send");
        return Err(ReleaseError::PartialSend {
            sent,
            total: packet.len(),
        });
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &UdpSocket, ifname: &str) -> std::io::Result<()> {
    use std::ffi::OsStr;
    nix::sys::socket::setsockopt(
        socket,
        nix::sys::socket::sockopt::BindToDevice,
        &OsStr::new(ifname).to_os_string(),
    )
    .map_err(std::io::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &UdpSocket, _ifname: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "SO_BINDTODEVICE is only available on linux",
    ))
}

/// Build and send a DHCPRELEASE packet from inside `namespace` (default
/// `"auth"`), restoring the caller's namespace afterward regardless of
/// outcome.
#[allow(clippy::too_many_arguments)]
pub fn release_dhcp_lease(
    namespace: &str,
    client_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
    chaddr: [u8; 6],
    client_id: Option<&[u8]>,
    from_ip: Option<Ipv4Addr>,
    ifname: Option<&str>,
) -> Result<(), ReleaseError> {
    let packet = build_release_packet(client_ip, server_ip, chaddr, client_id);

    let _guard = NetnsGuard::enter(namespace).map_err(|source| ReleaseError::NamespaceEnter {
        namespace: namespace.to_owned(),
        source,
    })?;

    send_release_packet(&packet, server_ip, from_ip, ifname)
}
