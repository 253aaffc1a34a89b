//! UDP broadcast transport for outlets running as separate processes.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use tracing::{debug, warn};

use super::snapshot::{NodeId, Snapshot, WIRE_LEN};
use super::transport::Transport;

/// Non-blocking UDP socket that broadcasts fixed-size snapshot datagrams.
///
/// Every outlet binds the same port. Unicast is addressed by convention to
/// `base_ip + id` on that port, which suits a flat lab subnet.
#[derive(Debug)]
pub struct UdpTransport {
    id: NodeId,
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    base_ip: Ipv4Addr,
    port: u16,
}

impl UdpTransport {
    /// Binds `0.0.0.0:port` in broadcast, non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding or configuring the socket fails.
    pub fn bind(id: NodeId, port: u16, base_ip: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            id,
            socket,
            broadcast_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)),
            base_ip,
            port,
        })
    }

    fn send_to(&self, addr: SocketAddr, snapshot: &Snapshot) {
        let payload = match snapshot.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "snapshot not sent");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&payload, addr) {
            warn!(%addr, error = %e, "udp send failed");
        }
    }
}

impl Transport for UdpTransport {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn broadcast(&mut self, snapshot: &Snapshot) {
        self.send_to(self.broadcast_addr, snapshot);
    }

    fn send(&mut self, to: NodeId, snapshot: &Snapshot) {
        let ip = Ipv4Addr::from(u32::from(self.base_ip).wrapping_add(u32::from(to.0)));
        self.send_to(SocketAddr::V4(SocketAddrV4::new(ip, self.port)), snapshot);
    }

    fn try_receive(&mut self) -> Option<Snapshot> {
        let mut buf = [0u8; WIRE_LEN + 1];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => match Snapshot::decode(&buf[..len]) {
                    // Our own broadcasts loop back; they are not peer data.
                    Ok(snapshot) if snapshot.sender == self.id => continue,
                    Ok(snapshot) => return Some(snapshot),
                    Err(e) => debug!(%from, error = %e, "ignoring foreign datagram"),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    warn!(error = %e, "udp receive failed");
                    return None;
                }
            }
        }
    }
}
