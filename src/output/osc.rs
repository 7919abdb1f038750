//! OSC over UDP publisher.

use crate::output::{PublishError, Publisher};
use rosc::{OscMessage, OscPacket, OscType, encoder};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

/// Sends each heart rate as an OSC message with one `int32` argument.
#[derive(Debug)]
pub struct OscPublisher {
    socket: UdpSocket,
}

impl OscPublisher {
    /// Resolve `host:port` and connect a UDP socket to it.
    ///
    /// `host` may be an IP address or a hostname. The local socket is bound to
    /// an ephemeral port of the destination's address family.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let destination = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {host}"),
            )
        })?;

        let local: SocketAddr = match destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(destination)?;

        Ok(Self { socket })
    }

    /// Address messages are sent to.
    pub fn destination(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

fn heart_rate_packet(path: &str, heart_rate: u16) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: vec![OscType::Int(i32::from(heart_rate))],
    })
}

impl Publisher for OscPublisher {
    fn publish(&self, path: &str, heart_rate: u16) -> Result<(), PublishError> {
        let bytes = encoder::encode(&heart_rate_packet(path, heart_rate))
            .map_err(|e| PublishError::Encode(format!("{e:?}")))?;
        self.socket.send(&bytes)?;
        Ok(())
    }
}
