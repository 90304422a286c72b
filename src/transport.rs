use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{trace, warn};

use crate::packet::Packet;

/// Abstraction over a bound, connectionless socket, introduced to facilitate mocking the
///  I/O part away for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    async fn send_datagram(&self, buf: &[u8], to: SocketAddr) -> anyhow::Result<()>;

    /// Wait for the next inbound datagram, writing it into `buf` and returning its length.
    async fn recv_datagram(&self, buf: &mut [u8]) -> anyhow::Result<usize>;

    fn local_addr(&self) -> anyhow::Result<SocketAddr>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_datagram(&self, buf: &[u8], to: SocketAddr) -> anyhow::Result<()> {
        self.send_to(buf, to)
            .await
            .with_context(|| format!("sending datagram to {}", to))?;
        Ok(())
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let (len, _from) = self.recv_from(buf).await.context("receiving datagram")?;
        Ok(len)
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(UdpSocket::local_addr(self)?)
    }
}

/// One endpoint's view of the network: a local socket that talks exclusively to the
///  fixed relay address. This is the sole suspension point in the system - every
///  higher component blocks only in `await_packet`.
#[derive(Clone)]
pub struct RelayTransport {
    socket: Arc<dyn DatagramSocket>,
    relay_addr: SocketAddr,
}

impl RelayTransport {
    pub fn new(socket: Arc<dyn DatagramSocket>, relay_addr: SocketAddr) -> RelayTransport {
        RelayTransport { socket, relay_addr }
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serialize and fire at the relay. No delivery guarantee - reliability is the
    ///  callers' business.
    pub async fn send_packet(&self, packet: &Packet) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(Packet::MAX_PACKET_LEN);
        packet.ser(&mut buf);

        trace!("sending {} via relay {}", packet, self.relay_addr);
        self.socket.send_datagram(&buf, self.relay_addr).await
    }

    /// Wait up to `timeout` for an inbound packet.
    ///
    /// Returns `Ok(None)` on timeout, and also for a datagram that fails to parse -
    ///  a malformed packet is indistinguishable from "nothing usable arrived" for the
    ///  caller's poll cycle. `Err` means a socket-level failure that is fatal to the
    ///  current operation.
    pub async fn await_packet(&self, timeout: Duration) -> anyhow::Result<Option<Packet>> {
        let mut buf = [0u8; Packet::MAX_PACKET_LEN];

        let len = match time::timeout(timeout, self.socket.recv_datagram(&mut buf)).await {
            Err(_elapsed) => return Ok(None),
            Ok(result) => result?,
        };

        match Packet::deser(&mut &buf[..len]) {
            Ok(packet) => {
                trace!("received {}", packet);
                Ok(Some(packet))
            }
            Err(e) => {
                warn!("dropping unparseable datagram ({} bytes): {:#}", len, e);
                Ok(None)
            }
        }
    }
}
