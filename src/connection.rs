use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::handshake;
use crate::receive_stream::ReceiveStream;
use crate::send_stream::SendStream;
use crate::transport::RelayTransport;

/// One established logical exchange with a peer, all state confined to this object so
///  that independent connections can run concurrently.
///
/// A connection owns a single window-begin cursor that successive send and receive
///  phases hand to each other: the sequence number a transfer ends on is the one the
///  next transfer begins with.
pub struct Connection {
    transport: RelayTransport,
    config: ConnectionConfig,
    peer_addr: Ipv4Addr,
    peer_port: u16,
    window_begin: u32,
}

impl Connection {
    /// Bind a fresh local socket and run the initiating side of the handshake against
    ///  `peer_addr:peer_port` (through the configured relay).
    pub async fn open(
        bind_addr: impl ToSocketAddrs,
        peer_addr: Ipv4Addr,
        peer_port: u16,
        config: ConnectionConfig,
    ) -> anyhow::Result<Connection> {
        config.validate()?;

        let socket = UdpSocket::bind(bind_addr)
            .await
            .context("binding local socket")?;
        let transport = RelayTransport::new(Arc::new(socket), config.relay_addr);

        handshake::connect(&transport, peer_addr, peer_port, &config).await?;

        Ok(Connection {
            transport,
            peer_addr,
            peer_port,
            window_begin: config.initial_sequence_number,
            config,
        })
    }

    /// Push `data` to the peer, running the full sender loop to completion (or to a
    ///  socket-level failure).
    pub async fn send(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut stream = SendStream::new(
            &self.transport,
            &self.config,
            self.peer_addr,
            self.peer_port,
        );
        self.window_begin = stream.send(data, self.window_begin).await?;
        Ok(())
    }

    /// Pull one transfer from the peer, running the full receiver loop until its FIN.
    pub async fn receive(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut stream = ReceiveStream::new(
            &self.transport,
            &self.config,
            self.peer_addr,
            self.peer_port,
        );
        let (data, next_begin) = stream.receive(self.window_begin).await?;
        self.window_begin = next_begin;
        Ok(data)
    }

    /// Tear down the session. The wire-level goodbye already happened with the FIN /
    ///  FIN-ACK exchange of the last transfer; this only releases the socket.
    pub fn close(self) {
        debug!("closing connection to {}:{}", self.peer_addr, self.peer_port);
    }

    pub fn peer_addr(&self) -> Ipv4Addr {
        self.peer_addr
    }

    pub fn peer_port(&self) -> u16 {
        self.peer_port
    }
}

/// The accepting side: waits for handshake initiations on a bound socket and turns them
///  into established `Connection`s.
///
/// Serves one peer at a time - multiplexing several simultaneous peers over the one
///  socket is explicitly out of scope.
pub struct Listener {
    socket: Arc<UdpSocket>,
    config: ConnectionConfig,
}

impl Listener {
    pub async fn bind(
        bind_addr: impl ToSocketAddrs,
        config: ConnectionConfig,
    ) -> anyhow::Result<Listener> {
        config.validate()?;

        let socket = UdpSocket::bind(bind_addr)
            .await
            .context("binding listening socket")?;
        debug!("listening on {}", socket.local_addr()?);

        Ok(Listener {
            socket: Arc::new(socket),
            config,
        })
    }

    pub fn local_port(&self) -> anyhow::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Wait for a SYN, answer it, and hand back the established connection. The
    ///  connection shares the listening socket, so accept the next peer only after the
    ///  previous exchange is done.
    pub async fn accept(&self) -> anyhow::Result<Connection> {
        let transport = RelayTransport::new(self.socket.clone(), self.config.relay_addr);

        let incoming = handshake::accept(&transport, &self.config).await?;

        Ok(Connection {
            transport,
            config: self.config.clone(),
            peer_addr: incoming.peer_addr,
            peer_port: incoming.peer_port,
            window_begin: incoming.initial_sequence_number,
        })
    }
}
