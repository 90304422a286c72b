//! In-memory socket pair for protocol tests: two `DatagramSocket`s wired back-to-back
//! by channels, standing in for the relay hop. Lossless and ordered - tests that need
//! loss or reordering inject it by playing the peer side by hand.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::transport::DatagramSocket;

pub struct PairedSocket {
    local_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

pub fn socket_pair() -> (Arc<PairedSocket>, Arc<PairedSocket>) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();

    let a = PairedSocket {
        local_addr: SocketAddr::from(([127, 0, 0, 1], 10001)),
        outbound: tx_b,
        inbound: Mutex::new(rx_a),
    };
    let b = PairedSocket {
        local_addr: SocketAddr::from(([127, 0, 0, 1], 10002)),
        outbound: tx_a,
        inbound: Mutex::new(rx_b),
    };
    (Arc::new(a), Arc::new(b))
}

#[async_trait]
impl DatagramSocket for PairedSocket {
    async fn send_datagram(&self, buf: &[u8], _to: SocketAddr) -> anyhow::Result<()> {
        // everything goes "to the relay", which in the pair is simply the other end
        if self.outbound.send(buf.to_vec()).is_err() {
            bail!("peer socket is gone");
        }
        Ok(())
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let datagram = match self.inbound.lock().await.recv().await {
            Some(datagram) => datagram,
            None => bail!("peer socket is gone"),
        };
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok(datagram.len())
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
