use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::packet::{Packet, PacketType};
use crate::transport::RelayTransport;

/// The send side of the Selective-Repeat ARQ engine: owns the outbound sliding window,
///  the retransmission policy and the FIN teardown. One instance drives one payload to
///  completion and is then discarded; the window-begin cursor is handed back to the
///  session.
///
/// Acknowledgment is selective, retransmission is mixed on purpose: an ACK naming a
///  still-pending packet pinpoints the one packet the receiver is missing and only that
///  packet is resent, while a timeout conservatively resends the whole outstanding
///  window to cover silent multi-loss. The two paths are distinct and must stay so.
pub struct SendStream<'a> {
    transport: &'a RelayTransport,
    config: &'a ConnectionConfig,
    peer_addr: Ipv4Addr,
    peer_port: u16,

    /// sent but unacknowledged packets, keyed by sequence number; also holds the FIN
    ///  once it is sent
    pending: FxHashMap<u32, Packet>,
    /// index of the next payload chunk that has not been placed in the window yet
    next_chunk: usize,
    fin_sent: bool,
    fin_retries_left: u32,
}

impl<'a> SendStream<'a> {
    pub fn new(
        transport: &'a RelayTransport,
        config: &'a ConnectionConfig,
        peer_addr: Ipv4Addr,
        peer_port: u16,
    ) -> SendStream<'a> {
        SendStream {
            transport,
            config,
            peer_addr,
            peer_port,
            pending: FxHashMap::default(),
            next_chunk: 0,
            fin_sent: false,
            fin_retries_left: config.fin_retry_limit,
        }
    }

    /// Push `data` to the peer, starting the window at `window_begin`. Returns the
    ///  sequence number the session continues with after teardown.
    pub async fn send(&mut self, data: &[u8], window_begin: u32) -> anyhow::Result<u32> {
        let chunks: Vec<&[u8]> = data.chunks(Packet::MAX_PAYLOAD).collect();
        let space = self.config.sequence_space;
        let mut window_begin = window_begin;

        debug!(
            "sending {} bytes as {} chunks to {}:{}, window begins at #{}",
            data.len(),
            chunks.len(),
            self.peer_addr,
            self.peer_port,
            window_begin
        );

        if chunks.is_empty() {
            // a zero-length payload has no DATA packets; go straight to teardown
            self.send_fin(window_begin).await?;
        }

        loop {
            self.fill_window(&chunks, window_begin).await?;

            let Some(packet) = self.transport.await_packet(self.config.ack_timeout).await? else {
                if self.fin_sent {
                    if let Some(next) = self.on_fin_timeout(window_begin).await? {
                        return Ok(next);
                    }
                } else {
                    self.resend_window(window_begin).await?;
                }
                continue;
            };

            match packet.packet_type {
                PacketType::Ack if self.fin_sent => {
                    // the receiver is still ACKing data, so the FIN got lost
                    self.resend(window_begin).await?;
                }
                PacketType::Ack => {
                    window_begin = self
                        .on_ack(packet.sequence_number, window_begin, chunks.len())
                        .await?;
                }
                PacketType::FinAck if self.fin_sent => {
                    debug!("received {}, transfer to {}:{} complete", packet, self.peer_addr, self.peer_port);
                    return Ok(space.next(window_begin));
                }
                _ => {
                    trace!("ignoring {} in send loop", packet);
                }
            }
        }
    }

    /// Build, register and transmit DATA packets for every free window slot while
    ///  unsent chunks remain.
    async fn fill_window(&mut self, chunks: &[&[u8]], window_begin: u32) -> anyhow::Result<()> {
        if self.fin_sent {
            return Ok(());
        }
        let space = self.config.sequence_space;

        for offset in 0..self.config.window_size {
            let seq = space.add(window_begin, offset);
            if self.pending.contains_key(&seq) {
                continue;
            }
            let Some(&chunk) = chunks.get(self.next_chunk) else {
                break;
            };
            self.next_chunk += 1;

            let packet = Packet::data(seq, self.peer_addr, self.peer_port, chunk.to_vec());
            self.transport.send_packet(&packet).await?;
            trace!("sent {}", packet);
            self.pending.insert(seq, packet);
        }
        Ok(())
    }

    /// Selective-ACK handling before the FIN is out.
    ///
    /// An acknowledged sequence number that is still pending is a gap report: the
    ///  receiver names the packet it is missing. Resend exactly that packet and treat
    ///  everything below it as implicitly acknowledged. An acknowledged number right
    ///  after the outstanding run is a clean slide: all of it arrived. Anything else is
    ///  a stale ACK and ignored.
    async fn on_ack(
        &mut self,
        acked: u32,
        window_begin: u32,
        chunk_count: usize,
    ) -> anyhow::Result<u32> {
        let space = self.config.sequence_space;

        if self.pending.contains_key(&acked) {
            self.resend(acked).await?;

            let implicitly_acked = space.offset(window_begin, acked);
            let mut begin = window_begin;
            for _ in 0..implicitly_acked {
                self.pending.remove(&begin);
                begin = space.next(begin);
            }
            if implicitly_acked > 0 {
                trace!("window slides to #{} past {} implicitly acknowledged packets", begin, implicitly_acked);
            }
            return Ok(begin);
        }

        if acked == space.add(window_begin, self.pending.len() as u32) {
            trace!("clean slide: everything up to #{} acknowledged", acked);
            self.pending.clear();
            if self.next_chunk == chunk_count {
                self.send_fin(acked).await?;
            }
            return Ok(acked);
        }

        trace!("stale ACK #{} at window #{}, ignoring", acked, window_begin);
        Ok(window_begin)
    }

    /// A timeout before the FIN is out conservatively resends the entire outstanding
    ///  window - the selective path cannot help when no feedback arrives at all.
    async fn resend_window(&mut self, window_begin: u32) -> anyhow::Result<()> {
        let space = self.config.sequence_space;
        debug!("timeout: resending the outstanding window starting at #{}", window_begin);

        for offset in 0..self.config.window_size {
            let seq = space.add(window_begin, offset);
            if self.pending.contains_key(&seq) {
                self.resend(seq).await?;
            }
        }
        Ok(())
    }

    /// A timeout after the FIN is out burns one retry; once the budget is exhausted the
    ///  transfer is treated as successfully finished, exactly as if the FIN-ACK had
    ///  arrived. Returns the session's next sequence number in that case.
    async fn on_fin_timeout(&mut self, window_begin: u32) -> anyhow::Result<Option<u32>> {
        match self.fin_retries_left.checked_sub(1) {
            Some(remaining) => {
                self.fin_retries_left = remaining;
                debug!("timeout waiting for FIN-ACK, resending FIN ({} retries left)", remaining);
                self.resend(window_begin).await?;
                Ok(None)
            }
            None => {
                debug!("giving up on FIN-ACK from {}:{}, treating transfer as complete", self.peer_addr, self.peer_port);
                Ok(Some(self.config.sequence_space.next(window_begin)))
            }
        }
    }

    async fn resend(&self, seq: u32) -> anyhow::Result<()> {
        if let Some(packet) = self.pending.get(&seq) {
            self.transport.send_packet(packet).await?;
            trace!("resent {}", packet);
        }
        Ok(())
    }

    async fn send_fin(&mut self, seq: u32) -> anyhow::Result<()> {
        let fin = Packet::control(PacketType::Fin, seq, self.peer_addr, self.peer_port);
        self.transport.send_packet(&fin).await?;
        debug!("sent {}", fin);
        self.pending.insert(seq, fin);
        self.fin_sent = true;
        Ok(())
    }
}
