use std::mem;
use std::net::Ipv4Addr;

use anyhow::bail;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::packet::{Packet, PacketType};
use crate::sequence::WindowPosition;
use crate::transport::RelayTransport;

/// The receive side of the Selective-Repeat ARQ engine: owns the receive window, the
///  out-of-order buffer, selective ACK generation and the FIN-ACK response.
///
/// The selective signal is an ACK carrying the current window-begin - not the arrived
///  packet's own number - telling the sender exactly which slot is still missing.
pub struct ReceiveStream<'a> {
    transport: &'a RelayTransport,
    config: &'a ConnectionConfig,
    peer_addr: Ipv4Addr,
    peer_port: u16,

    /// out-of-order packets waiting for their predecessors, keyed by sequence number
    buffered: FxHashMap<u32, Packet>,
    /// payloads in original order, accumulated until the FIN arrives
    assembled: Vec<u8>,
    /// whether any datagram at all arrived on this connection - handshake leftovers
    ///  count, matching the keep-alive behavior of the original system
    anything_received: bool,
}

impl<'a> ReceiveStream<'a> {
    pub fn new(
        transport: &'a RelayTransport,
        config: &'a ConnectionConfig,
        peer_addr: Ipv4Addr,
        peer_port: u16,
    ) -> ReceiveStream<'a> {
        ReceiveStream {
            transport,
            config,
            peer_addr,
            peer_port,
            buffered: FxHashMap::default(),
            assembled: Vec::new(),
            anything_received: false,
        }
    }

    /// Pull one transfer from the peer, starting the window at `window_begin`. Returns
    ///  the reassembled payload in original order and the window-begin the session
    ///  continues with.
    pub async fn receive(&mut self, window_begin: u32) -> anyhow::Result<(Vec<u8>, u32)> {
        let space = self.config.sequence_space;
        let mut window_begin = window_begin;
        let mut idle_polls = 0u32;

        debug!(
            "receiving from {}:{}, window begins at #{}",
            self.peer_addr, self.peer_port, window_begin
        );

        loop {
            let Some(packet) = self
                .transport
                .await_packet(self.config.receive_timeout)
                .await?
            else {
                if self.anything_received {
                    // keep-alive nudge so a stalled sender learns where the window is
                    self.send_window_ack(window_begin).await?;
                } else if let Some(max) = self.config.max_idle_polls {
                    idle_polls += 1;
                    if idle_polls >= max {
                        bail!(
                            "nothing received from {}:{} after {} polls",
                            self.peer_addr,
                            self.peer_port,
                            idle_polls
                        );
                    }
                }
                continue;
            };
            self.anything_received = true;

            match packet.packet_type {
                PacketType::Fin => {
                    let fin_ack = packet.derived(PacketType::FinAck, window_begin);
                    self.transport.send_packet(&fin_ack).await?;
                    debug!("received {}, sent {}", packet, fin_ack);

                    if !self.buffered.is_empty() {
                        // undelivered out-of-order packets are dropped on FIN
                        debug!("discarding {} buffered packets on teardown", self.buffered.len());
                    }
                    return Ok((mem::take(&mut self.assembled), space.next(window_begin)));
                }
                PacketType::Data => {
                    window_begin = self.on_data(packet, window_begin).await?;
                }
                _ => {
                    // handshake packets arriving mid-transfer are no-ops
                    trace!("ignoring {} in receive loop", packet);
                }
            }
        }
    }

    /// Classify an arrived DATA packet against the window and act on it: deliver and
    ///  drain at window-begin, buffer-and-ACK inside the window, drop outside.
    async fn on_data(&mut self, packet: Packet, window_begin: u32) -> anyhow::Result<u32> {
        let space = self.config.sequence_space;
        let window_size = self.config.window_size;

        match space.classify(window_begin, window_size, packet.sequence_number) {
            WindowPosition::Begin => {
                trace!("in-order {}, delivering", packet);
                self.assembled.extend_from_slice(&packet.payload);
                let mut begin = space.next(window_begin);

                // drain the run of buffered packets that is now contiguous
                for _ in 1..window_size {
                    let Some(buffered) = self.buffered.remove(&begin) else {
                        break;
                    };
                    trace!("draining buffered #{}", begin);
                    self.assembled.extend_from_slice(&buffered.payload);
                    begin = space.next(begin);
                }
                Ok(begin)
            }
            WindowPosition::Inside => {
                if self.buffered.contains_key(&packet.sequence_number) {
                    trace!("duplicate {}, ignoring", packet);
                    return Ok(window_begin);
                }
                trace!("out-of-order {}, buffering and reporting gap at #{}", packet, window_begin);
                let ack = packet.derived(PacketType::Ack, window_begin);
                self.buffered.insert(packet.sequence_number, packet);
                self.transport.send_packet(&ack).await?;
                Ok(window_begin)
            }
            WindowPosition::Outside => {
                trace!("{} is outside the window at #{}, discarding", packet, window_begin);
                Ok(window_begin)
            }
        }
    }

    async fn send_window_ack(&self, window_begin: u32) -> anyhow::Result<()> {
        let ack = Packet::control(PacketType::Ack, window_begin, self.peer_addr, self.peer_port);
        self.transport.send_packet(&ack).await?;
        trace!("sent keep-alive {}", ack);
        Ok(())
    }
}
