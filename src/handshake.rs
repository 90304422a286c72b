use std::net::Ipv4Addr;

use anyhow::bail;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::packet::{Packet, PacketType};
use crate::transport::RelayTransport;

/// What the accepting side learns from a SYN: the initiator's identity (as rewritten
///  into the packet by the relay) and the sequence number that becomes the initial
///  receive window-begin.
#[derive(Clone, Debug)]
pub struct IncomingConnection {
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
    pub initial_sequence_number: u32,
}

/// Drive the initiating side of the three-way handshake: INIT -> SYN_SENT -> ESTABLISHED.
///
/// The SYN is resent unconditionally after every timeout, with no backoff. A response is
///  accepted only if it is a SYN-ACK echoing the SYN's sequence number; everything else
///  is ignored and the SYN resent. The final ACK is fire-and-forget - the acceptor does
///  not confirm it.
pub async fn connect(
    transport: &RelayTransport,
    peer_addr: Ipv4Addr,
    peer_port: u16,
    config: &ConnectionConfig,
) -> anyhow::Result<()> {
    let initial_seq = config.initial_sequence_number;
    let syn = Packet::control(PacketType::Syn, initial_seq, peer_addr, peer_port);

    let mut attempts = 0u32;
    loop {
        transport.send_packet(&syn).await?;
        debug!("sent {} to {}:{}", syn, peer_addr, peer_port);

        match transport.await_packet(config.handshake_timeout).await? {
            Some(response)
                if response.packet_type == PacketType::SynAck
                    && response.sequence_number == initial_seq =>
            {
                let ack = Packet::control(PacketType::Ack, initial_seq, peer_addr, peer_port);
                transport.send_packet(&ack).await?;
                debug!("handshake with {}:{} established", peer_addr, peer_port);
                return Ok(());
            }
            Some(response) => {
                trace!("ignoring {} while waiting for SYN-ACK #{}", response, initial_seq);
            }
            None => {
                debug!("timed out waiting for SYN-ACK #{}, resending SYN", initial_seq);
            }
        }

        attempts += 1;
        if let Some(max) = config.max_handshake_attempts {
            if attempts >= max {
                bail!(
                    "handshake with {}:{} failed: no matching SYN-ACK after {} attempts",
                    peer_addr,
                    peer_port,
                    attempts
                );
            }
        }
    }
}

/// Drive the accepting side: LISTENING -> ESTABLISHED.
///
/// Polls until a SYN arrives, records the peer's identity and initial sequence number,
///  and answers with a SYN-ACK derived from the SYN. Any other packet type observed
///  while listening is ignored. The acceptor is established as soon as the SYN-ACK is
///  on the wire - the initiator's closing ACK is not awaited here, it surfaces as an
///  ignored packet in the subsequent receive loop.
pub async fn accept(
    transport: &RelayTransport,
    config: &ConnectionConfig,
) -> anyhow::Result<IncomingConnection> {
    loop {
        let Some(packet) = transport.await_packet(config.handshake_timeout).await? else {
            continue;
        };

        if packet.packet_type != PacketType::Syn {
            trace!("ignoring {} while listening", packet);
            continue;
        }

        debug!(
            "received connection request from {}:{} with initial sequence number {}",
            packet.peer_addr, packet.peer_port, packet.sequence_number
        );

        let syn_ack = packet.derived(PacketType::SynAck, packet.sequence_number);
        transport.send_packet(&syn_ack).await?;

        return Ok(IncomingConnection {
            peer_addr: packet.peer_addr,
            peer_port: packet.peer_port,
            initial_sequence_number: packet.sequence_number,
        });
    }
}
