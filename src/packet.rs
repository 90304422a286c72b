use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, BytesMut};
use num_enum::TryFromPrimitive;

/// The kind of a packet on the wire. The numeric codes are part of the wire format.
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    Syn = 1,
    SynAck = 2,
    Ack = 3,
    Fin = 4,
    FinAck = 5,
}

impl PacketType {
    /// Control packets carry a short fixed token as payload. The spellings are part of the
    ///  wire dialect and are deliberately not uniform.
    pub fn token(&self) -> &'static [u8] {
        match self {
            PacketType::Data => b"",
            PacketType::Syn => b"SYN",
            PacketType::SynAck => b"SYN-ACK",
            PacketType::Ack => b"ACK",
            PacketType::Fin => b"FIN",
            PacketType::FinAck => b"FIN_ACK",
        }
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single datagram-sized frame, the only entity on the wire.
///
/// All traffic goes to one relay address, so the logical destination travels inside the
///  packet as `peer_addr` / `peer_port`. The relay forwards based on these fields and
///  rewrites them to the physical sender's address, which is how each side learns the
///  identity of its counterpart.
///
/// Wire layout, all big-endian:
/// ```ascii
/// 0:  packet type: u8 (codes as in PacketType)
/// 1:  sequence number: u32
/// 5:  peer address: 4 bytes (IPv4)
/// 9:  peer port: u16
/// 11: payload length: u16
/// 13: payload
/// ```
///
/// A packet is immutable once constructed; responses are built with `derived`, keeping
///  the peer identity of the packet that triggered them.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Packet {
    pub packet_type: PacketType,
    pub sequence_number: u32,
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub const HEADER_LEN: usize = 13;
    pub const MAX_PAYLOAD: usize = 1013;
    pub const MAX_PACKET_LEN: usize = Self::HEADER_LEN + Self::MAX_PAYLOAD;

    pub fn data(
        sequence_number: u32,
        peer_addr: Ipv4Addr,
        peer_port: u16,
        payload: Vec<u8>,
    ) -> Packet {
        debug_assert!(payload.len() <= Self::MAX_PAYLOAD);
        Packet {
            packet_type: PacketType::Data,
            sequence_number,
            peer_addr,
            peer_port,
            payload,
        }
    }

    /// Build a control packet with the fixed token payload for its type.
    pub fn control(
        packet_type: PacketType,
        sequence_number: u32,
        peer_addr: Ipv4Addr,
        peer_port: u16,
    ) -> Packet {
        Packet {
            packet_type,
            sequence_number,
            peer_addr,
            peer_port,
            payload: packet_type.token().to_vec(),
        }
    }

    /// Derive a response from a just-received packet: new type and sequence number, same
    ///  peer identity, token payload for the new type.
    pub fn derived(&self, packet_type: PacketType, sequence_number: u32) -> Packet {
        Packet {
            packet_type,
            sequence_number,
            peer_addr: self.peer_addr,
            peer_port: self.peer_port,
            payload: packet_type.token().to_vec(),
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        debug_assert!(self.payload.len() <= Self::MAX_PAYLOAD);

        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.sequence_number);
        buf.put_slice(&self.peer_addr.octets());
        buf.put_u16(self.peer_port);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Packet> {
        let raw_type = buf.try_get_u8()?;
        let packet_type = PacketType::try_from_primitive(raw_type)
            .map_err(|_| anyhow!("unknown packet type code {}", raw_type))?;

        let sequence_number = buf.try_get_u32()?;
        let peer_addr = Ipv4Addr::from(buf.try_get_u32()?);
        let peer_port = buf.try_get_u16()?;

        let payload_len = buf.try_get_u16()? as usize;
        if payload_len > Self::MAX_PAYLOAD {
            bail!(
                "payload length {} exceeds the maximum of {}",
                payload_len,
                Self::MAX_PAYLOAD
            );
        }
        if buf.remaining() < payload_len {
            bail!(
                "truncated packet: payload length {} but only {} bytes left",
                payload_len,
                buf.remaining()
            );
        }
        let mut payload = vec![0u8; payload_len];
        buf.copy_to_slice(&mut payload);

        Ok(Packet {
            packet_type,
            sequence_number,
            peer_addr,
            peer_port,
            payload,
        })
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} -> {}:{} ({} bytes)",
            self.packet_type,
            self.sequence_number,
            self.peer_addr,
            self.peer_port,
            self.payload.len()
        )
    }
}
