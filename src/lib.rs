//! A reliable, ordered, connection-oriented transport ("Selective-Repeat over UDP")
//! between two endpoints that communicate only through an unreliable, possibly
//! reordering datagram relay. It is a minimal TCP analogue: three-way handshake,
//! sliding-window ARQ with selective acknowledgment, FIN/FIN-ACK teardown.
//!
//! ## Design goals
//!
//! * Reliability and strict in-order delivery on top of a lossy, reordering hop
//!   * *packets* have sequence numbers, are buffered, acknowledged and re-sent;
//!     the application deals in whole byte payloads only
//!   * duplicate detection is by sequence-number presence in the window maps
//! * All physical traffic goes to a single relay address; the logical destination
//!   travels inside each packet, and the relay rewrites those fields to the physical
//!   sender before forwarding - that is how the peers learn each other's identity
//! * Selective acknowledgment with a deliberately mixed retransmission strategy:
//!   an ACK naming a missing packet triggers a resend of exactly that packet, while
//!   a timeout conservatively resends the whole outstanding window
//! * A fixed window of 4 slots in both directions; no congestion control, no
//!   encryption, no multiplexing of several peers over one socket
//! * One logical control flow per connection - the bounded datagram wait is the only
//!   suspension point, and all state is confined to the session object, so
//!   independent connections are fully isolated
//!
//! ## Packet layout
//!
//! One packet per UDP datagram, all numbers big-endian:
//! ```ascii
//! 0:  packet type: u8
//!     * 0 DATA, 1 SYN, 2 SYN_ACK, 3 ACK, 4 FIN, 5 FIN_ACK
//! 1:  sequence number: u32, meaningful modulo the per-connection sequence space
//! 5:  peer address: 4 bytes (IPv4)
//! 9:  peer port: u16
//! 11: payload length: u16
//! 13: payload: up to 1013 bytes for DATA, a short fixed token for control packets
//! ```
//!
//! ## Protocol flow
//!
//! The initiator sends SYN and resends it after every 2000ms of silence until a
//! SYN-ACK echoing the SYN's sequence number arrives; it then answers with an
//! unconfirmed ACK and is established. The acceptor answers any SYN with a derived
//! SYN-ACK and is established immediately.
//!
//! Data flows through [`SendStream`]/[`ReceiveStream`] driven by the [`Connection`]:
//! the sender chunks the payload at 1013 bytes, keeps up to 4 packets in flight and
//! finishes with a FIN; the receiver buffers out-of-order packets, reports gaps with
//! ACKs carrying its window-begin, and answers the FIN with a FIN-ACK. A sender that
//! never sees the FIN-ACK gives up after a bounded number of FIN retransmissions and
//! treats the transfer as complete anyway.

mod config;
mod connection;
mod handshake;
mod packet;
mod receive_stream;
mod send_stream;
mod sequence;
#[cfg(test)]
mod testing;
mod transport;

pub use crate::config::{ConnectionConfig, ACCEPTOR_SEQ_SPACE, INITIATOR_SEQ_SPACE};
pub use crate::connection::{Connection, Listener};
pub use crate::handshake::IncomingConnection;
pub use crate::packet::{Packet, PacketType};
pub use crate::receive_stream::ReceiveStream;
pub use crate::send_stream::SendStream;
pub use crate::sequence::{SeqSpace, WindowPosition};
pub use crate::transport::{DatagramSocket, RelayTransport};
