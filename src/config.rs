use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::sequence::SeqSpace;

/// Sequence space size used by the connection-initiating role.
pub const INITIATOR_SEQ_SPACE: u32 = 2_324_234;

/// Sequence space size used by the accepting role.
///
/// NB: The two roles have historically used different space sizes; this looks like an
///  accident rather than a protocol feature, but both sides are self-consistent, so the
///  values are kept as per-role configuration instead of being unified.
pub const ACCEPTOR_SEQ_SPACE: u32 = u32::MAX;

/// All tunables of one connection. Created per role and then shared read-only by the
///  handshake, sender and receiver of that connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The one address all physical traffic is sent to, regardless of the logical peer.
    pub relay_addr: SocketAddr,

    pub sequence_space: SeqSpace,

    /// Window slots, both directions.
    pub window_size: u32,

    /// Sequence number of the initiator's SYN, doubling as the first data window-begin.
    pub initial_sequence_number: u32,

    /// Wait budget per handshake and sender poll cycle.
    pub handshake_timeout: Duration,
    pub ack_timeout: Duration,

    /// Wait budget per receiver poll cycle.
    pub receive_timeout: Duration,

    /// How often a sent FIN is retransmitted on timeout before the sender gives up.
    /// Giving up is treated as successful teardown.
    pub fin_retry_limit: u32,

    /// `None` (the production default) retries the handshake SYN forever. Tests inject
    ///  a bound to stay deterministic.
    pub max_handshake_attempts: Option<u32>,

    /// `None` (the production default) lets the receiver wait forever for the first
    ///  packet of a connection. Tests inject a bound to stay deterministic.
    pub max_idle_polls: Option<u32>,
}

impl ConnectionConfig {
    pub fn initiator(relay_addr: SocketAddr) -> ConnectionConfig {
        ConnectionConfig {
            relay_addr,
            sequence_space: SeqSpace::new(INITIATOR_SEQ_SPACE),
            ..Self::common(relay_addr)
        }
    }

    pub fn acceptor(relay_addr: SocketAddr) -> ConnectionConfig {
        ConnectionConfig {
            relay_addr,
            sequence_space: SeqSpace::new(ACCEPTOR_SEQ_SPACE),
            ..Self::common(relay_addr)
        }
    }

    fn common(relay_addr: SocketAddr) -> ConnectionConfig {
        ConnectionConfig {
            relay_addr,
            sequence_space: SeqSpace::new(ACCEPTOR_SEQ_SPACE),
            window_size: 4,
            initial_sequence_number: 1,
            handshake_timeout: Duration::from_millis(2000),
            ack_timeout: Duration::from_millis(2000),
            receive_timeout: Duration::from_millis(1000),
            fin_retry_limit: 3,
            max_handshake_attempts: None,
            max_idle_polls: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_size == 0 {
            bail!("window size must be at least 1");
        }
        if self.window_size as u64 * 2 > self.sequence_space.size() as u64 {
            // with a bigger window, old and new incarnations of a sequence number
            //  become indistinguishable
            bail!(
                "window size {} does not fit twice into sequence space {}",
                self.window_size,
                self.sequence_space.size()
            );
        }
        if self.initial_sequence_number >= self.sequence_space.size() {
            bail!(
                "initial sequence number {} is outside the sequence space {}",
                self.initial_sequence_number,
                self.sequence_space.size()
            );
        }
        Ok(())
    }
}
