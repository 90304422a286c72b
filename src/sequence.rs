use std::fmt::{Display, Formatter};

/// Where a sequence number falls relative to the receive window.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WindowPosition {
    /// exactly at window-begin, i.e. the next in-order packet
    Begin,
    /// inside the window but not at its begin, i.e. out of order but in range
    Inside,
    /// outside the window entirely
    Outside,
}

/// The circular sequence number space of one connection.
///
/// All sequence numbers are meaningful modulo the space size only, and the window may
///  straddle the wraparound point. Both sides of a connection may be configured with
///  *different* space sizes - the cases where that matters never arise as long as each
///  side applies its own space consistently to its own window.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SeqSpace {
    size: u32,
}

impl SeqSpace {
    pub fn new(size: u32) -> SeqSpace {
        debug_assert!(size > 0);
        SeqSpace { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn add(&self, seq: u32, delta: u32) -> u32 {
        ((seq as u64 + delta as u64) % self.size as u64) as u32
    }

    pub fn next(&self, seq: u32) -> u32 {
        self.add(seq, 1)
    }

    /// The number of steps from `from` up to (excluding) `to`, walking forward through
    ///  the space.
    pub fn offset(&self, from: u32, to: u32) -> u32 {
        if to >= from {
            to - from
        } else {
            // forward distance across the wraparound point
            self.size - from + to
        }
    }

    /// Classify `seq` against the window `[window_begin, window_begin + window_size)`,
    ///  taken modulo the space size.
    ///
    /// The non-wrapping and wrapping cases are kept as separate range tests: when the
    ///  window fits below the space boundary a plain interval check applies, otherwise
    ///  the window is the union of a tail piece `[window_begin, size)` and a head piece
    ///  `[0, window_size - (size - window_begin))`.
    pub fn classify(&self, window_begin: u32, window_size: u32, seq: u32) -> WindowPosition {
        if seq == window_begin {
            return WindowPosition::Begin;
        }

        let wraps = window_begin as u64 + window_size as u64 > self.size as u64;
        let inside = if !wraps {
            window_begin < seq && seq < window_begin + window_size
        } else {
            let head_end = window_size - (self.size - window_begin);
            (window_begin < seq && seq < self.size) || seq < head_end
        };

        if inside {
            WindowPosition::Inside
        } else {
            WindowPosition::Outside
        }
    }
}

impl Display for SeqSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mod {}", self.size)
    }
}
