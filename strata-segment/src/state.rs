//! Segment lifecycle states.
//!
//! ```text
//!          Fill            Seal
//!   Open ───────► Full ───────► Sealed
//!     │             │
//!     └──── Seal ───┼──────────► Sealed
//!     │             │
//!     └─ FlushFailed┴──────────► Failed (terminal)
//! ```

use std::fmt;

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SegmentState {
    /// Accepting appends.
    #[default]
    Open,
    /// No room for further appends; waiting to be sealed.
    Full,
    /// Closed for writes and fully durable. Readers may still consume it.
    Sealed,
    /// A flush failed. Nothing is accepted any more.
    Failed,
}

/// Events that drive segment state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// The write cursor reached capacity, or an append did not fit.
    Fill,
    /// The segment is closed for writes.
    Seal,
    /// Persisting the segment's bytes failed.
    FlushFailed,
}

impl SegmentState {
    /// Returns the state reached by applying `event`, or `None` if the
    /// transition is not allowed.
    pub fn transition(self, event: SegmentEvent) -> Option<SegmentState> {
        use SegmentEvent::*;
        use SegmentState::*;

        match (self, event) {
            (Open, Fill) | (Full, Fill) => Some(Full),
            (Open, Seal) | (Full, Seal) | (Sealed, Seal) => Some(Sealed),
            (Open, FlushFailed) | (Full, FlushFailed) => Some(Failed),
            (Sealed, Fill) | (Sealed, FlushFailed) => None,
            (Failed, _) => None,
        }
    }

    /// Returns whether the segment accepts appends.
    pub fn is_writable(self) -> bool {
        self == SegmentState::Open
    }

    /// Returns whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        self == SegmentState::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentState::Open => "open",
            SegmentState::Full => "full",
            SegmentState::Sealed => "sealed",
            SegmentState::Failed => "failed",
        }
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
