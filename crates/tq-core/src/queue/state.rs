//! Client-side lease lifecycle of one task snapshot.

/// Lease state as seen by this process.
///
/// The queue service is authoritative; this only exists so misuse on our side
/// (double acknowledge, using a snapshot after it was extended) fails fast
/// without a round trip.
///
/// Transitions:
/// - Created (push result) -> no local transitions; the service decides
/// - Leased -> Acknowledged (finish)
/// - Leased -> Superseded (extend returned a newer snapshot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseState {
    /// Returned by push; not leased by us.
    Created,

    /// Returned by lease or extend; we believe we hold the lease.
    Leased,

    /// Successfully finished.
    Acknowledged,

    /// Replaced by the snapshot an extend returned.
    Superseded,
}

impl LeaseState {
    /// Is this snapshot done (no further finish/extend allowed)?
    pub fn is_terminal(self) -> bool {
        matches!(self, LeaseState::Acknowledged | LeaseState::Superseded)
    }
}
