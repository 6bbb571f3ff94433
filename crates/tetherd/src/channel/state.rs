//! Channel lifecycle states.

use std::fmt;

/// Lifecycle state of a channel.
///
/// `StartWait -> Started -> Connected -> {RedirectSent, RedirectReceived}`;
/// any state may move to `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Constructed; no bytes exchanged yet.
    StartWait,
    /// Transport communication started; handshake pending.
    Started,
    /// Handshake complete.
    Connected,
    /// Traffic is being rerouted at this end's request.
    RedirectSent,
    /// Traffic is being rerouted at the peer's request.
    RedirectReceived,
    /// Torn down.
    Closed,
}

impl ChannelState {
    /// States whose channels receive broadcast output.
    #[must_use]
    pub const fn is_broadcast_eligible(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::RedirectSent | Self::RedirectReceived
        )
    }

    /// Returns `true` when a protocol-driven transition from `self` to `next`
    /// is allowed. `start` and `close` have dedicated operations and are not
    /// accepted here.
    #[must_use]
    pub const fn can_enter(self, next: Self) -> bool {
        match next {
            Self::Connected => matches!(
                self,
                Self::Started | Self::RedirectSent | Self::RedirectReceived
            ),
            Self::RedirectSent | Self::RedirectReceived => matches!(
                self,
                Self::Connected | Self::RedirectSent | Self::RedirectReceived
            ),
            Self::StartWait | Self::Started | Self::Closed => false,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StartWait => "start_wait",
            Self::Started => "started",
            Self::Connected => "connected",
            Self::RedirectSent => "redirect_sent",
            Self::RedirectReceived => "redirect_received",
            Self::Closed => "closed",
        };
        formatter.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ChannelState::StartWait, false)]
    #[case(ChannelState::Started, false)]
    #[case(ChannelState::Connected, true)]
    #[case(ChannelState::RedirectSent, true)]
    #[case(ChannelState::RedirectReceived, true)]
    #[case(ChannelState::Closed, false)]
    fn broadcast_eligibility(#[case] state: ChannelState, #[case] eligible: bool) {
        assert_eq!(state.is_broadcast_eligible(), eligible);
    }

    #[rstest]
    #[case(ChannelState::Started, ChannelState::Connected, true)]
    #[case(ChannelState::StartWait, ChannelState::Connected, false)]
    #[case(ChannelState::Connected, ChannelState::RedirectSent, true)]
    #[case(ChannelState::RedirectReceived, ChannelState::Connected, true)]
    #[case(ChannelState::Closed, ChannelState::Connected, false)]
    #[case(ChannelState::Connected, ChannelState::Closed, false)]
    fn protocol_transitions(
        #[case] from: ChannelState,
        #[case] to: ChannelState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_enter(to), allowed);
    }
}
