//! The persistent state machine a channel moves through between the
//! confirmation of its funding transaction and its announcement to the
//! network.

use crate::error::Error;

/// The opening state of a channel whose funding transaction has confirmed.
/// The terminal state, fully announced, is represented by the absence of a
/// record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelOpeningState {
    /// The funding transaction is confirmed on chain but `FundingLocked`
    /// has not yet been delivered to the peer.
    MarkedOpen,
    /// `FundingLocked` has been delivered but the channel has not been
    /// added to the router graph.
    LockedSent,
    /// The channel is part of the router graph but the announcement has
    /// not been broadcast to the network.
    AddedToRouterGraph,
}

impl From<ChannelOpeningState> for u16 {
    fn from(state: ChannelOpeningState) -> u16 {
        match state {
            ChannelOpeningState::MarkedOpen => 0,
            ChannelOpeningState::LockedSent => 1,
            ChannelOpeningState::AddedToRouterGraph => 2,
        }
    }
}

impl std::convert::TryFrom<u16> for ChannelOpeningState {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Error> {
        match value {
            0 => Ok(ChannelOpeningState::MarkedOpen),
            1 => Ok(ChannelOpeningState::LockedSent),
            2 => Ok(ChannelOpeningState::AddedToRouterGraph),
            _ => Err(Error::Storage(format!(
                "unknown channel opening state {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for ChannelOpeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            ChannelOpeningState::MarkedOpen => "markedOpen",
            ChannelOpeningState::LockedSent => "lockedSent",
            ChannelOpeningState::AddedToRouterGraph => "addedToRouterGraph",
        };
        f.write_str(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn opening_state_ordinals_strictly_increase_test() {
        let states = [
            ChannelOpeningState::MarkedOpen,
            ChannelOpeningState::LockedSent,
            ChannelOpeningState::AddedToRouterGraph,
        ];
        for window in states.windows(2) {
            assert!(u16::from(window[0]) < u16::from(window[1]));
            assert!(window[0] < window[1]);
        }
        for state in states {
            assert_eq!(ChannelOpeningState::try_from(u16::from(state)).unwrap(), state);
        }
        assert!(ChannelOpeningState::try_from(3).is_err());
    }
}
