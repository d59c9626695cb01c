//! #Error
use std::fmt;

/// An error code.
#[derive(Debug)]
pub enum Error {
    /// The peer has reached its maximum number of pending channels with us.
    MaxPendingChannels,
    /// Channel requests are rejected while our view of the chain is not
    /// current.
    ChainNotSynced,
    /// The proposed funding amount is above the maximum we accept.
    ChanTooLarge {
        /// The proposed funding amount.
        amount: u64,
        /// The maximum funding amount we accept.
        max: u64,
    },
    /// The proposed funding amount is below the minimum we accept.
    ChanTooSmall {
        /// The proposed funding amount.
        amount: u64,
        /// The minimum funding amount we accept.
        min: u64,
    },
    /// A non-zero push amount was proposed while we are configured to reject
    /// them.
    NonZeroPushRejected,
    /// The confirmation depth requested by the counterparty exceeds what the
    /// chain notifier can track.
    NumConfsTooLarge {
        /// The requested confirmation depth.
        required: u32,
        /// The maximum depth the notifier supports.
        max: u32,
    },
    /// The channel constraints dictated by the counterparty are unacceptable
    /// or internally inconsistent.
    UnacceptableConstraints(String),
    /// An upfront shutdown script was provided for a peer that does not
    /// signal support for the feature.
    UpfrontShutdownNotSupported,
    /// The external channel acceptor refused the channel.
    AcceptorRejected,
    /// An error coming from the wallet reservation workflow. The error text
    /// is shared with the peer.
    Reservation(String),
    /// An error occurred in the wallet component.
    Wallet(String),
    /// The wallet requires externally assembled funding for this reservation
    /// and the flow is parked until the signed PSBT is handed back.
    PsbtFundingRequired,
    /// The user canceled a PSBT funding flow.
    UserCanceled,
    /// The remote party canceled the funding flow, most likely because we
    /// took too long to produce the funding transaction.
    RemoteCanceled(String),
    /// The reservation saw no message from the peer for longer than the
    /// reservation timeout and was reaped by the zombie sweep.
    ReservationTimedOut(String),
    /// Too many blocks passed without the funding transaction confirming.
    ConfirmationTimeout,
    /// The funding manager is shutting down.
    ShuttingDown,
    /// The peer disconnected while the reservation was in progress.
    PeerDisconnected,
    /// The peer sent an error aborting the funding flow.
    PeerError(String),
    /// An invalid state was encountered, likely to indicate a bug.
    InvalidState(String),
    /// The opening state store encountered an error.
    Storage(String),
    /// The channel database encountered an error.
    Database(String),
    /// The chain notifier encountered an error.
    Notifier(String),
    /// The gossip subsystem rejected an announcement.
    Gossip(String),
    /// An IO error.
    IOError(std::io::Error),
}

impl Error {
    /// The error data to place in the error frame sent to the peer when a
    /// funding flow fails. Only errors from the reservation workflow and the
    /// funding protocol itself carry their exact text to the remote; every
    /// other kind is replaced by an opaque message so that internal state
    /// does not leak.
    pub fn peer_error_data(&self) -> String {
        match self {
            Error::MaxPendingChannels
            | Error::ChainNotSynced
            | Error::ChanTooLarge { .. }
            | Error::ChanTooSmall { .. }
            | Error::NonZeroPushRejected
            | Error::NumConfsTooLarge { .. }
            | Error::UnacceptableConstraints(_)
            | Error::UpfrontShutdownNotSupported
            | Error::AcceptorRejected
            | Error::ConfirmationTimeout
            | Error::Reservation(_) => self.to_string(),
            _ => "funding failed due to internal error".to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MaxPendingChannels => write!(f, "number of pending channels exceed maximum"),
            Error::ChainNotSynced => write!(f, "synchronizing blockchain"),
            Error::ChanTooLarge { amount, max } => {
                write!(f, "funding amount {} above maximum {}", amount, max)
            }
            Error::ChanTooSmall { amount, min } => {
                write!(f, "funding amount {} below minimum {}", amount, min)
            }
            Error::NonZeroPushRejected => write!(f, "non-zero push amounts are disabled"),
            Error::NumConfsTooLarge { required, max } => {
                write!(f, "minimum depth of {} exceeds maximum of {}", required, max)
            }
            Error::UnacceptableConstraints(ref s) => {
                write!(f, "unacceptable channel constraints: {}", s)
            }
            Error::UpfrontShutdownNotSupported => {
                write!(f, "peer does not support option upfront shutdown script")
            }
            Error::AcceptorRejected => write!(f, "open channel request rejected"),
            Error::Reservation(ref s) => write!(f, "{}", s),
            Error::Wallet(ref s) => write!(f, "wallet error: {}", s),
            Error::PsbtFundingRequired => write!(f, "waiting for signed PSBT"),
            Error::UserCanceled => write!(f, "user canceled funding"),
            Error::RemoteCanceled(ref s) => write!(f, "remote canceled funding: {}", s),
            Error::ReservationTimedOut(ref s) => write!(f, "{}", s),
            Error::ConfirmationTimeout => write!(f, "timeout waiting for funding confirmation"),
            Error::ShuttingDown => write!(f, "funding manager shutting down"),
            Error::PeerDisconnected => write!(f, "peer disconnected"),
            Error::PeerError(ref s) => write!(f, "received funding error from peer: {}", s),
            Error::InvalidState(ref s) => write!(f, "invalid state: {}", s),
            Error::Storage(ref s) => write!(f, "storage error: {}", s),
            Error::Database(ref s) => write!(f, "channel database error: {}", s),
            Error::Notifier(ref s) => write!(f, "chain notifier error: {}", s),
            Error::Gossip(ref s) => write!(f, "gossip error: {}", s),
            Error::IOError(ref e) => write!(f, "IO error: {}", e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IOError(e)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_errors_keep_their_text_test() {
        let err = Error::ChanTooSmall {
            amount: 19999,
            min: 20000,
        };
        assert_eq!(
            err.peer_error_data(),
            "funding amount 19999 below minimum 20000"
        );

        let err = Error::Reservation("not enough witness outputs to create funding".to_string());
        assert_eq!(
            err.peer_error_data(),
            "not enough witness outputs to create funding"
        );
    }

    #[test]
    fn internal_errors_are_opaque_to_the_peer_test() {
        let err = Error::Database("bucket not found".to_string());
        assert_eq!(err.peer_error_data(), "funding failed due to internal error");

        let err = Error::InvalidState("missing reservation".to_string());
        assert_eq!(err.peer_error_data(), "funding failed due to internal error");
    }
}
