//! Helpers for the individual steps of the funding handshake: feature
//! negotiation, upfront shutdown resolution and validation of the
//! constraints dictated by the counterparty.

use bitcoin::ScriptBuf;
use funding_messages::{AcceptChannel, FeatureBit, FeatureVector, OpenChannel};

use crate::config::MAX_HTLC_NUMBER;
use crate::error::Error;
use crate::{ChannelBasepoints, ChannelConstraints, CommitmentType, RemoteContribution};

/// The smallest dust limit we accept a counterparty to operate with, the
/// dust threshold of a P2WSH output.
const MIN_DUST_LIMIT: u64 = 354;

/// Derives the commitment format for a new channel from the feature bits
/// both peers advertise. Anchor commitments win when both sides signal
/// them, then static remote keys, with the legacy format as fallback. The
/// choice is fixed once the reservation is opened.
pub(crate) fn negotiate_commitment_type(
    local_features: &FeatureVector,
    remote_features: &FeatureVector,
) -> CommitmentType {
    let local_anchors = local_features.has_feature(FeatureBit::AnchorsOptional);
    let remote_anchors = remote_features.has_feature(FeatureBit::AnchorsOptional);
    if local_anchors && remote_anchors {
        return CommitmentType::Anchors;
    }

    let local_tweakless = local_features.has_feature(FeatureBit::StaticRemoteKeyOptional);
    let remote_tweakless = remote_features.has_feature(FeatureBit::StaticRemoteKeyOptional);
    if local_tweakless && remote_tweakless {
        return CommitmentType::Tweakless;
    }

    CommitmentType::Legacy
}

/// Resolves the upfront shutdown script to commit to the reservation. If
/// the peer does not signal the feature, a user provided script fails the
/// flow and no script is committed otherwise. If the peer does signal it,
/// the user script wins, then a freshly derived wallet script when default
/// shutdown scripts are enabled.
pub(crate) fn upfront_shutdown_script<F>(
    enable_upfront_shutdown: bool,
    remote_features: &FeatureVector,
    user_script: Option<ScriptBuf>,
    get_script: F,
) -> Result<Option<ScriptBuf>, Error>
where
    F: FnOnce() -> Result<ScriptBuf, Error>,
{
    let remote_upfront_shutdown =
        remote_features.has_feature(FeatureBit::UpfrontShutdownScriptOptional);

    if !remote_upfront_shutdown {
        if user_script.is_some() {
            return Err(Error::UpfrontShutdownNotSupported);
        }
        return Ok(None);
    }

    if user_script.is_some() {
        return Ok(user_script);
    }

    if !enable_upfront_shutdown {
        return Ok(None);
    }

    get_script().map(Some)
}

/// Validates the constraints the counterparty dictates for our commitment
/// transaction against our own bounds and for internal consistency.
pub(crate) fn validate_constraints(
    constraints: &ChannelConstraints,
    capacity: u64,
    max_local_csv: u16,
) -> Result<(), Error> {
    if constraints.csv_delay > max_local_csv {
        return Err(Error::UnacceptableConstraints(format!(
            "csv delay of {} exceeds maximum of {}",
            constraints.csv_delay, max_local_csv
        )));
    }

    if constraints.dust_limit < MIN_DUST_LIMIT {
        return Err(Error::UnacceptableConstraints(format!(
            "dust limit of {} is below minimum of {}",
            constraints.dust_limit, MIN_DUST_LIMIT
        )));
    }

    if constraints.channel_reserve < constraints.dust_limit {
        return Err(Error::UnacceptableConstraints(format!(
            "channel reserve of {} is below dust limit of {}",
            constraints.channel_reserve, constraints.dust_limit
        )));
    }

    if constraints.channel_reserve > capacity / 5 {
        return Err(Error::UnacceptableConstraints(format!(
            "channel reserve of {} exceeds 20% of channel capacity {}",
            constraints.channel_reserve, capacity
        )));
    }

    if constraints.htlc_minimum > capacity * 1000 {
        return Err(Error::UnacceptableConstraints(format!(
            "minimum htlc value of {} msat is above channel capacity",
            constraints.htlc_minimum
        )));
    }

    if constraints.max_accepted_htlcs == 0 || constraints.max_accepted_htlcs > MAX_HTLC_NUMBER {
        return Err(Error::UnacceptableConstraints(format!(
            "max accepted htlcs of {} is out of range",
            constraints.max_accepted_htlcs
        )));
    }

    Ok(())
}

/// Assembles the counterparty's contribution from its `Open` message,
/// pairing its keys with the constraints we require on its commitment. The
/// dust limit stays the one the counterparty picked for itself.
pub(crate) fn remote_contribution_from_open(
    msg: &OpenChannel,
    required: ChannelConstraints,
) -> RemoteContribution {
    RemoteContribution {
        funding_amount: msg.funding_amount,
        basepoints: ChannelBasepoints {
            funding_pubkey: msg.funding_pubkey,
            revocation: msg.revocation_point,
            payment: msg.payment_point,
            delayed_payment: msg.delayed_payment_point,
            htlc: msg.htlc_point,
        },
        first_commitment_point: msg.first_commitment_point,
        constraints: ChannelConstraints {
            dust_limit: msg.dust_limit,
            ..required
        },
        upfront_shutdown: msg.upfront_shutdown_script.clone(),
    }
}

/// Assembles the counterparty's contribution from its `Accept` message.
pub(crate) fn remote_contribution_from_accept(
    msg: &AcceptChannel,
    required: ChannelConstraints,
) -> RemoteContribution {
    RemoteContribution {
        funding_amount: 0,
        basepoints: ChannelBasepoints {
            funding_pubkey: msg.funding_pubkey,
            revocation: msg.revocation_point,
            payment: msg.payment_point,
            delayed_payment: msg.delayed_payment_point,
            htlc: msg.htlc_point,
        },
        first_commitment_point: msg.first_commitment_point,
        constraints: ChannelConstraints {
            dust_limit: msg.dust_limit,
            ..required
        },
        upfront_shutdown: msg.upfront_shutdown_script.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_type_negotiation_test() {
        let empty = FeatureVector::empty();
        let anchors = FeatureVector::with_features(&[
            FeatureBit::AnchorsOptional,
            FeatureBit::StaticRemoteKeyOptional,
        ]);
        let tweakless = FeatureVector::with_features(&[FeatureBit::StaticRemoteKeyOptional]);

        assert_eq!(
            negotiate_commitment_type(&empty, &empty),
            CommitmentType::Legacy
        );
        assert_eq!(
            negotiate_commitment_type(&anchors, &tweakless),
            CommitmentType::Tweakless
        );
        assert_eq!(
            negotiate_commitment_type(&anchors, &anchors),
            CommitmentType::Anchors
        );
        assert_eq!(
            negotiate_commitment_type(&tweakless, &empty),
            CommitmentType::Legacy
        );
    }

    #[test]
    fn upfront_shutdown_requires_feature_test() {
        let unsupporting = FeatureVector::empty();
        let script = ScriptBuf::new();

        let res = upfront_shutdown_script(false, &unsupporting, Some(script.clone()), || {
            panic!("should not derive a script")
        });
        assert!(matches!(res, Err(Error::UpfrontShutdownNotSupported)));

        let res =
            upfront_shutdown_script(true, &unsupporting, None, || panic!("should not be called"))
                .unwrap();
        assert!(res.is_none());

        let supporting =
            FeatureVector::with_features(&[FeatureBit::UpfrontShutdownScriptOptional]);
        let res = upfront_shutdown_script(false, &supporting, Some(script.clone()), || {
            panic!("user script wins")
        })
        .unwrap();
        assert_eq!(res, Some(script));

        let derived = ScriptBuf::from(vec![0x00, 0x14]);
        let expected = derived.clone();
        let res = upfront_shutdown_script(true, &supporting, None, move || Ok(derived)).unwrap();
        assert_eq!(res, Some(expected));
    }

    #[test]
    fn constraint_validation_test() {
        let valid = ChannelConstraints {
            dust_limit: 573,
            channel_reserve: 10_000,
            max_value_in_flight: 990_000_000,
            htlc_minimum: 1000,
            max_accepted_htlcs: 483,
            csv_delay: 144,
        };
        assert!(validate_constraints(&valid, 1_000_000, 10_000).is_ok());

        let mut too_high_csv = valid;
        too_high_csv.csv_delay = 10_001;
        assert!(matches!(
            validate_constraints(&too_high_csv, 1_000_000, 10_000),
            Err(Error::UnacceptableConstraints(_))
        ));

        let mut reserve_below_dust = valid;
        reserve_below_dust.channel_reserve = 100;
        assert!(validate_constraints(&reserve_below_dust, 1_000_000, 10_000).is_err());

        let mut no_htlcs = valid;
        no_htlcs.max_accepted_htlcs = 0;
        assert!(validate_constraints(&no_htlcs, 1_000_000, 10_000).is_err());
    }
}
