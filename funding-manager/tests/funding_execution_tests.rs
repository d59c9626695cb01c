extern crate funding_manager;
extern crate funding_messages;
extern crate mocks;

#[allow(dead_code)]
mod test_utils;

use std::sync::Arc;

use funding_manager::error::Error;
use funding_manager::opening::ChannelOpeningState;
use funding_manager::{ChannelDatabase, CommitmentType, GossipError, OpenStatusUpdate, Storage};
use funding_messages::{FeatureBit, FeatureVector, FundingMessage};
use mocks::mock_chain::MockChainNotifier;
use test_utils::*;

fn message_type_name(msg: &FundingMessage) -> &'static str {
    match msg {
        FundingMessage::Open(_) => "open",
        FundingMessage::Accept(_) => "accept",
        FundingMessage::Created(_) => "created",
        FundingMessage::Signed(_) => "signed",
        FundingMessage::FundingLocked(_) => "funding_locked",
        FundingMessage::Error(_) => "error",
        FundingMessage::ChannelAnnouncement(_) => "channel_announcement",
        FundingMessage::ChannelUpdate(_) => "channel_update",
        FundingMessage::AnnounceSignatures(_) => "announce_signatures",
        FundingMessage::NodeAnnouncement(_) => "node_announcement",
    }
}

#[test]
fn happy_single_funder_public_channel_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (temp_chan_id, updates_rx, _errors_rx, funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);

    // The negotiation is over for the caller once the funding transaction
    // is broadcast.
    match updates_rx.try_recv() {
        Ok(OpenStatusUpdate::ChanPending { txid, output_index }) => {
            assert_eq!(txid, funding_tx.txid());
            assert_eq!(output_index, 0);
        }
        other => panic!("expected ChanPending update, got {:?}", other),
    }
    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
    assert_eq!(alice.events.pending_open_events().len(), 1);

    // Until FundingLocked is exchanged, HTLC traffic is held back.
    let channel_id = funding_messages::channel_id_from_outpoint(&bitcoin::OutPoint {
        txid: funding_tx.txid(),
        vout: 0,
    });
    assert!(alice.manager.has_channel_barrier(&channel_id));
    assert!(bob.manager.has_channel_barrier(&channel_id));

    chain.confirm_transaction(&funding_tx);
    alice.manager.periodic_check().unwrap();
    bob.manager.periodic_check().unwrap();

    // Both sides observed the confirmation, sent FundingLocked and added
    // the channel to their router graph.
    assert_eq!(alice.events.open_events().len(), 1);
    assert_eq!(alice.events.reported_short_ids().len(), 1);
    let labels = alice.wallet.transaction_labels();
    assert_eq!(labels.len(), 1);
    assert!(labels[0].1.starts_with("openchannel:shortchanid-"));

    run_message_exchange(&mut alice, &mut bob);
    assert!(!alice.manager.has_channel_barrier(&channel_id));
    assert!(!bob.manager.has_channel_barrier(&channel_id));
    assert_eq!(alice.peers.added_channels().len(), 1);
    assert_eq!(bob.peers.added_channels().len(), 1);

    match updates_rx.try_recv() {
        Ok(OpenStatusUpdate::ChanOpen { channel_point }) => {
            assert_eq!(channel_point.txid, funding_tx.txid());
        }
        other => panic!("expected ChanOpen update, got {:?}", other),
    }

    let announced: Vec<&'static str> = alice
        .gossip
        .announcements()
        .iter()
        .map(message_type_name)
        .collect();
    assert_eq!(announced, vec!["channel_announcement", "channel_update"]);

    // The announcement proofs go out once the announcement depth is
    // reached, after which the opening record is gone.
    chain.mine_blocks(5);
    alice.manager.periodic_check().unwrap();
    bob.manager.periodic_check().unwrap();

    let announced: Vec<&'static str> = alice
        .gossip
        .announcements()
        .iter()
        .map(message_type_name)
        .collect();
    assert_eq!(
        announced,
        vec![
            "channel_announcement",
            "channel_update",
            "announce_signatures",
            "node_announcement"
        ]
    );
    assert!(alice.store.all_opening_states().unwrap().is_empty());
    assert!(bob.store.all_opening_states().unwrap().is_empty());
}

#[test]
fn responder_rejects_amount_below_minimum_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (request, _updates_rx, errors_rx) = open_channel_request(bob.node_id, 19_999);
    let temp_chan_id = alice.manager.open_channel(request).unwrap();

    let sent = alice.peers.take_messages();
    assert_eq!(sent.len(), 1);
    bob.manager
        .on_funding_message(&alice.node_id, &sent[0].1)
        .unwrap();

    // The exact error text goes to the peer, and no wallet reservation was
    // ever created for the flow.
    let errors = sent_error_messages(&bob);
    assert_eq!(
        errors,
        vec![(
            alice.node_id,
            temp_chan_id,
            "funding amount 19999 below minimum 20000".to_string()
        )]
    );
    assert!(bob.wallet.reservation_state(&temp_chan_id).is_none());

    // Delivering the error frame back tears down the initiator side too.
    let (target, channel_id, data) = errors[0].clone();
    assert_eq!(target, alice.node_id);
    alice
        .manager
        .on_funding_message(
            &bob.node_id,
            &FundingMessage::Error(funding_messages::ErrorMessage { channel_id, data }),
        )
        .unwrap();
    match errors_rx.try_recv() {
        Ok(Error::PeerError(data)) => {
            assert_eq!(data, "funding amount 19999 below minimum 20000")
        }
        other => panic!("expected peer error, got {:?}", other),
    }
    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
}

#[test]
fn boundary_amounts_test() {
    // Exactly the minimum is accepted.
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);
    complete_handshake(&mut alice, &mut bob, 20_000);

    // One above the maximum is rejected.
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut carol = create_node(3, &chain);
    let mut dave = create_node(4, &chain);
    connect(&carol, &dave);

    let max = carol.config.max_chan_size;
    let (request, _updates_rx, errors_rx) = open_channel_request(dave.node_id, max + 1);
    carol.manager.open_channel(request).unwrap();
    run_message_exchange(&mut carol, &mut dave);

    match errors_rx.try_recv() {
        Ok(Error::PeerError(data)) => {
            assert_eq!(data, format!("funding amount {} above maximum {}", max + 1, max))
        }
        other => panic!("expected peer error, got {:?}", other),
    }
    assert!(carol.wallet.published_transactions().is_empty());
}

#[test]
fn restart_between_marked_open_and_locked_sent_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (_temp_chan_id, _updates_rx, _errors_rx, funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);
    let funding_outpoint = bitcoin::OutPoint {
        txid: funding_tx.txid(),
        vout: 0,
    };

    // The peer goes away before FundingLocked can be delivered; the
    // confirmation is still processed and MarkedOpen persisted.
    alice.peers.set_online(bob.node_id, false);
    chain.confirm_transaction(&funding_tx);
    alice.manager.periodic_check().unwrap();

    let (state, short_chan_id) = alice
        .store
        .get_opening_state(&funding_outpoint)
        .unwrap()
        .expect("expected a persisted opening state");
    assert_eq!(state, ChannelOpeningState::MarkedOpen);

    // Crash and come back: the flow is re-armed from the channel database
    // and the stored state, and FundingLocked goes out when the peer does.
    restart_node(&mut alice);
    alice.peers.take_messages();
    alice.peers.set_online(bob.node_id, true);
    alice.manager.periodic_check().unwrap();

    let sent = alice.peers.take_messages();
    assert!(sent.iter().any(|(target, msg)| {
        *target == bob.node_id && matches!(msg, FundingMessage::FundingLocked(m) if m.channel_id == funding_messages::channel_id_from_outpoint(&funding_outpoint))
    }));
    let (state, resumed_short_chan_id) = alice
        .store
        .get_opening_state(&funding_outpoint)
        .unwrap()
        .expect("expected a persisted opening state");
    assert!(state > ChannelOpeningState::MarkedOpen);
    assert_eq!(short_chan_id, resumed_short_chan_id);
}

#[test]
fn responder_times_out_after_block_deadline_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (temp_chan_id, _updates_rx, _errors_rx, _funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);

    // One block short of the deadline the responder keeps waiting.
    chain.mine_blocks(2015);
    bob.manager.periodic_check().unwrap();
    assert!(bob.channel_db.closed_channels().is_empty());
    assert_eq!(bob.manager.pending_channels().unwrap().len(), 1);

    // At the deadline the channel is forgotten and the peer notified.
    chain.mine_blocks(1);
    bob.manager.periodic_check().unwrap();

    let closed = bob.channel_db.closed_channels();
    assert_eq!(closed.len(), 1);
    assert_eq!(
        closed[0].close_reason,
        funding_manager::CloseReason::FundingCanceled
    );

    let errors = sent_error_messages(&bob);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, temp_chan_id);
    assert!(errors[0].2.starts_with("timeout waiting for funding tx"));

    // The initiator has funds on the line and keeps waiting.
    alice.manager.periodic_check().unwrap();
    assert_eq!(alice.manager.pending_channels().unwrap().len(), 1);
}

#[test]
fn private_channel_announces_only_to_peer_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (mut request, _updates_rx, _errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.private = true;
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);

    let funding_tx = alice.wallet.published_transactions()[0].0.clone();
    chain.confirm_transaction(&funding_tx);
    alice.manager.periodic_check().unwrap();

    // The graph additions stay local, only our node announcement goes to
    // the peer, never to gossip, and the record is deleted right away.
    let announced: Vec<&'static str> = alice
        .gossip
        .announcements()
        .iter()
        .map(message_type_name)
        .collect();
    assert_eq!(announced, vec!["channel_announcement", "channel_update"]);

    let sent = alice.peers.take_messages();
    assert!(sent
        .iter()
        .any(|(_, msg)| matches!(msg, FundingMessage::NodeAnnouncement(_))));
    assert!(alice.store.all_opening_states().unwrap().is_empty());
}

#[test]
fn psbt_flow_canceled_by_user_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let temp_chan_id = [7; 32];
    alice.wallet.register_psbt_flow(temp_chan_id);

    let (mut request, updates_rx, errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.pending_channel_id = Some(temp_chan_id);
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);

    // The flow is parked, the caller has what it needs to build the PSBT.
    match updates_rx.try_recv() {
        Ok(OpenStatusUpdate::PsbtFund {
            funding_amount, ..
        }) => assert_eq!(funding_amount, 1_000_000),
        other => panic!("expected PsbtFund update, got {:?}", other),
    }

    // Parked reservations are shielded from the zombie sweep no matter how
    // long the user takes.
    mocks::mock_time::advance_time(10_000);
    alice.manager.periodic_check().unwrap();
    assert!(alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));

    alice.wallet.psbt_user_cancel(&temp_chan_id);
    alice.manager.periodic_check().unwrap();

    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
    let state = alice.wallet.reservation_state(&temp_chan_id).unwrap();
    assert_eq!(state.lock().unwrap().cancel_count, 1);
    assert!(alice.wallet.published_transactions().is_empty());

    let errors = sent_error_messages(&alice);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, temp_chan_id);

    match errors_rx.try_recv() {
        Ok(Error::UserCanceled) => {}
        other => panic!("expected user cancel error, got {:?}", other),
    }
}

#[test]
fn psbt_flow_completes_after_finalize_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let temp_chan_id = [8; 32];
    alice.wallet.register_psbt_flow(temp_chan_id);

    let (mut request, updates_rx, _errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.pending_channel_id = Some(temp_chan_id);
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);
    assert!(matches!(
        updates_rx.try_recv(),
        Ok(OpenStatusUpdate::PsbtFund { .. })
    ));

    alice.wallet.psbt_finalize(&temp_chan_id);
    alice.manager.periodic_check().unwrap();
    run_message_exchange(&mut alice, &mut bob);

    // The handshake resumed and completed through broadcast.
    assert_eq!(alice.wallet.published_transactions().len(), 1);
    assert!(matches!(
        updates_rx.try_recv(),
        Ok(OpenStatusUpdate::ChanPending { .. })
    ));
}

#[test]
fn zombie_sweep_reaps_idle_reservation_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (request, _updates_rx, errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    let temp_chan_id = alice.manager.open_channel(request).unwrap();
    assert!(alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));

    // Not yet expired.
    mocks::mock_time::advance_time(100);
    alice.manager.periodic_check().unwrap();
    assert!(alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));

    // The peer never answered, the reservation is reaped and the coins
    // released.
    mocks::mock_time::advance_time(600);
    alice.manager.periodic_check().unwrap();

    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
    let state = alice.wallet.reservation_state(&temp_chan_id).unwrap();
    assert_eq!(state.lock().unwrap().cancel_count, 1);
    assert!(matches!(
        errors_rx.try_recv(),
        Ok(Error::ReservationTimedOut(_))
    ));

    // The timeout is internal, the peer only sees an opaque error.
    let errors = sent_error_messages(&alice);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].2, "funding failed due to internal error");
}

#[test]
fn max_pending_channels_enforced_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    // First channel completes its handshake and sits pending in the
    // database.
    complete_handshake(&mut alice, &mut bob, 1_000_000);

    let (request, _updates_rx, errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);

    match errors_rx.try_recv() {
        Ok(Error::PeerError(data)) => {
            assert_eq!(data, "number of pending channels exceed maximum")
        }
        other => panic!("expected peer error, got {:?}", other),
    }
}

#[test]
fn shim_channels_exempt_from_pending_limit_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    // The operator registered the first channel as a canned shim on the
    // responder, it does not count towards the limit.
    let shim_chan_id = [9; 32];
    bob.wallet.register_shim(shim_chan_id);
    let (mut request, _updates_rx, _errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.pending_channel_id = Some(shim_chan_id);
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);
    assert_eq!(alice.wallet.published_transactions().len(), 1);

    let (request, _updates_rx2, errors_rx2) = open_channel_request(bob.node_id, 1_000_000);
    alice.manager.open_channel(request).unwrap();
    run_message_exchange(&mut alice, &mut bob);

    // The second channel went through the full handshake as well.
    assert!(errors_rx2.try_recv().is_err());
    assert_eq!(alice.wallet.published_transactions().len(), 2);
}

#[test]
fn peer_disconnect_cancels_reservations_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (request, _updates_rx, errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    let temp_chan_id = alice.manager.open_channel(request).unwrap();

    alice.manager.cancel_peer_reservations(&bob.node_id);

    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
    let state = alice.wallet.reservation_state(&temp_chan_id).unwrap();
    assert_eq!(state.lock().unwrap().cancel_count, 1);
    assert!(matches!(errors_rx.try_recv(), Ok(Error::PeerDisconnected)));
}

#[test]
fn upfront_shutdown_requires_peer_support_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let bob = create_node(2, &chain);
    connect(&alice, &bob);

    let script = bitcoin::ScriptBuf::from(vec![0x00, 0x14]);
    let (mut request, _updates_rx, _errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.shutdown_script = Some(script.clone());
    assert!(matches!(
        alice.manager.open_channel(request),
        Err(Error::UpfrontShutdownNotSupported)
    ));

    // With the feature signaled the script is committed into the Open
    // message.
    connect_with_features(
        &alice,
        &bob,
        FeatureVector::with_features(&[FeatureBit::UpfrontShutdownScriptOptional]),
    );
    let (mut request, _updates_rx, _errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    request.shutdown_script = Some(script.clone());
    alice.manager.open_channel(request).unwrap();

    let sent = alice.peers.take_messages();
    match &sent[0].1 {
        FundingMessage::Open(open) => {
            assert_eq!(open.upfront_shutdown_script, Some(script));
        }
        other => panic!("expected open message, got {:?}", other),
    }
}

#[test]
fn anchors_commitment_type_negotiated_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect_with_features(
        &alice,
        &bob,
        FeatureVector::with_features(&[
            FeatureBit::AnchorsOptional,
            FeatureBit::StaticRemoteKeyOptional,
        ]),
    );

    complete_handshake(&mut alice, &mut bob, 1_000_000);

    let channels = bob.channel_db.fetch_pending_channels().unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].commitment_type, CommitmentType::Anchors);
}

#[test]
fn error_frame_from_peer_cancels_reservation_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (request, _updates_rx, errors_rx) = open_channel_request(bob.node_id, 1_000_000);
    let temp_chan_id = alice.manager.open_channel(request).unwrap();

    alice
        .manager
        .on_funding_message(
            &bob.node_id,
            &FundingMessage::Error(funding_messages::ErrorMessage {
                channel_id: temp_chan_id,
                data: "no thanks".to_string(),
            }),
        )
        .unwrap();

    assert!(!alice.manager.is_pending_channel(&temp_chan_id, &bob.node_id));
    let state = alice.wallet.reservation_state(&temp_chan_id).unwrap();
    assert_eq!(state.lock().unwrap().cancel_count, 1);
    match errors_rx.try_recv() {
        Ok(Error::PeerError(data)) => assert_eq!(data, "no thanks"),
        other => panic!("expected peer error, got {:?}", other),
    }
}

#[test]
fn funding_tx_rebroadcast_on_restart_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (_temp_chan_id, _updates_rx, _errors_rx, funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);

    restart_node(&mut alice);

    let published = alice.wallet.published_transactions();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].0.txid(), funding_tx.txid());

    // The responder holds no funding transaction and rebroadcasts nothing.
    restart_node(&mut bob);
    assert!(bob.wallet.published_transactions().is_empty());
}

#[test]
fn gossip_rejection_classes_are_swallowed_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (_temp_chan_id, _updates_rx, _errors_rx, funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);

    chain.confirm_transaction(&funding_tx);
    alice.gossip.set_error(Some(GossipError::Outdated));
    alice.manager.periodic_check().unwrap();

    // Outdated announcements are not fatal, the state machine advanced
    // past the router graph step regardless.
    let funding_outpoint = bitcoin::OutPoint {
        txid: funding_tx.txid(),
        vout: 0,
    };
    let (state, _) = alice
        .store
        .get_opening_state(&funding_outpoint)
        .unwrap()
        .expect("expected a persisted opening state");
    assert_eq!(state, ChannelOpeningState::AddedToRouterGraph);
}

#[test]
fn funding_locked_before_local_confirmation_is_deferred_test() {
    let chain = Arc::new(MockChainNotifier::new(100));
    let mut alice = create_node(1, &chain);
    let mut bob = create_node(2, &chain);
    connect(&alice, &bob);

    let (_temp_chan_id, _updates_rx, _errors_rx, funding_tx) =
        complete_handshake(&mut alice, &mut bob, 1_000_000);
    let channel_id = funding_messages::channel_id_from_outpoint(&bitcoin::OutPoint {
        txid: funding_tx.txid(),
        vout: 0,
    });

    // Only the responder observes the confirmation for now and fires its
    // FundingLocked at us.
    chain.confirm_transaction(&funding_tx);
    bob.manager.periodic_check().unwrap();
    let bob_locked = bob
        .peers
        .take_messages()
        .into_iter()
        .find(|(_, msg)| matches!(msg, FundingMessage::FundingLocked(_)))
        .expect("expected FundingLocked from the responder");
    alice
        .manager
        .on_funding_message(&bob.node_id, &bob_locked.1)
        .unwrap();

    // Nothing is acted on before our own confirmation handling has run.
    assert!(alice.peers.added_channels().is_empty());
    assert!(alice.manager.has_channel_barrier(&channel_id));

    // The deferred message is replayed once MarkedOpen is written.
    alice.manager.periodic_check().unwrap();
    assert_eq!(alice.peers.added_channels().len(), 1);
    assert!(!alice.manager.has_channel_barrier(&channel_id));

    // A duplicate is detected through the stored revocation point and
    // ignored.
    alice
        .manager
        .on_funding_message(&bob.node_id, &bob_locked.1)
        .unwrap();
    assert_eq!(alice.peers.added_channels().len(), 1);
}
