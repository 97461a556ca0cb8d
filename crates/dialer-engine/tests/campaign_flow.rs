//! End-to-end campaign flow tests
//!
//! These tests drive complete campaign runs against an in-memory store:
//! dispatch cycles claim real ports, outcomes flow back through the
//! aggregator, and the tests assert the observable progression (progress
//! percentages, retry exhaustion, auto-completion, port reuse).

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::time::timeout;

use outdial_dialer_engine::prelude::*;

async fn create_test_engine(port_count: u16) -> Result<(Arc<DialerEngine>, Arc<LoopbackSwitch>)> {
    let mut config = DialerConfig::default();
    config.database.database_path = ":memory:".to_string();

    let switch = Arc::new(LoopbackSwitch::new());
    let engine = DialerEngine::new(config, switch.clone()).await?;
    engine.register_device("tenant-1", "gw-1", port_count).await?;
    Ok((engine, switch))
}

async fn create_running_campaign(
    engine: &Arc<DialerEngine>,
    contacts: &[&str],
) -> Result<Campaign> {
    let campaign = engine
        .create_campaign(NewCampaign {
            owner_id: "tenant-1".to_string(),
            name: "Flow campaign".to_string(),
            contact_list_id: "list-1".to_string(),
            greeting_reference: "custom/welcome".to_string(),
            transfer_number: Some("18005550100".to_string()),
            provider_id: None,
            port_selection: vec![],
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
        })
        .await?;
    engine.start_campaign(&campaign.id).await?;
    Ok(campaign)
}

/// Three contacts funneled through a single port: each dispatch cycle can
/// place exactly one call, so the campaign needs three full
/// dispatch-then-outcome rounds to finish.
#[tokio::test]
async fn test_one_port_campaign_completes_in_three_rounds() {
    let (engine, switch) = create_test_engine(1).await.expect("Engine creation failed");
    let campaign = create_running_campaign(
        &engine,
        &["15550001111", "15550002222", "15550003333"],
    )
    .await
    .expect("Campaign setup failed");

    let expected_progress = [33u8, 66, 100];
    for (round, expected) in expected_progress.iter().enumerate() {
        let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
        assert_eq!(dispatched, 1, "round {} should place exactly one call", round);

        let instructions = switch.take_instructions();
        assert_eq!(instructions.len(), 1);
        let instruction = &instructions[0];
        assert_eq!(instruction.port_number, 1);

        let outcome = CallOutcome::new(
            &instruction.attempt_id,
            &instruction.campaign_id,
            instruction.try_number,
            OutcomeStatus::Answered,
        )
        .with_port(&instruction.port_id)
        .with_duration(15);
        engine.apply_outcome(&outcome).await.expect("Outcome failed");

        let snapshot = engine
            .campaign_snapshot(&campaign.id)
            .await
            .expect("Snapshot failed");
        assert_eq!(snapshot.progress_percent, *expected, "after round {}", round);
    }

    // All attempts are terminal: the campaign closed itself and the port is
    // back in the pool.
    let snapshot = engine
        .campaign_snapshot(&campaign.id)
        .await
        .expect("Snapshot failed");
    assert_eq!(snapshot.status, CampaignStatus::Completed);
    assert_eq!(snapshot.answered, 3);
    assert_eq!(snapshot.completed_attempts, 3);

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 1);
    assert_eq!(stats.ports.busy, 0);
    assert_eq!(stats.attempts.succeeded, 3);
    assert_eq!(stats.running_campaigns, 0);

    // Nothing left to dispatch
    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 0);
}

/// Every try of a single attempt fails until the retry budget runs out.
/// The first round goes through a real dispatch cycle; later rounds bypass
/// the backoff window by dispatching the row directly, which the store
/// permits because dispatch eligibility is gated on status alone.
#[tokio::test]
async fn test_busy_contact_is_retried_then_permanently_failed() {
    let (engine, switch) = create_test_engine(1).await.expect("Engine creation failed");
    let campaign = create_running_campaign(&engine, &["15550001111"])
        .await
        .expect("Campaign setup failed");
    let mut events = engine.subscribe_events();

    for round in 1..=MAX_CALL_RETRIES {
        let (attempt_id, port_id) = if round == 1 {
            let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
            assert_eq!(dispatched, 1);
            let instruction = &switch.take_instructions()[0];
            (instruction.attempt_id.clone(), instruction.port_id.clone())
        } else {
            // The backoff from the previous failure has not elapsed, so the
            // scan must skip the attempt.
            let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
            assert_eq!(dispatched, 0);

            let attempt = engine
                .database()
                .list_attempts(&campaign.id)
                .await
                .expect("Listing attempts failed")
                .remove(0);
            let port = engine
                .ports()
                .claim("tenant-1", &campaign.id, None)
                .await
                .expect("Claim failed")
                .expect("The port should be free between rounds");
            let dispatched = engine
                .database()
                .dispatch_attempt_row(&attempt.id, &port.id)
                .await
                .expect("Dispatch row failed");
            assert!(dispatched);
            (attempt.id, port.id)
        };

        let outcome = CallOutcome::new(&attempt_id, &campaign.id, round, OutcomeStatus::Busy)
            .with_port(&port_id);
        engine.apply_outcome(&outcome).await.expect("Outcome failed");

        let attempt = engine
            .database()
            .get_attempt(&attempt_id)
            .await
            .expect("Get attempt failed")
            .expect("Attempt should exist");
        assert_eq!(attempt.attempts, round);
        if round < MAX_CALL_RETRIES {
            assert_eq!(attempt.status, AttemptStatus::Failed);
        } else {
            assert_eq!(attempt.status, AttemptStatus::PermanentlyFailed);
        }
    }

    // Exhaustion closed the last attempt, so the campaign completed with a
    // failure on the books and the port free.
    let snapshot = engine
        .campaign_snapshot(&campaign.id)
        .await
        .expect("Snapshot failed");
    assert_eq!(snapshot.status, CampaignStatus::Completed);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.answered, 0);
    assert_eq!(snapshot.progress_percent, 100);

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 1);
    assert_eq!(stats.attempts.permanently_failed, 1);

    // The exhaustion was announced on the event bus
    let mut saw_exhausted = false;
    while let Ok(event) = events.try_recv() {
        if let DialerEvent::AttemptExhausted { tries, .. } = event {
            assert_eq!(tries, MAX_CALL_RETRIES);
            saw_exhausted = true;
        }
    }
    assert!(saw_exhausted, "expected an AttemptExhausted event");
}

/// A replayed outcome must not touch a port that has since been claimed by
/// someone else.
#[tokio::test]
async fn test_duplicate_outcome_never_releases_a_foreign_claim() {
    let (engine, switch) = create_test_engine(1).await.expect("Engine creation failed");
    let campaign = create_running_campaign(&engine, &["15550001111"])
        .await
        .expect("Campaign setup failed");

    engine.run_dispatch_cycle().await.expect("Dispatch failed");
    let instruction = &switch.take_instructions()[0];
    let outcome = CallOutcome::new(
        &instruction.attempt_id,
        &instruction.campaign_id,
        instruction.try_number,
        OutcomeStatus::Transferred,
    )
    .with_port(&instruction.port_id);

    let application = engine.apply_outcome(&outcome).await.expect("Outcome failed");
    assert!(application.applied());

    // The port goes straight to another campaign
    let reclaimed = engine
        .ports()
        .claim("tenant-1", "camp-other", None)
        .await
        .expect("Claim failed")
        .expect("The released port should be claimable");
    assert_eq!(reclaimed.id, instruction.port_id);

    // Replaying the outcome is absorbed without disturbing the new claim
    let replay = engine.apply_outcome(&outcome).await.expect("Replay failed");
    assert!(matches!(replay.disposition, OutcomeDisposition::Duplicate));
    assert!(replay.port_to_release.is_none());

    let port = engine
        .ports()
        .get(&instruction.port_id)
        .await
        .expect("Get failed")
        .expect("Port should exist");
    assert_eq!(port.status, PortStatus::Busy);
    assert_eq!(port.current_campaign_id.as_deref(), Some("camp-other"));

    // Counters moved exactly once
    let snapshot = engine
        .campaign_snapshot(&campaign.id)
        .await
        .expect("Snapshot failed");
    assert_eq!(snapshot.answered, 1);
    assert_eq!(snapshot.transferred, 1);
}

/// An outcome event for an earlier try arriving while the next try is in
/// flight on the same port must not disturb the live call: the exact
/// replay is absorbed as a duplicate and a never-applied late event is
/// dropped as stale, neither releasing the port nor touching the attempt.
#[tokio::test]
async fn test_late_event_for_earlier_try_is_dropped_during_redispatch() {
    let (engine, switch) = create_test_engine(1).await.expect("Engine creation failed");
    let campaign = create_running_campaign(&engine, &["15550001111"])
        .await
        .expect("Campaign setup failed");

    // Try 1 goes out and fails busy.
    engine.run_dispatch_cycle().await.expect("Dispatch failed");
    let instruction = switch.take_instructions().remove(0);
    assert_eq!(instruction.try_number, 1);

    let try_one_busy = CallOutcome::new(
        &instruction.attempt_id,
        &instruction.campaign_id,
        instruction.try_number,
        OutcomeStatus::Busy,
    )
    .with_port(&instruction.port_id);
    let first = engine.apply_outcome(&try_one_busy).await.expect("Outcome failed");
    assert!(first.applied());

    // Skip the backoff window and put try 2 in flight on the same port.
    let port = engine
        .ports()
        .claim("tenant-1", &campaign.id, None)
        .await
        .expect("Claim failed")
        .expect("The port should be free after the failed try");
    assert_eq!(port.id, instruction.port_id);
    let redispatched = engine
        .database()
        .dispatch_attempt_row(&instruction.attempt_id, &port.id)
        .await
        .expect("Dispatch row failed");
    assert!(redispatched);

    // The switch re-delivers try 1's busy event.
    let replay = engine.apply_outcome(&try_one_busy).await.expect("Replay failed");
    assert!(matches!(replay.disposition, OutcomeDisposition::Duplicate));
    assert!(replay.port_to_release.is_none());

    // A never-applied event for the stale try is dropped too.
    let late = CallOutcome::new(
        &instruction.attempt_id,
        &instruction.campaign_id,
        1,
        OutcomeStatus::NoAnswer,
    )
    .with_port(&instruction.port_id);
    let dropped = engine.apply_outcome(&late).await.expect("Late event failed");
    assert!(matches!(dropped.disposition, OutcomeDisposition::Stale));
    assert!(dropped.port_to_release.is_none());

    // The live try is untouched: the port still carries its call and the
    // attempt is still waiting for try 2's outcome.
    let port = engine
        .ports()
        .get(&instruction.port_id)
        .await
        .expect("Get failed")
        .expect("Port should exist");
    assert_eq!(port.status, PortStatus::Busy);
    assert_eq!(port.current_campaign_id.as_deref(), Some(campaign.id.as_str()));

    let attempt = engine
        .database()
        .get_attempt(&instruction.attempt_id)
        .await
        .expect("Get attempt failed")
        .expect("Attempt should exist");
    assert_eq!(attempt.status, AttemptStatus::Dispatched);
    assert_eq!(attempt.attempts, 2);

    // Try 2's real outcome still lands normally.
    let try_two = CallOutcome::new(
        &instruction.attempt_id,
        &instruction.campaign_id,
        2,
        OutcomeStatus::Answered,
    )
    .with_port(&instruction.port_id);
    let applied = engine.apply_outcome(&try_two).await.expect("Outcome failed");
    assert!(applied.applied());

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 1);
    assert_eq!(stats.attempts.succeeded, 1);
}

/// Stopping a campaign strands its in-flight call; the late outcome is
/// still accounted, but the campaign stays stopped rather than flipping
/// to completed.
#[tokio::test]
async fn test_stopped_campaign_still_absorbs_inflight_outcomes() {
    let (engine, switch) = create_test_engine(1).await.expect("Engine creation failed");
    let campaign = create_running_campaign(&engine, &["15550001111"])
        .await
        .expect("Campaign setup failed");

    engine.run_dispatch_cycle().await.expect("Dispatch failed");
    let instruction = &switch.take_instructions()[0];

    engine.stop_campaign(&campaign.id).await.expect("Stop failed");

    let outcome = CallOutcome::new(
        &instruction.attempt_id,
        &instruction.campaign_id,
        instruction.try_number,
        OutcomeStatus::Answered,
    )
    .with_port(&instruction.port_id);
    engine.apply_outcome(&outcome).await.expect("Outcome failed");

    let snapshot = engine
        .campaign_snapshot(&campaign.id)
        .await
        .expect("Snapshot failed");
    assert_eq!(snapshot.status, CampaignStatus::Stopped);
    assert_eq!(snapshot.answered, 1);
    assert_eq!(snapshot.completed_attempts, 1);

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 1);
}

/// Hammer the registry with more concurrent claims than there are ports.
/// Exactly one claimer may win each port.
#[tokio::test]
async fn test_concurrent_claims_never_double_allocate() {
    let (engine, _switch) = create_test_engine(4).await.expect("Engine creation failed");

    let mut handles = Vec::new();
    for i in 0..12 {
        let registry = engine.ports().clone();
        handles.push(tokio::spawn(async move {
            registry
                .claim("tenant-1", &format!("camp-{}", i), None)
                .await
        }));
    }

    let mut claimed_ids = Vec::new();
    for handle in handles {
        let result = handle.await.expect("Claim task panicked").expect("Claim failed");
        if let Some(port) = result {
            claimed_ids.push(port.id);
        }
    }

    assert_eq!(claimed_ids.len(), 4, "every port claimed exactly once");
    claimed_ids.sort();
    claimed_ids.dedup();
    assert_eq!(claimed_ids.len(), 4, "no port was handed out twice");

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.busy, 4);
    assert_eq!(stats.ports.available, 0);
}

/// Full server run: background loops dispatch the calls while a responder
/// task answers everything the switch sees.
#[tokio::test]
#[serial]
async fn test_server_drives_campaign_to_completion() {
    let mut config = DialerConfig::default();
    config.database.database_path = ":memory:".to_string();
    config.scheduler.dispatch_interval_ms = 50;
    config.scheduler.release_retry_interval_secs = 1;
    config.monitoring.status_interval_secs = 60;

    let switch = Arc::new(LoopbackSwitch::new());
    let mut server = DialerServerBuilder::new()
        .with_config(config)
        .with_switch(switch.clone())
        .build()
        .await
        .expect("Server build failed");
    server.start().await.expect("Server start failed");

    let engine = server.engine().clone();
    engine
        .register_device("tenant-1", "gw-1", 2)
        .await
        .expect("Device registration failed");
    let campaign = create_running_campaign(
        &engine,
        &["15550001111", "15550002222", "15550003333", "15550004444"],
    )
    .await
    .expect("Campaign setup failed");

    // Answer every originated call as it arrives
    let responder_switch = switch.clone();
    let responder_engine = engine.clone();
    let responder = tokio::spawn(async move {
        loop {
            for instruction in responder_switch.take_instructions() {
                let outcome = CallOutcome::new(
                    &instruction.attempt_id,
                    &instruction.campaign_id,
                    instruction.try_number,
                    OutcomeStatus::Answered,
                )
                .with_port(&instruction.port_id)
                .with_duration(8);
                if responder_engine.report_outcome(outcome).is_err() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let completed = timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = engine
                .campaign_snapshot(&campaign.id)
                .await
                .expect("Snapshot failed");
            if snapshot.status == CampaignStatus::Completed {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("Campaign did not complete in time");

    assert_eq!(completed.answered, 4);
    assert_eq!(completed.progress_percent, 100);

    responder.abort();
    server.stop().await.expect("Server stop failed");

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 2);
    assert_eq!(stats.attempts.succeeded, 4);
}
