//! Integration tests for the dialer engine
//!
//! These tests verify that the orchestration components work together
//! correctly over a real (in-memory) database: device and provider
//! registration, port claims, campaign lifecycle, dispatch scanning, and
//! outcome accounting.

use anyhow::Result;
use std::sync::Arc;

use outdial_dialer_engine::prelude::*;

async fn create_test_engine() -> Result<(Arc<DialerEngine>, Arc<LoopbackSwitch>)> {
    let mut config = DialerConfig::default();
    config.database.database_path = ":memory:".to_string();

    let switch = Arc::new(LoopbackSwitch::new());
    let engine = DialerEngine::new(config, switch.clone()).await?;
    Ok((engine, switch))
}

fn test_campaign(contacts: &[&str]) -> NewCampaign {
    NewCampaign {
        owner_id: "tenant-1".to_string(),
        name: "Integration campaign".to_string(),
        contact_list_id: "list-1".to_string(),
        greeting_reference: "custom/welcome".to_string(),
        transfer_number: Some("18005550100".to_string()),
        provider_id: None,
        port_selection: vec![],
        contacts: contacts.iter().map(|c| c.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_engine_creation() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    let stats = engine.get_stats().await.expect("Stats should be readable");

    // Verify initial state
    assert_eq!(stats.running_campaigns, 0);
    assert_eq!(stats.ports.total(), 0);
    assert_eq!(stats.attempts.queued, 0);
    assert_eq!(stats.pending_releases, 0);

    // Verify configuration is accessible
    let config = engine.config();
    assert!(config.general.max_concurrent_campaigns > 0);
    assert!(!config.general.trunk_prefix.is_empty());
}

#[tokio::test]
async fn test_device_registration_is_idempotent() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");

    let ports = engine
        .register_device("tenant-1", "gw-1", 4)
        .await
        .expect("Device registration failed");
    assert_eq!(ports.len(), 4);
    assert!(ports.iter().all(|p| p.status == PortStatus::Available));

    // Claim one port, then re-register the same device. The claimed port
    // must keep its runtime state.
    let claimed = engine
        .ports()
        .claim("tenant-1", "camp-x", None)
        .await
        .expect("Claim failed")
        .expect("A port should be available");

    let ports = engine
        .register_device("tenant-1", "gw-1", 4)
        .await
        .expect("Re-registration failed");
    assert_eq!(ports.len(), 4);

    let still_busy = ports
        .iter()
        .find(|p| p.id == claimed.id)
        .expect("Claimed port should still exist");
    assert_eq!(still_busy.status, PortStatus::Busy);
}

#[tokio::test]
async fn test_port_claim_release_cycle() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 1)
        .await
        .expect("Device registration failed");

    let port = engine
        .ports()
        .claim("tenant-1", "camp-1", None)
        .await
        .expect("Claim failed")
        .expect("The only port should be claimable");
    assert_eq!(port.status, PortStatus::Busy);
    assert_eq!(port.current_campaign_id.as_deref(), Some("camp-1"));

    // Pool exhausted now
    let second = engine
        .ports()
        .claim("tenant-1", "camp-2", None)
        .await
        .expect("Claim failed");
    assert!(second.is_none());

    engine.ports().release(&port.id).await.expect("Release failed");
    let refreshed = engine
        .ports()
        .get(&port.id)
        .await
        .expect("Get failed")
        .expect("Port should exist");
    assert_eq!(refreshed.status, PortStatus::Available);

    // Releasing again is a no-op
    engine.ports().release(&port.id).await.expect("Repeat release failed");
}

#[tokio::test]
async fn test_port_error_flow() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 1)
        .await
        .expect("Device registration failed");

    engine
        .ports()
        .mark_error("gw-1-port-1", "SIM ejected")
        .await
        .expect("Mark error failed");

    // Errored ports are out of the pool until explicitly reset
    let claim = engine
        .ports()
        .claim("tenant-1", "camp-1", None)
        .await
        .expect("Claim failed");
    assert!(claim.is_none());

    let reset = engine.ports().reset("gw-1-port-1").await.expect("Reset failed");
    assert!(reset);

    let claim = engine
        .ports()
        .claim("tenant-1", "camp-1", None)
        .await
        .expect("Claim failed");
    assert!(claim.is_some());
}

#[tokio::test]
async fn test_preferred_port_is_honored() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 3)
        .await
        .expect("Device registration failed");

    let port = engine
        .ports()
        .claim("tenant-1", "camp-1", Some("gw-1-port-2"))
        .await
        .expect("Claim failed")
        .expect("A port should be available");
    assert_eq!(port.id, "gw-1-port-2");

    // With the preference taken, claims fall back to the general pool
    let fallback = engine
        .ports()
        .claim("tenant-1", "camp-1", Some("gw-1-port-2"))
        .await
        .expect("Claim failed")
        .expect("Another port should be available");
    assert_ne!(fallback.id, "gw-1-port-2");
}

#[tokio::test]
async fn test_campaign_creation_seeds_attempts() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");

    let campaign = engine
        .create_campaign(test_campaign(&["15550001111", "15550002222", "15550003333"]))
        .await
        .expect("Campaign creation failed");

    assert_eq!(campaign.status, CampaignStatus::Created);
    assert_eq!(campaign.total_attempts, 3);

    let attempts = engine
        .database()
        .list_attempts(&campaign.id)
        .await
        .expect("Listing attempts failed");
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.status == AttemptStatus::Queued));
    assert!(attempts.iter().all(|a| a.attempts == 0));
}

#[tokio::test]
async fn test_campaign_lifecycle_transitions() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    let campaign = engine
        .create_campaign(test_campaign(&["15550001111"]))
        .await
        .expect("Campaign creation failed");

    assert_eq!(
        engine.start_campaign(&campaign.id).await.expect("Start failed"),
        CampaignStatus::Running
    );
    assert_eq!(
        engine.pause_campaign(&campaign.id).await.expect("Pause failed"),
        CampaignStatus::Paused
    );
    assert_eq!(
        engine.resume_campaign(&campaign.id).await.expect("Resume failed"),
        CampaignStatus::Running
    );
    assert_eq!(
        engine.stop_campaign(&campaign.id).await.expect("Stop failed"),
        CampaignStatus::Stopped
    );

    // Stopped is terminal
    match engine.start_campaign(&campaign.id).await {
        Err(DialerError::InvalidTransition { .. }) => {}
        other => panic!("expected invalid transition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_campaign_cannot_start() {
    let (engine, _switch) = create_test_engine().await.expect("Engine creation failed");
    let campaign = engine
        .create_campaign(test_campaign(&[]))
        .await
        .expect("Campaign creation failed");
    assert_eq!(campaign.total_attempts, 0);

    match engine.start_campaign(&campaign.id).await {
        Err(DialerError::ResourceUnavailable(msg)) => {
            assert!(msg.contains("no dispatchable attempts"));
        }
        other => panic!("expected resource unavailable, got {:?}", other),
    }

    // The campaign is untouched by the rejected start
    let fresh = engine
        .get_campaign(&campaign.id)
        .await
        .expect("Get failed")
        .expect("Campaign should exist");
    assert_eq!(fresh.status, CampaignStatus::Created);
}

#[tokio::test]
async fn test_concurrent_campaign_limit() {
    let mut config = DialerConfig::default();
    config.database.database_path = ":memory:".to_string();
    config.general.max_concurrent_campaigns = 1;

    let engine = DialerEngine::new(config, Arc::new(LoopbackSwitch::new()))
        .await
        .expect("Engine creation failed");

    let first = engine
        .create_campaign(test_campaign(&["15550001111"]))
        .await
        .expect("Campaign creation failed");
    let second = engine
        .create_campaign(test_campaign(&["15550002222"]))
        .await
        .expect("Campaign creation failed");

    engine.start_campaign(&first.id).await.expect("First start failed");

    match engine.start_campaign(&second.id).await {
        Err(DialerError::ResourceUnavailable(msg)) => {
            assert!(msg.contains("limit reached"));
        }
        other => panic!("expected resource unavailable, got {:?}", other),
    }

    // Stopping the first frees a slot
    engine.stop_campaign(&first.id).await.expect("Stop failed");
    engine.start_campaign(&second.id).await.expect("Second start failed");
}

#[tokio::test]
async fn test_dispatch_places_calls() {
    let (engine, switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 2)
        .await
        .expect("Device registration failed");

    let campaign = engine
        .create_campaign(test_campaign(&["15550001111", "15550002222", "15550003333"]))
        .await
        .expect("Campaign creation failed");
    engine.start_campaign(&campaign.id).await.expect("Start failed");

    // Three due attempts but only two ports: the scan dispatches two and
    // leaves the third queued.
    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 2);

    let instructions = switch.take_instructions();
    assert_eq!(instructions.len(), 2);
    assert!(instructions.iter().all(|i| i.campaign_id == campaign.id));
    assert!(instructions
        .iter()
        .all(|i| i.context == format!("campaign-{}", campaign.id)));

    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.attempts.dispatched, 2);
    assert_eq!(stats.attempts.queued, 1);
    assert_eq!(stats.ports.busy, 2);
    assert_eq!(stats.ports.available, 0);

    // No free port: the next cycle is a no-op
    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 0);
    assert_eq!(switch.pending_instructions(), 0);
}

#[tokio::test]
async fn test_paused_campaign_is_not_scanned() {
    let (engine, switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 1)
        .await
        .expect("Device registration failed");

    let campaign = engine
        .create_campaign(test_campaign(&["15550001111"]))
        .await
        .expect("Campaign creation failed");
    engine.start_campaign(&campaign.id).await.expect("Start failed");
    engine.pause_campaign(&campaign.id).await.expect("Pause failed");

    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 0);
    assert_eq!(switch.pending_instructions(), 0);
}

#[tokio::test]
async fn test_dispatch_fault_consumes_try_and_frees_port() {
    let (engine, switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 1)
        .await
        .expect("Device registration failed");

    let campaign = engine
        .create_campaign(test_campaign(&["15550001111"]))
        .await
        .expect("Campaign creation failed");
    engine.start_campaign(&campaign.id).await.expect("Start failed");

    switch.fail_next(1);
    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 0);

    // The failed try is consumed and the attempt waits out its backoff
    let attempt = &engine
        .database()
        .list_attempts(&campaign.id)
        .await
        .expect("Listing attempts failed")[0];
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(attempt.attempts, 1);
    assert!(attempt.next_attempt_at.is_some());

    // The port went back to the pool
    let stats = engine.get_stats().await.expect("Stats failed");
    assert_eq!(stats.ports.available, 1);

    // Backoff has not elapsed, so the next scan leaves the attempt alone
    let dispatched = engine.run_dispatch_cycle().await.expect("Dispatch failed");
    assert_eq!(dispatched, 0);
}

#[tokio::test]
async fn test_provider_registration_and_artifacts() {
    let (engine, switch) = create_test_engine().await.expect("Engine creation failed");
    engine
        .register_device("tenant-1", "gw-1", 1)
        .await
        .expect("Device registration failed");

    let provider = engine
        .register_provider(NewProvider {
            owner_id: "tenant-1".to_string(),
            label: "Main trunk".to_string(),
            host: "sip.example.net".to_string(),
            port: 5060,
            username: "outdial".to_string(),
            secret: "s3cret".to_string(),
        })
        .await
        .expect("Provider registration failed");

    let fetched = engine
        .get_provider(&provider.id)
        .await
        .expect("Get failed")
        .expect("Provider should exist");
    assert_eq!(fetched.host, "sip.example.net");

    let mut new = test_campaign(&["15550001111"]);
    new.provider_id = Some(provider.id.clone());
    let campaign = engine.create_campaign(new).await.expect("Campaign creation failed");
    engine.start_campaign(&campaign.id).await.expect("Start failed");
    engine.run_dispatch_cycle().await.expect("Dispatch failed");

    // The bundle applied to the switch carries both artifacts, with the
    // claimed port's channel encoded into the transfer dial string.
    let bundles = switch.applied_bundles();
    assert_eq!(bundles.len(), 1);
    let bundle = &bundles[0];
    assert_eq!(bundle.campaign_id, campaign.id);
    assert!(bundle.dialplan.contains("Dial(SIP/goip_port1/18005550100,30)"));
    assert!(bundle
        .sip_peer
        .as_deref()
        .expect("Bundle should carry a SIP peer")
        .contains("host=sip.example.net"));
}
