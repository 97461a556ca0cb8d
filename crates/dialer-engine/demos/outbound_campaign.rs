//! Outbound Campaign Demo
//!
//! Runs a complete campaign against the loopback switch driver: registers a
//! gateway device and a transfer provider, creates a campaign from a small
//! contact list, starts the server loops, and simulates the switch by
//! answering each originated call with a scripted outcome.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example outbound_campaign -- --ports 2 --contacts 5
//! ```

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use outdial_dialer_engine::prelude::*;

#[derive(Parser, Debug)]
#[command(about = "Run a demo outbound campaign against the loopback switch")]
struct Args {
    /// Database path (empty for in-memory)
    #[arg(short = 'd', long, default_value = "")]
    db: String,

    /// Number of gateway ports to register
    #[arg(short, long, default_value = "2")]
    ports: u16,

    /// Number of contacts to dial
    #[arg(short, long, default_value = "5")]
    contacts: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("🚀 Starting outbound campaign demo");

    // Fast intervals so the demo finishes in seconds.
    let mut config = DialerConfig::default();
    config.database.database_path = args.db.clone();
    config.scheduler.dispatch_interval_ms = 200;
    config.scheduler.release_retry_interval_secs = 1;
    config.monitoring.status_interval_secs = 5;

    let switch = Arc::new(LoopbackSwitch::new());

    let mut server = DialerServerBuilder::new()
        .with_config(config)
        .with_switch(switch.clone())
        .build()
        .await?;

    let engine = server.engine().clone();

    // Capacity: one gateway device plus a transfer trunk.
    engine
        .register_device("demo-tenant", "gw-1", args.ports)
        .await?;

    let provider = engine
        .register_provider(NewProvider {
            owner_id: "demo-tenant".to_string(),
            label: "Demo trunk".to_string(),
            host: "sip.demo.invalid".to_string(),
            port: 5060,
            username: "outdial".to_string(),
            secret: "demo-secret".to_string(),
        })
        .await?;

    let contacts: Vec<String> = (0..args.contacts)
        .map(|n| format!("1555{:07}", n + 1))
        .collect();

    let campaign = engine
        .create_campaign(NewCampaign {
            owner_id: "demo-tenant".to_string(),
            name: "Demo campaign".to_string(),
            contact_list_id: "demo-list".to_string(),
            greeting_reference: "custom/welcome".to_string(),
            transfer_number: Some("18005550100".to_string()),
            provider_id: Some(provider.id.clone()),
            port_selection: vec![],
            contacts,
        })
        .await?;

    info!(
        "📋 Created campaign {} with {} contact(s)",
        campaign.id, campaign.total_attempts
    );

    server.start().await?;

    // Play the switch: pick up every originated call and report a scripted
    // outcome. Every third call is busy (and retried), every fourth call
    // presses 1 and transfers, the rest just listen and hang up.
    let responder_engine = engine.clone();
    let responder_switch = switch.clone();
    let responder = tokio::spawn(async move {
        let mut call_number = 0usize;
        loop {
            sleep(Duration::from_millis(100)).await;
            for instruction in responder_switch.take_instructions() {
                call_number += 1;
                let status = if call_number % 3 == 0 {
                    OutcomeStatus::Busy
                } else if call_number % 4 == 0 {
                    OutcomeStatus::Transferred
                } else {
                    OutcomeStatus::Answered
                };

                let outcome = CallOutcome::new(
                    &instruction.attempt_id,
                    &instruction.campaign_id,
                    instruction.try_number,
                    status,
                )
                .with_port(&instruction.port_id)
                .with_duration(12);

                info!(
                    "📲 Simulated {} for {} on channel {}",
                    status, instruction.contact_phone, instruction.port_number
                );
                if let Err(e) = responder_engine.report_outcome(outcome) {
                    warn!("Failed to report outcome: {}", e);
                    return;
                }
            }
        }
    });

    engine.start_campaign(&campaign.id).await?;
    info!("▶️  Campaign started, dialing...");

    // Poll until the campaign reaches a terminal state. Busy contacts are
    // backed off by minutes, so a demo run stops once only retries remain.
    let mut last_progress = u8::MAX;
    for _ in 0..120 {
        sleep(Duration::from_millis(500)).await;

        let snapshot = engine.campaign_snapshot(&campaign.id).await?;
        if snapshot.progress_percent != last_progress {
            last_progress = snapshot.progress_percent;
            info!(
                "📊 {}: {}% done ({} answered, {} transferred, {} failed)",
                snapshot.name,
                snapshot.progress_percent,
                snapshot.answered,
                snapshot.transferred,
                snapshot.failed
            );
        }

        if snapshot.status.is_terminal() {
            info!("🏁 Campaign finished as {}", snapshot.status);
            break;
        }

        let stats = engine.get_stats().await?;
        if stats.attempts.queued == 0
            && stats.attempts.dispatched == 0
            && stats.attempts.retrying > 0
        {
            info!(
                "⏸️  {} attempt(s) waiting out their backoff; stopping the demo here",
                stats.attempts.retrying
            );
            engine.stop_campaign(&campaign.id).await?;
            break;
        }
    }

    let snapshot = engine.campaign_snapshot(&campaign.id).await?;
    println!("\n📈 Final campaign state");
    println!("  Status:      {}", snapshot.status);
    println!("  Progress:    {}%", snapshot.progress_percent);
    println!(
        "  Outcomes:    {} answered / {} transferred / {} failed",
        snapshot.answered, snapshot.transferred, snapshot.failed
    );
    println!(
        "  Attempts:    {} of {} terminal",
        snapshot.completed_attempts, snapshot.total_attempts
    );

    responder.abort();
    server.stop().await?;
    Ok(())
}
