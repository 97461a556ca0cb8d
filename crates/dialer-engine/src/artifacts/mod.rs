//! # Switch Config Artifact Generation
//!
//! Renders the switch-side configuration for a campaign: a SIP peer
//! section for its transfer provider and a dialplan context that plays the
//! greeting, collects one digit, and bridges digit 1 to the transfer
//! destination.
//!
//! Generation is pure and deterministic: the same campaign, provider, and
//! port inputs always render byte-identical artifacts, so re-applying a
//! bundle to the switch is always safe. Generation is also all-or-nothing;
//! a bundle with a missing required field is never partially rendered.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::campaign::Campaign;
use crate::config::GeneralConfig;
use crate::database::Provider;
use crate::error::{DialerError, Result};

/// Seconds an answered callee has to press a digit after the greeting
///
/// Fixed by the call flow, not configuration: the prompt says "press 1"
/// and the window is part of the recorded script.
pub const DIGIT_WAIT_SECS: u64 = 5;

/// Channel used when a dispatch has no claimed port to encode
pub const DEFAULT_PORT_NUMBER: u16 = 1;

/// Rendered switch configuration for one campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub campaign_id: String,
    /// Dialplan context name the switch routes this campaign's calls into
    pub context: String,
    pub dialplan: String,
    /// SIP peer section; `None` for campaigns with no linked provider
    pub sip_peer: Option<String>,
}

/// Context name for a campaign's dialplan
pub fn campaign_context(campaign_id: &str) -> String {
    format!("campaign-{}", campaign_id)
}

/// Render the SIP peer section for a transfer provider
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use outdial_dialer_engine::artifacts::generate_sip_peer;
/// use outdial_dialer_engine::database::Provider;
///
/// let provider = Provider {
///     id: "prov-1".to_string(),
///     owner_id: "tenant-1".to_string(),
///     label: "Main trunk".to_string(),
///     host: "sip.example.net".to_string(),
///     port: 5060,
///     username: "outdial".to_string(),
///     secret: "s3cret".to_string(),
///     created_at: Utc::now(),
/// };
///
/// let peer = generate_sip_peer(&provider);
/// assert!(peer.starts_with("[outdial-provider-prov-1]"));
/// assert!(peer.contains("host=sip.example.net"));
/// ```
pub fn generate_sip_peer(provider: &Provider) -> String {
    format!(
        "[outdial-provider-{id}]\n\
         type=peer\n\
         host={host}\n\
         port={port}\n\
         username={username}\n\
         fromuser={username}\n\
         secret={secret}\n\
         context=outdial-inbound\n\
         insecure=port,invite\n\
         qualify=yes\n\
         disallow=all\n\
         allow=ulaw\n\
         allow=alaw\n",
        id = provider.id,
        host = provider.host,
        port = provider.port,
        username = provider.username,
        secret = provider.secret,
    )
}

/// Render the dialplan context for a campaign
///
/// The generated flow answers, plays the campaign greeting, then waits
/// [`DIGIT_WAIT_SECS`] seconds for a single digit. Digit 1 dials the
/// transfer destination out the given gateway channel; anything else,
/// or no input, hangs up.
///
/// A campaign without a transfer number renders an empty transfer
/// destination rather than failing; a missing port number falls back to
/// [`DEFAULT_PORT_NUMBER`] with a warning. The only hard requirement is
/// the campaign id, which names the context.
pub fn generate_dialplan(
    campaign: &Campaign,
    port_number: Option<u16>,
    general: &GeneralConfig,
) -> Result<String> {
    if campaign.id.is_empty() {
        return Err(DialerError::artifact(
            "Campaign id is required to name the dialplan context",
        ));
    }

    let port_number = match port_number {
        Some(n) => n,
        None => {
            warn!(
                "No port number for campaign {} dialplan, defaulting to channel {}",
                campaign.id, DEFAULT_PORT_NUMBER
            );
            DEFAULT_PORT_NUMBER
        }
    };

    let transfer = campaign.transfer_number.as_deref().unwrap_or("");
    let trunk = format!("{}{}", general.trunk_prefix, port_number);

    Ok(format!(
        "[{context}]\n\
         exten => s,1,Answer()\n\
         \x20same => n,Playback({greeting})\n\
         \x20same => n,WaitExten({wait})\n\
         \n\
         exten => 1,1,Dial(SIP/{trunk}/{transfer},{timeout})\n\
         \x20same => n,Hangup()\n\
         \n\
         exten => i,1,Hangup()\n\
         exten => t,1,Hangup()\n",
        context = campaign_context(&campaign.id),
        greeting = campaign.greeting_reference,
        wait = DIGIT_WAIT_SECS,
        trunk = trunk,
        transfer = transfer,
        timeout = general.transfer_timeout_secs,
    ))
}

/// Render the full artifact set for a campaign
///
/// A campaign with no linked provider produces a dialplan-only bundle;
/// the transfer leg then has no registered peer to traverse, which is the
/// operator's problem to finish, not a generation failure.
pub fn generate_campaign_bundle(
    campaign: &Campaign,
    provider: Option<&Provider>,
    port_number: Option<u16>,
    general: &GeneralConfig,
) -> Result<ConfigBundle> {
    let dialplan = generate_dialplan(campaign, port_number, general)?;

    if campaign.provider_id.is_some() && provider.is_none() {
        warn!(
            "Campaign {} references provider {:?} which no longer exists; emitting dialplan only",
            campaign.id, campaign.provider_id
        );
    }

    Ok(ConfigBundle {
        campaign_id: campaign.id.clone(),
        context: campaign_context(&campaign.id),
        dialplan,
        sip_peer: provider.map(generate_sip_peer),
    })
}
