//! Bootstrap command implementation.

use super::{print_json, Format};
use crate::realm::Realm;
use chatsync_engine::{BootstrapOutcome, SyncEvent};
use chatsync_protocol::Narrow;
use chatsync_server::{Endpoint, Fault};
use serde::Serialize;

/// Result of one bootstrap attempt.
#[derive(Debug, Serialize)]
pub struct BootstrapReport {
    /// Final sequencer state.
    pub state: String,
    /// Version reported by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    /// Event queue that was registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    /// Abort reason, if the attempt failed with a classified error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Failure message, if the attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Effects performed, in order.
    pub follow_ups: Vec<String>,
    /// Private messages loaded by the background backfill.
    pub recent_private_messages: usize,
    /// Faults the server injected.
    pub faults_injected: usize,
}

/// Faults to arm before bootstrapping.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapFaults {
    /// Failures on `POST /register`.
    pub register: usize,
    /// Failures on `GET /server_settings`.
    pub settings: usize,
    /// Failure kind.
    pub fault: Fault,
}

/// Runs the bootstrap command.
pub async fn run(
    realm: &Realm,
    faults: BootstrapFaults,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    realm
        .server
        .faults()
        .fail_next(Endpoint::Register, faults.register, faults.fault);
    realm
        .server
        .faults()
        .fail_next(Endpoint::ServerSettings, faults.settings, faults.fault);

    let outcome = realm.session.bootstrap().await?;
    realm.session.join_background().await;

    let mut report = BootstrapReport {
        state: realm.session.bootstrap_state().name().to_string(),
        server_version: None,
        queue_id: None,
        abort_reason: None,
        error: None,
        follow_ups: realm
            .delegate
            .calls()
            .iter()
            .map(|f| format!("{f:?}"))
            .collect(),
        recent_private_messages: realm
            .events
            .events()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::FetchCompleted {
                    narrow: Narrow::AllPrivate,
                    messages,
                    ..
                } => Some(messages.len()),
                _ => None,
            })
            .sum(),
        faults_injected: realm.server.faults().injected(),
    };
    match &outcome {
        BootstrapOutcome::Completed { snapshot, .. } => {
            report.server_version = Some(snapshot.server_version.to_string());
            report.queue_id = Some(snapshot.initial_data.queue_id.clone());
        }
        BootstrapOutcome::Aborted { reason, error, .. } => {
            report.abort_reason = reason.map(|r| r.to_string());
            report.error = Some(error.to_string());
        }
    }
    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &BootstrapReport) {
    println!("Bootstrap: {}", report.state);
    if let Some(version) = &report.server_version {
        println!("  Server version: {version}");
    }
    if let Some(queue_id) = &report.queue_id {
        println!("  Event queue:    {queue_id}");
    }
    if let Some(reason) = &report.abort_reason {
        println!("  Abort reason:   {reason}");
    }
    if let Some(error) = &report.error {
        println!("  Error:          {error}");
    }
    println!("  Follow-ups:");
    for follow_up in &report.follow_ups {
        println!("    - {follow_up}");
    }
    println!("  Recent PMs:     {}", report.recent_private_messages);
    println!("  Faults:         {}", report.faults_injected);
}
