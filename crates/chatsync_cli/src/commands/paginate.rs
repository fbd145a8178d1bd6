//! Paginate command implementation.

use super::{print_json, Format};
use crate::realm::Realm;
use chatsync_engine::SyncStore;
use chatsync_protocol::{Anchor, Message, Narrow};
use chatsync_server::{Endpoint, Fault};
use serde::Serialize;

/// One fetched page.
#[derive(Debug, Serialize)]
pub struct PageSummary {
    /// `around`, `older` or `newer`.
    pub direction: &'static str,
    /// Messages in the page.
    pub count: usize,
    /// Oldest id in the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_id: Option<u64>,
    /// Newest id in the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_id: Option<u64>,
}

/// Result of a pagination run.
#[derive(Debug, Serialize)]
pub struct PaginateReport {
    /// Narrow that was paged.
    pub narrow: String,
    /// Starting anchor.
    pub anchor: String,
    /// Pages in fetch order.
    pub pages: Vec<PageSummary>,
    /// Distinct messages loaded.
    pub total: usize,
    /// No older messages remain.
    pub older_caught_up: bool,
    /// No newer messages remain.
    pub newer_caught_up: bool,
    /// Faults the server injected.
    pub faults_injected: usize,
}

/// Pagination parameters.
#[derive(Debug, Clone)]
pub struct PaginateArgs {
    /// Narrow to page through.
    pub narrow: Narrow,
    /// Where to open the narrow.
    pub anchor: Anchor,
    /// Maximum pages per direction after the initial fetch.
    pub max_pages: usize,
    /// Failures to arm on `GET /messages` after bootstrap.
    pub fail_messages: usize,
    /// Failure kind.
    pub fault: Fault,
}

fn summarize(direction: &'static str, page: &[Message]) -> PageSummary {
    PageSummary {
        direction,
        count: page.len(),
        first_id: page.first().map(|m| m.id),
        last_id: page.last().map(|m| m.id),
    }
}

/// Runs the paginate command.
pub async fn run(
    realm: &Realm,
    args: PaginateArgs,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = &realm.session;
    let outcome = session.bootstrap().await?;
    if !outcome.is_completed() {
        return Err(format!(
            "bootstrap {}; nothing to paginate",
            session.bootstrap_state().name()
        )
        .into());
    }
    session.join_background().await;

    realm
        .server
        .faults()
        .fail_next(Endpoint::Messages, args.fail_messages, args.fault);

    let mut pages = Vec::new();
    let mut ids = std::collections::BTreeSet::new();

    if let Some(page) = session.fetch_around(&args.narrow, args.anchor).await? {
        ids.extend(page.iter().map(|m| m.id));
        pages.push(summarize("around", &page));
    }
    for _ in 0..args.max_pages {
        let Some(page) = session.fetch_older(&args.narrow).await? else {
            break;
        };
        ids.extend(page.iter().map(|m| m.id));
        pages.push(summarize("older", &page));
    }
    for _ in 0..args.max_pages {
        let Some(page) = session.fetch_newer(&args.narrow).await? else {
            break;
        };
        ids.extend(page.iter().map(|m| m.id));
        pages.push(summarize("newer", &page));
    }

    let window = session.store().fetch_window(&args.narrow);
    let report = PaginateReport {
        narrow: args.narrow.to_string(),
        anchor: args.anchor.to_string(),
        pages,
        total: ids.len(),
        older_caught_up: window.older_caught_up,
        newer_caught_up: window.newer_caught_up,
        faults_injected: realm.server.faults().injected(),
    };

    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &PaginateReport) {
    println!("Narrow {} from {}", report.narrow, report.anchor);
    for page in &report.pages {
        match (page.first_id, page.last_id) {
            (Some(first), Some(last)) => {
                println!("  {:<6} {:>4} messages  [{first}..={last}]", page.direction, page.count)
            }
            _ => println!("  {:<6}    0 messages", page.direction),
        }
    }
    println!("  Total:      {}", report.total);
    println!(
        "  Caught up:  older={} newer={}",
        report.older_caught_up, report.newer_caught_up
    );
    println!("  Faults:     {}", report.faults_injected);
}
