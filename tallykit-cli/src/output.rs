//! Output formatting utilities.

use serde::Serialize;
use tallykit_core::{delivery::FlushReport, event::Event, TallyKit};

/// The device identity as printed by `identity`.
#[derive(Serialize)]
pub struct IdentityView {
    pub organization_id: String,
    pub identifier: String,
    pub previous_identifier: Option<String>,
    pub launch_type: String,
}

impl IdentityView {
    pub fn of(sdk: &TallyKit) -> Self {
        Self {
            organization_id: sdk.organization_id(),
            identifier: sdk.identifier(),
            previous_identifier: sdk.previous_identifier(),
            launch_type: sdk.launch_type().to_string(),
        }
    }
}

/// A pending event as printed by `queue`.
#[derive(Serialize)]
pub struct EventView<'a> {
    pub id: String,
    pub name: &'a str,
    pub created_at: u64,
    pub method: String,
    pub parameters: &'a std::collections::BTreeMap<String, String>,
    pub payload_len: Option<usize>,
    pub checksum: &'a str,
}

impl<'a> EventView<'a> {
    pub fn of(event: &'a Event) -> Self {
        Self {
            id: event.id().to_string(),
            name: event.name(),
            created_at: event.context().created_at,
            method: event.method().to_string(),
            parameters: event.parameters(),
            payload_len: event.payload().map(<[u8]>::len),
            checksum: event.checksum(),
        }
    }
}

/// The flush summary as printed by `flush`.
#[derive(Serialize)]
pub struct FlushView {
    pub delivered: u64,
    pub rejected: u64,
    pub failed_attempts: u64,
    pub remaining: u64,
    pub deadline_expired: bool,
}

impl From<FlushReport> for FlushView {
    fn from(report: FlushReport) -> Self {
        Self {
            delivered: report.delivered,
            rejected: report.rejected,
            failed_attempts: report.failed_attempts,
            remaining: report.remaining,
            deadline_expired: report.deadline_expired,
        }
    }
}

/// Prints `value` as a single JSON line.
pub fn print_json(value: &impl Serialize) -> eyre::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Prints the header of the `queue` table.
#[allow(clippy::print_literal)]
pub fn print_table_header() {
    println!("{:<36} {:<20} {:<16} {}", "ID", "NAME", "METHOD", "PARAMETERS");
    println!("{}", "-".repeat(100));
}

/// Formats a pending event as a table row.
pub fn format_table_row(event: &Event) -> String {
    let parameters = event
        .parameters()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{:<36} {:<20} {:<16} {}",
        event.id(),
        truncate(event.name(), 20),
        event.method(),
        parameters
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Launch", 20), "Launch");
        assert_eq!(truncate("AVeryLongEventNameIndeed", 10), "AVeryLo...");
    }
}
