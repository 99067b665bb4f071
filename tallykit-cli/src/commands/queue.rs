//! Queue command implementation.

use super::Session;
use crate::output::{self, EventView};

pub fn run(session: &Session) -> eyre::Result<()> {
    let sdk = session.open()?;
    let events = sdk.pending_events();

    if session.json {
        let views: Vec<EventView<'_>> = events.iter().map(EventView::of).collect();
        return output::print_json(&views);
    }

    output::print_table_header();
    for event in &events {
        println!("{}", output::format_table_row(event));
    }
    println!("{} pending", events.len());
    Ok(())
}
