//! Clear command implementation.

use super::Session;
use crate::output;

pub fn run(session: &Session) -> eyre::Result<()> {
    let sdk = session.open()?;
    let cleared = sdk.clear_pending_events();

    if session.json {
        output::print_json(&serde_json::json!({ "cleared": cleared }))
    } else {
        println!("cleared {cleared} pending event(s)");
        Ok(())
    }
}
