//! Identity command implementation.

use super::Session;
use crate::output::{self, IdentityView};

pub fn run(session: &Session) -> eyre::Result<()> {
    let sdk = session.open()?;
    let view = IdentityView::of(&sdk);
    if session.json {
        return output::print_json(&view);
    }

    println!("organization:  {}", view.organization_id);
    println!("identifier:    {}", view.identifier);
    println!("launch:        {}", view.launch_type);
    if let Some(previous) = view.previous_identifier {
        println!("previous:      {previous}");
    }
    Ok(())
}
