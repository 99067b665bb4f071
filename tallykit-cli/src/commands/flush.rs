//! Flush command implementation.

use super::Session;
use crate::output::{self, FlushView};

pub async fn run(session: &Session, window_secs: u64) -> eyre::Result<()> {
    let sdk = session.open()?;
    let report = sdk
        .app_will_suspend(window_secs.saturating_mul(1_000), None)
        .await;
    let view = FlushView::from(report);

    if session.json {
        return output::print_json(&view);
    }

    println!(
        "delivered {}, rejected {}, {} failed attempt(s), {} remaining",
        view.delivered, view.rejected, view.failed_attempts, view.remaining
    );
    if view.deadline_expired {
        println!("flush window of {window_secs}s expired");
    }
    Ok(())
}
