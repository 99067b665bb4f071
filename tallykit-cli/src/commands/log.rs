//! Log command implementation.

use std::path::PathBuf;

use eyre::WrapErr;
use tallykit_core::event::EventDraft;

use super::Session;
use crate::output;

/// Parses a `key=value` event parameter.
pub fn parse_parameter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn run(
    session: &Session,
    name: String,
    parameters: Vec<(String, String)>,
    payload: Option<PathBuf>,
    cookie: bool,
    fingerprint: bool,
) -> eyre::Result<()> {
    let mut draft = EventDraft::new(name)
        .parameters(parameters)
        .requires_cookie(cookie)
        .requires_fingerprint(fingerprint);
    if let Some(path) = payload {
        let bytes = std::fs::read(&path)
            .wrap_err_with(|| format!("failed to read payload {}", path.display()))?;
        draft = draft.payload(bytes);
    }

    let sdk = session.open()?;
    sdk.log(draft)?;
    let pending = sdk.pending_event_count();
    tracing::info!("event enqueued, {pending} pending");

    if session.json {
        output::print_json(&serde_json::json!({ "pending": pending }))
    } else {
        println!("enqueued ({pending} pending)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameter() {
        assert_eq!(
            parse_parameter("sku=gold=pack"),
            Ok(("sku".to_string(), "gold=pack".to_string()))
        );
        assert_eq!(parse_parameter("k="), Ok(("k".to_string(), String::new())));
        assert!(parse_parameter("novalue").is_err());
        assert!(parse_parameter("=v").is_err());
    }
}
