//! Re-exports `tallykit-core` and its UniFFI scaffolding for the Swift and Kotlin builds.

pub use tallykit_core::*;

tallykit_core::uniffi_reexport_scaffolding!();
