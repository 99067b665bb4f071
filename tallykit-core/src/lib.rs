//! `tallykit-core` is an embedded telemetry pipeline.
//!
//! It captures application events, signs them with a per-device checksum, keeps them in a
//! durable queue and ships them to a remote collector one at a time, with exponential backoff
//! and a background-flush window. A device identifier is kept stable across reinstalls by
//! mirroring it into storage partitions that other apps embedding the SDK can read.
//!
//! Hosts construct a [`TallyKit`] instance with a [`TallyKitConfig`] and a
//! [`storage::SharedStorageProvider`], then call its logging methods.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

/// Version of the SDK reported with every event.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

mod config;
pub use config::*;

mod error;
pub use error::*;

/// Hashing, symmetric encryption and base64 used across the pipeline.
pub mod crypto;

/// Storage partitions, platform storage traits and their implementations.
pub mod storage;

/// Device identifier resolution and launch classification.
pub mod identity;

/// The event model and its checksum.
pub mod event;

/// Durable queue, transports and the delivery loop.
pub mod delivery;

/// Builders for the well-known events reported by the SDK.
pub mod event_logger;

/// Bridge from the `log` facade to a host-provided logger.
pub mod logger;

mod sdk;
pub use sdk::*;

// private modules
mod http_request;
mod utils;

uniffi::setup_scaffolding!("tallykit_core");
