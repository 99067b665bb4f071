//! Durable event queue and the delivery loop that drains it.
//!
//! Events are persisted before any attempt is made and removed only after the collector
//! accepted or permanently refused them. Attempts are strictly serial. Failures back off
//! exponentially, and direct deliveries that keep failing move to the embedded renderer
//! when the host registered one.

mod background;
mod backoff;
mod direct;
mod engine;
mod queue;
mod renderer;
mod transport;

pub use background::{BackgroundTask, BackgroundTaskHost, FlushReport};
pub use backoff::Backoff;
pub use direct::DirectConnection;
pub use engine::{DeliveryEngine, DeliveryStats, LoopState};
pub use queue::{EventQueue, QueueLimits};
pub use renderer::{ContentRenderer, EmbeddedRenderer, RenderOutcome};
pub use transport::{DeliveryOutcome, Transport, TransportError, TransportSelector};
