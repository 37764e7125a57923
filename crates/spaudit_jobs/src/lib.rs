//! Job lifecycle management: cancellation tokens, the progress/event bus,
//! and the job registry that admits, runs, and tracks long-lived audit jobs.

pub mod cancel;
pub mod event;
pub mod executor;
pub mod progress;
pub mod registry;

pub use cancel::CancellationToken;
pub use event::{Event, EventBus, EventKindPub};
pub use executor::JobExecutor;
pub use progress::ProgressReporter;
pub use registry::JobRegistry;
pub use spaudit_domain::JobParams;
