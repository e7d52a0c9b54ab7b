// Application Layer - Use Cases

pub mod backoff;
pub mod deadline;
pub mod discovery;
pub mod dispatcher;
pub mod marker;
pub mod runner;

// Re-exports
pub use backoff::{BackoffPolicy, RetryDecision};
pub use deadline::RunContext;
pub use discovery::{Discoverer, DiscoverySettings};
pub use dispatcher::{
    shutdown_channel, DispatchOutcome, DispatchReport, DispatcherSettings, ExportDispatcher,
    ShutdownSender, ShutdownToken,
};
pub use marker::ExportMarker;
pub use runner::{GroupReport, RunReport, Runner, RunnerSettings};
