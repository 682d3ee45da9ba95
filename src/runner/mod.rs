pub mod executor;
pub mod reporter;
pub mod scheduler;
pub mod serialization;
pub mod sink;
pub mod types;

pub use executor::{IterationContext, IterationOutcome, StepExecutor};
pub use reporter::ConsoleReporter;
pub use scheduler::{
    ExecutionReport, LoadProfile, Scheduler, StopSignal, UserOutcome, UserReport,
};
pub use sink::{FanOutSink, JsonlSink, ResultSink, SummaryCollector};
pub use types::{
    ExecutionResult, FailureKind, Flow, LabelStats, RequestFailure, RunSummary, percentile,
};
