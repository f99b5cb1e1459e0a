//! Job engine: typed payloads, the handler registry, the dispatcher and the
//! recurring scheduler, plus the supervised loop used by the batch queue.

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod types;

pub use backoff::{LoopExit, PollOutcome, RetryCounter, RetryPolicy, supervise};
pub use dispatcher::{Dispatcher, DispatcherStatus, TickReport};
pub use error::{JobError, JobResult};
pub use gate::ConcurrencyGate;
pub use payload::{JobConfig, JobResults};
pub use registry::JobTypeRegistry;
pub use scheduler::{ScheduleReport, Scheduler};
pub use types::{JobContext, JobHandler, ProgressReporter};
