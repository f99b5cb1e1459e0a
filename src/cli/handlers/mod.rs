//! One handler per subcommand.

pub mod schedule;
pub mod serve;
pub mod stats;

pub use schedule::ScheduleCommandHandler;
pub use serve::ServeCommandHandler;
pub use stats::StatsCommandHandler;
