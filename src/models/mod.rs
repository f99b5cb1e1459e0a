mod batch;
mod entity;
mod job;

pub use batch::{
    Batch, BatchItem, BatchItemRow, BatchRow, BatchStatus, ItemStatus, NewBatchItemRow,
    NewBatchRow, batch_progress,
};
pub use entity::{MonitoredEntity, MonitoredEntityRow, MonitoringFrequency, Platform};
pub use job::{
    DEFAULT_PRIORITY, Job, JobRow, JobStatus, JobType, MAX_PRIORITY, NewJob, NewJobRow, QueueStats,
};
