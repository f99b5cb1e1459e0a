//! Content-generation batch queue.

pub mod events;
pub mod manager;

pub use events::{BatchEvent, BatchListener, BatchObservers, Subscription};
pub use manager::{BatchQueueManager, BatchQueueStatus};
