//! Content-generation batches, their items and per-owner usage.

use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schema::{batch_items, batches};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::BatchStatus")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Partial
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::ItemStatus")]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// `round(100 * settled / total)`; an empty batch counts as done.
pub fn batch_progress(completed: i32, failed: i32, total: i32) -> u8 {
    if total <= 0 {
        return 100;
    }
    let settled = (completed + failed).clamp(0, total) as f64;
    (100.0 * settled / total as f64).round() as u8
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = batches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BatchRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: BatchStatus,
    pub progress: i16,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub error: Option<String>,
    pub created_at: jiff_diesel::Timestamp,
    pub completed_at: Option<jiff_diesel::Timestamp>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = batches)]
pub struct NewBatchRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: BatchStatus,
    pub progress: i16,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub created_at: jiff_diesel::Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: BatchStatus,
    pub progress: u8,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Batch {
    pub fn new(id: Uuid, owner_id: Uuid, total_items: i32, now: Timestamp) -> Self {
        Self {
            id,
            owner_id,
            status: BatchStatus::Pending,
            progress: 0,
            total_items,
            completed_items: 0,
            failed_items: 0,
            error: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn settled(&self) -> i32 {
        self.completed_items + self.failed_items
    }

    pub fn is_settled(&self) -> bool {
        self.settled() >= self.total_items
    }

    /// Progress implied by the current counters.
    pub fn computed_progress(&self) -> u8 {
        batch_progress(self.completed_items, self.failed_items, self.total_items)
    }

    /// Terminal status once every item has settled: no failures is
    /// `completed`, no successes is `failed`, anything else `partial`.
    pub fn terminal_status(&self) -> Option<BatchStatus> {
        if !self.is_settled() {
            return None;
        }
        Some(if self.failed_items == 0 {
            BatchStatus::Completed
        } else if self.completed_items == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        })
    }

    /// Summary stored in `error` when any item failed.
    pub fn failure_summary(&self) -> Option<String> {
        (self.failed_items > 0)
            .then(|| format!("{} of {} items failed", self.failed_items, self.total_items))
    }

    pub fn to_row(&self) -> NewBatchRow {
        NewBatchRow {
            id: self.id,
            owner_id: self.owner_id,
            status: self.status,
            progress: self.progress as i16,
            total_items: self.total_items,
            completed_items: self.completed_items,
            failed_items: self.failed_items,
            created_at: self.created_at.to_diesel(),
        }
    }
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            status: row.status,
            progress: row.progress.clamp(0, 100) as u8,
            total_items: row.total_items,
            completed_items: row.completed_items,
            failed_items: row.failed_items,
            error: row.error,
            created_at: row.created_at.to_jiff(),
            completed_at: row.completed_at.map(|t| t.to_jiff()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = batch_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BatchItemRow {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub position: i32,
    pub payload: JsonValue,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub result_ref: Option<String>,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = batch_items)]
pub struct NewBatchItemRow {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub position: i32,
    pub payload: JsonValue,
    pub status: ItemStatus,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub position: i32,
    pub payload: JsonValue,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub result_ref: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BatchItem {
    pub fn new(batch_id: Uuid, position: i32, payload: JsonValue, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            position,
            payload,
            status: ItemStatus::Pending,
            error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_row(&self) -> NewBatchItemRow {
        NewBatchItemRow {
            id: self.id,
            batch_id: self.batch_id,
            position: self.position,
            payload: self.payload.clone(),
            status: self.status,
            created_at: self.created_at.to_diesel(),
            updated_at: self.updated_at.to_diesel(),
        }
    }
}

impl From<BatchItemRow> for BatchItem {
    fn from(row: BatchItemRow) -> Self {
        Self {
            id: row.id,
            batch_id: row.batch_id,
            position: row.position,
            payload: row.payload,
            status: row.status,
            error: row.error,
            result_ref: row.result_ref,
            created_at: row.created_at.to_jiff(),
            updated_at: row.updated_at.to_jiff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch(total: i32, completed: i32, failed: i32) -> Batch {
        let mut batch = Batch::new(Uuid::new_v4(), Uuid::new_v4(), total, Timestamp::now());
        batch.completed_items = completed;
        batch.failed_items = failed;
        batch
    }

    #[test]
    fn test_terminal_status_rules() {
        assert_eq!(batch(5, 3, 1).terminal_status(), None);
        assert_eq!(batch(5, 5, 0).terminal_status(), Some(BatchStatus::Completed));
        assert_eq!(batch(5, 0, 5).terminal_status(), Some(BatchStatus::Failed));
        assert_eq!(batch(5, 2, 3).terminal_status(), Some(BatchStatus::Partial));
    }

    #[test]
    fn test_failure_summary() {
        assert_eq!(batch(5, 5, 0).failure_summary(), None);
        assert_eq!(
            batch(5, 2, 3).failure_summary().as_deref(),
            Some("3 of 5 items failed")
        );
    }

    #[test]
    fn test_progress_rounding() {
        assert_eq!(batch_progress(1, 0, 3), 33);
        assert_eq!(batch_progress(2, 0, 3), 67);
        assert_eq!(batch_progress(0, 0, 0), 100);
    }

    proptest! {
        /// Settling one more item never lowers progress, and a fully settled
        /// batch is always at 100.
        #[test]
        fn prop_progress_monotonic(total in 1i32..500, outcomes in prop::collection::vec(any::<bool>(), 0..500)) {
            let mut completed = 0;
            let mut failed = 0;
            let mut last = batch_progress(0, 0, total);
            for success in outcomes.into_iter().take(total as usize) {
                if success { completed += 1 } else { failed += 1 }
                let next = batch_progress(completed, failed, total);
                prop_assert!(next >= last);
                last = next;
            }
            if completed + failed == total {
                prop_assert_eq!(last, 100);
            }
        }
    }
}
